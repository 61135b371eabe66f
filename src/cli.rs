//! The command line shared by `iptables-save`, `ip6tables-save` and `arptables-save`.

use std::error::Error;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, FromArgMatches, Parser};

use crate::error::SaveError;
use crate::extension::Registry;
use crate::query::TableBackend;
use crate::sockopt::KernelBackend;
use crate::{save, ProtocolFamily, SaveOptions};

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(version, about = "Dump the firewall tables in the format of the restore tools", long_about = None)]
pub struct Args {
    /// Print the packet and byte counters of every rule.
    #[arg(short, long)]
    pub counters: bool,

    /// Only dump this table.
    #[arg(short, long, value_name = "TABLE")]
    pub table: Option<String>,

    /// Program used to load the kernel module of the tables.
    #[arg(short = 'M', long, value_name = "PROGRAM")]
    pub modprobe: Option<PathBuf>,

    /// Dump at once, the arguments that follow are not read.
    #[arg(short, long)]
    pub dump: bool,

    #[arg(short, long, hide = true)]
    pub binary: bool,

    #[arg(hide = true)]
    pub extra: Vec<String>,
}

/// Number of leading arguments to hand to clap: everything up to and including the first
/// `-d`, which dumps at once and leaves the rest of the command line unread.
fn dump_cutoff(args: &[OsString]) -> usize {
    let mut takes_value = false;
    for (i, arg) in args.iter().enumerate().skip(1) {
        if takes_value {
            takes_value = false;
            continue;
        }
        let arg = match arg.to_str() {
            Some(arg) => arg,
            None => continue,
        };
        match arg {
            "--" => break,
            "-d" | "--dump" => return i + 1,
            "-t" | "--table" | "-M" | "--modprobe" => takes_value = true,
            _ => {
                // a cluster of short flags, such as `-cd`
                let flags = arg.strip_prefix('-').filter(|f| !f.starts_with('-'));
                if let Some(flags) = flags {
                    if flags.contains('d') && flags.chars().all(|c| "bcd".contains(c)) {
                        return i + 1;
                    }
                }
            }
        }
    }
    args.len()
}

/// Parses the command line of the dump tool of `family`.
pub fn parse_args<I, T>(family: ProtocolFamily, args: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    args.truncate(dump_cutoff(&args));
    let matches = Args::command()
        .name(family.program_name())
        .try_get_matches_from(args)?;
    Args::from_arg_matches(&matches)
}

/// Dumps what `args` asks for from `backend`.
pub fn dump<B: TableBackend, W: Write>(
    args: &Args,
    backend: &B,
    registry: &Registry,
    out: &mut W,
) -> Result<(), SaveError> {
    let opts = SaveOptions::new(backend.get_family().program_name())
        .with_counters(args.counters)
        .with_table(args.table.as_deref());
    save(backend, registry, &opts, out)?;
    out.flush()?;
    Ok(())
}

/// Prints an error and the chain of its causes.
fn report(program: &str, err: &dyn Error) {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    eprintln!("{}: {}", program, msg);
}

/// Entry point of the dump tools.
pub fn run(family: ProtocolFamily) -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let program = family.program_name();

    let args = match parse_args(family, std::env::args_os()) {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            eprintln!(
                "Look at manual page `{}.8' for more information.",
                program
            );
            return ExitCode::FAILURE;
        }
    };

    if args.binary {
        eprintln!("-b/--binary option is not implemented");
    }
    if !args.dump && !args.extra.is_empty() {
        eprintln!("Unknown arguments found on commandline");
        return ExitCode::FAILURE;
    }

    let backend = match KernelBackend::new(family) {
        Ok(backend) => backend.with_modprobe(args.modprobe.clone()),
        Err(e) => {
            report(program, &e);
            return ExitCode::FAILURE;
        }
    };
    let registry = match Registry::with_builtin_extensions() {
        Ok(registry) => registry,
        Err(e) => {
            report(program, &e);
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match dump(&args, &backend, &registry, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(program, &e);
            ExitCode::FAILURE
        }
    }
}
