use std::process::ExitCode;

use xtables_save::ProtocolFamily;

fn main() -> ExitCode {
    xtables_save::cli::run(ProtocolFamily::Ipv6)
}
