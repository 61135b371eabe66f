use std::io::Write;

use chrono::Local;

use crate::error::SaveError;
use crate::extension::Registry;
use crate::query::{snapshot, TableBackend};

/// What to dump and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Name of the tool, written in the header of every table.
    pub program: String,
    pub version: String,
    /// Prefix every rule with its `[packets:bytes]` counters.
    pub counters: bool,
    /// Only dump this table instead of every listed one.
    pub table: Option<String>,
}

impl SaveOptions {
    pub fn new(program: &str) -> Self {
        SaveOptions {
            program: program.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            counters: false,
            table: None,
        }
    }

    pub fn with_counters(mut self, counters: bool) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_table(mut self, table: Option<&str>) -> Self {
        self.table = table.map(str::to_string);
        self
    }
}

/// Local time in the layout of `ctime(3)`.
fn timestamp() -> String {
    Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Dumps the requested table, or every table listed by the backend, in listing order. The
/// first failure stops the dump.
pub fn save<B: TableBackend, W: Write>(
    backend: &B,
    registry: &Registry,
    opts: &SaveOptions,
    out: &mut W,
) -> Result<(), SaveError> {
    match &opts.table {
        Some(table) => save_table(backend, registry, opts, table, out),
        None => {
            for table in backend.table_names()? {
                save_table(backend, registry, opts, &table, out)?;
            }
            Ok(())
        }
    }
}

/// Dumps a single table. Nothing is written when the table cannot be opened.
pub fn save_table<B: TableBackend, W: Write>(
    backend: &B,
    registry: &Registry,
    opts: &SaveOptions,
    table: &str,
    out: &mut W,
) -> Result<(), SaveError> {
    let snapshot = snapshot(backend, table)?;

    writeln!(
        out,
        "# Generated by {} v{} on {}",
        opts.program,
        opts.version,
        timestamp()
    )?;
    writeln!(out, "*{}", snapshot.get_name())?;

    // every chain is declared before the rules, so that jumps never point forward
    for chain in snapshot.get_chains() {
        writeln!(out, "{}", chain.header_line())?;
    }

    for chain in snapshot.get_chains() {
        for rule in chain.get_rules() {
            let line = rule.to_save_line(chain.get_name(), registry, opts.counters)?;
            writeln!(out, "{}", line)?;
        }
    }

    writeln!(out, "COMMIT")?;
    writeln!(out, "# Completed on {}", timestamp())?;
    Ok(())
}
