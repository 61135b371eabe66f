use std::fs;
use std::io;
use std::path::Path;

use crate::error::QueryError;
use crate::Chain;

/// Maximum length of a table name in the kernel, terminating NUL included.
pub const XT_TABLE_MAXNAMELEN: usize = 32;

/// The content of one table, read in a single pass and discarded once rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    name: String,
    chains: Vec<Chain>,
}

impl TableSnapshot {
    pub fn new(name: &str, chains: Vec<Chain>) -> Self {
        TableSnapshot {
            name: name.to_string(),
            chains,
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_chains(&self) -> &[Chain] {
        &self.chains
    }
}

/// Reads a table listing such as `/proc/net/ip_tables_names`, one name per line.
///
/// A missing file means that the family has no table loaded.
pub fn read_table_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>, QueryError> {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist, no table to list", path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(QueryError::ListingUnreadable {
                path: path.display().to_string(),
                source,
            })
        }
    };

    content
        .split_inclusive('\n')
        .map(|line| match line.strip_suffix('\n') {
            Some(name) if name.len() < XT_TABLE_MAXNAMELEN => Ok(name.to_string()),
            _ => Err(QueryError::MalformedTableListing(line.to_string())),
        })
        .collect()
}
