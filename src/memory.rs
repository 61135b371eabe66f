//! A backend serving tables held in memory.

use std::cell::Cell;
use std::io;
use std::rc::Rc;

use crate::error::QueryError;
use crate::query::{TableBackend, TableCache, TableHandle};
use crate::{Chain, ChainPolicy, Counters, ProtocolFamily, Rule, TableSnapshot};

/// Tables built in-process. Besides serving them, the backend keeps track of the handles it
/// opened and of the module loads it was asked for, and can simulate the failures of a kernel.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    family: ProtocolFamily,
    tables: Vec<TableSnapshot>,
    needs_module: bool,
    module_load_fails: bool,
    module_loaded: Cell<bool>,
    module_loads: Cell<usize>,
    open_handles: Rc<Cell<usize>>,
    broken_chain: Option<String>,
}

impl MemoryBackend {
    pub fn new(family: ProtocolFamily) -> Self {
        MemoryBackend {
            family,
            ..Default::default()
        }
    }

    /// Adds a table, listed after the ones already added.
    pub fn with_table(mut self, name: &str, chains: Vec<Chain>) -> Self {
        self.tables.push(TableSnapshot::new(name, chains));
        self
    }

    /// Hides every table until [`TableBackend::load_kernel_module`] is called.
    pub fn requiring_module(mut self) -> Self {
        self.needs_module = true;
        self
    }

    /// Makes every module load fail, as with a broken modprobe helper.
    pub fn with_failing_module_load(mut self) -> Self {
        self.module_load_fails = true;
        self
    }

    /// Makes reading the rules of `chain` fail.
    pub fn with_broken_chain(mut self, chain: &str) -> Self {
        self.broken_chain = Some(chain.to_string());
        self
    }

    /// How many times a module load was requested.
    pub fn module_loads(&self) -> usize {
        self.module_loads.get()
    }

    /// Number of handles opened and not yet released.
    pub fn open_handles(&self) -> usize {
        self.open_handles.get()
    }

    fn available(&self) -> bool {
        !self.needs_module || self.module_loaded.get()
    }
}

impl TableBackend for MemoryBackend {
    type Handle = MemoryHandle;

    fn get_family(&self) -> ProtocolFamily {
        self.family
    }

    fn open(&self, table: &str) -> Result<MemoryHandle, QueryError> {
        if !self.available() {
            return Err(QueryError::NoSuchTable);
        }
        let snapshot = self
            .tables
            .iter()
            .find(|t| t.get_name() == table)
            .ok_or(QueryError::NoSuchTable)?;
        self.open_handles.set(self.open_handles.get() + 1);
        Ok(MemoryHandle {
            cache: TableCache::new(snapshot.get_chains().to_vec()),
            broken_chain: self.broken_chain.clone(),
            open_handles: Rc::clone(&self.open_handles),
        })
    }

    fn table_names(&self) -> Result<Vec<String>, QueryError> {
        if !self.available() {
            return Ok(Vec::new());
        }
        Ok(self
            .tables
            .iter()
            .map(|t| t.get_name().to_string())
            .collect())
    }

    fn load_kernel_module(&self) -> Result<(), QueryError> {
        self.module_loads.set(self.module_loads.get() + 1);
        if self.module_load_fails {
            return Err(QueryError::ModuleLoadFailed {
                module: self.family.kernel_module().unwrap_or_default().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no modprobe"),
            });
        }
        self.module_loaded.set(true);
        Ok(())
    }
}

/// Handle over a copy of one memory table.
#[derive(Debug)]
pub struct MemoryHandle {
    cache: TableCache,
    broken_chain: Option<String>,
    open_handles: Rc<Cell<usize>>,
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.open_handles.set(self.open_handles.get() - 1);
    }
}

impl TableHandle for MemoryHandle {
    fn first_chain(&mut self) -> Result<Option<String>, QueryError> {
        self.cache.first_chain()
    }

    fn next_chain(&mut self) -> Result<Option<String>, QueryError> {
        self.cache.next_chain()
    }

    fn is_builtin(&self, chain: &str) -> bool {
        self.cache.is_builtin(chain)
    }

    fn get_policy(&self, chain: &str) -> Result<Option<(ChainPolicy, Counters)>, QueryError> {
        self.cache.get_policy(chain)
    }

    fn first_rule(&mut self, chain: &str) -> Result<Option<Rule>, QueryError> {
        if self.broken_chain.as_deref() == Some(chain) {
            return Err(QueryError::ConcurrentUpdate);
        }
        self.cache.first_rule(chain)
    }

    fn next_rule(&mut self) -> Result<Option<Rule>, QueryError> {
        self.cache.next_rule()
    }
}
