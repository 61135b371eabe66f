//! Walking the content of a table.
//!
//! A [`TableBackend`] opens [`TableHandle`]s, which expose the chains and rules of one table
//! through a cursor protocol (first/next chain, first/next rule). A handle is an owned value:
//! whatever it holds (socket, cached entries) is released when it is dropped.

use std::iter::FusedIterator;

use crate::error::QueryError;
use crate::{Chain, ChainPolicy, Counters, ProtocolFamily, Rule, TableSnapshot};

/// Cursor over the chains and rules of one table.
pub trait TableHandle {
    /// Moves the chain cursor to the first chain and returns its name.
    fn first_chain(&mut self) -> Result<Option<String>, QueryError>;

    fn next_chain(&mut self) -> Result<Option<String>, QueryError>;

    fn is_builtin(&self, chain: &str) -> bool;

    /// Policy and counters of a builtin chain, `None` for user defined chains.
    fn get_policy(&self, chain: &str) -> Result<Option<(ChainPolicy, Counters)>, QueryError>;

    /// Moves the rule cursor to the first rule of `chain`.
    fn first_rule(&mut self, chain: &str) -> Result<Option<Rule>, QueryError>;

    fn next_rule(&mut self) -> Result<Option<Rule>, QueryError>;

    /// Iterates over the chain names, restarting from the first chain.
    fn chains(&mut self) -> Chains<'_, Self>
    where
        Self: Sized,
    {
        Chains {
            handle: self,
            started: false,
            done: false,
        }
    }

    /// Iterates over the rules of `chain`, restarting from its first rule.
    fn rules<'h>(&'h mut self, chain: &str) -> Rules<'h, Self>
    where
        Self: Sized,
    {
        Rules {
            handle: self,
            chain: chain.to_string(),
            started: false,
            done: false,
        }
    }
}

/// A source of tables for one protocol family.
pub trait TableBackend {
    type Handle: TableHandle;

    fn get_family(&self) -> ProtocolFamily;

    fn open(&self, table: &str) -> Result<Self::Handle, QueryError>;

    /// Names of the tables currently available, in listing order.
    fn table_names(&self) -> Result<Vec<String>, QueryError>;

    /// Makes the tables of the family available, typically by loading a kernel module.
    fn load_kernel_module(&self) -> Result<(), QueryError>;
}

/// Turns a `Result<Option<T>>` cursor step into an iterator item, stopping after the end or
/// the first error.
fn step<T>(done: &mut bool, res: Result<Option<T>, QueryError>) -> Option<Result<T, QueryError>> {
    match res {
        Ok(Some(val)) => Some(Ok(val)),
        Ok(None) => {
            *done = true;
            None
        }
        Err(e) => {
            *done = true;
            Some(Err(e))
        }
    }
}

pub struct Chains<'h, H: TableHandle> {
    handle: &'h mut H,
    started: bool,
    done: bool,
}

impl<'h, H: TableHandle> Iterator for Chains<'h, H> {
    type Item = Result<String, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let res = if self.started {
            self.handle.next_chain()
        } else {
            self.started = true;
            self.handle.first_chain()
        };
        step(&mut self.done, res)
    }
}

impl<'h, H: TableHandle> FusedIterator for Chains<'h, H> {}

pub struct Rules<'h, H: TableHandle> {
    handle: &'h mut H,
    chain: String,
    started: bool,
    done: bool,
}

impl<'h, H: TableHandle> Iterator for Rules<'h, H> {
    type Item = Result<Rule, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let res = if self.started {
            self.handle.next_rule()
        } else {
            self.started = true;
            self.handle.first_rule(&self.chain)
        };
        step(&mut self.done, res)
    }
}

impl<'h, H: TableHandle> FusedIterator for Rules<'h, H> {}

/// Opens `table`, loading the kernel module of the family and retrying once if the first
/// attempt fails.
pub fn open_table<B: TableBackend>(backend: &B, table: &str) -> Result<B::Handle, QueryError> {
    match backend.open(table) {
        Ok(handle) => Ok(handle),
        Err(e) => {
            debug!("Opening table {} failed ({}), loading the kernel module", table, e);
            if let Err(e) = backend.load_kernel_module() {
                warn!("{}", e);
            }
            backend
                .open(table)
                .map_err(|source| QueryError::TableUnavailable {
                    table: table.to_string(),
                    source: Box::new(source),
                })
        }
    }
}

/// Reads every chain of `table` with its rules, the chain list first. The handle is released
/// before returning, whatever the outcome.
pub fn snapshot<B: TableBackend>(backend: &B, table: &str) -> Result<TableSnapshot, QueryError> {
    let mut handle = open_table(backend, table)?;

    let names = handle.chains().collect::<Result<Vec<_>, _>>()?;
    let mut chains = Vec::with_capacity(names.len());
    for name in names {
        let chain = match handle.get_policy(&name)? {
            Some((policy, counters)) if handle.is_builtin(&name) => {
                Chain::builtin(&name, policy, counters)
            }
            _ => Chain::user(&name),
        };
        chains.push(chain);
    }

    for chain in chains.iter_mut() {
        let name = chain.get_name().to_string();
        for rule in handle.rules(&name) {
            chain.add_rule(rule?);
        }
        debug!(
            "Read {} rules from {}:{}",
            chain.get_rules().len(),
            table,
            name
        );
    }
    Ok(TableSnapshot::new(table, chains))
}

/// A handle over a table that was read in full when it was opened. Both backends cache the
/// whole table this way, so the cursors never see a concurrent update.
#[derive(Debug, Clone)]
pub struct TableCache {
    chains: Vec<Chain>,
    chain_cursor: Option<usize>,
    rule_cursor: Option<(usize, usize)>,
}

impl TableCache {
    pub fn new(chains: Vec<Chain>) -> Self {
        TableCache {
            chains,
            chain_cursor: None,
            rule_cursor: None,
        }
    }

    fn find(&self, chain: &str) -> Option<(usize, &Chain)> {
        self.chains
            .iter()
            .enumerate()
            .find(|(_, c)| c.get_name() == chain)
    }

    fn chain_name(&self, idx: usize) -> Option<String> {
        self.chains.get(idx).map(|c| c.get_name().to_string())
    }

    fn rule(&self, (chain, rule): (usize, usize)) -> Option<Rule> {
        self.chains
            .get(chain)
            .and_then(|c| c.get_rules().get(rule))
            .cloned()
    }
}

impl TableHandle for TableCache {
    fn first_chain(&mut self) -> Result<Option<String>, QueryError> {
        self.chain_cursor = Some(0);
        Ok(self.chain_name(0))
    }

    fn next_chain(&mut self) -> Result<Option<String>, QueryError> {
        let next = self.chain_cursor.map_or(0, |idx| idx + 1);
        self.chain_cursor = Some(next);
        Ok(self.chain_name(next))
    }

    fn is_builtin(&self, chain: &str) -> bool {
        self.find(chain).map_or(false, |(_, c)| c.is_builtin())
    }

    fn get_policy(&self, chain: &str) -> Result<Option<(ChainPolicy, Counters)>, QueryError> {
        Ok(self
            .find(chain)
            .and_then(|(_, c)| c.get_policy().map(|policy| (policy, c.get_counters()))))
    }

    fn first_rule(&mut self, chain: &str) -> Result<Option<Rule>, QueryError> {
        let idx = match self.find(chain) {
            Some((idx, _)) => idx,
            None => {
                self.rule_cursor = None;
                return Ok(None);
            }
        };
        self.rule_cursor = Some((idx, 0));
        Ok(self.rule((idx, 0)))
    }

    fn next_rule(&mut self) -> Result<Option<Rule>, QueryError> {
        let (chain, rule) = match self.rule_cursor {
            Some(cursor) => cursor,
            None => return Ok(None),
        };
        self.rule_cursor = Some((chain, rule + 1));
        Ok(self.rule((chain, rule + 1)))
    }
}
