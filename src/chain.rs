use std::convert::TryFrom;
use std::fmt;

use libc::{NF_ACCEPT, NF_DROP};

use crate::error::DecodeError;
use crate::Rule;

/// Packet and byte counters, as kept by the kernel for every rule and builtin chain.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Counters {
    pub packets: u64,
    pub bytes: u64,
}

impl Counters {
    pub fn new(packets: u64, bytes: u64) -> Self {
        Counters { packets, bytes }
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.packets, self.bytes)
    }
}

/// A chain policy. Decides what to do with a packet that was processed by a builtin chain but
/// did not match any rules.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ChainPolicy {
    /// Accept the packet.
    Accept = NF_ACCEPT,
    /// Drop the packet.
    Drop = NF_DROP,
}

impl ChainPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainPolicy::Accept => "ACCEPT",
            ChainPolicy::Drop => "DROP",
        }
    }
}

impl fmt::Display for ChainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for ChainPolicy {
    type Error = DecodeError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            NF_ACCEPT => Ok(ChainPolicy::Accept),
            NF_DROP => Ok(ChainPolicy::Drop),
            _ => Err(DecodeError::UnknownChainPolicy(value)),
        }
    }
}

/// A chain of a table, with its rules in evaluation order.
///
/// Builtin chains are attached to a netfilter hook and carry a policy and counters. User
/// defined chains are only entered through jumps and have neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    name: String,
    policy: Option<ChainPolicy>,
    counters: Counters,
    rules: Vec<Rule>,
}

impl Chain {
    pub fn builtin(name: &str, policy: ChainPolicy, counters: Counters) -> Chain {
        Chain {
            name: name.to_string(),
            policy: Some(policy),
            counters,
            rules: Vec::new(),
        }
    }

    pub fn user(name: &str) -> Chain {
        Chain {
            name: name.to_string(),
            policy: None,
            counters: Counters::default(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_policy(&self) -> Option<ChainPolicy> {
        self.policy
    }

    pub fn get_counters(&self) -> Counters {
        self.counters
    }

    pub fn get_rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_builtin(&self) -> bool {
        self.policy.is_some()
    }

    /// The declaration line of the chain in a dump: `:NAME POLICY [packets:bytes]`, with `-`
    /// and zeroed counters for user defined chains.
    pub fn header_line(&self) -> String {
        match self.policy {
            Some(policy) => format!(":{} {} {}", self.name, policy, self.counters),
            None => format!(":{} - {}", self.name, Counters::default()),
        }
    }
}
