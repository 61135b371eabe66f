// Copyryght (c) 2021 GPL lafleur@boum.org and Simon Thoby
//
// This file is free software: you may copy, redistribute and/or modify it
// under the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This file is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see the LICENSE file.

//! Userspace side of the legacy x_tables firewall (iptables, ip6tables and arptables).
//!
//! The crate is made of two halves that only meet through the [`extension::Registry`]:
//!
//! * the **extension framework**: every match or target kind (`REJECT`, `TRACE`, the arp
//!   `mangle` target, ...) is an [`extension::Extension`] exposing an option table and a fixed
//!   set of callbacks. [`extension::ParamParser`] turns command line options into a validated
//!   parameter block for one extension.
//! * the **ruleset dumper**: a [`query::TableBackend`] hands out table handles that are walked
//!   chain by chain and rule by rule, and [`save`] renders what it finds into the text format
//!   understood by the `*-restore` tools.
//!
//! Two backends are provided. [`sockopt::KernelBackend`] reads the live tables through the
//! `getsockopt` interface of `ip_tables`, `ip6_tables` and `arp_tables`, which requires
//! `CAP_NET_ADMIN`. [`memory::MemoryBackend`] serves tables built in-process, which is what the
//! tests use and what an embedder can use to render rules it already holds.
//!
//! ```
//! use xtables_save::extension::Registry;
//! use xtables_save::memory::MemoryBackend;
//! use xtables_save::{save, Chain, ChainPolicy, Counters, ProtocolFamily, SaveOptions};
//!
//! let backend = MemoryBackend::new(ProtocolFamily::Ipv4).with_table(
//!     "filter",
//!     vec![Chain::builtin("INPUT", ChainPolicy::Accept, Counters::new(10, 500))],
//! );
//! let registry = Registry::with_builtin_extensions().unwrap();
//! let mut out = Vec::new();
//! save(&backend, &registry, &SaveOptions::new("iptables-save"), &mut out).unwrap();
//! assert!(String::from_utf8(out).unwrap().contains(":INPUT ACCEPT [10:500]\n"));
//! ```

use std::convert::TryFrom;

#[macro_use]
extern crate log;

pub mod addr;
pub use addr::{Iface, MacAddr};

mod error;
pub use error::{DecodeError, ParameterError, QueryError, RegistryError, SaveError};

pub mod extension;

mod chain;
pub use chain::{Chain, ChainPolicy, Counters};

mod rule;
pub use rule::{
    ArpHeader, ExtensionEntry, InvFlags, Ipv4Header, Ipv6Header, MaskedValue, Rule, RuleHeader,
    RuleTarget, Verdict,
};

mod table;
pub use table::{read_table_names, TableSnapshot};

pub mod query;

pub mod memory;

mod layout;
pub mod sockopt;

mod modprobe;
pub use modprobe::load_kernel_module;

mod save;
pub use save::{save, save_table, SaveOptions};

pub mod cli;

#[cfg(test)]
mod tests;

/// Denotes a protocol family. Used to tell which kind of tables an extension or a backend
/// operates on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ProtocolFamily {
    /// Extensions usable with every family, such as `TRACE`.
    Unspec = libc::NFPROTO_UNSPEC,
    Ipv4 = libc::NFPROTO_IPV4,
    Arp = libc::NFPROTO_ARP,
    Ipv6 = libc::NFPROTO_IPV6,
}

impl ProtocolFamily {
    /// Name of the dump tool for this family, used in the generated header.
    pub fn program_name(self) -> &'static str {
        match self {
            ProtocolFamily::Ipv4 => "iptables-save",
            ProtocolFamily::Ipv6 => "ip6tables-save",
            ProtocolFamily::Arp => "arptables-save",
            ProtocolFamily::Unspec => "xtables-save",
        }
    }

    /// The file under which the kernel lists the tables currently loaded for this family.
    pub fn table_names_path(self) -> Option<&'static str> {
        match self {
            ProtocolFamily::Ipv4 => Some("/proc/net/ip_tables_names"),
            ProtocolFamily::Ipv6 => Some("/proc/net/ip6_tables_names"),
            ProtocolFamily::Arp => Some("/proc/net/arp_tables_names"),
            ProtocolFamily::Unspec => None,
        }
    }

    /// The kernel module providing the tables of this family.
    pub fn kernel_module(self) -> Option<&'static str> {
        match self {
            ProtocolFamily::Ipv4 => Some("ip_tables"),
            ProtocolFamily::Ipv6 => Some("ip6_tables"),
            ProtocolFamily::Arp => Some("arp_tables"),
            ProtocolFamily::Unspec => None,
        }
    }
}

impl Default for ProtocolFamily {
    fn default() -> Self {
        Self::Unspec
    }
}

impl TryFrom<i32> for ProtocolFamily {
    type Error = DecodeError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            libc::NFPROTO_UNSPEC => Ok(ProtocolFamily::Unspec),
            libc::NFPROTO_IPV4 => Ok(ProtocolFamily::Ipv4),
            libc::NFPROTO_ARP => Ok(ProtocolFamily::Arp),
            libc::NFPROTO_IPV6 => Ok(ProtocolFamily::Ipv6),
            _ => Err(DecodeError::UnknownProtocolFamily(value)),
        }
    }
}
