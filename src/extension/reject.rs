use std::convert::TryFrom;

use super::{
    check_payload_size, xt_align, Extension, ExtensionData, ExtensionKind, NameEntry, NameLookup,
    NameTable, OptionId, OptionSpec, RuleContext,
};
use crate::error::{DecodeError, ParameterError};
use crate::{ProtocolFamily, RuleHeader};

/// The reply sent back by the `REJECT` target. Values follow `enum ipt_reject_with`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RejectWith {
    IcmpNetUnreachable = 0,
    IcmpHostUnreachable = 1,
    IcmpProtoUnreachable = 2,
    IcmpPortUnreachable = 3,
    // 4 was the faked echo reply, which the kernel no longer implements
    IcmpNetProhibited = 5,
    IcmpHostProhibited = 6,
    TcpReset = 7,
    IcmpAdminProhibited = 8,
}

impl TryFrom<u32> for RejectWith {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => RejectWith::IcmpNetUnreachable,
            1 => RejectWith::IcmpHostUnreachable,
            2 => RejectWith::IcmpProtoUnreachable,
            3 => RejectWith::IcmpPortUnreachable,
            5 => RejectWith::IcmpNetProhibited,
            6 => RejectWith::IcmpHostProhibited,
            7 => RejectWith::TcpReset,
            8 => RejectWith::IcmpAdminProhibited,
            _ => return Err(DecodeError::UnknownRejectType(value)),
        })
    }
}

impl RejectWith {
    fn xlate_name(self) -> &'static str {
        match self {
            RejectWith::IcmpNetUnreachable => "net-unreachable",
            RejectWith::IcmpHostUnreachable => "host-unreachable",
            RejectWith::IcmpProtoUnreachable => "prot-unreachable",
            RejectWith::IcmpPortUnreachable => "port-unreachable",
            RejectWith::IcmpNetProhibited => "net-prohibited",
            RejectWith::IcmpHostProhibited => "host-prohibited",
            RejectWith::TcpReset => "tcp reset",
            RejectWith::IcmpAdminProhibited => "admin-prohibited",
        }
    }
}

const fn entry(
    name: &'static str,
    alias: &'static str,
    value: RejectWith,
    description: &'static str,
) -> NameEntry<RejectWith> {
    NameEntry {
        name,
        alias: Some(alias),
        value,
        description,
    }
}

static REJECT_NAMES: [NameEntry<RejectWith>; 8] = [
    entry(
        "icmp-net-unreachable",
        "net-unreach",
        RejectWith::IcmpNetUnreachable,
        "ICMP network unreachable",
    ),
    entry(
        "icmp-host-unreachable",
        "host-unreach",
        RejectWith::IcmpHostUnreachable,
        "ICMP host unreachable",
    ),
    entry(
        "icmp-proto-unreachable",
        "proto-unreach",
        RejectWith::IcmpProtoUnreachable,
        "ICMP protocol unreachable",
    ),
    entry(
        "icmp-port-unreachable",
        "port-unreach",
        RejectWith::IcmpPortUnreachable,
        "ICMP port unreachable (default)",
    ),
    entry(
        "icmp-net-prohibited",
        "net-prohib",
        RejectWith::IcmpNetProhibited,
        "ICMP network prohibited",
    ),
    entry(
        "icmp-host-prohibited",
        "host-prohib",
        RejectWith::IcmpHostProhibited,
        "ICMP host prohibited",
    ),
    entry("tcp-reset", "tcp-rst", RejectWith::TcpReset, "TCP RST packet"),
    entry(
        "icmp-admin-prohibited",
        "admin-prohib",
        RejectWith::IcmpAdminProhibited,
        "ICMP administratively prohibited (*)",
    ),
];

pub(crate) static REJECT_TYPES: NameTable<RejectWith> =
    NameTable::new(&REJECT_NAMES).with_retired(&[("echo-reply", "echoreply")]);

/// Parameter block of the `REJECT` target (`struct ipt_reject_info`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectInfo {
    pub with: RejectWith,
}

impl Default for RejectInfo {
    fn default() -> Self {
        RejectInfo {
            with: RejectWith::IcmpPortUnreachable,
        }
    }
}

impl RejectInfo {
    fn name(&self) -> &'static str {
        // every variant has an entry
        REJECT_TYPES.name_of(self.with).unwrap_or("icmp-port-unreachable")
    }
}

const O_REJECT_WITH: OptionId = 0;

static OPTIONS: [OptionSpec; 1] = [OptionSpec::with_argument("reject-with", O_REJECT_WITH)];

/// The IPv4 `REJECT` target: drops the packet and answers it with an ICMP error or a TCP reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reject;

fn reject_info(data: &ExtensionData) -> Option<&RejectInfo> {
    match data {
        ExtensionData::Reject(info) => Some(info),
        _ => None,
    }
}

impl Extension for Reject {
    fn name(&self) -> &'static str {
        "REJECT"
    }

    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Ipv4
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Target
    }

    fn param_size(&self) -> usize {
        std::mem::size_of::<u32>()
    }

    fn options(&self) -> &'static [OptionSpec] {
        &OPTIONS
    }

    fn help(&self) -> String {
        format!(
            "REJECT target options:\n\
             --reject-with type              drop input packet and send back\n\
             \x20                               a reply packet according to type:\n\
             Valid reject types:\n\
             {}\n\
             (*) See man page or read the INCOMPATIBILITES file for compatibility issues.\n",
            REJECT_TYPES.describe()
        )
    }

    fn init(&self) -> ExtensionData {
        RejectInfo::default().into()
    }

    fn parse(
        &self,
        id: OptionId,
        arg: &str,
        _invert: bool,
        data: &mut ExtensionData,
        _ctx: &RuleContext<'_>,
    ) -> Result<bool, ParameterError> {
        if id != O_REJECT_WITH {
            return Ok(false);
        }
        let info = match data {
            ExtensionData::Reject(info) => info,
            _ => return Err(ParameterError::ForeignParameterBlock(self.name().to_string())),
        };
        match REJECT_TYPES.resolve(arg) {
            NameLookup::Found(with) => {
                info.with = with;
                Ok(true)
            }
            NameLookup::Retired(name) => {
                warn!("--reject-with {} no longer supported", name);
                Err(ParameterError::UnknownRejectType(arg.to_string()))
            }
            NameLookup::Unknown => Err(ParameterError::UnknownRejectType(arg.to_string())),
        }
    }

    fn print(&self, data: &ExtensionData, _header: &RuleHeader, _numeric: bool) -> Option<String> {
        reject_info(data).map(|info| format!("reject-with {}", info.name()))
    }

    fn save(&self, data: &ExtensionData, _header: &RuleHeader) -> Option<String> {
        reject_info(data).map(|info| format!("--reject-with {}", info.name()))
    }

    fn translate(&self, data: &ExtensionData, _header: &RuleHeader) -> Option<String> {
        reject_info(data).map(|info| match info.with {
            RejectWith::IcmpPortUnreachable => "reject".to_string(),
            RejectWith::TcpReset => format!("reject with {}", info.with.xlate_name()),
            other => format!("reject with icmp type {}", other.xlate_name()),
        })
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, DecodeError> {
        check_payload_size(self.name(), payload, self.param_size())?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&payload[..4]);
        let with = RejectWith::try_from(u32::from_ne_bytes(raw))?;
        Ok(RejectInfo { with }.into())
    }

    fn encode(&self, data: &ExtensionData) -> Vec<u8> {
        let mut buf = vec![0u8; xt_align(self.param_size())];
        if let Some(info) = reject_info(data) {
            buf[..4].copy_from_slice(&(info.with as u32).to_ne_bytes());
        }
        buf
    }
}
