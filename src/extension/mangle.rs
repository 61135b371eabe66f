use std::net::{IpAddr, Ipv4Addr};

use bitflags::bitflags;

use super::{
    check_payload_size, xt_align, Extension, ExtensionData, ExtensionKind, NameEntry, NameLookup,
    NameTable, OptionId, OptionSpec, RuleContext,
};
use crate::addr::{ipaddr_to_anyname, parse_ipv4_any, MacAddr, ETH_ALEN};
use crate::error::{DecodeError, ParameterError};
use crate::{ProtocolFamily, RuleHeader};

/// Size of the hardware address buffers of `struct arpt_mangle`.
const ARPT_DEV_ADDR_LEN_MAX: usize = 16;

const SRC_DEVADDR_OFFSET: usize = 0;
const TGT_DEVADDR_OFFSET: usize = SRC_DEVADDR_OFFSET + ARPT_DEV_ADDR_LEN_MAX;
const SRC_IP_OFFSET: usize = TGT_DEVADDR_OFFSET + ARPT_DEV_ADDR_LEN_MAX;
const TGT_IP_OFFSET: usize = SRC_IP_OFFSET + 4;
const FLAGS_OFFSET: usize = TGT_IP_OFFSET + 4;
const TARGET_OFFSET: usize = FLAGS_OFFSET + 4;
const ARPT_MANGLE_SIZE: usize = TARGET_OFFSET + 4;

bitflags! {
    /// The fields a mangle target rewrites, as stored in `struct arpt_mangle`.
    pub struct MangleFlags: u8 {
        const SDEV = 0x01;
        const TDEV = 0x02;
        const SIP = 0x04;
        const TIP = 0x08;
    }
}

/// What happens to the packet once it was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MangleVerdict {
    Drop,
    Accept,
    /// Keep traversing the chain.
    Continue,
}

impl Default for MangleVerdict {
    fn default() -> Self {
        MangleVerdict::Accept
    }
}

impl MangleVerdict {
    fn to_raw(self) -> i32 {
        match self {
            MangleVerdict::Drop => libc::NF_DROP,
            MangleVerdict::Accept => libc::NF_ACCEPT,
            // XT_CONTINUE
            MangleVerdict::Continue => -1,
        }
    }

    fn from_raw(raw: i32) -> Result<Self, DecodeError> {
        match raw {
            libc::NF_DROP => Ok(MangleVerdict::Drop),
            libc::NF_ACCEPT => Ok(MangleVerdict::Accept),
            -1 => Ok(MangleVerdict::Continue),
            _ => Err(DecodeError::UnknownMangleVerdict(raw)),
        }
    }
}

static VERDICT_NAMES: [NameEntry<MangleVerdict>; 3] = [
    NameEntry {
        name: "DROP",
        alias: None,
        value: MangleVerdict::Drop,
        description: "drop the packet",
    },
    NameEntry {
        name: "ACCEPT",
        alias: None,
        value: MangleVerdict::Accept,
        description: "accept the packet (default)",
    },
    NameEntry {
        name: "CONTINUE",
        alias: None,
        value: MangleVerdict::Continue,
        description: "continue with the next rule",
    },
];

static MANGLE_VERDICTS: NameTable<MangleVerdict> = NameTable::new(&VERDICT_NAMES);

/// Parameter block of the arp `mangle` target. A field left to `None` is not rewritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArpMangle {
    pub src_ip: Option<Ipv4Addr>,
    pub tgt_ip: Option<Ipv4Addr>,
    pub src_mac: Option<MacAddr>,
    pub tgt_mac: Option<MacAddr>,
    pub verdict: MangleVerdict,
}

impl ArpMangle {
    pub fn flags(&self) -> MangleFlags {
        let mut flags = MangleFlags::empty();
        flags.set(MangleFlags::SDEV, self.src_mac.is_some());
        flags.set(MangleFlags::TDEV, self.tgt_mac.is_some());
        flags.set(MangleFlags::SIP, self.src_ip.is_some());
        flags.set(MangleFlags::TIP, self.tgt_ip.is_some());
        flags
    }
}

const O_MANGLE_IP_S: OptionId = 0;
const O_MANGLE_IP_D: OptionId = 1;
const O_MANGLE_MAC_S: OptionId = 2;
const O_MANGLE_MAC_D: OptionId = 3;
const O_MANGLE_TARGET: OptionId = 4;

static OPTIONS: [OptionSpec; 5] = [
    OptionSpec::with_argument("mangle-ip-s", O_MANGLE_IP_S),
    OptionSpec::with_argument("mangle-ip-d", O_MANGLE_IP_D),
    OptionSpec::with_argument("mangle-mac-s", O_MANGLE_MAC_S),
    OptionSpec::with_argument("mangle-mac-d", O_MANGLE_MAC_D),
    OptionSpec::with_argument("mangle-target", O_MANGLE_TARGET),
];

/// The arp `mangle` target, rewriting the addresses carried by arp packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mangle;

fn parse_ip(option: &'static str, arg: &str) -> Result<Ipv4Addr, ParameterError> {
    parse_ipv4_any(arg)
        .and_then(|addrs| addrs.into_iter().next())
        .ok_or_else(|| ParameterError::InvalidAddress {
            option,
            value: arg.to_string(),
        })
}

/// Hardware addresses can only be rewritten by rules that pin their length to the one of an
/// Ethernet address.
fn parse_mac(
    option: &'static str,
    side: &'static str,
    arg: &str,
    ctx: &RuleContext<'_>,
) -> Result<MacAddr, ParameterError> {
    let hw_len = ctx
        .hardware_length()
        .ok_or(ParameterError::NoHardwareLength)?;
    if hw_len.inverted {
        return Err(ParameterError::InvertedHardwareLength(option));
    }
    if hw_len.length as usize != ETH_ALEN {
        return Err(ParameterError::UnsupportedHardwareLength(hw_len.length));
    }
    arg.parse().map_err(|_| ParameterError::InvalidMac {
        side,
        value: arg.to_string(),
    })
}

fn mangle_info(data: &ExtensionData) -> Option<&ArpMangle> {
    match data {
        ExtensionData::Mangle(info) => Some(info),
        _ => None,
    }
}

fn read_ip(payload: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    )
}

fn read_mac(payload: &[u8], offset: usize) -> MacAddr {
    let mut mac = [0u8; ETH_ALEN];
    mac.copy_from_slice(&payload[offset..offset + ETH_ALEN]);
    MacAddr(mac)
}

impl Extension for Mangle {
    fn name(&self) -> &'static str {
        "mangle"
    }

    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Arp
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Target
    }

    fn param_size(&self) -> usize {
        ARPT_MANGLE_SIZE
    }

    fn options(&self) -> &'static [OptionSpec] {
        &OPTIONS
    }

    fn help(&self) -> String {
        "mangle target options:\n\
         --mangle-ip-s IP address\n\
         --mangle-ip-d IP address\n\
         --mangle-mac-s MAC address\n\
         --mangle-mac-d MAC address\n\
         --mangle-target target (DROP, CONTINUE or ACCEPT -- default is ACCEPT)\n"
            .to_string()
    }

    fn init(&self) -> ExtensionData {
        ArpMangle::default().into()
    }

    fn parse(
        &self,
        id: OptionId,
        arg: &str,
        _invert: bool,
        data: &mut ExtensionData,
        ctx: &RuleContext<'_>,
    ) -> Result<bool, ParameterError> {
        if !OPTIONS.iter().any(|opt| opt.id == id) {
            return Ok(false);
        }
        let info = match data {
            ExtensionData::Mangle(info) => info,
            _ => return Err(ParameterError::ForeignParameterBlock(self.name().to_string())),
        };
        match id {
            O_MANGLE_IP_S => info.src_ip = Some(parse_ip("mangle-ip-s", arg)?),
            O_MANGLE_IP_D => info.tgt_ip = Some(parse_ip("mangle-ip-d", arg)?),
            O_MANGLE_MAC_S => info.src_mac = Some(parse_mac("mangle-mac-s", "source", arg, ctx)?),
            O_MANGLE_MAC_D => info.tgt_mac = Some(parse_mac("mangle-mac-d", "target", arg, ctx)?),
            _ => {
                info.verdict = match MANGLE_VERDICTS.resolve(arg) {
                    NameLookup::Found(verdict) => verdict,
                    _ => return Err(ParameterError::BadMangleTarget(arg.to_string())),
                }
            }
        }
        Ok(true)
    }

    fn print(&self, data: &ExtensionData, _header: &RuleHeader, numeric: bool) -> Option<String> {
        let info = mangle_info(data)?;
        let mut words = Vec::new();
        if let Some(ip) = info.src_ip {
            words.push(format!(
                "--mangle-ip-s {}",
                ipaddr_to_anyname(IpAddr::V4(ip), numeric)
            ));
        }
        if let Some(mac) = info.src_mac {
            words.push(format!("--mangle-mac-s {}", mac));
        }
        if let Some(ip) = info.tgt_ip {
            words.push(format!(
                "--mangle-ip-d {}",
                ipaddr_to_anyname(IpAddr::V4(ip), numeric)
            ));
        }
        if let Some(mac) = info.tgt_mac {
            words.push(format!("--mangle-mac-d {}", mac));
        }
        match info.verdict {
            MangleVerdict::Accept => {}
            MangleVerdict::Drop => words.push("--mangle-target DROP".to_string()),
            MangleVerdict::Continue => words.push("--mangle-target CONTINUE".to_string()),
        }
        Some(words.join(" "))
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, DecodeError> {
        check_payload_size(self.name(), payload, self.param_size())?;
        let raw_flags = payload[FLAGS_OFFSET];
        let flags =
            MangleFlags::from_bits(raw_flags).ok_or(DecodeError::UnknownMangleFlags(raw_flags))?;
        let mut raw_target = [0u8; 4];
        raw_target.copy_from_slice(&payload[TARGET_OFFSET..TARGET_OFFSET + 4]);
        Ok(ArpMangle {
            src_ip: flags
                .contains(MangleFlags::SIP)
                .then(|| read_ip(payload, SRC_IP_OFFSET)),
            tgt_ip: flags
                .contains(MangleFlags::TIP)
                .then(|| read_ip(payload, TGT_IP_OFFSET)),
            src_mac: flags
                .contains(MangleFlags::SDEV)
                .then(|| read_mac(payload, SRC_DEVADDR_OFFSET)),
            tgt_mac: flags
                .contains(MangleFlags::TDEV)
                .then(|| read_mac(payload, TGT_DEVADDR_OFFSET)),
            verdict: MangleVerdict::from_raw(i32::from_ne_bytes(raw_target))?,
        }
        .into())
    }

    fn encode(&self, data: &ExtensionData) -> Vec<u8> {
        let mut buf = vec![0u8; xt_align(ARPT_MANGLE_SIZE)];
        let info = match mangle_info(data) {
            Some(info) => info,
            None => return buf,
        };
        if let Some(mac) = info.src_mac {
            buf[SRC_DEVADDR_OFFSET..SRC_DEVADDR_OFFSET + ETH_ALEN].copy_from_slice(&mac.0);
        }
        if let Some(mac) = info.tgt_mac {
            buf[TGT_DEVADDR_OFFSET..TGT_DEVADDR_OFFSET + ETH_ALEN].copy_from_slice(&mac.0);
        }
        if let Some(ip) = info.src_ip {
            buf[SRC_IP_OFFSET..SRC_IP_OFFSET + 4].copy_from_slice(&ip.octets());
        }
        if let Some(ip) = info.tgt_ip {
            buf[TGT_IP_OFFSET..TGT_IP_OFFSET + 4].copy_from_slice(&ip.octets());
        }
        buf[FLAGS_OFFSET] = info.flags().bits();
        buf[TARGET_OFFSET..TARGET_OFFSET + 4].copy_from_slice(&info.verdict.to_raw().to_ne_bytes());
        buf
    }
}
