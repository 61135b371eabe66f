//! Decoding of the tables handed out by the `getsockopt` interface of `ip_tables`,
//! `ip6_tables` and `arp_tables`.
//!
//! A table is a blob of variable sized entries. Each entry starts with the generic rule
//! header of the family, followed by its matches and its target. Builtin chains span from
//! their hook entry to their underflow entry, which carries the policy. User defined chains
//! start with an `ERROR` target naming them and end with a `RETURN` entry. The last entry of
//! the blob is an `ERROR` target named `ERROR`.

use std::convert::TryFrom;
use std::net::{Ipv4Addr, Ipv6Addr};

use libc::c_int;

use crate::addr::{Iface, MacAddr, ETH_ALEN, IFNAMSIZ};
use crate::error::DecodeError;
use crate::rule::{ArpHeader, InvFlags, Ipv4Header, Ipv6Header, MaskedValue};
use crate::table::XT_TABLE_MAXNAMELEN;
use crate::{
    Chain, ChainPolicy, Counters, ExtensionEntry, ProtocolFamily, Rule, RuleHeader, RuleTarget,
    Verdict,
};

/// Size of `struct xt_entry_match` and `struct xt_entry_target` without their data.
const XT_ENTRY_HDR_LEN: usize = 32;
const XT_EXTENSION_MAXNAMELEN: usize = 29;

const XT_STANDARD_TARGET: &str = "";
const XT_ERROR_TARGET: &str = "ERROR";

// standard target verdicts, `-NF_xxx - 1`
const VERDICT_DROP: i32 = -libc::NF_DROP - 1;
const VERDICT_ACCEPT: i32 = -libc::NF_ACCEPT - 1;
const VERDICT_QUEUE: i32 = -libc::NF_QUEUE - 1;
const XT_RETURN: i32 = -libc::NF_REPEAT - 1;

/// Size of `struct ipt_get_entries` and friends without the entries.
pub(crate) const GET_ENTRIES_HDR_LEN: usize = 40;

/// Where things live in the structures of one family.
#[derive(Debug)]
pub(crate) struct Layout {
    pub family: ProtocolFamily,
    pub level: c_int,
    pub so_get_info: c_int,
    pub so_get_entries: c_int,
    hook_names: &'static [&'static str],
    /// `sizeof(struct ipt_entry)` and friends.
    entry_size: usize,
    /// Position of `target_offset`, directly followed by `next_offset`.
    target_offset_pos: usize,
    counters_pos: usize,
}

static IPV4_LAYOUT: Layout = Layout {
    family: ProtocolFamily::Ipv4,
    level: libc::SOL_IP,
    so_get_info: 64,
    so_get_entries: 65,
    hook_names: &["PREROUTING", "INPUT", "FORWARD", "OUTPUT", "POSTROUTING"],
    entry_size: 112,
    target_offset_pos: 88,
    counters_pos: 96,
};

static IPV6_LAYOUT: Layout = Layout {
    family: ProtocolFamily::Ipv6,
    level: libc::IPPROTO_IPV6,
    so_get_info: 64,
    so_get_entries: 65,
    hook_names: &["PREROUTING", "INPUT", "FORWARD", "OUTPUT", "POSTROUTING"],
    entry_size: 168,
    target_offset_pos: 140,
    counters_pos: 152,
};

static ARP_LAYOUT: Layout = Layout {
    family: ProtocolFamily::Arp,
    level: libc::SOL_IP,
    so_get_info: 96,
    so_get_entries: 97,
    hook_names: &["INPUT", "OUTPUT", "FORWARD"],
    entry_size: 192,
    target_offset_pos: 164,
    counters_pos: 176,
};

pub(crate) fn layout_for(family: ProtocolFamily) -> Option<&'static Layout> {
    match family {
        ProtocolFamily::Ipv4 => Some(&IPV4_LAYOUT),
        ProtocolFamily::Ipv6 => Some(&IPV6_LAYOUT),
        ProtocolFamily::Arp => Some(&ARP_LAYOUT),
        ProtocolFamily::Unspec => None,
    }
}

/// The answer to a `SO_GET_INFO` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableInfo {
    pub valid_hooks: u32,
    pub hook_entry: Vec<u32>,
    pub underflow: Vec<u32>,
    pub num_entries: u32,
    pub size: u32,
}

fn bytes<const N: usize>(buf: &[u8], pos: usize) -> Result<[u8; N], DecodeError> {
    let mut out = [0u8; N];
    out.copy_from_slice(buf.get(pos..pos + N).ok_or(DecodeError::BufTooSmall)?);
    Ok(out)
}

fn read_u16(buf: &[u8], pos: usize) -> Result<u16, DecodeError> {
    bytes(buf, pos).map(u16::from_ne_bytes)
}

fn read_be16(buf: &[u8], pos: usize) -> Result<u16, DecodeError> {
    bytes(buf, pos).map(u16::from_be_bytes)
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32, DecodeError> {
    bytes(buf, pos).map(u32::from_ne_bytes)
}

fn read_u64(buf: &[u8], pos: usize) -> Result<u64, DecodeError> {
    bytes(buf, pos).map(u64::from_ne_bytes)
}

fn read_ipv4(buf: &[u8], pos: usize) -> Result<Ipv4Addr, DecodeError> {
    bytes::<4>(buf, pos).map(Ipv4Addr::from)
}

fn read_ipv6(buf: &[u8], pos: usize) -> Result<Ipv6Addr, DecodeError> {
    bytes::<16>(buf, pos).map(Ipv6Addr::from)
}

/// Reads a NUL padded string.
fn c_str(buf: &[u8]) -> Result<String, DecodeError> {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8(buf[..len].to_vec())?)
}

fn read_iface(buf: &[u8], name_pos: usize, mask_pos: usize) -> Result<Option<Iface>, DecodeError> {
    let name = bytes::<IFNAMSIZ>(buf, name_pos)?;
    let mask = bytes::<IFNAMSIZ>(buf, mask_pos)?;
    Ok(Iface::from_raw(&name, &mask))
}

/// Maps the inversion bits of a kernel header to [`InvFlags`].
fn inv_flags(raw: u16, mapping: &[(u16, InvFlags)]) -> InvFlags {
    mapping
        .iter()
        .filter(|(bit, _)| raw & bit != 0)
        .fold(InvFlags::empty(), |acc, (_, flag)| acc | *flag)
}

const IP_INV_MAPPING: [(u16, InvFlags); 6] = [
    (0x01, InvFlags::IN_IFACE),
    (0x02, InvFlags::OUT_IFACE),
    (0x08, InvFlags::SRC),
    (0x10, InvFlags::DST),
    (0x20, InvFlags::FRAG),
    (0x40, InvFlags::PROTO),
];

const ARP_INV_MAPPING: [(u16, InvFlags); 10] = [
    (0x0001, InvFlags::IN_IFACE),
    (0x0002, InvFlags::OUT_IFACE),
    (0x0004, InvFlags::SRC),
    (0x0008, InvFlags::DST),
    (0x0010, InvFlags::SRC_MAC),
    (0x0020, InvFlags::DST_MAC),
    (0x0040, InvFlags::OPCODE),
    (0x0080, InvFlags::HW_TYPE),
    (0x0100, InvFlags::PROTO_TYPE),
    (0x0200, InvFlags::HW_LEN),
];

const IPT_F_FRAG: u8 = 0x01;
const IPT_F_GOTO: u8 = 0x02;
const IP6T_F_GOTO: u8 = 0x04;

/// Returns the header of an IPv4 entry and whether its jump is a goto.
fn decode_ipv4_header(e: &[u8]) -> Result<(RuleHeader, bool), DecodeError> {
    let flags = e[82];
    let header = Ipv4Header {
        src: read_ipv4(e, 0)?,
        dst: read_ipv4(e, 4)?,
        src_mask: read_ipv4(e, 8)?,
        dst_mask: read_ipv4(e, 12)?,
        in_iface: read_iface(e, 16, 48)?,
        out_iface: read_iface(e, 32, 64)?,
        proto: read_u16(e, 80)?,
        fragment: flags & IPT_F_FRAG != 0,
        inv: inv_flags(e[83] as u16, &IP_INV_MAPPING),
    };
    Ok((RuleHeader::Ipv4(header), flags & IPT_F_GOTO != 0))
}

fn decode_ipv6_header(e: &[u8]) -> Result<(RuleHeader, bool), DecodeError> {
    let flags = e[131];
    let header = Ipv6Header {
        src: read_ipv6(e, 0)?,
        dst: read_ipv6(e, 16)?,
        src_mask: read_ipv6(e, 32)?,
        dst_mask: read_ipv6(e, 48)?,
        in_iface: read_iface(e, 64, 96)?,
        out_iface: read_iface(e, 80, 112)?,
        proto: read_u16(e, 128)?,
        inv: inv_flags(e[132] as u16, &IP_INV_MAPPING),
    };
    Ok((RuleHeader::Ipv6(header), flags & IP6T_F_GOTO != 0))
}

fn masked_be16(e: &[u8], pos: usize) -> Result<Option<MaskedValue<u16>>, DecodeError> {
    let mask = read_be16(e, pos + 2)?;
    if mask == 0 {
        return Ok(None);
    }
    Ok(Some(MaskedValue::new(read_be16(e, pos)?, mask)))
}

/// Only Ethernet sized hardware addresses are represented.
fn masked_mac(e: &[u8], pos: usize) -> Result<Option<MaskedValue<MacAddr>>, DecodeError> {
    let mask = bytes::<ETH_ALEN>(e, pos + 16)?;
    if mask == [0; ETH_ALEN] {
        return Ok(None);
    }
    Ok(Some(MaskedValue::new(
        MacAddr(bytes::<ETH_ALEN>(e, pos)?),
        MacAddr(mask),
    )))
}

fn decode_arp_header(e: &[u8]) -> Result<(RuleHeader, bool), DecodeError> {
    let header = ArpHeader {
        src: read_ipv4(e, 0)?,
        tgt: read_ipv4(e, 4)?,
        src_mask: read_ipv4(e, 8)?,
        tgt_mask: read_ipv4(e, 12)?,
        hw_len: (e[17] != 0).then(|| MaskedValue::new(e[16], e[17])),
        src_mac: masked_mac(e, 18)?,
        tgt_mac: masked_mac(e, 50)?,
        opcode: masked_be16(e, 82)?,
        hw_type: masked_be16(e, 86)?,
        proto_type: masked_be16(e, 90)?,
        in_iface: read_iface(e, 94, 126)?,
        out_iface: read_iface(e, 110, 142)?,
        inv: inv_flags(read_u16(e, 160)?, &ARP_INV_MAPPING),
    };
    Ok((RuleHeader::Arp(header), false))
}

/// An entry of the blob, before chains are reassembled.
struct RawEntry<'a> {
    offset: usize,
    next_offset: usize,
    header: RuleHeader,
    goto: bool,
    counters: Counters,
    matches: Vec<ExtensionEntry>,
    target_name: String,
    target_revision: u8,
    target_data: &'a [u8],
}

impl<'a> RawEntry<'a> {
    fn is_error(&self) -> bool {
        self.target_name == XT_ERROR_TARGET
    }

    /// Name carried by an `ERROR` target.
    fn error_name(&self) -> Result<String, DecodeError> {
        let len = self.target_data.len().min(XT_TABLE_MAXNAMELEN);
        c_str(&self.target_data[..len])
    }

    fn standard_verdict(&self) -> Result<i32, DecodeError> {
        if self.target_data.len() < 4 {
            return Err(DecodeError::InvalidDataSize);
        }
        bytes(self.target_data, 0).map(i32::from_ne_bytes)
    }
}

/// Reads the header of a match or target: its total size, name and revision.
fn extension_header(buf: &[u8], pos: usize) -> Result<(usize, String, u8), DecodeError> {
    let size = read_u16(buf, pos)? as usize;
    let name = c_str(
        buf.get(pos + 2..pos + 2 + XT_EXTENSION_MAXNAMELEN)
            .ok_or(DecodeError::BufTooSmall)?,
    )?;
    let revision = *buf
        .get(pos + 2 + XT_EXTENSION_MAXNAMELEN)
        .ok_or(DecodeError::BufTooSmall)?;
    Ok((size, name, revision))
}

/// A user defined chain found in the blob, from its `ERROR` head to its `RETURN` tail.
struct UserChainSpan {
    name: String,
    head: usize,
    foot: usize,
}

/// A chain being rebuilt. Builtin chains know the offset of their underflow entry.
struct PendingChain {
    name: String,
    rules: Vec<Rule>,
    underflow: Option<usize>,
}

impl PendingChain {
    fn new(name: String, underflow: Option<usize>) -> Self {
        PendingChain {
            name,
            rules: Vec::new(),
            underflow,
        }
    }

    fn finish(self, policy: Option<(ChainPolicy, Counters)>) -> Chain {
        let chain = match policy {
            Some((policy, counters)) => Chain::builtin(&self.name, policy, counters),
            None => Chain::user(&self.name),
        };
        self.rules
            .into_iter()
            .fold(chain, |chain, rule| chain.with_rule(rule))
    }
}

impl Layout {
    pub fn info_size(&self) -> usize {
        XT_TABLE_MAXNAMELEN + 4 + 8 * self.hook_names.len() + 8
    }

    pub fn decode_info(&self, buf: &[u8]) -> Result<TableInfo, DecodeError> {
        let hooks = self.hook_names.len();
        let read_array = |pos: usize| -> Result<Vec<u32>, DecodeError> {
            (0..hooks).map(|i| read_u32(buf, pos + 4 * i)).collect()
        };
        let hook_pos = XT_TABLE_MAXNAMELEN + 4;
        Ok(TableInfo {
            valid_hooks: read_u32(buf, XT_TABLE_MAXNAMELEN)?,
            hook_entry: read_array(hook_pos)?,
            underflow: read_array(hook_pos + 4 * hooks)?,
            num_entries: read_u32(buf, hook_pos + 8 * hooks)?,
            size: read_u32(buf, hook_pos + 8 * hooks + 4)?,
        })
    }

    fn decode_header(&self, e: &[u8]) -> Result<(RuleHeader, bool), DecodeError> {
        match self.family {
            ProtocolFamily::Ipv6 => decode_ipv6_header(e),
            ProtocolFamily::Arp => decode_arp_header(e),
            _ => decode_ipv4_header(e),
        }
    }

    fn decode_entry<'a>(&self, blob: &'a [u8], offset: usize) -> Result<RawEntry<'a>, DecodeError> {
        let e = &blob[offset..];
        if e.len() < self.entry_size {
            return Err(DecodeError::BufTooSmall);
        }
        let target_offset = read_u16(e, self.target_offset_pos)? as usize;
        let next_offset = read_u16(e, self.target_offset_pos + 2)? as usize;
        if target_offset < self.entry_size
            || next_offset < target_offset + XT_ENTRY_HDR_LEN
            || next_offset > e.len()
        {
            return Err(DecodeError::InvalidEntrySize(offset));
        }

        let (header, goto) = self.decode_header(e)?;
        let counters = Counters::new(
            read_u64(e, self.counters_pos)?,
            read_u64(e, self.counters_pos + 8)?,
        );

        let mut matches = Vec::new();
        let mut pos = self.entry_size;
        while pos < target_offset {
            let (size, name, revision) = extension_header(e, pos)?;
            if size < XT_ENTRY_HDR_LEN || pos + size > target_offset {
                return Err(DecodeError::InvalidEntrySize(offset));
            }
            matches.push(ExtensionEntry::new(
                &name,
                revision,
                e[pos + XT_ENTRY_HDR_LEN..pos + size].to_vec(),
            ));
            pos += size;
        }

        let (size, target_name, target_revision) = extension_header(e, target_offset)?;
        if size < XT_ENTRY_HDR_LEN || target_offset + size > next_offset {
            return Err(DecodeError::InvalidEntrySize(offset));
        }
        Ok(RawEntry {
            offset,
            next_offset,
            header,
            goto,
            counters,
            matches,
            target_name,
            target_revision,
            target_data: &e[target_offset + XT_ENTRY_HDR_LEN..target_offset + size],
        })
    }

    fn decode_target(
        &self,
        entry: &RawEntry<'_>,
        user_chains: &[UserChainSpan],
    ) -> Result<RuleTarget, DecodeError> {
        if entry.target_name != XT_STANDARD_TARGET {
            return Ok(RuleTarget::Extension(ExtensionEntry::new(
                &entry.target_name,
                entry.target_revision,
                entry.target_data.to_vec(),
            )));
        }
        let verdict = entry.standard_verdict()?;
        let target = match verdict {
            VERDICT_DROP => RuleTarget::Verdict(Verdict::Drop),
            VERDICT_ACCEPT => RuleTarget::Verdict(Verdict::Accept),
            VERDICT_QUEUE => RuleTarget::Verdict(Verdict::Queue),
            XT_RETURN => RuleTarget::Verdict(Verdict::Return),
            v if v < 0 => return Err(DecodeError::InvalidDataSize),
            v if v as usize == entry.offset + entry.next_offset => RuleTarget::Fallthrough,
            v => {
                let dest = v as usize;
                let chain = user_chains
                    .iter()
                    .find(|span| span.head <= dest && dest <= span.foot)
                    .ok_or(DecodeError::DanglingJump(entry.offset))?;
                if entry.goto {
                    RuleTarget::Goto(chain.name.clone())
                } else {
                    RuleTarget::Jump(chain.name.clone())
                }
            }
        };
        Ok(target)
    }

    /// Rebuilds the chains of a table from the entries returned by `SO_GET_ENTRIES`. Chains
    /// are returned in blob order.
    pub fn decode_entries(&self, info: &TableInfo, blob: &[u8]) -> Result<Vec<Chain>, DecodeError> {
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < blob.len() {
            let entry = self.decode_entry(blob, offset)?;
            offset += entry.next_offset;
            entries.push(entry);
        }
        if entries.len() != info.num_entries as usize {
            debug!(
                "The table announced {} entries, {} were found",
                info.num_entries,
                entries.len()
            );
        }

        let mut user_chains = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            if !entry.is_error() {
                continue;
            }
            let name = entry.error_name()?;
            if name == XT_ERROR_TARGET {
                continue;
            }
            let foot = entries[i + 1..]
                .iter()
                .take_while(|e| !e.is_error())
                .last()
                .map_or(entry.offset, |e| e.offset);
            user_chains.push(UserChainSpan {
                name,
                head: entry.offset,
                foot,
            });
        }

        let builtin_hooks: Vec<(usize, usize, &str)> = self
            .hook_names
            .iter()
            .enumerate()
            .filter(|(hook, _)| info.valid_hooks & (1u32 << *hook) != 0)
            .map(|(hook, name)| {
                (
                    info.hook_entry[hook] as usize,
                    info.underflow[hook] as usize,
                    *name,
                )
            })
            .collect();

        let mut chains = Vec::new();
        let mut current: Option<PendingChain> = None;
        for (i, entry) in entries.iter().enumerate() {
            if entry.is_error() {
                let name = entry.error_name()?;
                current = if name == XT_ERROR_TARGET {
                    None
                } else {
                    Some(PendingChain::new(name, None))
                };
                continue;
            }
            if let Some((_, underflow, name)) =
                builtin_hooks.iter().find(|(start, _, _)| *start == entry.offset)
            {
                current = Some(PendingChain::new(name.to_string(), Some(*underflow)));
            }

            let underflow = match &current {
                Some(pending) => pending.underflow,
                None => return Err(DecodeError::OrphanEntry(entry.offset)),
            };
            match underflow {
                Some(underflow) if underflow == entry.offset => {
                    let verdict = entry
                        .standard_verdict()?
                        .checked_add(1)
                        .and_then(i32::checked_neg)
                        .ok_or(DecodeError::InvalidDataSize)?;
                    let policy = ChainPolicy::try_from(verdict)?;
                    if let Some(done) = current.take() {
                        chains.push(done.finish(Some((policy, entry.counters))));
                    }
                }
                // the RETURN tail of a user defined chain
                None if entries.get(i + 1).map_or(true, RawEntry::is_error) => {
                    if let Some(done) = current.take() {
                        chains.push(done.finish(None));
                    }
                }
                _ => {
                    let target = self.decode_target(entry, &user_chains)?;
                    let rule = entry
                        .matches
                        .iter()
                        .fold(Rule::new(entry.header.clone()), |rule, m| {
                            rule.with_match(m.clone())
                        })
                        .with_target(target)
                        .with_counters(entry.counters);
                    if let Some(pending) = current.as_mut() {
                        pending.rules.push(rule);
                    }
                }
            }
        }
        Ok(chains)
    }
}
