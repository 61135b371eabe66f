use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

use bitflags::bitflags;

use crate::addr::{format_ipv4_masked, format_ipv6_masked, protocol_name, Iface, MacAddr};
use crate::error::SaveError;
use crate::extension::{Extension, ExtensionData, ExtensionKind, Registry};
use crate::{Counters, ProtocolFamily};

bitflags! {
    /// The header fields whose test is inverted (`!`). Each family only uses a subset.
    #[derive(Default)]
    pub struct InvFlags: u16 {
        const IN_IFACE = 0x0001;
        const OUT_IFACE = 0x0002;
        const SRC = 0x0004;
        const DST = 0x0008;
        const PROTO = 0x0010;
        const FRAG = 0x0020;
        const SRC_MAC = 0x0040;
        const DST_MAC = 0x0080;
        const OPCODE = 0x0100;
        const HW_TYPE = 0x0200;
        const PROTO_TYPE = 0x0400;
        const HW_LEN = 0x0800;
    }
}

/// A value compared under a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskedValue<T> {
    pub value: T,
    pub mask: T,
}

impl<T> MaskedValue<T> {
    pub fn new(value: T, mask: T) -> Self {
        MaskedValue { value, mask }
    }
}

/// The generic part of an IPv4 rule (`struct ipt_ip`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub src_mask: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub dst_mask: Ipv4Addr,
    pub in_iface: Option<Iface>,
    pub out_iface: Option<Iface>,
    /// Layer 4 protocol number, 0 for any.
    pub proto: u16,
    /// Only match second and further fragments.
    pub fragment: bool,
    pub inv: InvFlags,
}

impl Default for Ipv4Header {
    fn default() -> Self {
        Ipv4Header {
            src: Ipv4Addr::UNSPECIFIED,
            src_mask: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            dst_mask: Ipv4Addr::UNSPECIFIED,
            in_iface: None,
            out_iface: None,
            proto: 0,
            fragment: false,
            inv: InvFlags::empty(),
        }
    }
}

/// The generic part of an IPv6 rule (`struct ip6t_ip6`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Header {
    pub src: Ipv6Addr,
    pub src_mask: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub dst_mask: Ipv6Addr,
    pub in_iface: Option<Iface>,
    pub out_iface: Option<Iface>,
    pub proto: u16,
    pub inv: InvFlags,
}

impl Default for Ipv6Header {
    fn default() -> Self {
        Ipv6Header {
            src: Ipv6Addr::UNSPECIFIED,
            src_mask: Ipv6Addr::UNSPECIFIED,
            dst: Ipv6Addr::UNSPECIFIED,
            dst_mask: Ipv6Addr::UNSPECIFIED,
            in_iface: None,
            out_iface: None,
            proto: 0,
            inv: InvFlags::empty(),
        }
    }
}

/// The generic part of an arp rule (`struct arpt_arp`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpHeader {
    pub src: Ipv4Addr,
    pub src_mask: Ipv4Addr,
    pub tgt: Ipv4Addr,
    pub tgt_mask: Ipv4Addr,
    pub src_mac: Option<MaskedValue<MacAddr>>,
    pub tgt_mac: Option<MaskedValue<MacAddr>>,
    /// Hardware address length.
    pub hw_len: Option<MaskedValue<u8>>,
    pub opcode: Option<MaskedValue<u16>>,
    pub hw_type: Option<MaskedValue<u16>>,
    pub proto_type: Option<MaskedValue<u16>>,
    pub in_iface: Option<Iface>,
    pub out_iface: Option<Iface>,
    pub inv: InvFlags,
}

impl Default for ArpHeader {
    fn default() -> Self {
        ArpHeader {
            src: Ipv4Addr::UNSPECIFIED,
            src_mask: Ipv4Addr::UNSPECIFIED,
            tgt: Ipv4Addr::UNSPECIFIED,
            tgt_mask: Ipv4Addr::UNSPECIFIED,
            src_mac: None,
            tgt_mac: None,
            hw_len: None,
            opcode: None,
            hw_type: None,
            proto_type: None,
            in_iface: None,
            out_iface: None,
            inv: InvFlags::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleHeader {
    Ipv4(Ipv4Header),
    Ipv6(Ipv6Header),
    Arp(ArpHeader),
}

impl RuleHeader {
    pub fn get_family(&self) -> ProtocolFamily {
        match self {
            RuleHeader::Ipv4(_) => ProtocolFamily::Ipv4,
            RuleHeader::Ipv6(_) => ProtocolFamily::Ipv6,
            RuleHeader::Arp(_) => ProtocolFamily::Arp,
        }
    }
}

/// A match or target attached to a rule, as stored in the kernel: the extension name and
/// revision, and the aligned parameter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionEntry {
    pub name: String,
    pub revision: u8,
    pub payload: Vec<u8>,
}

impl ExtensionEntry {
    pub fn new(name: &str, revision: u8, payload: Vec<u8>) -> Self {
        ExtensionEntry {
            name: name.to_string(),
            revision,
            payload,
        }
    }

    pub fn from_data(ext: &dyn Extension, data: &ExtensionData) -> Self {
        ExtensionEntry {
            name: ext.name().to_string(),
            revision: ext.revision(),
            payload: ext.encode(data),
        }
    }
}

/// The verdicts of the standard target.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Verdict {
    Accept,
    Drop,
    Queue,
    Return,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accept => "ACCEPT",
            Verdict::Drop => "DROP",
            Verdict::Queue => "QUEUE",
            Verdict::Return => "RETURN",
        }
    }
}

/// What happens to a packet matching a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    /// No target: the rule only updates its counters.
    Fallthrough,
    Verdict(Verdict),
    /// Enter a user defined chain and come back once it is exhausted.
    Jump(String),
    /// Enter a user defined chain without coming back.
    Goto(String),
    Extension(ExtensionEntry),
}

/// A rule of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    header: RuleHeader,
    matches: Vec<ExtensionEntry>,
    target: RuleTarget,
    counters: Counters,
}

impl Rule {
    pub fn new(header: RuleHeader) -> Rule {
        Rule {
            header,
            matches: Vec::new(),
            target: RuleTarget::Fallthrough,
            counters: Counters::default(),
        }
    }

    pub fn with_match(mut self, entry: ExtensionEntry) -> Self {
        self.matches.push(entry);
        self
    }

    pub fn with_target(mut self, target: RuleTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn get_header(&self) -> &RuleHeader {
        &self.header
    }

    pub fn get_matches(&self) -> &[ExtensionEntry] {
        &self.matches
    }

    pub fn get_target(&self) -> &RuleTarget {
        &self.target
    }

    pub fn get_counters(&self) -> Counters {
        self.counters
    }

    /// Renders the rule as the line that appends it to `chain` in a dump, without the
    /// trailing newline.
    pub fn to_save_line(
        &self,
        chain: &str,
        registry: &Registry,
        show_counters: bool,
    ) -> Result<String, SaveError> {
        let mut line = String::new();
        if show_counters {
            let _ = write!(line, "{} ", self.counters);
        }
        let _ = write!(line, "-A {}", chain);
        match &self.header {
            RuleHeader::Ipv4(ip) => write_ipv4_header(&mut line, ip),
            RuleHeader::Ipv6(ip) => write_ipv6_header(&mut line, ip),
            RuleHeader::Arp(arp) => write_arp_header(&mut line, arp),
        }

        for entry in &self.matches {
            let _ = write!(line, " -m {}", entry.name);
            if let Some(text) = self.render_extension(registry, entry, ExtensionKind::Match)? {
                push_words(&mut line, &text);
            }
        }

        match &self.target {
            RuleTarget::Fallthrough => {}
            RuleTarget::Verdict(verdict) => {
                let _ = write!(line, " -j {}", verdict.as_str());
            }
            RuleTarget::Jump(chain) => {
                let _ = write!(line, " -j {}", chain);
            }
            RuleTarget::Goto(chain) => {
                let _ = write!(line, " -g {}", chain);
            }
            RuleTarget::Extension(entry) => {
                let _ = write!(line, " -j {}", entry.name);
                match self.render_extension(registry, entry, ExtensionKind::Target)? {
                    Some(text) => push_words(&mut line, &text),
                    // a parameter block nobody can render would be lost on restore
                    None if !entry.payload.is_empty() => {
                        return Err(SaveError::MissingSaveFunction(entry.name.clone()))
                    }
                    None => {}
                }
            }
        }
        Ok(line)
    }

    /// Canonical text of an extension: its `save` output, or its numeric `print` output when
    /// it has no `save`. `None` when it has neither.
    fn render_extension(
        &self,
        registry: &Registry,
        entry: &ExtensionEntry,
        kind: ExtensionKind,
    ) -> Result<Option<String>, SaveError> {
        let family = self.header.get_family();
        let ext = registry.lookup_kind(&entry.name, family, Some(entry.revision), kind)?;
        let data = ext.decode(&entry.payload).map_err(|source| {
            error!("Failed to decode the parameters of {}", entry.name);
            SaveError::Decode {
                name: entry.name.clone(),
                source,
            }
        })?;
        Ok(ext
            .save(&data, &self.header)
            .or_else(|| ext.print(&data, &self.header, true)))
    }
}

fn push_words(line: &mut String, text: &str) {
    if !text.is_empty() {
        line.push(' ');
        line.push_str(text);
    }
}

fn negation(inv: InvFlags, flag: InvFlags) -> &'static str {
    if inv.contains(flag) {
        " !"
    } else {
        ""
    }
}

fn write_iface(line: &mut String, letter: char, iface: &Option<Iface>, inverted: &str) {
    if let Some(iface) = iface {
        let _ = write!(line, "{} -{} {}", inverted, letter, iface);
    }
}

fn write_proto(line: &mut String, proto: u16, inverted: &str) {
    if proto != 0 {
        let _ = write!(line, "{} -p {}", inverted, protocol_name(proto));
    }
}

fn write_ipv4(line: &mut String, option: &str, addr: Ipv4Addr, mask: Ipv4Addr, inverted: &str) {
    if mask.is_unspecified() && addr.is_unspecified() && inverted.is_empty() {
        return;
    }
    let _ = write!(
        line,
        "{} {} {}",
        inverted,
        option,
        format_ipv4_masked(addr, mask)
    );
}

fn write_ipv4_header(line: &mut String, ip: &Ipv4Header) {
    let inv = ip.inv;
    write_ipv4(line, "-s", ip.src, ip.src_mask, negation(inv, InvFlags::SRC));
    write_ipv4(line, "-d", ip.dst, ip.dst_mask, negation(inv, InvFlags::DST));
    write_iface(line, 'i', &ip.in_iface, negation(inv, InvFlags::IN_IFACE));
    write_iface(line, 'o', &ip.out_iface, negation(inv, InvFlags::OUT_IFACE));
    write_proto(line, ip.proto, negation(inv, InvFlags::PROTO));
    if ip.fragment {
        let _ = write!(line, "{} -f", negation(inv, InvFlags::FRAG));
    }
}

fn write_ipv6(line: &mut String, option: &str, addr: Ipv6Addr, mask: Ipv6Addr, inverted: &str) {
    if mask.is_unspecified() && inverted.is_empty() {
        return;
    }
    let _ = write!(
        line,
        "{} {} {}",
        inverted,
        option,
        format_ipv6_masked(addr, mask)
    );
}

fn write_ipv6_header(line: &mut String, ip: &Ipv6Header) {
    let inv = ip.inv;
    write_ipv6(line, "-s", ip.src, ip.src_mask, negation(inv, InvFlags::SRC));
    write_ipv6(line, "-d", ip.dst, ip.dst_mask, negation(inv, InvFlags::DST));
    write_iface(line, 'i', &ip.in_iface, negation(inv, InvFlags::IN_IFACE));
    write_iface(line, 'o', &ip.out_iface, negation(inv, InvFlags::OUT_IFACE));
    write_proto(line, ip.proto, negation(inv, InvFlags::PROTO));
}

// arp addresses omit a full mask
fn write_arp_ip(line: &mut String, option: &str, addr: Ipv4Addr, mask: Ipv4Addr, inverted: &str) {
    if mask.is_unspecified() && inverted.is_empty() {
        return;
    }
    if mask == Ipv4Addr::BROADCAST {
        let _ = write!(line, "{} {} {}", inverted, option, addr);
    } else {
        let _ = write!(
            line,
            "{} {} {}",
            inverted,
            option,
            format_ipv4_masked(addr, mask)
        );
    }
}

fn write_arp_mac(
    line: &mut String,
    option: &str,
    mac: &Option<MaskedValue<MacAddr>>,
    inverted: &str,
) {
    if let Some(mac) = mac {
        let _ = write!(line, "{} {} {}", inverted, option, mac.value);
        if mac.mask.0 != [0xff; 6] {
            let _ = write!(line, "/{}", mac.mask);
        }
    }
}

fn write_arp_header(line: &mut String, arp: &ArpHeader) {
    let inv = arp.inv;
    write_iface(line, 'i', &arp.in_iface, negation(inv, InvFlags::IN_IFACE));
    write_iface(line, 'o', &arp.out_iface, negation(inv, InvFlags::OUT_IFACE));
    write_arp_ip(line, "-s", arp.src, arp.src_mask, negation(inv, InvFlags::SRC));
    write_arp_ip(line, "-d", arp.tgt, arp.tgt_mask, negation(inv, InvFlags::DST));
    write_arp_mac(
        line,
        "--src-mac",
        &arp.src_mac,
        negation(inv, InvFlags::SRC_MAC),
    );
    write_arp_mac(
        line,
        "--dst-mac",
        &arp.tgt_mac,
        negation(inv, InvFlags::DST_MAC),
    );
    if let Some(hw_len) = arp.hw_len {
        let _ = write!(
            line,
            "{} --h-length {}",
            negation(inv, InvFlags::HW_LEN),
            hw_len.value
        );
        if hw_len.mask != u8::MAX {
            let _ = write!(line, "/{}", hw_len.mask);
        }
    }
    if let Some(opcode) = arp.opcode {
        let _ = write!(
            line,
            "{} --opcode {}",
            negation(inv, InvFlags::OPCODE),
            opcode.value
        );
        if opcode.mask != u16::MAX {
            let _ = write!(line, "/{}", opcode.mask);
        }
    }
    if let Some(hw_type) = arp.hw_type {
        let _ = write!(
            line,
            "{} --h-type {}",
            negation(inv, InvFlags::HW_TYPE),
            hw_type.value
        );
        if hw_type.mask != u16::MAX {
            let _ = write!(line, "/{}", hw_type.mask);
        }
    }
    if let Some(proto_type) = arp.proto_type {
        let _ = write!(
            line,
            "{} --proto-type {:#x}",
            negation(inv, InvFlags::PROTO_TYPE),
            proto_type.value
        );
        if proto_type.mask != u16::MAX {
            let _ = write!(line, "/{:#x}", proto_type.mask);
        }
    }
}
