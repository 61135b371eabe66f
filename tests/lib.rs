#![allow(dead_code)]
use std::net::Ipv4Addr;

use xtables_save::extension::{
    ArpMangle, Extension, ExtensionData, Mangle, MangleVerdict, ParamParser, Registry, Reject,
    RejectInfo, RejectWith, RuleContext,
};
use xtables_save::memory::MemoryBackend;
use xtables_save::{
    save, ArpHeader, Chain, ChainPolicy, Counters, ExtensionEntry, Ipv4Header, MaskedValue,
    ParameterError, Rule, RuleHeader, RuleTarget, SaveError, SaveOptions, Verdict,
};

pub const TABLE_NAME: &str = "filter";
pub const USER_CHAIN: &str = "LOGGING";

pub fn get_registry() -> Registry {
    Registry::with_builtin_extensions().unwrap()
}

pub fn arp_header() -> RuleHeader {
    RuleHeader::Arp(ArpHeader {
        hw_len: Some(MaskedValue::new(6, 0xff)),
        ..Default::default()
    })
}

pub fn ipv4_header() -> RuleHeader {
    RuleHeader::Ipv4(Ipv4Header::default())
}

pub fn parse_extension<S: AsRef<str>>(
    ext: &dyn Extension,
    header: &RuleHeader,
    args: &[S],
) -> Result<ExtensionData, ParameterError> {
    let ctx = RuleContext::new(header);
    let mut parser = ParamParser::new(ext);
    parser.parse_args(args, &ctx)?;
    parser.finish()
}

pub fn reject_target(with: RejectWith) -> RuleTarget {
    RuleTarget::Extension(ExtensionEntry::from_data(
        &Reject,
        &RejectInfo { with }.into(),
    ))
}

pub fn mangle_target(info: ArpMangle) -> RuleTarget {
    RuleTarget::Extension(ExtensionEntry::from_data(&Mangle, &info.into()))
}

/// The filter table of the documentation: INPUT with its policy and counters, and an empty
/// LOGGING chain.
pub fn get_filter_table() -> Vec<Chain> {
    vec![
        Chain::builtin("INPUT", ChainPolicy::Accept, Counters::new(10, 500)),
        Chain::user(USER_CHAIN),
    ]
}

/// A busier filter table, where rules jump to chains declared after them.
pub fn get_busy_filter_table() -> Vec<Chain> {
    let src = RuleHeader::Ipv4(Ipv4Header {
        src: Ipv4Addr::new(192, 168, 0, 0),
        src_mask: Ipv4Addr::new(255, 255, 0, 0),
        ..Default::default()
    });
    vec![
        Chain::builtin("INPUT", ChainPolicy::Drop, Counters::new(4, 240))
            .with_rule(Rule::new(src).with_target(RuleTarget::Jump(USER_CHAIN.to_string())))
            .with_rule(Rule::new(ipv4_header()).with_target(reject_target(RejectWith::TcpReset))),
        Chain::builtin("FORWARD", ChainPolicy::Accept, Counters::default())
            .with_rule(Rule::new(ipv4_header()).with_target(RuleTarget::Goto("BLACKHOLE".to_string()))),
        Chain::builtin("OUTPUT", ChainPolicy::Accept, Counters::new(1, 1)),
        Chain::user(USER_CHAIN)
            .with_rule(Rule::new(ipv4_header()).with_counters(Counters::new(5, 300)))
            .with_rule(Rule::new(ipv4_header()).with_target(RuleTarget::Verdict(Verdict::Return))),
        Chain::user("BLACKHOLE")
            .with_rule(Rule::new(ipv4_header()).with_target(RuleTarget::Verdict(Verdict::Drop))),
    ]
}

pub fn get_arp_table() -> Vec<Chain> {
    vec![
        Chain::builtin("INPUT", ChainPolicy::Accept, Counters::default()),
        Chain::builtin("OUTPUT", ChainPolicy::Accept, Counters::default()).with_rule(
            Rule::new(arp_header()).with_target(mangle_target(ArpMangle {
                src_ip: Some(Ipv4Addr::new(10, 0, 0, 254)),
                verdict: MangleVerdict::Drop,
                ..Default::default()
            })),
        ),
    ]
}

pub fn dump(backend: &MemoryBackend, opts: &SaveOptions) -> (Result<(), SaveError>, Vec<String>) {
    let mut out = Vec::new();
    let res = save(backend, &get_registry(), opts, &mut out);
    let lines = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    (res, lines)
}

/// Drops the timestamped comments, which change from one run to the next.
pub fn without_comments(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(String::as_str)
        .filter(|line| !line.starts_with('#'))
        .collect()
}
