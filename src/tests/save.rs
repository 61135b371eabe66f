use super::{get_registry, ipv4_header, TABLE_NAME, USER_CHAIN};
use crate::error::{QueryError, SaveError};
use crate::extension::{Reject, RejectInfo, RejectWith};
use crate::memory::MemoryBackend;
use crate::{
    save, save_table, Chain, ChainPolicy, Counters, ExtensionEntry, ProtocolFamily, Rule,
    RuleTarget, SaveOptions, Verdict,
};

fn filter_chains() -> Vec<Chain> {
    vec![
        Chain::builtin("INPUT", ChainPolicy::Accept, Counters::new(10, 500)).with_rule(
            Rule::new(ipv4_header())
                .with_target(RuleTarget::Jump(USER_CHAIN.to_string()))
                .with_counters(Counters::new(2, 120)),
        ),
        Chain::builtin("FORWARD", ChainPolicy::Drop, Counters::default()),
        Chain::user(USER_CHAIN).with_rule(
            Rule::new(ipv4_header()).with_target(RuleTarget::Verdict(Verdict::Return)),
        ),
    ]
}

fn nat_chains() -> Vec<Chain> {
    vec![Chain::builtin(
        "PREROUTING",
        ChainPolicy::Accept,
        Counters::default(),
    )]
}

fn dump(backend: &MemoryBackend, opts: &SaveOptions) -> Result<Vec<String>, SaveError> {
    let mut out = Vec::new();
    save(backend, &get_registry(), opts, &mut out)?;
    Ok(lines(out))
}

fn lines(out: Vec<u8>) -> Vec<String> {
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// The dump without its two timestamped comment lines per table.
fn body(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .filter(|line| !line.starts_with('#'))
        .map(String::as_str)
        .collect()
}

#[test]
fn options() {
    let opts = SaveOptions::new("iptables-save");
    assert_eq!(opts.program, "iptables-save");
    assert_eq!(opts.version, env!("CARGO_PKG_VERSION"));
    assert!(!opts.counters);
    assert_eq!(opts.table, None);

    let opts = opts.with_counters(true).with_table(Some("nat"));
    assert!(opts.counters);
    assert_eq!(opts.table.as_deref(), Some("nat"));
}

#[test]
fn table_layout() {
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4).with_table(TABLE_NAME, filter_chains());
    let lines = dump(&backend, &SaveOptions::new("iptables-save")).unwrap();

    assert_eq!(lines.len(), 9);
    assert!(lines[0].starts_with(&format!(
        "# Generated by iptables-save v{} on ",
        env!("CARGO_PKG_VERSION")
    )));
    assert_eq!(
        &lines[1..8],
        [
            "*filter",
            ":INPUT ACCEPT [10:500]",
            ":FORWARD DROP [0:0]",
            ":LOGGING - [0:0]",
            "-A INPUT -j LOGGING",
            "-A LOGGING -j RETURN",
            "COMMIT",
        ]
    );
    assert!(lines[8].starts_with("# Completed on "));
}

#[test]
fn counters_are_optional() {
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4).with_table(TABLE_NAME, filter_chains());
    let opts = SaveOptions::new("iptables-save").with_counters(true);
    let lines = dump(&backend, &opts).unwrap();
    assert!(lines.contains(&"[2:120] -A INPUT -j LOGGING".to_string()));
    assert!(lines.contains(&"[0:0] -A LOGGING -j RETURN".to_string()));
    // chain counters are always written
    assert!(lines.contains(&":INPUT ACCEPT [10:500]".to_string()));
}

#[test]
fn every_listed_table_in_order() {
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4)
        .with_table("nat", nat_chains())
        .with_table(TABLE_NAME, filter_chains());
    let lines = dump(&backend, &SaveOptions::new("iptables-save")).unwrap();
    let tables: Vec<&String> = lines.iter().filter(|l| l.starts_with('*')).collect();
    assert_eq!(tables, ["*nat", "*filter"]);
    assert_eq!(lines.iter().filter(|l| *l == "COMMIT").count(), 2);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn single_table() {
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4)
        .with_table("nat", nat_chains())
        .with_table(TABLE_NAME, filter_chains());
    let opts = SaveOptions::new("iptables-save").with_table(Some("nat"));
    let lines = dump(&backend, &opts).unwrap();
    assert_eq!(
        body(&lines),
        ["*nat", ":PREROUTING ACCEPT [0:0]", "COMMIT"]
    );
}

#[test]
fn missing_table_writes_nothing() {
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4).with_table(TABLE_NAME, filter_chains());
    let mut out = Vec::new();
    let opts = SaveOptions::new("iptables-save");
    let res = save_table(&backend, &get_registry(), &opts, "ghost", &mut out);
    assert!(matches!(
        res,
        Err(SaveError::Query(QueryError::TableUnavailable { .. }))
    ));
    assert!(out.is_empty());
    assert_eq!(backend.module_loads(), 1);
}

#[test]
fn broken_table_stops_the_dump() {
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4)
        .with_table("nat", nat_chains())
        .with_table(TABLE_NAME, filter_chains())
        .with_broken_chain("INPUT");
    let mut out = Vec::new();
    let res = save(
        &backend,
        &get_registry(),
        &SaveOptions::new("iptables-save"),
        &mut out,
    );
    assert!(matches!(
        res,
        Err(SaveError::Query(QueryError::ConcurrentUpdate))
    ));
    // nat was complete, nothing of filter was written
    let written = lines(out);
    assert_eq!(body(&written), ["*nat", ":PREROUTING ACCEPT [0:0]", "COMMIT"]);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn unrenderable_rule_stops_the_dump() {
    let chains = vec![Chain::builtin("INPUT", ChainPolicy::Accept, Counters::default())
        .with_rule(Rule::new(ipv4_header()).with_target(RuleTarget::Extension(
            ExtensionEntry::new("CLASSIFY", 0, vec![0; 8]),
        )))];
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4).with_table(TABLE_NAME, chains);
    let opts = SaveOptions::new("iptables-save");
    assert!(matches!(
        dump(&backend, &opts),
        Err(SaveError::Registry(_))
    ));
}

#[test]
fn rules_with_extensions() {
    let reject = ExtensionEntry::from_data(
        &Reject,
        &RejectInfo {
            with: RejectWith::IcmpHostProhibited,
        }
        .into(),
    );
    let chains = vec![Chain::builtin("INPUT", ChainPolicy::Drop, Counters::default())
        .with_rule(Rule::new(ipv4_header()).with_target(RuleTarget::Extension(reject)))];
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4).with_table(TABLE_NAME, chains);
    let lines = dump(&backend, &SaveOptions::new("iptables-save")).unwrap();
    assert_eq!(
        body(&lines),
        [
            "*filter",
            ":INPUT DROP [0:0]",
            "-A INPUT -j REJECT --reject-with icmp-host-prohibited",
            "COMMIT",
        ]
    );
}
