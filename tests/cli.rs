use std::path::PathBuf;

use clap::error::ErrorKind;
use xtables_save::cli::{dump as dump_args, parse_args, Args};
use xtables_save::memory::MemoryBackend;
use xtables_save::{ProtocolFamily, QueryError, SaveError};

mod lib;
use lib::*;

fn parse(args: &[&str]) -> Result<Args, clap::Error> {
    parse_args(
        ProtocolFamily::Ipv4,
        std::iter::once("iptables-save").chain(args.iter().copied()),
    )
}

#[test]
fn defaults() {
    let args = parse(&[]).unwrap();
    assert!(!args.counters);
    assert!(!args.dump);
    assert!(!args.binary);
    assert_eq!(args.table, None);
    assert_eq!(args.modprobe, None);
    assert!(args.extra.is_empty());
}

#[test]
fn short_and_long_options() {
    let args = parse(&["-c", "-t", "nat", "-M", "/usr/sbin/modprobe"]).unwrap();
    assert!(args.counters);
    assert_eq!(args.table.as_deref(), Some("nat"));
    assert_eq!(args.modprobe, Some(PathBuf::from("/usr/sbin/modprobe")));

    let args = parse(&["--counters", "--table=mangle", "--modprobe", "kmod", "--binary"]).unwrap();
    assert!(args.counters);
    assert!(args.binary);
    assert_eq!(args.table.as_deref(), Some("mangle"));
    assert_eq!(args.modprobe, Some(PathBuf::from("kmod")));
}

#[test]
fn trailing_arguments_are_collected() {
    let args = parse(&["-t", "filter", "leftover"]).unwrap();
    assert_eq!(args.extra, ["leftover"]);
    assert!(!args.dump);

    let args = parse(&["-d", "leftover", "more"]).unwrap();
    assert!(args.dump);
    assert!(args.extra.is_empty());
}

#[test]
fn dump_stops_argument_handling() {
    let args = parse(&["-d", "--bogus", "-c"]).unwrap();
    assert!(args.dump);
    assert!(!args.counters);

    let args = parse(&["-c", "-t", "nat", "--dump", "-t", "raw"]).unwrap();
    assert!(args.counters);
    assert_eq!(args.table.as_deref(), Some("nat"));

    let args = parse(&["-cd", "-h"]).unwrap();
    assert!(args.counters);
    assert!(args.dump);
}

#[test]
fn bad_arguments() {
    assert_eq!(
        parse(&["--bogus"]).unwrap_err().kind(),
        ErrorKind::UnknownArgument
    );
    assert_eq!(
        parse(&["-t"]).unwrap_err().kind(),
        ErrorKind::InvalidValue
    );
    assert_eq!(parse(&["-h"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
    assert_eq!(parse(&["-V"]).unwrap_err().kind(), ErrorKind::DisplayVersion);
}

#[test]
fn dump_with_arguments() {
    let backend = MemoryBackend::new(ProtocolFamily::Ipv4)
        .with_table(TABLE_NAME, get_busy_filter_table())
        .with_table("raw", vec![]);
    let args = parse(&["-c", "-t", TABLE_NAME]).unwrap();
    let mut out = Vec::new();
    dump_args(&args, &backend, &get_registry(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("# Generated by iptables-save v"));
    assert!(text.contains("\n[5:300] -A LOGGING\n"));
    assert!(!text.contains("*raw"));
}

#[test]
fn dump_of_missing_table() {
    let backend = MemoryBackend::new(ProtocolFamily::Ipv6);
    let args = parse_args(ProtocolFamily::Ipv6, ["ip6tables-save", "-t", "ghost"]).unwrap();
    let mut out = Vec::new();
    let err = dump_args(&args, &backend, &get_registry(), &mut out).unwrap_err();
    assert!(matches!(
        err,
        SaveError::Query(QueryError::TableUnavailable { .. })
    ));
    assert_eq!(err.to_string(), "Cannot initialize table \"ghost\"");
    assert!(out.is_empty());
}
