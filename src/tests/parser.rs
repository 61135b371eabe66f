use super::{arp_header_with_hw_len, ipv4_header, MockMatch, O_MOCK_FLAG, O_MOCK_VALUE};
use crate::error::ParameterError;
use crate::extension::{
    ExtensionData, HardwareLength, Mangle, ParamParser, Reject, RejectInfo, RejectWith,
    RuleContext,
};
use crate::rule::{ArpHeader, InvFlags, MaskedValue};
use crate::RuleHeader;

#[test]
fn unknown_option() {
    let header = ipv4_header();
    let ctx = RuleContext::new(&header);
    let mut parser = ParamParser::new(&Reject);
    assert_eq!(
        parser.parse_args(&["--reject-type", "tcp-reset"], &ctx),
        Err(ParameterError::UnknownOption("reject-type".to_string()))
    );
    assert_eq!(parser.get_flags(), 0);
}

#[test]
fn missing_argument() {
    let header = ipv4_header();
    let ctx = RuleContext::new(&header);
    let mut parser = ParamParser::new(&Reject);
    assert_eq!(
        parser.parse_args(&["--reject-with"], &ctx),
        Err(ParameterError::MissingArgument("reject-with".to_string()))
    );
}

#[test]
fn attached_argument() {
    let header = ipv4_header();
    let ctx = RuleContext::new(&header);
    let mut parser = ParamParser::new(&Reject);
    parser.parse_args(&["--reject-with=tcp-reset"], &ctx).unwrap();
    assert_eq!(parser.get_flags(), 1);
    assert_eq!(
        parser.finish().unwrap(),
        ExtensionData::from(RejectInfo {
            with: RejectWith::TcpReset,
        })
    );
}

#[test]
fn stray_argument() {
    let header = ipv4_header();
    let ctx = RuleContext::new(&header);
    let mut parser = ParamParser::new(&Reject);
    assert_eq!(
        parser.parse_args(&["tcp-reset"], &ctx),
        Err(ParameterError::UnexpectedArgument("tcp-reset".to_string()))
    );

    let mock = MockMatch::new(0);
    let mut parser = ParamParser::new(&mock);
    assert_eq!(
        parser.parse_args(&["--mock-flag=yes"], &ctx),
        Err(ParameterError::UnexpectedArgument("yes".to_string()))
    );
}

#[test]
fn inversion_is_checked() {
    let header = ipv4_header();
    let ctx = RuleContext::new(&header);
    let mut parser = ParamParser::new(&Reject);
    assert_eq!(
        parser.parse_args(&["!", "--reject-with", "tcp-reset"], &ctx),
        Err(ParameterError::InversionNotAllowed("reject-with".to_string()))
    );

    let mock = MockMatch::new(0);
    let mut parser = ParamParser::new(&mock);
    parser
        .parse_args(&["!", "--mock-flag", "--mock-value", "1"], &ctx)
        .unwrap();
    assert_eq!(parser.get_flags(), (1 << O_MOCK_FLAG) | (1 << O_MOCK_VALUE));
}

#[test]
fn inversion_applies_to_next_option_only() {
    let header = ipv4_header();
    let ctx = RuleContext::new(&header);
    let mock = MockMatch::new(0);

    let mut parser = ParamParser::new(&mock);
    assert!(parser
        .parse_args(&["!", "--mock-flag", "--mock-value", "1"], &ctx)
        .is_ok());

    let mut parser = ParamParser::new(&mock);
    assert_eq!(
        parser.parse_args(&["--mock-value", "1", "!", "--mock-value", "2"], &ctx),
        Err(ParameterError::InversionNotAllowed("mock-value".to_string()))
    );
    assert_eq!(parser.get_flags(), 1 << O_MOCK_VALUE);
}

#[test]
fn final_check_sees_flags() {
    let header = ipv4_header();
    let ctx = RuleContext::new(&header);
    let mock = MockMatch::new(0);

    let mut parser = ParamParser::new(&mock);
    parser.parse_args(&["--mock-flag"], &ctx).unwrap();
    assert_eq!(
        parser.finish(),
        Err(ParameterError::MissingArgument("mock-value".to_string()))
    );

    let mut parser = ParamParser::new(&mock);
    parser.parse_args(&["--mock-value", "x"], &ctx).unwrap();
    assert!(parser.finish().is_ok());
}

#[test]
fn errors_stop_parsing() {
    let header = arp_header_with_hw_len(6);
    let ctx = RuleContext::new(&header);
    let mut parser = ParamParser::new(&Mangle);
    assert_eq!(
        parser.parse_args(
            &["--mangle-target", "bogus", "--mangle-ip-s", "10.0.0.1"],
            &ctx
        ),
        Err(ParameterError::BadMangleTarget("bogus".to_string()))
    );
    assert_eq!(parser.get_flags(), 0);
}

#[test]
fn hardware_length_context() {
    let header = arp_header_with_hw_len(6);
    assert_eq!(
        RuleContext::new(&header).hardware_length(),
        Some(HardwareLength {
            length: 6,
            inverted: false,
        })
    );

    let header = RuleHeader::Arp(ArpHeader {
        hw_len: Some(MaskedValue::new(8, 0x0f)),
        inv: InvFlags::HW_LEN | InvFlags::SRC,
        ..Default::default()
    });
    assert_eq!(
        RuleContext::new(&header).hardware_length(),
        Some(HardwareLength {
            length: 8,
            inverted: true,
        })
    );

    assert_eq!(RuleContext::new(&ipv4_header()).hardware_length(), None);
    let header = RuleHeader::Arp(ArpHeader::default());
    assert_eq!(RuleContext::new(&header).hardware_length(), None);
}

#[test]
fn option_id_past_the_mask_sets_no_bit() {
    let mock = MockMatch::with_wide_option();
    let header = ipv4_header();
    let ctx = RuleContext::new(&header);
    let mut parser = ParamParser::new(&mock);
    parser
        .parse_args(&["--mock-wide", "--mock-value", "1"], &ctx)
        .unwrap();
    assert_eq!(parser.get_flags(), 1 << O_MOCK_VALUE);
    assert!(parser.finish().is_ok());
}
