use std::net::Ipv4Addr;

use crate::addr::{format_ipv4_masked, parse_ipv4_any, Iface, MacAddr, IFNAMSIZ};

#[test]
fn mac_accepts_short_groups() {
    let mac: MacAddr = "0:1b:c:dd:e:f".parse().unwrap();
    assert_eq!(mac.0, [0x00, 0x1b, 0x0c, 0xdd, 0x0e, 0x0f]);
    assert_eq!(mac.to_string(), "00:1b:0c:dd:0e:0f");
}

#[test]
fn mac_rejects_garbage() {
    assert!("00:11:22:33:44".parse::<MacAddr>().is_err());
    assert!("00:11:22:33:44:55:66".parse::<MacAddr>().is_err());
    assert!("00:11:22:33:44:zz".parse::<MacAddr>().is_err());
    assert!("001:11:22:33:44:55".parse::<MacAddr>().is_err());
}

#[test]
fn ipv4_mask_rendering() {
    let addr = Ipv4Addr::new(10, 0, 0, 0);
    assert_eq!(
        format_ipv4_masked(addr, Ipv4Addr::new(255, 0, 0, 0)),
        "10.0.0.0/8"
    );
    assert_eq!(
        format_ipv4_masked(addr, Ipv4Addr::new(255, 0, 255, 0)),
        "10.0.0.0/255.0.255.0"
    );
}

#[test]
fn numeric_address_is_not_resolved() {
    assert_eq!(
        parse_ipv4_any("192.168.1.1"),
        Some(vec![Ipv4Addr::new(192, 168, 1, 1)])
    );
    assert_eq!(parse_ipv4_any("/24"), None);
}

#[test]
fn mask_is_applied_to_the_address() {
    assert_eq!(
        parse_ipv4_any("10.1.2.3/8"),
        Some(vec![Ipv4Addr::new(10, 0, 0, 0)])
    );
    assert_eq!(
        parse_ipv4_any("192.168.1.77/255.255.255.0"),
        Some(vec![Ipv4Addr::new(192, 168, 1, 0)])
    );
    assert_eq!(
        parse_ipv4_any("192.168.1.77/32"),
        Some(vec![Ipv4Addr::new(192, 168, 1, 77)])
    );
    assert_eq!(parse_ipv4_any("10.1.2.3/0"), Some(vec![Ipv4Addr::UNSPECIFIED]));
    // dotted masks need not be contiguous
    assert_eq!(
        parse_ipv4_any("10.1.2.3/255.0.255.0"),
        Some(vec![Ipv4Addr::new(10, 0, 2, 0)])
    );
}

#[test]
fn bad_mask_is_rejected() {
    assert_eq!(parse_ipv4_any("10.1.2.3/33"), None);
    assert_eq!(parse_ipv4_any("10.1.2.3/255.0.256.0"), None);
    assert_eq!(parse_ipv4_any("10.1.2.3/"), None);
    assert_eq!(parse_ipv4_any("10.1.2.3/abc"), None);
}

#[test]
fn iface_raw_round_trip() {
    for name in &["eth0", "ppp+", "lo"] {
        let iface = Iface::new(name);
        let (raw, mask) = iface.to_raw();
        let decoded = Iface::from_raw(&raw, &mask).unwrap();
        assert_eq!(decoded.to_string(), *name);
    }
    assert_eq!(Iface::from_raw(&[0; IFNAMSIZ], &[0; IFNAMSIZ]), None);
}
