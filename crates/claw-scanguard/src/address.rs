//! Client address extraction and address-class predicates.

use std::collections::HashMap;
use std::net::IpAddr;

/// Default header carrying the client address set by the fronting proxy.
pub const DEFAULT_IP_HEADER: &str = "X-Real-Ip";

/// Parse a claimed client address.
///
/// The whole trimmed value must be one address. A forwarding chain such as
/// `"a, b"` is unparsable: its leading elements are supplied by the client.
/// IPv4-mapped IPv6 addresses are folded to IPv4 so both spellings share one
/// reputation entry.
#[must_use]
pub fn parse_client_ip(raw: &str) -> Option<IpAddr> {
    raw.trim().parse::<IpAddr>().ok().map(|ip| ip.to_canonical())
}

/// Look up the client address header and parse it.
///
/// Header names are matched case-insensitively.
#[must_use]
pub fn extract_client_ip(headers: &HashMap<String, String>, header: &str) -> Option<IpAddr> {
    header_value(headers, header).and_then(parse_client_ip)
}

/// Find a header value by case-insensitive name.
#[must_use]
pub fn header_value<'a>(headers: &'a HashMap<String, String>, header: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(header))
        .map(|(_, value)| value.as_str())
}

/// Loopback check that also covers IPv4-mapped IPv6.
#[must_use]
pub fn is_loopback(ip: &IpAddr) -> bool {
    ip.to_canonical().is_loopback()
}

/// Private-range check: RFC 1918 for IPv4, RFC 4193 (`fc00::/7`) for IPv6.
#[must_use]
pub fn is_private(ip: &IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("203.0.113.5", Some("203.0.113.5") ; "plain v4")]
    #[test_case("  203.0.113.5 ", Some("203.0.113.5") ; "whitespace")]
    #[test_case("2001:db8::1", Some("2001:db8::1") ; "plain v6")]
    #[test_case("::ffff:198.51.100.7", Some("198.51.100.7") ; "mapped v6 folds to v4")]
    #[test_case("1.2.3.4, 5.6.7.8", None ; "forwarding chain")]
    #[test_case("1.2.3.4,", None ; "trailing comma")]
    #[test_case("", None ; "empty")]
    #[test_case("not-an-ip", None ; "garbage")]
    #[test_case("1.2.3.4:8080", None ; "with port")]
    fn test_parse_client_ip(raw: &str, expected: Option<&str>) {
        let expected: Option<IpAddr> = expected.map(|s| s.parse().unwrap());
        assert_eq!(parse_client_ip(raw), expected);
    }

    #[test]
    fn test_extract_client_ip_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("x-real-ip".to_string(), "198.51.100.1".to_string());

        let ip = extract_client_ip(&headers, DEFAULT_IP_HEADER);
        assert_eq!(ip, Some("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_missing() {
        let mut headers = HashMap::new();
        headers.insert("x-forwarded-for".to_string(), "198.51.100.1".to_string());

        assert!(extract_client_ip(&headers, DEFAULT_IP_HEADER).is_none());
    }

    #[test_case("127.0.0.1", true ; "v4 loopback")]
    #[test_case("127.10.0.1", true ; "v4 loopback range")]
    #[test_case("::1", true ; "v6 loopback")]
    #[test_case("::ffff:127.0.0.1", true ; "mapped loopback")]
    #[test_case("203.0.113.5", false ; "public")]
    fn test_is_loopback(raw: &str, expected: bool) {
        let ip: IpAddr = raw.parse().unwrap();
        assert_eq!(is_loopback(&ip), expected);
    }

    #[test_case("10.0.0.5", true ; "rfc1918 10/8")]
    #[test_case("172.16.4.1", true ; "rfc1918 172.16/12")]
    #[test_case("172.32.0.1", false ; "outside 172.16/12")]
    #[test_case("192.168.1.1", true ; "rfc1918 192.168/16")]
    #[test_case("fd12:3456::1", true ; "ula")]
    #[test_case("fc00::1", true ; "ula lower half")]
    #[test_case("fe80::1", false ; "link local is not private")]
    #[test_case("::ffff:10.1.2.3", true ; "mapped private")]
    #[test_case("8.8.8.8", false ; "public v4")]
    fn test_is_private(raw: &str, expected: bool) {
        let ip: IpAddr = raw.parse().unwrap();
        assert_eq!(is_private(&ip), expected);
    }
}
