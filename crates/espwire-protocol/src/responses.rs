//! Response parsing for the AT protocol.
//!
//! Responses are plain text lines. Besides the `OK`/`SEND OK` terminators
//! handled by the receiver, this module recognises connection lifecycle
//! notifications and `key<sep>value` query results such as
//! `+CIFSR:STAIP,"192.168.1.5"`.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{AtError, AtResult};
use crate::frame::ConnectionId;

/// Connection lifecycle notification, `<id>,<event>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// `<id>,CONNECT`
    Connect(ConnectionId),
    /// `<id>,CLOSED`
    Closed(ConnectionId),
    /// `<id>,CONNECT FAIL`
    ConnectFail(ConnectionId),
}

impl Notification {
    /// Parse a notification line. Returns `None` for any other line.
    pub fn parse(line: &str) -> Option<Notification> {
        let (id, event) = line.split_once(',')?;
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let id = ConnectionId(id.parse().ok()?);
        match event {
            "CONNECT" => Some(Notification::Connect(id)),
            "CLOSED" => Some(Notification::Closed(id)),
            "CONNECT FAIL" => Some(Notification::ConnectFail(id)),
            _ => None,
        }
    }

    /// Get the connection slot the notification refers to.
    pub fn id(&self) -> ConnectionId {
        match self {
            Notification::Connect(id) | Notification::Closed(id) | Notification::ConnectFail(id) => *id,
        }
    }
}

/// Find the value for `key` in `key<sep>value` lines.
///
/// Each line containing `sep` is split at its first occurrence and both
/// sides are trimmed; the first line whose left side equals `key` wins.
pub fn lookup<'a, S: AsRef<str>>(lines: &'a [S], key: &str, sep: char) -> Option<&'a str> {
    lines.iter().find_map(|line| {
        let (k, v) = line.as_ref().split_once(sep)?;
        (k.trim() == key).then(|| v.trim())
    })
}

/// Like [`lookup`], but a missing key is an error.
pub fn require<'a, S: AsRef<str>>(lines: &'a [S], key: &str, sep: char) -> AtResult<&'a str> {
    lookup(lines, key, sep).ok_or_else(|| AtError::FieldNotFound {
        key: key.to_string(),
    })
}

/// Strip one pair of surrounding double quotes, if present on both ends.
pub fn trim_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Parse a quoted or bare IPv4 address value.
pub fn parse_ipv4(value: &str) -> AtResult<Ipv4Addr> {
    let text = trim_quotes(value);
    text.parse()
        .map_err(|_| AtError::InvalidAddress(text.to_string()))
}

/// A 6-byte hardware (MAC) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HardwareAddress(pub [u8; 6]);

impl HardwareAddress {
    /// Create an address from bytes.
    pub fn new(bytes: [u8; 6]) -> Self {
        HardwareAddress(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a, b, c, d, e, g)
    }
}

impl FromStr for HardwareAddress {
    type Err = AtError;

    /// Parse `aa:bb:cc:dd:ee:ff` in either case, optionally quoted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = trim_quotes(s.trim());
        let invalid = || AtError::InvalidAddress(text.to_string());

        let mut bytes = [0u8; 6];
        let mut parts = text.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(HardwareAddress(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notifications() {
        assert_eq!(Notification::parse("0,CONNECT"), Some(Notification::Connect(ConnectionId(0))));
        assert_eq!(Notification::parse("3,CLOSED"), Some(Notification::Closed(ConnectionId(3))));
        assert_eq!(
            Notification::parse("1,CONNECT FAIL"),
            Some(Notification::ConnectFail(ConnectionId(1)))
        );
        assert_eq!(
            Notification::parse("12,CLOSED").map(|n| n.id()),
            Some(ConnectionId(12))
        );
        assert_eq!(Notification::parse("x,CONNECT"), None);
        assert_eq!(Notification::parse("0,CONNECTED"), None);
        assert_eq!(Notification::parse("WIFI CONNECTED"), None);
        assert_eq!(Notification::parse(",CLOSED"), None);
    }

    #[test]
    fn test_lookup_station_ip() {
        let lines = vec![
            "AT+CIFSR".to_string(),
            "+CIFSR:STAIP,\"192.168.1.5\"".to_string(),
            "+CIFSR:STAMAC,\"18:fe:34:a1:b2:c3\"".to_string(),
            "OK".to_string(),
        ];
        let value = lookup(&lines, "+CIFSR:STAIP", ',').unwrap();
        assert_eq!(trim_quotes(value), "192.168.1.5");
        assert_eq!(parse_ipv4(value).unwrap(), Ipv4Addr::new(192, 168, 1, 5));
    }

    #[test]
    fn test_lookup_splits_at_first_separator() {
        let lines = ["+CIPSTAMAC:\"18:fe:34:a1:b2:c3\"", "OK"];
        assert_eq!(lookup(&lines, "+CIPSTAMAC", ':'), Some("\"18:fe:34:a1:b2:c3\""));
    }

    #[test]
    fn test_lookup_trims_and_is_case_sensitive() {
        let lines = ["  name :  value  "];
        assert_eq!(lookup(&lines, "name", ':'), Some("value"));
        assert_eq!(lookup(&lines, "NAME", ':'), None);
    }

    #[test]
    fn test_lookup_missing() {
        let lines = ["OK"];
        assert_eq!(lookup(&lines, "+CIFSR:STAIP", ','), None);
        assert!(matches!(
            require(&lines, "+CIFSR:STAIP", ','),
            Err(AtError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_trim_quotes() {
        assert_eq!(trim_quotes("\"abc\""), "abc");
        assert_eq!(trim_quotes("\"\""), "");
        assert_eq!(trim_quotes("\""), "\"");
        assert_eq!(trim_quotes("\"abc"), "\"abc");
        assert_eq!(trim_quotes("abc"), "abc");
    }

    #[test]
    fn test_hardware_address_format() {
        let mac = HardwareAddress::new([0x18, 0xfe, 0x34, 0x0a, 0x00, 0xff]);
        assert_eq!(mac.to_string(), "18:FE:34:0A:00:FF");
    }

    #[test]
    fn test_hardware_address_parse_case_insensitive() {
        let lower: HardwareAddress = "18:fe:34:0a:00:ff".parse().unwrap();
        let upper: HardwareAddress = "\"18:FE:34:0A:00:FF\"".parse().unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.as_bytes(), &[0x18, 0xfe, 0x34, 0x0a, 0x00, 0xff]);
    }

    #[test]
    fn test_hardware_address_parse_rejects_bad_input() {
        assert!("18:fe:34:0a:00".parse::<HardwareAddress>().is_err());
        assert!("18:fe:34:0a:00:ff:01".parse::<HardwareAddress>().is_err());
        assert!("18:fe:34:0a:00:zz".parse::<HardwareAddress>().is_err());
        assert!("118:fe:34:0a:00:ff".parse::<HardwareAddress>().is_err());
    }

    #[test]
    fn test_hardware_address_round_trip() {
        for seed in 0u32..512 {
            let bytes = [
                seed as u8,
                (seed >> 1) as u8,
                (seed.wrapping_mul(7)) as u8,
                (seed.wrapping_mul(31)) as u8,
                (seed.wrapping_mul(131)) as u8,
                (seed ^ 0xa5) as u8,
            ];
            let mac = HardwareAddress::new(bytes);
            let parsed: HardwareAddress = mac.to_string().parse().unwrap();
            assert_eq!(parsed, mac);
        }
    }
}
