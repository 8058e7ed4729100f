use std::fmt;

/// Raw storage for both families. IPv4 occupies the first 4 bytes.
pub const ADDR_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddrKind {
    V4,
    V6,
}

/// A peer endpoint: raw address bytes, family and port.
///
/// The family is carried explicitly. Earlier revisions of this system
/// guessed it from the address bytes, which turns `::1` into an IPv4
/// address; see [`NetAddr::legacy_v6_heuristic`].
///
/// `Ord` is byte-wise and exists only so addresses can key maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetAddr {
    pub kind: AddrKind,
    pub ip: [u8; ADDR_BYTES],
    pub port: u16,
}

impl NetAddr {
    pub fn v4(octets: [u8; 4], port: u16) -> Self {
        let mut ip = [0u8; ADDR_BYTES];
        ip[..4].copy_from_slice(&octets);
        Self {
            kind: AddrKind::V4,
            ip,
            port,
        }
    }

    pub fn v6(groups: [u16; 8], port: u16) -> Self {
        let mut ip = [0u8; ADDR_BYTES];
        for (i, group) in groups.iter().enumerate() {
            ip[i * 2..i * 2 + 2].copy_from_slice(&group.to_be_bytes());
        }
        Self {
            kind: AddrKind::V6,
            ip,
            port,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn is_v6(&self) -> bool {
        self.kind == AddrKind::V6
    }

    pub fn groups(&self) -> [u16; 8] {
        let mut groups = [0u16; 8];
        for (i, group) in groups.iter_mut().enumerate() {
            *group = u16::from_be_bytes([self.ip[i * 2], self.ip[i * 2 + 1]]);
        }
        groups
    }

    pub fn octets(&self) -> [u8; 4] {
        [self.ip[0], self.ip[1], self.ip[2], self.ip[3]]
    }

    /// The historical family test: "IPv6 if any of the upper three 32-bit
    /// words is non-zero". Misclassifies `::1` (and any v6 address whose
    /// value fits the last word) as IPv4. Kept for reference; nothing
    /// routes through it.
    pub fn legacy_v6_heuristic(&self) -> bool {
        self.ip[4..8] != [0; 4] || self.ip[8..12] != [0; 4] || self.ip[12..16] != [0; 4]
    }

    /// True for addresses that never leave the local network: loopback,
    /// RFC1918 ranges, link-local, and the v6 unique-local block.
    pub fn is_lan(&self) -> bool {
        match self.kind {
            AddrKind::V4 => {
                let [a, b, _, _] = self.octets();
                a == 127
                    || a == 10
                    || (a == 172 && (16..=31).contains(&b))
                    || (a == 192 && b == 168)
                    || (a == 169 && b == 254)
            }
            AddrKind::V6 => {
                let groups = self.groups();
                groups == [0, 0, 0, 0, 0, 0, 0, 1]
                    || groups[0] & 0xffc0 == 0xfe80
                    || groups[0] & 0xfe00 == 0xfc00
            }
        }
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_addr(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddrParseError {
    #[error("empty address string")]
    Empty,
    #[error("too many groups")]
    TooManyGroups,
    #[error("too few groups")]
    TooFewGroups,
    #[error("more than one '::' run")]
    SecondZeroRun,
    #[error("group longer than four digits")]
    GroupTooLong,
    #[error("dangling separator at end of address")]
    TrailingSeparator,
    #[error("empty octet")]
    EmptyOctet,
    #[error("octet out of range")]
    OctetOutOfRange,
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("not a valid IPv4 or IPv6 address")]
    Unrecognized,
}

/// Parses a colon-separated IPv6 literal: 1-4 hex digits per group, at
/// most one `::` run. Single left-to-right scan; groups collected after a
/// `::` are shifted to the end of the 8-slot array afterwards and the gap
/// is zero-filled.
pub fn parse_ipv6(s: &str) -> Result<[u8; ADDR_BYTES], AddrParseError> {
    if s.is_empty() {
        return Err(AddrParseError::Empty);
    }

    let mut groups = [0u16; 8];
    let mut count = 0usize;
    let mut group = 0u16;
    let mut digits = 0usize;
    let mut split: Option<usize> = None;
    let mut prev_colon = false;
    let mut run_just_closed = false;

    for c in s.chars() {
        if count == 8 {
            return Err(AddrParseError::TooManyGroups);
        }
        if c == ':' {
            if prev_colon {
                // Second colon of a `::` run.
                if run_just_closed || split.is_some() {
                    return Err(AddrParseError::SecondZeroRun);
                }
                if count == 7 {
                    return Err(AddrParseError::TooManyGroups);
                }
                split = Some(count);
                run_just_closed = true;
            } else {
                groups[count] = group;
                count += 1;
                group = 0;
                digits = 0;
                run_just_closed = false;
            }
            prev_colon = true;
        } else {
            let nibble = c.to_digit(16).ok_or(AddrParseError::InvalidCharacter(c))?;
            if digits == 4 {
                return Err(AddrParseError::GroupTooLong);
            }
            group = (group << 4) | nibble as u16;
            digits += 1;
            prev_colon = false;
            run_just_closed = false;
        }
    }

    if prev_colon {
        // A dangling single colon is degenerate; a trailing `::` is fine.
        if !run_just_closed {
            return Err(AddrParseError::TrailingSeparator);
        }
    } else {
        groups[count] = group;
        count += 1;
    }

    match split {
        Some(at) => {
            // Shift everything collected after the run to the end, highest
            // index first so the ranges may overlap, then zero the gap.
            let tail = count - at;
            for i in 0..tail {
                groups[7 - i] = groups[count - 1 - i];
            }
            for g in &mut groups[at..8 - tail] {
                *g = 0;
            }
        }
        None => {
            if count != 8 {
                return Err(AddrParseError::TooFewGroups);
            }
        }
    }

    let mut bytes = [0u8; ADDR_BYTES];
    for (i, group) in groups.iter().enumerate() {
        bytes[i * 2..i * 2 + 2].copy_from_slice(&group.to_be_bytes());
    }
    Ok(bytes)
}

/// Formats all 8 groups in full, lowercase, colon-separated. Never emits
/// `::` compression, so formatting does not round-trip compressed input.
pub fn format_ipv6(addr: &NetAddr) -> String {
    let g = addr.groups();
    format!(
        "{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}",
        g[0], g[1], g[2], g[3], g[4], g[5], g[6], g[7]
    )
}

/// Parses a dotted-quad IPv4 literal: exactly four decimal octets in
/// 0-255, no empty octets.
pub fn parse_ipv4(s: &str) -> Result<[u8; 4], AddrParseError> {
    if s.is_empty() {
        return Err(AddrParseError::Empty);
    }

    let mut octets = [0u8; 4];
    let mut value = 0u32;
    let mut index = 0usize;
    let mut digit_seen = false;

    for c in s.chars() {
        if index == 4 {
            return Err(AddrParseError::TooManyGroups);
        }
        if c == '.' {
            if !digit_seen {
                return Err(AddrParseError::EmptyOctet);
            }
            octets[index] = value as u8;
            index += 1;
            value = 0;
            digit_seen = false;
        } else {
            let digit = match c.to_digit(10) {
                Some(d) => d,
                None => return Err(AddrParseError::InvalidCharacter(c)),
            };
            value = value * 10 + digit;
            if value > 255 {
                return Err(AddrParseError::OctetOutOfRange);
            }
            digit_seen = true;
        }
    }

    if !digit_seen {
        return Err(AddrParseError::TrailingSeparator);
    }
    octets[index] = value as u8;
    index += 1;

    if index != 4 {
        return Err(AddrParseError::TooFewGroups);
    }
    Ok(octets)
}

pub fn format_ipv4(addr: &NetAddr) -> String {
    let [a, b, c, d] = addr.octets();
    format!("{}.{}.{}.{}", a, b, c, d)
}

/// Parses either family: IPv6 first, IPv4 as the fallback. The port is
/// left at zero; textual addresses do not carry one.
pub fn parse_addr(s: &str) -> Result<NetAddr, AddrParseError> {
    if let Ok(bytes) = parse_ipv6(s) {
        return Ok(NetAddr {
            kind: AddrKind::V6,
            ip: bytes,
            port: 0,
        });
    }
    if let Ok(octets) = parse_ipv4(s) {
        return Ok(NetAddr::v4(octets, 0));
    }
    Err(AddrParseError::Unrecognized)
}

pub fn format_addr(addr: &NetAddr) -> String {
    match addr.kind {
        AddrKind::V4 => format_ipv4(addr),
        AddrKind::V6 => format_ipv6(addr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_round_trip() {
        let addr = NetAddr::v4(parse_ipv4("192.246.40.70").unwrap(), 0);
        assert_eq!(format_ipv4(&addr), "192.246.40.70");
    }

    #[test]
    fn ipv4_drops_leading_zeros() {
        let addr = NetAddr::v4(parse_ipv4("010.001.000.255").unwrap(), 0);
        assert_eq!(format_ipv4(&addr), "10.1.0.255");
    }

    #[test]
    fn ipv4_rejects_out_of_range_octet() {
        assert_eq!(parse_ipv4("1.2.3.256"), Err(AddrParseError::OctetOutOfRange));
    }

    #[test]
    fn ipv4_rejects_wrong_group_counts() {
        assert_eq!(parse_ipv4("1.2.3"), Err(AddrParseError::TooFewGroups));
        assert_eq!(parse_ipv4("1.2.3.4.5"), Err(AddrParseError::TooManyGroups));
    }

    #[test]
    fn ipv4_rejects_degenerate_input() {
        assert_eq!(parse_ipv4(""), Err(AddrParseError::Empty));
        assert_eq!(parse_ipv4("1.2..3"), Err(AddrParseError::EmptyOctet));
        assert_eq!(parse_ipv4(".1.2.3"), Err(AddrParseError::EmptyOctet));
        assert_eq!(parse_ipv4("1.2.3.4."), Err(AddrParseError::TrailingSeparator));
        assert_eq!(parse_ipv4("1.2.3.x"), Err(AddrParseError::InvalidCharacter('x')));
    }

    #[test]
    fn ipv6_full_form_round_trips() {
        let text = "2001:0db8:85a3:0000:0000:8a2e:0370:7334";
        let addr = NetAddr {
            kind: AddrKind::V6,
            ip: parse_ipv6(text).unwrap(),
            port: 0,
        };
        assert_eq!(format_ipv6(&addr), text);
    }

    #[test]
    fn ipv6_case_normalizes() {
        let addr = NetAddr {
            kind: AddrKind::V6,
            ip: parse_ipv6("2001:0DB8:85A3:0000:0000:8A2E:0370:7334").unwrap(),
            port: 0,
        };
        assert_eq!(format_ipv6(&addr), "2001:0db8:85a3:0000:0000:8a2e:0370:7334");
    }

    #[test]
    fn ipv6_loopback_expansion() {
        let addr = NetAddr {
            kind: AddrKind::V6,
            ip: parse_ipv6("::1").unwrap(),
            port: 0,
        };
        assert_eq!(addr.groups(), [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn ipv6_interior_zero_run() {
        let addr = NetAddr {
            kind: AddrKind::V6,
            ip: parse_ipv6("1::1").unwrap(),
            port: 0,
        };
        assert_eq!(addr.groups(), [1, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn ipv6_trailing_zero_run() {
        let addr = NetAddr {
            kind: AddrKind::V6,
            ip: parse_ipv6("fe80::").unwrap(),
            port: 0,
        };
        assert_eq!(addr.groups(), [0xfe80, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn ipv6_all_zero() {
        let addr = NetAddr {
            kind: AddrKind::V6,
            ip: parse_ipv6("::").unwrap(),
            port: 0,
        };
        assert_eq!(addr.groups(), [0; 8]);
    }

    #[test]
    fn ipv6_rejects_nine_groups() {
        assert_eq!(
            parse_ipv6("1:2:3:4:5:6:7:8:9"),
            Err(AddrParseError::TooManyGroups)
        );
    }

    #[test]
    fn ipv6_rejects_double_zero_run() {
        assert_eq!(parse_ipv6("1::2::3"), Err(AddrParseError::SecondZeroRun));
        assert_eq!(parse_ipv6("1:::2"), Err(AddrParseError::SecondZeroRun));
    }

    #[test]
    fn ipv6_rejects_degenerate_input() {
        assert_eq!(parse_ipv6(""), Err(AddrParseError::Empty));
        assert_eq!(parse_ipv6("1:2:3:"), Err(AddrParseError::TrailingSeparator));
        assert_eq!(parse_ipv6("1:2:3"), Err(AddrParseError::TooFewGroups));
        assert_eq!(parse_ipv6("12345::"), Err(AddrParseError::GroupTooLong));
        assert_eq!(parse_ipv6("1:g::"), Err(AddrParseError::InvalidCharacter('g')));
    }

    #[test]
    fn format_never_compresses() {
        let addr = NetAddr {
            kind: AddrKind::V6,
            ip: parse_ipv6("1::1").unwrap(),
            port: 0,
        };
        // Parsing accepts `::`; formatting never reproduces it.
        assert_eq!(format_ipv6(&addr), "0001:0000:0000:0000:0000:0000:0000:0001");
    }

    #[test]
    fn parse_addr_picks_family() {
        assert_eq!(parse_addr("10.0.0.1").unwrap().kind, AddrKind::V4);
        assert_eq!(parse_addr("fe80::1").unwrap().kind, AddrKind::V6);
        assert_eq!(parse_addr("idnewt"), Err(AddrParseError::Unrecognized));
    }

    #[test]
    fn legacy_heuristic_misclassifies_loopback() {
        let addr = parse_addr("::1").unwrap();
        // The explicit kind gets it right; the old bytes-only test did not.
        assert!(addr.is_v6());
        assert!(!addr.legacy_v6_heuristic());
    }

    #[test]
    fn lan_ranges() {
        assert!(parse_addr("127.0.0.1").unwrap().is_lan());
        assert!(parse_addr("10.4.4.4").unwrap().is_lan());
        assert!(parse_addr("172.20.0.1").unwrap().is_lan());
        assert!(parse_addr("192.168.1.1").unwrap().is_lan());
        assert!(parse_addr("169.254.0.7").unwrap().is_lan());
        assert!(!parse_addr("8.8.8.8").unwrap().is_lan());
        assert!(parse_addr("::1").unwrap().is_lan());
        assert!(parse_addr("fe80::1234").unwrap().is_lan());
        assert!(parse_addr("fd00::1").unwrap().is_lan());
        assert!(!parse_addr("2001:db8::1").unwrap().is_lan());
    }
}
