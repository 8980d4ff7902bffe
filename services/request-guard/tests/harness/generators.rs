// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for attack simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Origins an attacker might send against `bastion.example`.
pub fn generate_forged_origins() -> Vec<&'static str> {
    vec![
        "https://evil.example.com",
        "https://bastion.example.evil.com",
        "https://evilbastion.example",
        "https://bastion.example:8443",
        "null",
        "file://",
        "https://xn--bastin-fxa.example",
    ]
}

/// Syntactically broken tokens.
pub fn generate_malformed_tokens() -> Vec<String> {
    vec![
        String::new(),
        "abc".to_string(),
        "a.b".to_string(),
        "a.b.c.d".to_string(),
        "..".to_string(),
        "zzzzzzzzzzzzzz.AAAA.AAAA".to_string(),
        "LRX1.QUJD.REVG".to_string(),
    ]
}

/// Flip the last character of a token's signature segment.
pub fn tamper(token: &str) -> String {
    let mut chars: Vec<char> = token.chars().collect();
    if let Some(last) = chars.last_mut() {
        *last = if *last == 'A' { 'B' } else { 'A' };
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_tamper_changes_token() {
        assert_ne!(tamper("1.abc.xyz"), "1.abc.xyz");
        assert_eq!(tamper("1.abc.xyA"), "1.abc.xyB");
    }
}
