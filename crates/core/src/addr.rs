//! Bind-address selection helper.
//!
//! Interface enumeration is platform code and lives with the embedder; this
//! module only picks the address a server should advertise from an already
//! enumerated list.

use std::net::Ipv4Addr;

/// Pick the default bind address from an interface address list.
///
/// Returns the first RFC1918 private address (10.0.0.0/8, 172.16.0.0/12,
/// 192.168.0.0/16), else the first entry, else `None`. Only the private
/// check needs to parse; the fallback is the first entry as given.
pub fn select_default_address(addresses: &[String]) -> Option<&str> {
    addresses
        .iter()
        .find(|entry| {
            entry
                .parse::<Ipv4Addr>()
                .is_ok_and(|ip| ip.is_private())
        })
        .or_else(|| addresses.first())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prefers_each_private_range() {
        for private in ["10.1.2.3", "172.16.0.9", "172.31.255.1", "192.168.1.20"] {
            let addresses = list(&["203.0.113.7", private]);
            assert_eq!(select_default_address(&addresses), Some(private));
        }
    }

    #[test]
    fn falls_back_to_first_entry() {
        let addresses = list(&["203.0.113.7", "198.51.100.2"]);
        assert_eq!(select_default_address(&addresses), Some("203.0.113.7"));
    }

    #[test]
    fn unparseable_entries_are_not_private() {
        let addresses = list(&["fe80::1", "not-an-ip", "192.168.0.5"]);
        assert_eq!(select_default_address(&addresses), Some("192.168.0.5"));
    }

    #[test]
    fn fallback_is_first_entry_verbatim() {
        // No private address: the first entry wins even when it does not
        // parse as IPv4.
        let addresses = list(&["fe80::1", "203.0.113.7"]);
        assert_eq!(select_default_address(&addresses), Some("fe80::1"));
    }

    #[test]
    fn outside_172_12_bit_block_is_not_private() {
        // 172.32.0.0 is just past 172.16.0.0/12
        let addresses = list(&["172.32.0.1", "10.0.0.1"]);
        assert_eq!(select_default_address(&addresses), Some("10.0.0.1"));
    }

    #[test]
    fn only_empty_list_yields_none() {
        assert_eq!(select_default_address(&[]), None);
        assert_eq!(select_default_address(&list(&["junk"])), Some("junk"));
    }
}
