//! Outbound address screening for attestation callbacks.
//!
//! Callback URIs are supplied by community administrators, so the engine
//! refuses to call loopback, private or otherwise reserved addresses.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use super::AttestationError;

const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
];

/// Static check of a URL host, before any DNS lookup.
#[must_use]
pub fn is_blocked_host(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    if BLOCKED_HOSTNAMES.contains(&lower.as_str()) {
        return true;
    }

    let bare = lower.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>().is_ok_and(|ip| is_private_ip(&ip))
}

/// Loopback, private, link-local, shared, documentation or multicast ranges.
#[must_use]
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (a == 100 && (b & 0xC0) == 64) // 100.64.0.0/10
                || (a == 198 && (b & 0xFE) == 18) // 198.18.0.0/15
                || (a == 192 && b == 0 && (c == 0 || c == 2)) // 192.0.0.0/24, 192.0.2.0/24
                || (a == 198 && b == 51 && c == 100) // 198.51.100.0/24
                || (a == 203 && b == 0 && c == 113) // 203.0.113.0/24
                || a >= 224
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xFE00) == 0xFC00 // fc00::/7
                || (v6.segments()[0] & 0xFFC0) == 0xFE80 // fe80::/10
                || is_v4_mapped_private(v6)
        }
    }
}

fn is_v4_mapped_private(v6: &Ipv6Addr) -> bool {
    v6.to_ipv4_mapped()
        .is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
}

/// Callback target whose address passed screening.
///
/// The request must be sent to `addr`, so a second DNS answer cannot
/// redirect it.
#[derive(Debug, Clone)]
pub struct VerifiedTarget {
    pub host: String,
    pub addr: SocketAddr,
}

/// Resolve the callback host and reject it if any address is non-public.
pub async fn verify_callback(url: &reqwest::Url) -> Result<VerifiedTarget, AttestationError> {
    let host = url
        .host_str()
        .ok_or_else(|| AttestationError::Blocked("callback URI has no host".into()))?
        .to_string();
    if is_blocked_host(&host) {
        return Err(AttestationError::Blocked(format!("host {host} is not public")));
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(VerifiedTarget {
            host,
            addr: SocketAddr::new(ip, port),
        });
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| AttestationError::Transport(format!("DNS lookup for {host} failed: {e}")))?
        .collect();

    if let Some(private) = addrs.iter().find(|a| is_private_ip(&a.ip())) {
        return Err(AttestationError::Blocked(format!(
            "{host} resolved to non-public address {}",
            private.ip()
        )));
    }

    let addr = addrs
        .first()
        .copied()
        .ok_or_else(|| AttestationError::Transport(format!("no addresses for {host}")))?;

    Ok(VerifiedTarget { host, addr })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_loopback_names() {
        assert!(is_blocked_host("localhost"));
        assert!(is_blocked_host("LocalHost"));
        assert!(is_blocked_host("ip6-loopback"));
    }

    #[test]
    fn blocks_private_and_reserved_v4() {
        for host in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "224.0.0.1",
        ] {
            assert!(is_blocked_host(host), "{host} should be blocked");
        }
    }

    #[test]
    fn blocks_private_v6() {
        assert!(is_blocked_host("::1"));
        assert!(is_blocked_host("[::1]"));
        assert!(is_blocked_host("fd00::1"));
        assert!(is_blocked_host("fe80::1"));
        assert!(is_blocked_host("::ffff:127.0.0.1"));
    }

    #[test]
    fn allows_public_hosts() {
        assert!(!is_blocked_host("8.8.8.8"));
        assert!(!is_blocked_host("gate.example.com"));
        assert!(!is_blocked_host("2606:4700::1111"));
    }

    #[tokio::test]
    async fn verify_rejects_literal_private_ip() {
        let url = reqwest::Url::parse("http://127.0.0.1:8080/check").unwrap();
        let err = verify_callback(&url).await.unwrap_err();
        assert!(matches!(err, AttestationError::Blocked(_)));
    }

    #[tokio::test]
    async fn verify_accepts_literal_public_ip() {
        let url = reqwest::Url::parse("https://1.1.1.1/check").unwrap();
        let target = verify_callback(&url).await.unwrap();
        assert_eq!(target.addr.port(), 443);
    }
}
