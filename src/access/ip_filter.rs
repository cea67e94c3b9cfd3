//! Client IP extraction and blacklist/whitelist evaluation (§4.2.1).

use std::net::IpAddr;

use http::HeaderMap;

use crate::config::ip_filter::IpFilter;
use crate::error::PipelineError;

/// Resolve the client IP per `trust_xff`: the leftmost `X-Forwarded-For`
/// entry when trusted, else the socket peer address.
pub fn client_ip(headers: &HeaderMap, socket: IpAddr, trust_xff: bool) -> IpAddr {
    if trust_xff {
        if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(first) = xff.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }
    socket
}

/// Evaluate the compiled filter against a client IP.
pub fn check(filter: &IpFilter, ip: IpAddr) -> Result<(), PipelineError> {
    if filter.is_allowed(&ip) {
        Ok(())
    } else {
        Err(PipelineError::IpBlocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ip_filter::IpFilteringConfig;

    #[test]
    fn xff_leftmost_entry_wins_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.1.1.191, 10.0.0.1".parse().unwrap());
        let socket: IpAddr = "9.9.9.9".parse().unwrap();
        let ip = client_ip(&headers, socket, true);
        assert_eq!(ip, "1.1.1.191".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn socket_used_when_xff_not_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.1.1.191".parse().unwrap());
        let socket: IpAddr = "9.9.9.9".parse().unwrap();
        let ip = client_ip(&headers, socket, false);
        assert_eq!(ip, socket);
    }

    #[test]
    fn blacklisted_ip_is_blocked() {
        let cfg = IpFilteringConfig { whitelist: vec![], blacklist: vec!["1.1.1.128/26".into()], trust_xff: false };
        let filter = IpFilter::compile(&cfg);
        assert!(check(&filter, "1.1.1.150".parse().unwrap()).is_err());
        assert!(check(&filter, "2.2.2.2".parse().unwrap()).is_ok());
    }
}
