use anyhow::{bail, Result};
use std::net::IpAddr;

/// Resolve an interface name to the local address the search socket should
/// bind. Prefers IPv4 since SSDP replies here come over the v4 multicast
/// group.
pub fn interface_addr(name: &str) -> Result<IpAddr> {
    let ifs = if_addrs::get_if_addrs()?;

    let mut candidates: Vec<IpAddr> = ifs
        .iter()
        .filter(|ifa| ifa.name == name)
        .map(|ifa| ifa.ip())
        .collect();

    if candidates.is_empty() {
        let mut names: Vec<String> = ifs.into_iter().map(|ifa| ifa.name).collect();
        names.sort();
        names.dedup();
        bail!(
            "no interface named {} (available: {})",
            name,
            names.join(", ")
        );
    }

    candidates.sort_by_key(|ip| !ip.is_ipv4());
    Ok(candidates.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_interface_lists_alternatives() {
        let err = interface_addr("definitely-not-an-interface")
            .expect_err("bogus name should not resolve");
        assert!(err.to_string().contains("no interface named"));
    }
}
