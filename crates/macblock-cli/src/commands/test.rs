//! Query the loopback resolver and interpret the answer.

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use macblock_types::{domain, Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// `macblock test <domain>`
pub async fn run(raw_domain: &str) -> Result<()> {
    let name = domain::normalize(raw_domain)?;

    let group =
        NameServerConfigGroup::from_ips_clear(&[IpAddr::V4(Ipv4Addr::LOCALHOST)], 53, true);
    let mut opts = ResolverOpts::default();
    opts.timeout = Duration::from_secs(3);
    opts.attempts = 1;
    opts.use_hosts_file = false;
    opts.cache_size = 0;
    let resolver =
        TokioAsyncResolver::tokio(ResolverConfig::from_parts(None, Vec::new(), group), opts);

    match resolver.lookup_ip(name.as_str()).await {
        Ok(answer) => {
            let ips: Vec<String> = answer.iter().map(|ip| ip.to_string()).collect();
            println!("{name}: RESOLVES ({})", ips.join(", "));
            Ok(())
        }
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. }
                if *response_code == ResponseCode::NXDomain =>
            {
                println!("{name}: BLOCKED (NXDOMAIN)");
                Ok(())
            }
            ResolveErrorKind::NoRecordsFound { .. } => {
                println!("{name}: no records (not blocked, nothing to resolve)");
                Ok(())
            }
            _ => Err(Error::transient(
                format!("querying 127.0.0.1:53 for {name}"),
                format!("{e}; is the macblock resolver running?"),
            )),
        },
    }
}
