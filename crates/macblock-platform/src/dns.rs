//! Per-service DNS control via `networksetup`.

use crate::run;
use macblock_types::{Error, Result, ServiceDns};
use std::net::IpAddr;
use tracing::info;

/// The `networksetup` sentinel meaning "no static servers, use DHCP".
const EMPTY_SENTINEL: &str = "Empty";

/// Interprets `networksetup -getdnsservers` output.
///
/// The command prints one IP per line when servers are set, and a sentence
/// containing "aren't any DNS Servers set" otherwise. Unknown services make
/// it print an error sentence while still exiting zero, so both streams are
/// inspected.
pub fn parse_get_dns(output: &run::CommandOutput, service: &str) -> Result<ServiceDns> {
    let servers: Vec<IpAddr> = output
        .stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    if !servers.is_empty() {
        return Ok(ServiceDns::Servers(servers));
    }

    let combined = format!("{}{}", output.stdout, output.stderr);
    if combined.contains("any DNS Servers set") {
        return Ok(ServiceDns::Dhcp);
    }
    Err(Error::transient(
        format!("reading DNS servers for {service}"),
        combined.trim().to_string(),
    ))
}

/// Reads the current DNS servers of a service.
pub async fn get(service: &str) -> Result<ServiceDns> {
    let output = run::run(&["networksetup", "-getdnsservers", service]).await?;
    if !output.success() {
        return Err(Error::transient(
            format!("reading DNS servers for {service}"),
            format!("exit {}: {}", output.exit_code, output.stderr.trim()),
        ));
    }
    parse_get_dns(&output, service)
}

/// Sets a service's DNS servers. An empty list resets to DHCP via the
/// `Empty` sentinel.
pub async fn set(service: &str, servers: &[IpAddr]) -> Result<()> {
    let rendered: Vec<String> = servers.iter().map(ToString::to_string).collect();
    let mut argv = vec!["networksetup", "-setdnsservers", service];
    if rendered.is_empty() {
        argv.push(EMPTY_SENTINEL);
    } else {
        argv.extend(rendered.iter().map(String::as_str));
    }
    run::run_checked(&argv, run::DEFAULT_TIMEOUT).await?;
    info!(service, servers = ?rendered, "set DNS servers");
    Ok(())
}

/// Restores a service to its backed-up configuration.
pub async fn restore(service: &str, backup: &ServiceDns) -> Result<()> {
    match backup {
        ServiceDns::Servers(ips) => set(service, ips).await,
        ServiceDns::Dhcp => set(service, &[]).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str) -> run::CommandOutput {
        run::CommandOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: false,
        }
    }

    #[test]
    fn parses_static_servers_in_order() {
        let parsed = parse_get_dns(&output("10.0.0.1\n10.0.0.2\n", ""), "Wi-Fi").unwrap();
        assert_eq!(
            parsed,
            ServiceDns::Servers(vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()])
        );
    }

    #[test]
    fn dhcp_sentence_maps_to_dhcp() {
        let parsed = parse_get_dns(
            &output("There aren't any DNS Servers set on Wi-Fi.\n", ""),
            "Wi-Fi",
        )
        .unwrap();
        assert_eq!(parsed, ServiceDns::Dhcp);
    }

    #[test]
    fn unknown_service_sentence_is_an_error() {
        let err = parse_get_dns(
            &output("** Error: The parameters were not valid.\n", ""),
            "Nope",
        )
        .unwrap_err();
        assert!(err.is_transient());
    }
}
