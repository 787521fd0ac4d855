//! Local network detection and the /24 subnet the port scan walks.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::process::Command;
use std::str::FromStr;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a Command that hides the console window on Windows.
#[cfg_attr(not(target_os = "windows"), allow(unused_mut))]
fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// First three octets of an IPv4 /24, e.g. `192.168.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubnetBase([u8; 3]);

impl SubnetBase {
    /// Number of host suffixes scanned (1 through 254).
    pub const HOST_COUNT: usize = 254;

    pub const fn new(a: u8, b: u8, c: u8) -> Self {
        Self([a, b, c])
    }

    /// The /24 containing `ip`, provided it is in a private range.
    pub fn for_private_ip(ip: Ipv4Addr) -> Result<Self> {
        if !ip.is_private() {
            return Err(Error::Configuration(format!(
                "{} is not on a private network",
                ip
            )));
        }
        let [a, b, c, _] = ip.octets();
        Ok(Self::new(a, b, c))
    }

    pub fn host(&self, suffix: u8) -> Ipv4Addr {
        let [a, b, c] = self.0;
        Ipv4Addr::new(a, b, c, suffix)
    }

    /// Every scannable address, suffix 1 to 254 in order.
    pub fn hosts(self) -> impl Iterator<Item = Ipv4Addr> {
        (1..=254u8).map(move |suffix| self.host(suffix))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        ip.octets()[..3] == self.0
    }
}

impl std::fmt::Display for SubnetBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{}.{}.{}", a, b, c)
    }
}

impl FromStr for SubnetBase {
    type Err = Error;

    /// Accepts `192.168.1` or a CIDR such as `192.168.1.0/24`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let octets: Vec<&str> = s.split('.').collect();
        if octets.len() == 3 {
            let mut parsed = [0u8; 3];
            for (slot, part) in parsed.iter_mut().zip(&octets) {
                *slot = part
                    .parse()
                    .map_err(|_| Error::Configuration(format!("invalid subnet base: {}", s)))?;
            }
            return Ok(Self(parsed));
        }

        let invalid = || Error::Configuration(format!("invalid subnet: {}", s));
        if octets.len() != 4 || !s.contains('/') {
            return Err(invalid());
        }
        let network: ipnetwork::Ipv4Network = s.parse().map_err(|_| invalid())?;
        let [a, b, c, _] = network.network().octets();
        Ok(Self::new(a, b, c))
    }
}

/// Network information including interface, subnet, and gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub interface: String,
    pub subnet: String,
    pub gateway_ip: Option<String>,
    pub local_ip: Option<Ipv4Addr>,
}

/// Subnet base of the active interface. Fails with a configuration error
/// when there is no interface on a private IPv4 network.
pub async fn local_subnet() -> Result<SubnetBase> {
    let info = get_full_network_info().await?;
    let local_ip = info
        .local_ip
        .ok_or_else(|| Error::Configuration("no local network".to_string()))?;
    tracing::info!(
        "Local address {} on {} (subnet {})",
        local_ip,
        info.interface,
        info.subnet
    );
    SubnetBase::for_private_ip(local_ip)
        .map_err(|_| Error::Configuration(format!("no local network ({} is not private)", local_ip)))
}

/// Get full network information for the interface carrying the default route.
/// The platform tools run on the blocking pool.
pub async fn get_full_network_info() -> Result<NetworkInfo> {
    tokio::task::spawn_blocking(detect_network_info)
        .await
        .map_err(|e| Error::Configuration(format!("network detection did not finish: {}", e)))?
}

fn detect_network_info() -> Result<NetworkInfo> {
    #[cfg(target_os = "windows")]
    {
        get_windows_network_info()
    }

    #[cfg(target_os = "linux")]
    {
        get_linux_network_info()
    }

    #[cfg(target_os = "macos")]
    {
        get_macos_network_info()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Err(Error::Configuration("Unsupported platform".to_string()))
    }
}

#[cfg(target_os = "linux")]
fn get_linux_network_info() -> Result<NetworkInfo> {
    let route_output = hidden_command("ip").args(["route", "show", "default"]).output()?;
    let route_str = String::from_utf8_lossy(&route_output.stdout);

    let gateway_ip = route_str
        .split_whitespace()
        .skip_while(|&s| s != "via")
        .nth(1)
        .map(|s| s.to_string());

    let interface = route_str
        .split_whitespace()
        .skip_while(|&s| s != "dev")
        .nth(1)
        .unwrap_or("eth0")
        .to_string();

    let addr_output = hidden_command("ip")
        .args(["-4", "addr", "show", &interface])
        .output()?;
    let addr_str = String::from_utf8_lossy(&addr_output.stdout);

    Ok(parse_ip_addr_output(&addr_str, interface, gateway_ip))
}

/// Pull the first non-loopback `inet a.b.c.d/len` line out of `ip addr` output.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_ip_addr_output(output: &str, interface: String, gateway_ip: Option<String>) -> NetworkInfo {
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("inet ") && !trimmed.contains("127.0.0.1") {
            if let Some(cidr) = trimmed.split_whitespace().nth(1) {
                if let Ok(network) = cidr.parse::<ipnetwork::Ipv4Network>() {
                    return NetworkInfo {
                        interface,
                        subnet: format!("{}/{}", network.network(), network.prefix()),
                        gateway_ip,
                        local_ip: Some(network.ip()),
                    };
                }
            }
        }
    }

    NetworkInfo {
        interface,
        subnet: String::new(),
        gateway_ip,
        local_ip: None,
    }
}

#[cfg(target_os = "macos")]
fn get_macos_network_info() -> Result<NetworkInfo> {
    let route_output = hidden_command("route").args(["-n", "get", "default"]).output()?;
    let route_str = String::from_utf8_lossy(&route_output.stdout);

    let gateway_ip = route_str
        .lines()
        .find(|line| line.contains("gateway:"))
        .and_then(|line| line.split(':').nth(1))
        .map(|s| s.trim().to_string());

    let interface = route_str
        .lines()
        .find(|line| line.contains("interface:"))
        .and_then(|line| line.split(':').nth(1))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "en0".to_string());

    let ifconfig_output = hidden_command("ifconfig").arg(&interface).output()?;
    let ifconfig_str = String::from_utf8_lossy(&ifconfig_output.stdout);

    for line in ifconfig_str.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("inet ") && !trimmed.contains("127.0.0.1") {
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if let (Some(ip), Some(mask)) = (parts.get(1), parts.get(3)) {
                let ip = ip.parse::<Ipv4Addr>();
                let mask = u32::from_str_radix(mask.trim_start_matches("0x"), 16);
                if let (Ok(ip), Ok(mask)) = (ip, mask) {
                    let network = Ipv4Addr::from(u32::from(ip) & mask);
                    return Ok(NetworkInfo {
                        interface,
                        subnet: format!("{}/{}", network, mask.count_ones()),
                        gateway_ip,
                        local_ip: Some(ip),
                    });
                }
            }
        }
    }

    Ok(NetworkInfo {
        interface,
        subnet: String::new(),
        gateway_ip,
        local_ip: None,
    })
}

#[cfg(target_os = "windows")]
fn get_windows_network_info() -> Result<NetworkInfo> {
    let output = hidden_command("ipconfig").output()?;
    let output_str = String::from_utf8_lossy(&output.stdout);
    let virtual_patterns = ["vEthernet", "WSL", "Hyper-V", "VirtualBox", "VMware", "Docker"];

    let mut best: Option<NetworkInfo> = None;
    let mut current_name = String::new();
    let mut current_ip: Option<Ipv4Addr> = None;
    let mut current_mask: Option<Ipv4Addr> = None;

    let mut finish = |name: &str, ip: Option<Ipv4Addr>, mask: Option<Ipv4Addr>| {
        if best.is_some() || virtual_patterns.iter().any(|p| name.contains(p)) {
            return;
        }
        if let (Some(ip), Some(mask)) = (ip, mask) {
            let network = Ipv4Addr::from(u32::from(ip) & u32::from(mask));
            best = Some(NetworkInfo {
                interface: name.to_string(),
                subnet: format!("{}/{}", network, u32::from(mask).count_ones()),
                gateway_ip: None,
                local_ip: Some(ip),
            });
        }
    };

    for line in output_str.lines() {
        let trimmed = line.trim();
        if line.starts_with("Ethernet adapter") || line.starts_with("Wireless LAN adapter") {
            finish(&current_name, current_ip.take(), current_mask.take());
            current_name = line.trim_end_matches(':').to_string();
        }
        let value = trimmed
            .split(':')
            .nth(1)
            .map(|v| v.trim().trim_start_matches(". ").to_string());
        if trimmed.starts_with("IPv4 Address") || trimmed.starts_with("IP Address") {
            current_ip = value
                .and_then(|v| v.trim_end_matches("(Preferred)").parse().ok())
                .filter(|ip: &Ipv4Addr| !ip.is_loopback() && !ip.is_link_local());
        } else if trimmed.starts_with("Subnet Mask") {
            current_mask = value.and_then(|v| v.parse().ok());
        }
    }
    finish(&current_name, current_ip, current_mask);

    best.ok_or_else(|| Error::Configuration("no local network".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ranges() {
        assert!(SubnetBase::for_private_ip(Ipv4Addr::new(192, 168, 1, 20)).is_ok());
        assert!(SubnetBase::for_private_ip(Ipv4Addr::new(10, 4, 0, 9)).is_ok());
        assert!(SubnetBase::for_private_ip(Ipv4Addr::new(172, 20, 3, 1)).is_ok());
        assert!(matches!(
            SubnetBase::for_private_ip(Ipv4Addr::new(172, 32, 0, 1)),
            Err(Error::Configuration(_))
        ));
        assert!(SubnetBase::for_private_ip(Ipv4Addr::new(8, 8, 8, 8)).is_err());
    }

    #[test]
    fn test_hosts_cover_1_to_254() {
        let base = SubnetBase::new(192, 168, 1);
        let hosts: Vec<Ipv4Addr> = base.hosts().collect();
        assert_eq!(hosts.len(), SubnetBase::HOST_COUNT);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(192, 168, 1, 254));
        assert!(base.contains(Ipv4Addr::new(192, 168, 1, 77)));
        assert!(!base.contains(Ipv4Addr::new(192, 168, 2, 77)));
    }

    #[test]
    fn test_parse_subnet_base() {
        assert_eq!("192.168.1".parse::<SubnetBase>().unwrap(), SubnetBase::new(192, 168, 1));
        assert_eq!("10.0.5.0/24".parse::<SubnetBase>().unwrap(), SubnetBase::new(10, 0, 5));
        assert!("192.168".parse::<SubnetBase>().is_err());
        assert!("300.1.1".parse::<SubnetBase>().is_err());
        assert_eq!(SubnetBase::new(10, 0, 5).to_string(), "10.0.5");
    }

    #[test]
    fn test_parse_ip_addr_output() {
        let output = "2: wlan0: <BROADCAST,MULTICAST,UP> mtu 1500\n    inet 192.168.1.42/24 brd 192.168.1.255 scope global wlan0\n";
        let info = parse_ip_addr_output(output, "wlan0".to_string(), Some("192.168.1.1".to_string()));
        assert_eq!(info.local_ip, Some(Ipv4Addr::new(192, 168, 1, 42)));
        assert_eq!(info.subnet, "192.168.1.0/24");

        let empty = parse_ip_addr_output("", "eth0".to_string(), None);
        assert!(empty.local_ip.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_network_detection_on_single_threaded_runtime() {
        let ticker = tokio::spawn(async {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
        });

        match get_full_network_info().await {
            Ok(info) => {
                if info.local_ip.is_some() {
                    assert!(!info.subnet.is_empty());
                }
            }
            Err(e) => assert!(matches!(e, Error::Configuration(_) | Error::Io(_))),
        }
        ticker.await.unwrap();
    }
}
