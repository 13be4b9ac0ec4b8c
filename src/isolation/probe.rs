//! Layer 4: existing listeners on the instance's bind address.
//!
//! # Design Decisions
//! - Capability chosen at runtime by [`detect_listener_probe`]
//! - Findings are advisory; listener ownership is not correlated

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

/// TCP state code for LISTEN in `/proc/net/tcp*`.
const TCP_LISTEN: &str = "0A";

#[async_trait]
pub trait ListenerProbe: Send + Sync {
    /// Ports with an active TCP listener bound exactly to `ip`.
    async fn listening_ports(&self, ip: IpAddr) -> io::Result<Vec<u16>>;
}

/// Reads the kernel TCP tables under `/proc/net`.
#[derive(Debug, Clone)]
pub struct ProcNetListenerProbe {
    root: PathBuf,
}

impl ProcNetListenerProbe {
    pub fn new() -> Self {
        Self::with_root("/proc/net")
    }

    /// Use an alternate directory holding `tcp` and `tcp6`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcNetListenerProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListenerProbe for ProcNetListenerProbe {
    async fn listening_ports(&self, ip: IpAddr) -> io::Result<Vec<u16>> {
        let table = match ip {
            IpAddr::V4(_) => "tcp",
            IpAddr::V6(_) => "tcp6",
        };

        let content = match tokio::fs::read_to_string(self.root.join(table)).await {
            Ok(content) => content,
            // tcp6 is absent when IPv6 is disabled
            Err(e) if e.kind() == io::ErrorKind::NotFound && table == "tcp6" => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e),
        };

        let mut ports: Vec<u16> = parse_listeners(&content)
            .into_iter()
            .filter(|(addr, _)| *addr == ip)
            .map(|(_, port)| port)
            .collect();
        ports.sort_unstable();
        ports.dedup();
        Ok(ports)
    }
}

/// Probe for platforms without a listener table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListenerProbe;

#[async_trait]
impl ListenerProbe for NoopListenerProbe {
    async fn listening_ports(&self, _ip: IpAddr) -> io::Result<Vec<u16>> {
        Ok(Vec::new())
    }
}

/// Pick the real probe when `/proc/net/tcp` is readable, else the no-op.
pub fn detect_listener_probe() -> Arc<dyn ListenerProbe> {
    if Path::new("/proc/net/tcp").exists() {
        tracing::debug!("Using /proc/net listener probe");
        Arc::new(ProcNetListenerProbe::new())
    } else {
        tracing::debug!("No listener table available, process binding check disabled");
        Arc::new(NoopListenerProbe)
    }
}

/// `(address, port)` for every LISTEN row; malformed rows are skipped.
fn parse_listeners(content: &str) -> Vec<(IpAddr, u16)> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let local = fields.nth(1)?;
            let state = fields.nth(1)?;
            if state != TCP_LISTEN {
                return None;
            }

            let (addr_hex, port_hex) = local.split_once(':')?;
            let port = u16::from_str_radix(port_hex, 16).ok()?;
            Some((decode_address(addr_hex)?, port))
        })
        .collect()
}

/// Decode the kernel's hex address: 32-bit words in host byte order.
fn decode_address(hex: &str) -> Option<IpAddr> {
    let word = |chunk: &str| u32::from_str_radix(chunk, 16).ok().map(u32::to_ne_bytes);

    match hex.len() {
        8 => Some(IpAddr::V4(Ipv4Addr::from(word(hex)?))),
        32 => {
            let mut octets = [0u8; 16];
            for (i, out) in octets.chunks_exact_mut(4).enumerate() {
                out.copy_from_slice(&word(hex.get(i * 8..i * 8 + 8)?)?);
            }
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

#[cfg(all(test, target_endian = "little"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0A01A8C0:235A 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1001 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1002 1 0000000000000000 100 0 0 10 0
   2: 0A01A8C0:0050 0B01A8C0:C350 01 00000000:00000000 00:00000000 00000000     0        0 1003 1 0000000000000000 100 0 0 10 0
   3: 0A01A8C0:235B 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1004 1 0000000000000000 100 0 0 10 0
";

    const TCP6: &str = "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000001000000:0035 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 2001 1 0000000000000000 100 0 0 10 0
";

    #[test]
    fn test_decode_ipv4_little_endian() {
        assert_eq!(
            decode_address("0100007F"),
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
        assert_eq!(
            decode_address("0A01A8C0"),
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)))
        );
    }

    #[test]
    fn test_parse_skips_non_listen_rows() {
        let rows = parse_listeners(TCP);
        assert_eq!(rows.len(), 3);
        assert!(!rows.iter().any(|(_, port)| *port == 80));
    }

    #[tokio::test]
    async fn test_probe_filters_by_address() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tcp"), TCP).unwrap();
        std::fs::write(dir.path().join("tcp6"), TCP6).unwrap();

        let probe = ProcNetListenerProbe::with_root(dir.path());
        let ports = probe
            .listening_ports("192.168.1.10".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(ports, vec![9050, 9051]);

        let ports = probe.listening_ports("::1".parse().unwrap()).await.unwrap();
        assert_eq!(ports, vec![53]);
    }

    #[tokio::test]
    async fn test_missing_tcp6_is_empty() {
        let dir = TempDir::new().unwrap();
        let probe = ProcNetListenerProbe::with_root(dir.path());

        let ports = probe.listening_ports("fd00::1".parse().unwrap()).await.unwrap();
        assert!(ports.is_empty());
    }

    #[tokio::test]
    async fn test_noop_probe_reports_nothing() {
        let ports = NoopListenerProbe
            .listening_ports("10.0.0.1".parse().unwrap())
            .await
            .unwrap();
        assert!(ports.is_empty());
    }
}
