//! Bounded-concurrency TCP connect sweep over a /24.

use super::network::SubnetBase;
use crate::net;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONCURRENCY: usize = 30;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome for one address in the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortProbe {
    pub ip: Ipv4Addr,
    pub open: bool,
    /// Hosts finished so far (skipped hosts included), 1..=254
    pub completed: usize,
}

impl PortProbe {
    /// Fraction of the subnet finished.
    pub fn fraction(&self) -> f64 {
        self.completed as f64 / SubnetBase::HOST_COUNT as f64
    }
}

/// Connects to one port on every host in a subnet.
#[derive(Debug, Clone)]
pub struct PortScanner {
    port: u16,
    concurrency: usize,
    timeout: Duration,
}

impl PortScanner {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sweep `base.1` through `base.254`.
    ///
    /// Hosts in `skip` are reported closed without a connection attempt so
    /// the `completed` counter still reaches 254. At most `concurrency`
    /// connects are in flight. Once `cancel` fires no new connect starts and
    /// the stream ends after in-flight attempts resolve.
    pub fn scan(
        &self,
        base: SubnetBase,
        skip: HashSet<Ipv4Addr>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, PortProbe> {
        let port = self.port;
        let limit = self.timeout;
        let completed = Arc::new(AtomicUsize::new(0));
        let stop = cancel.clone();

        stream::iter(base.hosts())
            .take_while(move |_| futures::future::ready(!stop.is_cancelled()))
            .map(move |ip| {
                let skipped = skip.contains(&ip);
                let completed = Arc::clone(&completed);
                let cancel = cancel.clone();
                async move {
                    let open = if skipped {
                        false
                    } else {
                        let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));
                        tokio::select! {
                            _ = cancel.cancelled() => false,
                            open = net::is_port_open(addr, limit) => open,
                        }
                    };
                    PortProbe {
                        ip,
                        open,
                        completed: completed.fetch_add(1, Ordering::SeqCst) + 1,
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .boxed()
    }

    /// Run a full sweep and return the open hosts in address order.
    pub async fn open_hosts(&self, base: SubnetBase, cancel: CancellationToken) -> Vec<Ipv4Addr> {
        let mut open: Vec<Ipv4Addr> = self
            .scan(base, HashSet::new(), cancel)
            .filter_map(|p| futures::future::ready(p.open.then_some(p.ip)))
            .collect()
            .await;
        open.sort();
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener_pair() -> (TcpListener, TcpListener, u16) {
        // Same port on two loopback aliases; retry until the second bind lands.
        for _ in 0..20 {
            let first = TcpListener::bind("127.0.0.10:0").await.unwrap();
            let port = first.local_addr().unwrap().port();
            if let Ok(second) = TcpListener::bind(("127.0.0.20", port)).await {
                return (first, second, port);
            }
        }
        panic!("could not bind loopback listeners");
    }

    fn loopback() -> SubnetBase {
        SubnetBase::new(127, 0, 0)
    }

    #[tokio::test]
    async fn test_scan_finds_open_hosts_and_counts_all() {
        let (_a, _b, port) = listener_pair().await;
        let scanner = PortScanner::new(port)
            .with_concurrency(64)
            .with_timeout(Duration::from_millis(300));

        let results: Vec<PortProbe> = scanner
            .scan(loopback(), HashSet::new(), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(results.len(), 254);
        let max = results.iter().map(|p| p.completed).max().unwrap();
        assert_eq!(max, 254);

        let mut open: Vec<Ipv4Addr> = results.iter().filter(|p| p.open).map(|p| p.ip).collect();
        open.sort();
        assert_eq!(open, vec![Ipv4Addr::new(127, 0, 0, 10), Ipv4Addr::new(127, 0, 0, 20)]);
    }

    #[tokio::test]
    async fn test_skipped_hosts_are_not_probed_but_counted() {
        let (_a, _b, port) = listener_pair().await;
        let scanner = PortScanner::new(port).with_timeout(Duration::from_millis(300));
        let skip: HashSet<Ipv4Addr> = [Ipv4Addr::new(127, 0, 0, 10)].into_iter().collect();

        let results: Vec<PortProbe> = scanner
            .scan(loopback(), skip, CancellationToken::new())
            .collect()
            .await;

        assert_eq!(results.len(), 254);
        let open: Vec<Ipv4Addr> = results.iter().filter(|p| p.open).map(|p| p.ip).collect();
        assert_eq!(open, vec![Ipv4Addr::new(127, 0, 0, 20)]);
    }

    #[tokio::test]
    async fn test_cancelled_scan_ends_early() {
        let scanner = PortScanner::new(9).with_timeout(Duration::from_millis(300));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results: Vec<PortProbe> = scanner.scan(loopback(), HashSet::new(), cancel).collect().await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_sweep_ends_stream_within_one_timeout() {
        let timeout = Duration::from_millis(300);
        let scanner = PortScanner::new(554).with_concurrency(30).with_timeout(timeout);
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout + timeout / 2).await;
            stop.cancel();
        });

        let started = std::time::Instant::now();
        let results: Vec<PortProbe> = scanner
            .scan(SubnetBase::new(10, 255, 255), HashSet::new(), cancel)
            .collect()
            .await;

        assert!(started.elapsed() <= timeout * 3);
        assert!(results.iter().all(|p| !p.open));
        assert!(results.len() <= SubnetBase::HOST_COUNT);
    }

    #[test]
    fn test_fraction() {
        let probe = PortProbe {
            ip: Ipv4Addr::new(10, 0, 0, 1),
            open: false,
            completed: 127,
        };
        assert!((probe.fraction() - 0.5).abs() < 1e-9);
    }
}
