//! ONVIF WS-Discovery: one multicast Probe, then collect ProbeMatches until
//! the listen window closes.

use crate::net;
use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Standard WS-Discovery multicast group and port
pub const MULTICAST_GROUP: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702);

/// Default listen window after the probe is sent
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

static XADDR_IP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"http://(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").expect("static regex")
});

const NAME_SCOPE: &str = "onvif://www.onvif.org/name/";

/// A device that answered the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResponse {
    pub ip: Ipv4Addr,
    /// Friendly name from the `onvif://www.onvif.org/name/...` scope
    pub name: Option<String>,
    pub raw: String,
}

/// Sends WS-Discovery probes for NetworkVideoTransmitter devices.
#[derive(Debug, Clone)]
pub struct WsDiscoveryClient {
    target: SocketAddr,
    timeout: Duration,
}

impl Default for WsDiscoveryClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl WsDiscoveryClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            target: SocketAddr::V4(MULTICAST_GROUP),
            timeout,
        }
    }

    /// Probe a specific address instead of the multicast group.
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    /// Send one probe and stream every response received before the listen
    /// window closes or `cancel` fires.
    ///
    /// If the socket cannot be created or the probe cannot be sent, the
    /// stream ends immediately without items. Undecodable datagrams are
    /// skipped.
    pub fn discover(&self, cancel: CancellationToken) -> BoxStream<'static, DiscoveryResponse> {
        let target = self.target;
        let deadline = Instant::now() + self.timeout;

        stream::once(async move {
            match send_probe(target).await {
                Ok(socket) => Some(socket),
                Err(e) => {
                    tracing::warn!("WS-Discovery probe to {} failed: {}", target, e);
                    None
                }
            }
        })
        .filter_map(futures::future::ready)
        .flat_map(move |socket| receive_responses(socket, deadline, cancel.clone()))
        .boxed()
    }
}

async fn send_probe(target: SocketAddr) -> crate::Result<UdpSocket> {
    let socket = net::multicast_socket(4)?;
    let message = probe_message(&uuid::Uuid::new_v4().to_string());
    socket.send_to(message.as_bytes(), target).await?;
    tracing::debug!("WS-Discovery probe sent to {}", target);
    Ok(socket)
}

fn receive_responses(
    socket: UdpSocket,
    deadline: Instant,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = DiscoveryResponse> {
    stream::unfold((socket, vec![0u8; 65536]), move |(socket, mut buf)| {
        let cancel = cancel.clone();
        async move {
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    r = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)) => r,
                };

                match received {
                    Err(_) => return None,
                    Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
                    Ok(Err(e)) => {
                        tracing::debug!("WS-Discovery receive failed: {}", e);
                        return None;
                    }
                    Ok(Ok((n, sender))) => {
                        if let Some(response) = parse_response(&buf[..n], sender) {
                            return Some((response, (socket, buf)));
                        }
                    }
                }
            }
        }
    })
}

/// SOAP 1.2 Probe envelope scoped to NetworkVideoTransmitter devices.
pub fn probe_message(message_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"
            xmlns:w="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <e:Header>
    <w:MessageID>urn:uuid:{}</w:MessageID>
    <w:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</w:To>
    <w:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</w:Action>
  </e:Header>
  <e:Body>
    <d:Probe>
      <d:Types>dn:NetworkVideoTransmitter</d:Types>
    </d:Probe>
  </e:Body>
</e:Envelope>"#,
        message_id
    )
}

/// Decode one datagram. The camera address comes from the first
/// `http://a.b.c.d` XAddr in the body, falling back to the sender address.
pub fn parse_response(datagram: &[u8], sender: SocketAddr) -> Option<DiscoveryResponse> {
    let text = std::str::from_utf8(datagram).ok()?;
    if !text.contains("Envelope") {
        return None;
    }

    let from_body = XADDR_IP
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<Ipv4Addr>().ok())
        .next();

    let ip = match (from_body, sender) {
        (Some(ip), _) => ip,
        (None, SocketAddr::V4(v4)) => *v4.ip(),
        (None, SocketAddr::V6(_)) => return None,
    };

    Some(DiscoveryResponse {
        ip,
        name: scope_name(text),
        raw: text.to_string(),
    })
}

fn scope_name(xml: &str) -> Option<String> {
    let start = xml.find(NAME_SCOPE)? + NAME_SCOPE.len();
    let encoded: String = xml[start..]
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '<')
        .collect();
    let name = percent_decode(&encoded);
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let (hi, lo) = (bytes[i + 1], bytes[i + 2]);
            if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() {
                let digit = |b: u8| (b as char).to_digit(16).unwrap_or(0) as u8;
                out.push(digit(hi) << 4 | digit(lo));
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
