//! Socket helpers shared by discovery, port scanning and RTSP probing.
//!
//! Every wait in here is bounded by an explicit timeout so no caller can
//! block on an unresponsive device.

use crate::error::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

/// Upper bound on how much of a text response we buffer.
const MAX_RESPONSE_BYTES: usize = 16 * 1024;

/// Open a TCP connection, giving up after `limit`.
pub async fn connect(addr: SocketAddr, limit: Duration) -> Result<TcpStream> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::Transport(format!("connect to {} failed: {}", addr, e))),
        Err(_) => Err(Error::Timeout),
    }
}

/// Check whether anything accepts TCP connections on `addr`.
pub async fn is_port_open(addr: SocketAddr, limit: Duration) -> bool {
    connect(addr, limit).await.is_ok()
}

/// Write the whole payload, giving up after `limit`.
pub async fn send(stream: &mut TcpStream, payload: &[u8], limit: Duration) -> Result<()> {
    match timeout(limit, stream.write_all(payload)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Transport(format!("send failed: {}", e))),
        Err(_) => Err(Error::Timeout),
    }
}

/// Read a text response head (status line and headers).
///
/// Stops at the blank line ending the headers, at EOF, or once
/// `MAX_RESPONSE_BYTES` have arrived. Bodies are not needed by any caller.
pub async fn read_head(stream: &mut TcpStream, limit: Duration) -> Result<String> {
    let read = async {
        let mut buf = Vec::with_capacity(2048);
        let mut chunk = [0u8; 2048];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_RESPONSE_BYTES {
                break;
            }
        }
        Ok::<_, std::io::Error>(buf)
    };

    match timeout(limit, read).await {
        Ok(Ok(buf)) if buf.is_empty() => {
            Err(Error::Transport("connection closed without a response".to_string()))
        }
        Ok(Ok(buf)) => Ok(String::from_utf8_lossy(&buf).into_owned()),
        Ok(Err(e)) => Err(Error::Transport(format!("receive failed: {}", e))),
        Err(_) => Err(Error::Timeout),
    }
}

/// Connect, send one request and read the response head.
///
/// One connection per exchange: several camera firmwares close the socket
/// after answering with an auth challenge.
pub async fn exchange(addr: SocketAddr, request: &str, limit: Duration) -> Result<String> {
    let mut stream = connect(addr, limit).await?;
    send(&mut stream, request.as_bytes(), limit).await?;
    read_head(&mut stream, limit).await
}

/// UDP socket for sending to a multicast group and collecting unicast replies.
///
/// Bound to an ephemeral port with address reuse so other discovery tools on
/// the same host are not locked out.
pub fn multicast_socket(ttl: u32) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_multicast_ttl_v4(ttl)?;
    socket.set_nonblocking(true)?;
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&bind_addr.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_exchange_reads_until_blank_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").await.unwrap();
            // keep the socket open; the reader must stop at the blank line
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let head = exchange(addr, "OPTIONS * RTSP/1.0\r\n\r\n", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(head.starts_with("RTSP/1.0 200 OK"));
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(addr, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!is_port_open(addr, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = exchange(addr, "DESCRIBE x RTSP/1.0\r\n\r\n", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }
}
