//! Byte stream to the server: TCP or a Unix domain socket

use crate::config::Address;
use crate::error::WireResult;
use bytes::BytesMut;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

/// Socket a connection runs over
#[derive(Debug)]
pub enum Transport {
    /// TCP, with Nagle disabled
    Tcp(TcpStream),
    /// Unix domain socket
    Unix(UnixStream),
}

impl Transport {
    /// Open a socket to `address`
    pub async fn connect(address: &Address) -> WireResult<Self> {
        let transport = match address {
            Address::Tcp { host, port } => Self::connect_tcp(host, *port).await?,
            Address::Unix(path) => Self::connect_unix(path).await?,
        };
        tracing::trace!(%address, "socket connected");
        Ok(transport)
    }

    /// TCP to `host:port`
    pub async fn connect_tcp(host: &str, port: u16) -> WireResult<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self::Tcp(stream))
    }

    /// Unix socket at the full socket file path
    pub async fn connect_unix(path: &Path) -> WireResult<Self> {
        Ok(Self::Unix(UnixStream::connect(path).await?))
    }

    /// Write all of `buf` and flush
    pub async fn send(&mut self, buf: &[u8]) -> WireResult<()> {
        match self {
            Self::Tcp(s) => {
                s.write_all(buf).await?;
                s.flush().await?;
            }
            Self::Unix(s) => {
                s.write_all(buf).await?;
                s.flush().await?;
            }
        }
        Ok(())
    }

    /// Append whatever is readable to `buf`; 0 means the peer hung up
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> WireResult<usize> {
        let n = match self {
            Self::Tcp(s) => s.read_buf(buf).await?,
            Self::Unix(s) => s.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Shut down the write half
    pub async fn shutdown(&mut self) -> WireResult<()> {
        match self {
            Self::Tcp(s) => s.shutdown().await?,
            Self::Unix(s) => s.shutdown().await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_tcp_connect_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Transport::connect_tcp("127.0.0.1", port).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unix_connect_failure() {
        let address = Address::Unix(PathBuf::from("/nonexistent/dir/.s.PGSQL.5432"));
        assert!(Transport::connect(&address).await.is_err());
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut transport = Transport::connect(&Address::Tcp {
            host: "127.0.0.1".into(),
            port,
        })
        .await
        .unwrap();
        transport.send(b"ping").await.unwrap();

        let mut buf = BytesMut::new();
        while buf.len() < 4 {
            assert!(transport.read_buf(&mut buf).await.unwrap() > 0);
        }
        assert_eq!(&buf[..], b"ping");

        server.await.unwrap();
        transport.shutdown().await.unwrap();
    }
}
