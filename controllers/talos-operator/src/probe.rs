//! TCP connectivity test for Machine endpoints.

use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

/// Why a connectivity test failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The connection was refused or the address did not resolve
    #[error("dial tcp {endpoint}: {source}")]
    Connect {
        /// `address:port` that was dialed
        endpoint: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// No answer within the timeout
    #[error("dial tcp {endpoint}: i/o timeout after {timeout:?}")]
    Timeout {
        /// `address:port` that was dialed
        endpoint: String,
        /// Bound that elapsed
        timeout: Duration,
    },
}

/// Opens a TCP connection to `endpoint` and closes it again.
pub async fn tcp_connect(endpoint: &str, timeout: Duration) -> Result<(), ProbeError> {
    match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(())
        }
        Ok(Err(source)) => Err(ProbeError::Connect {
            endpoint: endpoint.to_string(),
            source,
        }),
        Err(_elapsed) => Err(ProbeError::Timeout {
            endpoint: endpoint.to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let result = tcp_connect(&endpoint, Duration::from_secs(1)).await;
        assert!(result.is_ok(), "Probe against a listening socket should succeed: {result:?}");
    }

    #[tokio::test]
    async fn test_closed_port_fails() {
        // Setup: bind then release a port so nothing listens on it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = tcp_connect(&endpoint, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains(&endpoint), "Error should name the endpoint: {err}");
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails() {
        let result = tcp_connect("not-a-host.invalid:6443", Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
