use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use hawker_core::models::listings::ConnectionDescriptor;
use reqwest::{Client, Proxy};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use urlencoding::encode;

/// Result of one liveness check. Probes never fail: anything that keeps
/// the endpoint from answering becomes an offline outcome with a reason.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub online: bool,
    pub latency_ms: Option<u64>,
    /// Public address the check endpoint saw the request arrive from.
    /// Only socks5 probes can know this.
    pub exit_addr: Option<String>,
    pub reason: Option<String>,
}

impl ProbeOutcome {
    fn online(latency_ms: u64, exit_addr: Option<String>) -> Self {
        Self {
            online: true,
            latency_ms: Some(latency_ms),
            exit_addr,
            reason: None,
        }
    }

    fn offline(reason: impl Into<String>) -> Self {
        Self {
            online: false,
            latency_ms: None,
            exit_addr: None,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prober {
    check_url: String,
    timeout: Duration,
    concurrency: usize,
    pptp_port: u16,
}

impl Prober {
    pub fn new(
        check_url: impl Into<String>,
        timeout: Duration,
        concurrency: usize,
        pptp_port: u16,
    ) -> Self {
        Self {
            check_url: check_url.into(),
            timeout,
            concurrency: concurrency.max(1),
            pptp_port,
        }
    }

    /// A socks5 endpoint counts as live when one HTTP round trip to the
    /// check endpoint completes through it within the timeout.
    pub async fn check_socks5(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> ProbeOutcome {
        let url = format!(
            "socks5://{}:{}@{}:{}",
            encode(username),
            encode(password),
            host,
            port
        );
        let proxy = match Proxy::all(&url) {
            Ok(proxy) => proxy,
            Err(e) => return ProbeOutcome::offline(e.to_string()),
        };
        let client = match Client::builder().proxy(proxy).timeout(self.timeout).build() {
            Ok(client) => client,
            Err(e) => return ProbeOutcome::offline(e.to_string()),
        };

        let start = Instant::now();
        match client.get(&self.check_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let latency = start.elapsed().as_millis() as u64;
                let exit = resp
                    .text()
                    .await
                    .ok()
                    .map(|body| body.trim().to_string())
                    .filter(|s| !s.is_empty());
                ProbeOutcome::online(latency, exit)
            }
            Ok(resp) => ProbeOutcome::offline(format!("check endpoint returned {}", resp.status())),
            Err(e) if e.is_timeout() => ProbeOutcome::offline("timed out"),
            Err(e) => ProbeOutcome::offline(e.to_string()),
        }
    }

    /// A PPTP endpoint counts as live when its control port accepts a TCP
    /// connection within the timeout. Deliberately weak: an open port does
    /// not prove the tunnel negotiates. Kept that way because probe
    /// latency and false-positive rate feed the refund-window timing
    /// downstream.
    pub async fn check_pptp(&self, host: &str) -> ProbeOutcome {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, TcpStream::connect((host, self.pptp_port))).await {
            Ok(Ok(_stream)) => ProbeOutcome::online(start.elapsed().as_millis() as u64, None),
            Ok(Err(e)) => ProbeOutcome::offline(e.to_string()),
            Err(_) => ProbeOutcome::offline("timed out"),
        }
    }

    pub async fn check(&self, conn: &ConnectionDescriptor) -> ProbeOutcome {
        match conn {
            ConnectionDescriptor::Socks5 {
                host,
                port,
                username,
                password,
            } => self.check_socks5(host, *port, username, password).await,
            ConnectionDescriptor::Pptp { host, .. } => self.check_pptp(host).await,
        }
    }

    /// Fans out checks keyed by caller-chosen ids, at most `concurrency`
    /// in flight at a time. One slow target never holds up the rest;
    /// results arrive in completion order.
    pub async fn batch(
        &self,
        targets: Vec<(i32, ConnectionDescriptor)>,
    ) -> Vec<(i32, ProbeOutcome)> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        stream::iter(targets)
            .map(|(id, conn)| {
                let sem = Arc::clone(&semaphore);
                let prober = self.clone();
                async move {
                    let _permit = sem.acquire().await.expect("probe semaphore closed");
                    (id, prober.check(&conn).await)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_pptp_online_when_port_accepts() {
        let (_listener, port) = listener().await;
        let prober = Prober::new("http://unused.invalid", Duration::from_secs(2), 4, port);

        let outcome = prober.check_pptp("127.0.0.1").await;
        assert!(outcome.online);
        assert!(outcome.latency_ms.is_some());
        assert!(outcome.reason.is_none());
    }

    #[tokio::test]
    async fn test_pptp_offline_when_connection_refused() {
        let (listener, port) = listener().await;
        drop(listener);
        let prober = Prober::new("http://unused.invalid", Duration::from_secs(2), 4, port);

        let outcome = prober.check_pptp("127.0.0.1").await;
        assert!(!outcome.online);
        assert!(outcome.reason.is_some());
    }

    #[tokio::test]
    async fn test_socks5_offline_when_nothing_listens() {
        let (listener, port) = listener().await;
        drop(listener);
        let prober = Prober::new("http://unused.invalid", Duration::from_secs(2), 4, 1723);

        let outcome = prober.check_socks5("127.0.0.1", port, "u", "p").await;
        assert!(!outcome.online);
    }

    #[tokio::test]
    async fn test_batch_keeps_ids() {
        let (_listener, open_port) = listener().await;
        let (closed, closed_port) = listener().await;
        drop(closed);
        let prober = Prober::new("http://unused.invalid", Duration::from_secs(2), 2, open_port);

        // both targets are pptp so the pptp_port of the prober applies to
        // the open one; the closed one gets its own prober
        let open = ConnectionDescriptor::Pptp {
            host: "127.0.0.1".into(),
            username: "u".into(),
            password: "p".into(),
        };
        let results = prober.batch(vec![(1, open.clone()), (2, open)]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, o)| o.online));

        let prober = Prober::new(
            "http://unused.invalid",
            Duration::from_secs(2),
            2,
            closed_port,
        );
        let dead = ConnectionDescriptor::Pptp {
            host: "127.0.0.1".into(),
            username: "u".into(),
            password: "p".into(),
        };
        let results = prober.batch(vec![(7, dead)]).await;
        assert_eq!(results[0].0, 7);
        assert!(!results[0].1.online);
    }
}
