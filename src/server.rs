//! Minimal HTTP surface: a trigger-check endpoint and a health endpoint.
//!
//! Two GET routes are all the service exposes, so requests are parsed by
//! hand over a plain TCP listener rather than pulling in an HTTP framework.

use crate::scheduler::{check_and_trigger, Clock, Triggerable};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

const CRON_RESPONSE: &str = "{\"success\":true,\"message\":\"Checked and triggered eligible cron jobs\"}";

/// A client gets this long to send the full request before the connection
/// is dropped.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handles the request handlers need.
pub struct ServerContext {
    pub clock: Arc<dyn Clock>,
    pub job: Arc<dyn Triggerable>,
    pub run_at: (u32, u32),
}

/// Binds the listening port and serves until the listener fails.
pub async fn run(port: u16, context: Arc<ServerContext>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    println!("[server] listening on port {}", port);
    serve(listener, context).await
}

async fn serve(listener: TcpListener, context: Arc<ServerContext>) -> Result<()> {
    loop {
        let (stream, _addr) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        let context = context.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, context).await {
                tracing::warn!("connection error: {:#}", e);
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, context: Arc<ServerContext>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request_line = tokio::time::timeout(READ_TIMEOUT, read_request(&mut reader))
        .await
        .context("Timed out reading request")??;

    let response = match request_path(&request_line).as_deref() {
        Some("/_/health") => http_response(200, "OK", ""),
        Some("/cron-runner") => {
            println!("[server] cron-runner called");
            check_and_trigger(
                context.clock.as_ref(),
                context.run_at,
                context.job.as_ref(),
            )
            .await;
            http_response(200, "OK", CRON_RESPONSE)
        }
        _ => http_response(404, "Not Found", ""),
    };

    write_half.write_all(response.as_bytes()).await?;
    write_half.shutdown().await?;
    Ok(())
}

/// Reads the request line and drains the headers; none of the headers
/// matter for these routes.
async fn read_request(reader: &mut BufReader<OwnedReadHalf>) -> Result<String> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    Ok(request_line)
}

/// Extracts the path from a `GET <path> HTTP/1.1` request line.
fn request_path(request_line: &str) -> Option<String> {
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    if method != "GET" {
        return None;
    }
    Some(path.to_string())
}

fn http_response(code: u16, reason: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        code,
        reason,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::AsyncReadExt;

    struct FixedClock(u32, u32);

    impl Clock for FixedClock {
        fn local_hour_minute(&self) -> (u32, u32) {
            (self.0, self.1)
        }
    }

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicU32,
    }

    #[async_trait]
    impl Triggerable for CountingJob {
        async fn trigger(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_request_path_parsing() {
        assert_eq!(
            request_path("GET /_/health HTTP/1.1\r\n").as_deref(),
            Some("/_/health")
        );
        assert_eq!(
            request_path("GET /cron-runner HTTP/1.1\r\n").as_deref(),
            Some("/cron-runner")
        );
        assert_eq!(request_path("POST /cron-runner HTTP/1.1\r\n"), None);
        assert_eq!(request_path("\r\n"), None);
    }

    #[test]
    fn test_http_response_shape() {
        let response = http_response(200, "OK", "{}");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("content-length: 2\r\n"));
        assert!(response.ends_with("\r\n\r\n{}"));
    }

    async fn start_test_server(
        clock: (u32, u32),
        run_at: (u32, u32),
    ) -> (std::net::SocketAddr, Arc<CountingJob>) {
        let job = Arc::new(CountingJob::default());
        let context = Arc::new(ServerContext {
            clock: Arc::new(FixedClock(clock.0, clock.1)),
            job: job.clone(),
            run_at,
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = serve(listener, context).await;
        });
        (addr, job)
    }

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nhost: test\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, _job) = start_test_server((12, 0), (3, 0)).await;
        let response = get(addr, "/_/health").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (addr, _job) = start_test_server((12, 0), (3, 0)).await;
        let response = get(addr, "/nope").await;
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_cron_runner_outside_window_does_not_trigger() {
        let (addr, job) = start_test_server((12, 0), (3, 0)).await;
        let response = get(addr, "/cron-runner").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("\"success\":true"));
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_client_connection_times_out() {
        let (addr, job) = start_test_server((3, 0), (3, 0)).await;

        // Send a request line but never finish the headers; the server must
        // give up instead of holding the connection open forever.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /cron-runner HTTP/1.1\r\n")
            .await
            .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "");
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cron_runner_at_run_time_triggers_job() {
        let (addr, job) = start_test_server((3, 0), (3, 0)).await;
        let response = get(addr, "/cron-runner").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }
}
