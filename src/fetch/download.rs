use futures_util::StreamExt;
use reqwest::Client;
use std::{future::Future, path::Path, time::Duration};
use tokio::{fs, time::sleep};
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Settings;
use crate::error::{Result, ScrapeError};
use crate::process::grid::is_shift_jis;

/// Retrieves the body of a URL. Implemented over HTTP for real runs and by
/// in-memory doubles in tests.
pub trait Transport {
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// `reqwest` transport with exponential backoff on transient failures.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    max_retries: u32,
    initial_backoff: Duration,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ScrapeError::FetchFailure {
                url: settings.base_url.clone(),
                message: format!("building HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
            initial_backoff: settings.initial_backoff,
        })
    }

    /// One attempt. The flag says whether the failure is worth retrying.
    async fn get_once(&self, url: &Url) -> std::result::Result<Vec<u8>, (String, bool)> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| (format!("GET failed: {e}"), true))?;

        let status = resp.status();
        if !status.is_success() {
            return Err((format!("HTTP error: {status}"), status.is_server_error()));
        }

        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| (format!("reading body: {e}"), true))?;
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Longest pause between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Pause before retry number `attempt` (1-based): `initial` doubled per
/// earlier retry, capped at [`MAX_BACKOFF`].
pub fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    initial.saturating_mul(factor).min(MAX_BACKOFF)
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let failure = |message: String| ScrapeError::FetchFailure {
            url: url.to_string(),
            message,
        };
        let parsed = Url::parse(url).map_err(|e| failure(format!("invalid URL: {e}")))?;

        let mut attempts = 0;
        loop {
            match self.get_once(&parsed).await {
                Ok(body) => return Ok(body),
                Err((message, true)) if attempts < self.max_retries => {
                    attempts += 1;
                    let backoff = backoff_delay(self.initial_backoff, attempts);
                    warn!(%url, attempt = attempts, delay_ms = backoff.as_millis() as u64, error = %message, "Retrying");
                    sleep(backoff).await;
                }
                Err((message, _)) => {
                    error!(%url, attempts = attempts + 1, error = %message, "giving up");
                    return Err(failure(message));
                }
            }
        }
    }
}

/// What [`download_bulletin`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downloaded {
    /// Destination already existed; nothing was requested.
    Cached,
    /// Body of `bytes` length was fetched and stored.
    Fetched { bytes: usize },
}

/// Fetch `url` into `dest` unless `dest` already exists.
///
/// The body must be non-empty Shift_JIS; anything else is a fetch failure and
/// leaves nothing on disk.
pub async fn download_bulletin<T: Transport>(
    transport: &T,
    url: &str,
    dest: impl AsRef<Path>,
) -> Result<Downloaded> {
    let dest = dest.as_ref();
    if fs::try_exists(dest)
        .await
        .map_err(|e| ScrapeError::io(dest, e))?
    {
        debug!(path = %dest.display(), "already downloaded");
        return Ok(Downloaded::Cached);
    }

    let body = transport.get(url).await?;
    if body.is_empty() {
        return Err(ScrapeError::FetchFailure {
            url: url.to_string(),
            message: "empty body".into(),
        });
    }
    if !is_shift_jis(&body) {
        return Err(ScrapeError::FetchFailure {
            url: url.to_string(),
            message: "body is not Shift_JIS".into(),
        });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ScrapeError::io(parent, e))?;
    }
    let tmp = dest.with_extension("csv.tmp");
    fs::write(&tmp, &body)
        .await
        .map_err(|e| ScrapeError::io(&tmp, e))?;
    fs::rename(&tmp, dest)
        .await
        .map_err(|e| ScrapeError::io(dest, e))?;

    Ok(Downloaded::Fetched { bytes: body.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tempfile::tempdir;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    const OK_BODY: &str = "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\na,b\n";
    const UNAVAILABLE: &str =
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    const NOT_FOUND: &str =
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    /// Local server answering each connection with the next canned response.
    /// Returns a URL on it and the number of requests answered so far.
    async fn serve(responses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            for response in responses {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while let Ok(n) = sock.read(&mut buf[read..]).await {
                    read += n;
                    if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        (format!("http://{addr}/2024/3/2024-03-zensu.csv"), hits)
    }

    fn transport(max_retries: u32) -> HttpTransport {
        let settings = Settings::default()
            .with_max_retries(max_retries)
            .with_initial_backoff(Duration::from_millis(1));
        HttpTransport::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (url, hits) = serve(vec![UNAVAILABLE, OK_BODY]).await;
        let body = transport(2).get(&url).await.unwrap();
        assert_eq!(body, b"a,b\n");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, hits) = serve(vec![NOT_FOUND, OK_BODY, OK_BODY]).await;
        let err = transport(2).get(&url).await.unwrap_err();
        assert!(matches!(err, ScrapeError::FetchFailure { ref message, .. } if message.contains("404")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let (url, hits) = serve(vec![UNAVAILABLE, UNAVAILABLE, UNAVAILABLE, OK_BODY]).await;
        let err = transport(2).get(&url).await.unwrap_err();
        assert!(matches!(err, ScrapeError::FetchFailure { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let initial = Duration::from_millis(500);
        assert_eq!(backoff_delay(initial, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(initial, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(initial, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(initial, 33), MAX_BACKOFF);
        assert_eq!(backoff_delay(initial, u32::MAX), MAX_BACKOFF);
    }

    struct Fixed {
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl Transport for Fixed {
        async fn get(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    #[tokio::test]
    async fn test_download_then_cached() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("raw").join("2024-03-zensu.csv");
        let transport = Fixed {
            body: b"a,b\n1,2\n".to_vec(),
            calls: AtomicUsize::new(0),
        };

        let first = download_bulletin(&transport, "http://x/a.csv", &dest).await?;
        assert_eq!(first, Downloaded::Fetched { bytes: 8 });
        assert_eq!(std::fs::read(&dest)?, b"a,b\n1,2\n");

        let second = download_bulletin(&transport, "http://x/a.csv", &dest).await?;
        assert_eq!(second, Downloaded::Cached);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_undecodable_body_leaves_no_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("2024-03-zensu.csv");
        // 0x81 0x20 is not a valid Shift_JIS pair
        let transport = Fixed {
            body: vec![0x81, 0x20, 0x81, 0x20],
            calls: AtomicUsize::new(0),
        };

        let err = download_bulletin(&transport, "http://x/a.csv", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::FetchFailure { .. }));
        assert!(!dest.exists());
        assert!(!dest.with_extension("csv.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_body_is_failure() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("x.csv");
        let transport = Fixed {
            body: Vec::new(),
            calls: AtomicUsize::new(0),
        };
        assert!(download_bulletin(&transport, "http://x/a.csv", &dest)
            .await
            .is_err());
        assert!(!dest.exists());
    }
}
