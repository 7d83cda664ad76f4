/// Installer downloads over HTTPS.
use crate::error::DownloadError;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Fetches a URL into a local file. Swapped for a counting fake in tests.
pub trait Downloader: Send + Sync {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

/// Blocking `reqwest` client: HTTPS only, at most one redirect (GitHub
/// release assets answer with a single hop to their CDN).
pub struct HttpDownloader {
    connect_timeout: Duration,
    timeout: Duration,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
        }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let client = reqwest::blocking::Client::builder()
            .https_only(true)
            .redirect(reqwest::redirect::Policy::limited(1))
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .user_agent(format!("mountify/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;

        let request_error = |e: reqwest::Error| DownloadError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };
        let mut resp = client
            .get(url)
            .send()
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        let write_error = |source: std::io::Error| DownloadError::Write {
            path: dest.display().to_string(),
            source,
        };
        let mut file = std::fs::File::create(dest).map_err(write_error)?;
        let written = resp.copy_to(&mut file).map_err(|e| {
            let _ = std::fs::remove_file(dest);
            request_error(e)
        })?;
        file.flush().map_err(write_error)?;

        if written == 0 {
            let _ = std::fs::remove_file(dest);
            return Err(DownloadError::Empty(url.to_string()));
        }

        info!("Downloaded {} ({} bytes) to {}", url, written, dest.display());
        Ok(written)
    }
}
