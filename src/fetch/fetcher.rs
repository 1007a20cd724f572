//! Downloading one source image to the local cache.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use super::FetchError;

/// Retrieves the resource at a URL into a local file.
///
/// Implementations must not leave a partial file at `dst` on failure.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, dst: &Path) -> Result<(), FetchError>;
}

/// Fetches `http(s)://` URLs with `reqwest` and copies `file://` URLs.
pub struct UrlFetcher {
    client: reqwest::blocking::Client,
}

impl UrlFetcher {
    /// Default per-attempt timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn fetch_http(&self, url: &str, temp: &mut fs::File) -> Result<(), FetchError> {
        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.copy_to(temp)?;
        Ok(())
    }
}

impl Fetcher for UrlFetcher {
    fn fetch(&self, url: &str, dst: &Path) -> Result<(), FetchError> {
        let dir = dst.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(".fetch-")
            .suffix(".part")
            .tempfile_in(dir)?;

        if let Some(local) = url.strip_prefix("file://") {
            let mut source = fs::File::open(local)?;
            std::io::copy(&mut source, temp.as_file_mut())?;
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url, temp.as_file_mut())?;
        } else {
            return Err(FetchError::UnsupportedUrl {
                url: url.to_string(),
            });
        }

        temp.as_file_mut().flush()?;
        temp.persist(dst).map_err(|e| FetchError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        fs::write(&src, b"payload").unwrap();
        let dst = dir.path().join("dst.bin");

        let fetcher = UrlFetcher::new(Duration::from_secs(5)).unwrap();
        fetcher
            .fetch(&format!("file://{}", src.display()), &dst)
            .unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_missing_file_url_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("dst.bin");

        let fetcher = UrlFetcher::new(Duration::from_secs(5)).unwrap();
        let result = fetcher.fetch("file:///definitely/not/here.png", &dst);
        assert!(matches!(result, Err(FetchError::Io(_))));
        assert!(!dst.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unsupported_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = UrlFetcher::new(Duration::from_secs(5)).unwrap();
        let result = fetcher.fetch("ftp://example.com/a.png", &dir.path().join("a.png"));
        assert!(matches!(result, Err(FetchError::UnsupportedUrl { .. })));
    }
}
