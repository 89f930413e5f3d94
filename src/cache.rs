//! Fixture cache: on-disk store of fetched resources for deterministic
//! offline reruns.
//!
//! Layout is one directory per host, one file per resource keyed by the
//! SHA-256 hex digest of the URL's path and query. A cached file holds the
//! status line, then the response headers, a blank line, and the body.
//! Each store appends a line to the host's `metadata.txt` ledger. Cache
//! failures degrade to a logged warning on the caller's side; nothing here
//! panics.

use crate::error::CssDiffError;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use url::Url;

const METADATA_FILENAME: &str = "metadata.txt";

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub struct FixtureCache {
    root: PathBuf,
}

impl FixtureCache {
    pub fn new(root: impl AsRef<Path>) -> FixtureCache {
        FixtureCache {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Cache key for a URL: hex digest over path and query.
    pub fn key_for(url: &Url) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.path().as_bytes());
        if let Some(query) = url.query() {
            hasher.update(b"?");
            hasher.update(query.as_bytes());
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }

    pub fn host_directory(&self, host: &str) -> PathBuf {
        self.root.join(host)
    }

    pub fn is_cached(&self, host: &str, key: &str) -> bool {
        self.host_directory(host).join(key).is_file()
    }

    /// Writes the response under the URL's host directory and appends the
    /// ledger line (key, body length, original path).
    pub fn store(
        &self,
        url: &Url,
        key: &str,
        status_line: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<(), CssDiffError> {
        let host = url.host_str().unwrap_or("localhost");
        let hostdir = self.host_directory(host);
        fs::create_dir_all(&hostdir)?;
        let path = hostdir.join(key);
        let result = (|| -> std::io::Result<()> {
            let mut file = File::create(&path)?;
            writeln!(file, "{}", status_line)?;
            for (name, value) in headers {
                writeln!(file, "{}:{}", name, value)?;
            }
            writeln!(file)?;
            file.write_all(body)?;
            Ok(())
        })();
        if let Err(err) = result {
            // A partial file would poison later reruns.
            let _ = fs::remove_file(&path);
            return Err(CssDiffError::Io(err));
        }

        let mut ledger = OpenOptions::new()
            .create(true)
            .append(true)
            .open(hostdir.join(METADATA_FILENAME))?;
        let mut location = url.path().to_string();
        if let Some(query) = url.query() {
            location.push('?');
            location.push_str(query);
        }
        writeln!(ledger, "{} {:>10} {}", key, body.len(), location)?;
        Ok(())
    }

    /// Replays a cached response: status line, headers up to the blank
    /// line, then the body.
    pub fn open(&self, host: &str, key: &str) -> Result<CachedResponse, CssDiffError> {
        let path = self.host_directory(host).join(key);
        let mut raw = Vec::new();
        File::open(&path)?.read_to_end(&mut raw)?;

        let mut status_line = String::new();
        let mut headers = Vec::new();
        let mut cursor = 0usize;
        let mut first = true;
        loop {
            let end = raw[cursor..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|pos| cursor + pos);
            let Some(end) = end else {
                return Err(CssDiffError::Fetch(format!(
                    "cache entry {}/{} has no body separator",
                    host, key
                )));
            };
            let line = String::from_utf8_lossy(&raw[cursor..end]).into_owned();
            cursor = end + 1;
            if line.is_empty() {
                break;
            }
            if first {
                status_line = line;
                first = false;
            } else if let Some(split) = line.find(':') {
                headers.push((
                    line[..split].to_ascii_lowercase(),
                    line[split + 1..].to_string(),
                ));
            }
        }
        Ok(CachedResponse {
            status_line,
            headers,
            body: raw[cursor..].to_vec(),
        })
    }

    /// Body-only convenience matching the `UserAgent` fetch shape.
    pub fn fetch(&self, url: &Url) -> Result<Vec<u8>, CssDiffError> {
        let host = url.host_str().unwrap_or("localhost");
        let key = Self::key_for(url);
        if !self.is_cached(host, &key) {
            return Err(CssDiffError::Fetch(format!("{} is not cached", url)));
        }
        Ok(self.open(host, &key)?.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_cache() -> (FixtureCache, PathBuf) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .subsec_nanos();
        let root = std::env::temp_dir().join(format!(
            "cssdiff-cache-{}-{}",
            std::process::id(),
            nanos
        ));
        (FixtureCache::new(&root), root)
    }

    fn sample_url() -> Url {
        Url::parse("http://www.example.com/css/main.css?v=3").expect("url")
    }

    #[test]
    fn keys_are_stable_and_host_scoped() {
        let url = sample_url();
        let key = FixtureCache::key_for(&url);
        assert_eq!(key, FixtureCache::key_for(&url));
        assert_eq!(key.len(), 64);
        let other = Url::parse("http://www.example.com/css/main.css").expect("url");
        assert_ne!(key, FixtureCache::key_for(&other));
    }

    #[test]
    fn store_then_open_round_trips_the_response() {
        let (cache, root) = temp_cache();
        let url = sample_url();
        let key = FixtureCache::key_for(&url);
        assert!(!cache.is_cached("www.example.com", &key));

        let headers = vec![("Content-Type".to_string(), " text/css".to_string())];
        cache
            .store(&url, &key, "HTTP/1.1 200 OK", &headers, b"p { color: red }")
            .expect("store");
        assert!(cache.is_cached("www.example.com", &key));

        let response = cache.open("www.example.com", &key).expect("open");
        assert_eq!(response.status_line, "HTTP/1.1 200 OK");
        assert_eq!(
            response.headers,
            vec![("content-type".to_string(), " text/css".to_string())]
        );
        assert_eq!(response.body, b"p { color: red }");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn ledger_accumulates_one_line_per_store() {
        let (cache, root) = temp_cache();
        let first = sample_url();
        let second = Url::parse("http://www.example.com/index.html").expect("url");
        for url in [&first, &second] {
            let key = FixtureCache::key_for(url);
            cache
                .store(url, &key, "HTTP/1.1 200 OK", &[], b"body")
                .expect("store");
        }
        let ledger = std::fs::read_to_string(
            cache.host_directory("www.example.com").join("metadata.txt"),
        )
        .expect("ledger");
        let lines: Vec<&str> = ledger.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("/css/main.css?v=3"));
        assert!(lines[1].ends_with("/index.html"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn fetch_reports_missing_entries() {
        let (cache, root) = temp_cache();
        let url = sample_url();
        match cache.fetch(&url) {
            Err(CssDiffError::Fetch(message)) => assert!(message.contains("not cached")),
            other => panic!("expected fetch error, got {:?}", other.map(|_| ())),
        }
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn body_preserves_binary_content() {
        let (cache, root) = temp_cache();
        let url = Url::parse("http://www.example.com/logo.png").expect("url");
        let key = FixtureCache::key_for(&url);
        let body = [0u8, 10, 13, 255, 10, 10, 0];
        cache
            .store(&url, &key, "HTTP/1.1 200 OK", &[], &body)
            .expect("store");
        let fetched = cache.fetch(&url).expect("fetch");
        assert_eq!(fetched, body);
        let _ = std::fs::remove_dir_all(&root);
    }
}
