//! Durable key/value blob storage with two-tier backend fallback
//!
//! Backends are tried in a fixed priority order. Availability is decided by
//! probing each backend at construction time, not by catching errors on the
//! hot path. `put` is all-or-nothing per key: a partial write is never
//! observable by `get`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_QUOTA_BYTES: usize = 4096;
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// A named-blob storage backend
pub trait Backend {
    fn name(&self) -> &str;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Primary backend: one file per key, no size limit
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Backend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.key_path(key);
        // Write-then-rename keeps the put atomic per key
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Envelope written by the fallback backend; entries past their expiry are
/// treated as absent on read
#[derive(Serialize, Deserialize)]
struct Envelope {
    expires_at: DateTime<Utc>,
    payload: String,
}

/// Fallback backend: size-constrained, with a retention window encoded into
/// every entry
pub struct QuotaBackend {
    dir: PathBuf,
    quota_bytes: usize,
    retention_days: i64,
}

impl QuotaBackend {
    pub fn new(dir: impl Into<PathBuf>, quota_bytes: usize, retention_days: i64) -> Self {
        Self {
            dir: dir.into(),
            quota_bytes,
            retention_days,
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Backend for QuotaBackend {
    fn name(&self) -> &str {
        "quota"
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let envelope = Envelope {
            expires_at: Utc::now() + Duration::days(self.retention_days),
            payload: value.to_string(),
        };
        let encoded = serde_json::to_string(&envelope)?;
        if encoded.len() > self.quota_bytes {
            return Err(Error::QuotaExceeded {
                size: encoded.len(),
                quota: self.quota_bytes,
            });
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let encoded = match fs::read_to_string(self.key_path(key)) {
            Ok(value) => value,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: Envelope = match serde_json::from_str(&encoded) {
            Ok(env) => env,
            // An unreadable envelope is treated as absent, not fatal
            Err(_) => return Ok(None),
        };
        if Utc::now() > envelope.expires_at {
            let _ = self.delete(key);
            return Ok(None);
        }
        Ok(Some(envelope.payload))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Two-tier store: primary first, fallback on failure
pub struct PersistenceStore {
    backends: Vec<Box<dyn Backend>>,
    available: Vec<bool>,
}

impl PersistenceStore {
    /// Probe each backend once; a backend that cannot round-trip the probe
    /// payload is skipped for the rest of the session
    pub fn new(backends: Vec<Box<dyn Backend>>) -> Self {
        let available = backends.iter().map(|b| probe(b.as_ref())).collect();
        Self {
            backends,
            available,
        }
    }

    /// Conventional layout under one directory: unlimited primary store plus
    /// a quota-constrained fallback
    pub fn open(dir: &Path, quota_bytes: usize, retention_days: i64) -> Self {
        Self::new(vec![
            Box::new(FileBackend::new(dir.join("store"))),
            Box::new(QuotaBackend::new(
                dir.join("fallback"),
                quota_bytes,
                retention_days,
            )),
        ])
    }

    pub fn has_backend(&self) -> bool {
        self.available.iter().any(|a| *a)
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut last = Error::StorageUnavailable;
        for (i, backend) in self.backends.iter().enumerate() {
            if !self.available[i] {
                continue;
            }
            match backend.put(key, value) {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    /// First backend holding the key wins; backend errors fall through to the
    /// next tier
    pub fn get(&self, key: &str) -> Option<String> {
        for (i, backend) in self.backends.iter().enumerate() {
            if !self.available[i] {
                continue;
            }
            if let Ok(Some(value)) = backend.get(key) {
                return Some(value);
            }
        }
        None
    }

    /// Remove the key from every tier so a stale fallback copy cannot shadow
    /// a later read
    pub fn delete(&self, key: &str) {
        for (i, backend) in self.backends.iter().enumerate() {
            if self.available[i] {
                let _ = backend.delete(key);
            }
        }
    }

    /// Round-trip a small known payload; run at startup so a disabled
    /// storage environment surfaces immediately instead of on first save
    pub fn self_test(&self) -> bool {
        const PROBE_KEY: &str = "sheetview_selftest";
        const PROBE_VALUE: &str = r#"{"test":"value","number":123}"#;

        if self.put(PROBE_KEY, PROBE_VALUE).is_err() {
            return false;
        }
        let ok = self.get(PROBE_KEY).as_deref() == Some(PROBE_VALUE);
        self.delete(PROBE_KEY);
        ok
    }
}

fn probe(backend: &dyn Backend) -> bool {
    const PROBE_KEY: &str = "sheetview_probe";

    if backend.put(PROBE_KEY, "probe").is_err() {
        return false;
    }
    let ok = matches!(backend.get(PROBE_KEY), Ok(Some(v)) if v == "probe");
    let _ = backend.delete(PROBE_KEY);
    ok
}
