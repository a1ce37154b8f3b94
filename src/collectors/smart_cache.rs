//! Time-bounded cache of raw NVMe health-log pages.
//!
//! A [`SmartCache`] belongs to one query context and holds a single entry for
//! the device that context talks to. A [`CacheStore`] is the longer-lived,
//! bounded collection of entries keyed by device path that the CLI persists
//! between invocations.

use crate::models::device::DeviceInfo;
use crate::models::smart::SMART_PAGE_SIZE;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TTL_SECONDS: u64 = 300;
pub const DEFAULT_STORE_CAPACITY: usize = 16;

// ── Device signature ──────────────────────────────────────────────────

/// Identity of the physical device behind a path (model + serial).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceSignature(String);

impl DeviceSignature {
    pub const UNKNOWN: &'static str = "UNKNOWN_DEVICE";

    pub fn from_identity(model: Option<&str>, serial: Option<&str>) -> Self {
        let model  = model.map(str::trim).filter(|s| !s.is_empty());
        let serial = serial.map(str::trim).filter(|s| !s.is_empty());
        let sig = match (model, serial) {
            (Some(m), Some(s)) => format!("MODEL={}&SERIAL={}", m, s),
            (Some(m), None)    => format!("MODEL={}", m),
            (None, Some(s))    => format!("SERIAL={}", s),
            (None, None)       => Self::UNKNOWN.to_string(),
        };
        DeviceSignature(sig)
    }

    pub fn from_info(info: &DeviceInfo) -> Self {
        Self::from_identity(info.model.as_deref(), info.serial.as_deref())
    }

    pub fn unknown() -> Self {
        DeviceSignature(Self::UNKNOWN.to_string())
    }

    /// Wrap an already-formatted signature. An empty one disables identity checks.
    pub fn from_raw(s: impl Into<String>) -> Self {
        DeviceSignature(s.into())
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Entry ─────────────────────────────────────────────────────────────

/// One cached read: the raw 512-byte log page plus when and from whom it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub signature:    DeviceSignature,
    pub cached_bytes: Vec<u8>,
    pub last_update:  Option<DateTime<Utc>>,
    pub is_valid:     bool,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            signature:    DeviceSignature::default(),
            cached_bytes: vec![0; SMART_PAGE_SIZE],
            last_update:  None,
            is_valid:     false,
        }
    }
}

/// Why a lookup did not produce a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Disabled,
    Invalid,
    SignatureMismatch,
    Expired,
    Corrupt,
}

// ── Per-context cache ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SmartCache {
    enabled:     bool,
    ttl_seconds: u64,
    entry:       CacheEntry,
}

impl Default for SmartCache {
    fn default() -> Self {
        Self::new(true, DEFAULT_TTL_SECONDS)
    }
}

impl SmartCache {
    /// A fresh cache starts out holding an invalid entry.
    pub fn new(enabled: bool, ttl_seconds: u64) -> Self {
        Self { enabled, ttl_seconds, entry: CacheEntry::default() }
    }

    pub fn disabled() -> Self {
        Self::new(false, DEFAULT_TTL_SECONDS)
    }

    pub fn is_enabled(&self) -> bool { self.enabled }
    pub fn ttl_seconds(&self) -> u64 { self.ttl_seconds }
    pub fn entry(&self) -> &CacheEntry { &self.entry }

    /// Seed the cache from a previously stored entry; it is re-validated on lookup.
    pub fn restore(&mut self, entry: CacheEntry) {
        self.entry = entry;
    }

    pub fn lookup(&mut self, signature: &DeviceSignature) -> Option<[u8; SMART_PAGE_SIZE]> {
        self.lookup_at(signature, Utc::now())
    }

    pub fn lookup_at(
        &mut self,
        signature: &DeviceSignature,
        now: DateTime<Utc>,
    ) -> Option<[u8; SMART_PAGE_SIZE]> {
        match self.check(signature, now) {
            Ok(bytes) => {
                tracing::debug!(%signature, "cache hit");
                Some(bytes)
            }
            Err(MissReason::Disabled) => None,
            Err(reason) => {
                if self.entry.is_valid {
                    tracing::debug!(%signature, ?reason, "cache entry invalidated");
                }
                self.invalidate();
                None
            }
        }
    }

    fn check(&self, signature: &DeviceSignature, now: DateTime<Utc>) -> Result<[u8; SMART_PAGE_SIZE], MissReason> {
        if !self.enabled {
            return Err(MissReason::Disabled);
        }
        if !self.entry.is_valid {
            return Err(MissReason::Invalid);
        }
        if !signature.is_empty() && self.entry.signature != *signature {
            return Err(MissReason::SignatureMismatch);
        }
        let last = self.entry.last_update.ok_or(MissReason::Invalid)?;
        let age = now.signed_duration_since(last);
        // A timestamp from the future cannot vouch for freshness.
        if age < Duration::zero() {
            return Err(MissReason::Expired);
        }
        // Compared in whole seconds so any u64 ttl is valid.
        let age_secs = u64::try_from(age.num_seconds()).unwrap_or(0);
        if age_secs >= self.ttl_seconds {
            return Err(MissReason::Expired);
        }
        self.entry.cached_bytes.as_slice().try_into().map_err(|_| MissReason::Corrupt)
    }

    pub fn update(&mut self, signature: &DeviceSignature, bytes: &[u8; SMART_PAGE_SIZE]) {
        self.update_at(signature, bytes, Utc::now());
    }

    pub fn update_at(&mut self, signature: &DeviceSignature, bytes: &[u8; SMART_PAGE_SIZE], now: DateTime<Utc>) {
        if !self.enabled { return; }
        self.entry = CacheEntry {
            signature:    signature.clone(),
            cached_bytes: bytes.to_vec(),
            last_update:  Some(now),
            is_valid:     true,
        };
    }

    /// Mark the entry stale. The bytes are left in place.
    pub fn invalidate(&mut self) {
        self.entry.is_valid = false;
    }
}

// ── Process-wide store ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreSlot {
    key:   String,
    entry: CacheEntry,
    seq:   u64,
}

/// Bounded set of cache entries keyed by device path. When full, the
/// least-recently written slot is overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStore {
    capacity: usize,
    next_seq: u64,
    slots:    Vec<StoreSlot>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY)
    }
}

impl CacheStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), next_seq: 0, slots: Vec::new() }
    }

    pub fn capacity(&self) -> usize { self.capacity }
    pub fn len(&self) -> usize { self.slots.len() }
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.slots.iter().find(|s| s.key == key).map(|s| &s.entry)
    }

    pub fn put(&mut self, key: &str, entry: CacheEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(slot) = self.slots.iter_mut().find(|s| s.key == key) {
            slot.entry = entry;
            slot.seq = seq;
            return;
        }
        let slot = StoreSlot { key: key.to_string(), entry, seq };
        if self.slots.len() < self.capacity {
            self.slots.push(slot);
        } else if let Some(oldest) = self.slots.iter_mut().min_by_key(|s| s.seq) {
            tracing::debug!(evicted = %oldest.key, "cache store full, overwriting oldest slot");
            *oldest = slot;
        }
    }

    pub fn invalidate(&mut self, key: &str) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.key == key) {
            slot.entry.is_valid = false;
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.key.as_str())
    }

    /// Shrink or grow to `capacity`, dropping the oldest slots first.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        if self.slots.len() > self.capacity {
            self.slots.sort_by_key(|s| std::cmp::Reverse(s.seq));
            self.slots.truncate(self.capacity);
        }
    }

    // ── Persistence ────────────────────────────────────────────────────

    pub fn cache_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join("smartprobe").join("smart_cache.json"))
    }

    /// Load from the default location. Any failure yields an empty store.
    pub fn load(capacity: usize) -> Self {
        match Self::cache_path() {
            Some(p) => Self::load_from(&p, capacity),
            None    => Self::with_capacity(capacity),
        }
    }

    pub fn load_from(path: &Path, capacity: usize) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(t)  => t,
            Err(_) => return Self::with_capacity(capacity),
        };
        match serde_json::from_str::<CacheStore>(&text) {
            Ok(mut store) => {
                store.resize(capacity);
                store
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable cache store");
                Self::with_capacity(capacity)
            }
        }
    }

    pub fn save(&self) {
        if let Some(p) = Self::cache_path() {
            self.save_to(&p);
        }
    }

    /// Best-effort write; failures are logged and otherwise ignored.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string(self) {
            Ok(text) => {
                if let Err(e) = fs::write(path, text) {
                    tracing::warn!(path = %path.display(), error = %e, "could not persist cache store");
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not serialise cache store"),
        }
    }
}
