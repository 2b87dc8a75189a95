//! Persisted dedup ledger
//!
//! The ledger is the set of content digests that have already been delivered to
//! the symbol server. It lives in a small JSON document:
//!
//! ```json
//! {
//!   "already_done": ["0f3a…", "9b1c…"],
//!   "updated_at": "2026-10-18T09:12:44Z"
//! }
//! ```
//!
//! Other top-level fields are carried through a read-modify-write cycle
//! untouched, in their original order and with numbers kept exact. The digest
//! list stays where it was in the document. `updated_at` belongs to this tool
//! and is overwritten on every commit.
//!
//! ## Lifecycle
//!
//! 1. [`DedupLedger::load`] once at the start of a run. A missing or unparsable
//!    document yields an empty ledger and a warning, never an error.
//! 2. [`DedupLedger::add`] while the run is in flight. Memory only.
//! 3. [`DedupLedger::persist`] exactly once, after the uploader reported success.
//!
//! The set only grows. Nothing in this crate removes a digest.

use crate::error::{Result, ShipError};
use crate::fingerprint::ContentDigest;
use crate::utils;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Field holding the digest list
pub const DIGESTS_FIELD: &str = "already_done";

/// Field stamped on every commit
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// In-memory view of the persisted digest set
#[derive(Debug, Clone, Default)]
pub struct DedupLedger {
    path: PathBuf,
    digests: BTreeSet<ContentDigest>,
    extra: Map<String, Value>,
    /// Position of the digest list among the top-level fields
    digests_slot: usize,
}

impl DedupLedger {
    /// Load the ledger stored at `path`
    ///
    /// Never fails: a missing file or a document that is not a JSON object gives
    /// an empty ledger. Non-string entries in the digest list are dropped with a
    /// warning; the rest of the document is kept.
    pub fn load(path: &Path) -> Self {
        let mut ledger = DedupLedger {
            path: path.to_path_buf(),
            ..Default::default()
        };

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No ledger at {:?}, starting empty", path);
                return ledger;
            }
            Err(e) => {
                warn!("Cannot read ledger at {:?}, starting empty: {}", path, e);
                return ledger;
            }
        };

        match parse_document(path, &raw) {
            Ok(parsed) => {
                debug!("Loaded {} digests from {:?}", parsed.digests.len(), path);
                ledger.digests = parsed.digests;
                ledger.extra = parsed.extra;
                ledger.digests_slot = parsed.digests_slot;
            }
            Err(e) => warn!("{}; starting with an empty ledger", e),
        }

        ledger
    }

    /// Location the ledger was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `digest` has already been delivered
    pub fn contains(&self, digest: &ContentDigest) -> bool {
        self.digests.contains(digest)
    }

    /// Record `digest` in memory; returns whether it was new
    pub fn add(&mut self, digest: ContentDigest) -> bool {
        self.digests.insert(digest)
    }

    /// Number of known digests
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Whether the ledger holds no digests
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Iterate digests in sorted order
    pub fn digests(&self) -> impl Iterator<Item = &ContentDigest> {
        self.digests.iter()
    }

    /// Top-level fields other than the digest list
    pub fn extra_fields(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Write the ledger back to the path it was loaded from
    pub fn persist(&mut self) -> Result<()> {
        let path = self.path.clone();
        self.persist_to(&path)
    }

    /// Write the full ledger to `path`
    ///
    /// The document is pretty-printed with a sorted digest list so that
    /// successive versions diff cleanly. Other fields keep their order. The
    /// write is atomic.
    pub fn persist_to(&mut self, path: &Path) -> Result<()> {
        if let Some(previous) = self.extra.get(UPDATED_AT_FIELD) {
            if !previous.is_string() {
                warn!(
                    "Replacing non-timestamp '{}' value {} in {:?}",
                    UPDATED_AT_FIELD, previous, path
                );
            }
        }
        self.extra.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        let digests = Value::Array(
            self.digests
                .iter()
                .map(|d| Value::String(d.as_str().to_string()))
                .collect(),
        );
        let mut document = Map::new();
        let mut pending = Some(digests);
        for (index, (key, value)) in self.extra.iter().enumerate() {
            if index == self.digests_slot {
                if let Some(digests) = pending.take() {
                    document.insert(DIGESTS_FIELD.to_string(), digests);
                }
            }
            document.insert(key.clone(), value.clone());
        }
        if let Some(digests) = pending {
            document.insert(DIGESTS_FIELD.to_string(), digests);
        }

        let mut body = serde_json::to_string_pretty(&Value::Object(document))?;
        body.push('\n');
        utils::atomic_write(path, body.as_bytes())?;

        info!("Persisted {} digests to {:?}", self.digests.len(), path);
        Ok(())
    }
}

struct ParsedLedger {
    digests: BTreeSet<ContentDigest>,
    extra: Map<String, Value>,
    digests_slot: usize,
}

fn parse_document(path: &Path, raw: &str) -> Result<ParsedLedger> {
    let corrupt = |reason: String| ShipError::LedgerCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;
    let Value::Object(document) = value else {
        return Err(corrupt("top level is not an object".to_string()));
    };

    let digests_slot = document
        .keys()
        .position(|k| k == DIGESTS_FIELD)
        .unwrap_or(0);
    let mut field = None;
    let mut extra = Map::new();
    for (key, value) in document {
        if key == DIGESTS_FIELD {
            field = Some(value);
        } else {
            extra.insert(key, value);
        }
    }

    let mut digests = BTreeSet::new();
    match field {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(s) if !s.is_empty() => {
                        digests.insert(ContentDigest::from_hex(s));
                    }
                    other => warn!("Ignoring malformed ledger entry {} in {:?}", other, path),
                }
            }
        }
        Some(other) => {
            warn!(
                "Ledger field '{}' in {:?} is not a list ({}), ignoring it",
                DIGESTS_FIELD, path, other
            );
        }
    }

    Ok(ParsedLedger {
        digests,
        extra,
        digests_slot,
    })
}
