//! ---
//! sg_section: "04-resolution-evaluation"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Hash-chained decision audit trail."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::evaluator::{AccessRequest, Decision, DecisionReason, Verdict};
use crate::params::Parameters;

const GENESIS_HASH_LEN: usize = 64;

/// One recorded authorization decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Principal the decision was made for.
    pub principal: String,
    /// Requested permission path.
    pub permission: String,
    /// Resource parameters of the request.
    pub resource: Parameters,
    /// Outcome.
    pub verdict: Verdict,
    /// How the outcome was reached.
    pub reason: DecisionReason,
    /// Canonical form of the deciding directive, if any.
    pub matched: Option<String>,
    /// SHA-256 over the record contents and the previous hash.
    pub hash: String,
    /// Hash of the previous record (zeros for the first).
    pub previous_hash: String,
}

impl DecisionRecord {
    fn compute_hash(&self, previous_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            self.timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        // Length prefixes keep field boundaries unambiguous.
        for field in [self.principal.as_str(), self.permission.as_str()] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        for (name, value) in &self.resource {
            hasher.update((name.len() as u64).to_be_bytes());
            hasher.update(name.as_bytes());
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        }
        hasher.update(self.verdict.as_str().as_bytes());
        hasher.update(self.reason.as_str().as_bytes());
        hasher.update(self.matched.as_deref().unwrap_or("-").as_bytes());
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Decision audit log backed by a newline-delimited JSON file.
#[derive(Debug, Clone)]
pub struct DecisionAuditLog {
    path: PathBuf,
    last_hash: String,
}

impl DecisionAuditLog {
    /// Open (or create on first append) the log at `path`. Existing records set the head hash.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut log = Self {
            path: path.clone(),
            last_hash: "0".repeat(GENESIS_HASH_LEN),
        };
        if path.exists() {
            for record in read_records(&path)? {
                log.last_hash = record.hash;
            }
        }
        Ok(log)
    }

    /// File backing this log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record for `decision`.
    pub fn record(
        &mut self,
        principal: &str,
        request: &AccessRequest,
        decision: &Decision,
    ) -> Result<DecisionRecord> {
        let mut record = DecisionRecord {
            timestamp: Utc::now(),
            principal: principal.to_string(),
            permission: request.permission.clone(),
            resource: request.resource.clone(),
            verdict: decision.verdict,
            reason: decision.reason,
            matched: decision.matched.as_ref().map(|d| d.format()),
            hash: String::new(),
            previous_hash: self.last_hash.clone(),
        };
        record.hash = record.compute_hash(&self.last_hash);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("unable to open audit log {}", self.path.display()))?;
        file.write_all(serde_json::to_string(&record)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        self.last_hash = record.hash.clone();
        Ok(record)
    }

    /// Every record currently in the file.
    pub fn records(&self) -> Result<Vec<DecisionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_records(&self.path)
    }

    /// Recompute the chain; false when any record was altered, dropped or reordered.
    pub fn verify(&self) -> Result<bool> {
        let mut previous = "0".repeat(GENESIS_HASH_LEN);
        for record in self.records()? {
            if record.previous_hash != previous || record.compute_hash(&previous) != record.hash {
                return Ok(false);
            }
            previous = record.hash;
        }
        Ok(true)
    }
}

fn read_records(path: &Path) -> Result<Vec<DecisionRecord>> {
    let file = fs::File::open(path)
        .with_context(|| format!("unable to open audit log {}", path.display()))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).context("corrupt audit record")?);
    }
    Ok(records)
}
