//! File-backed Stores
//!
//! Durable adapters for the two pieces of state that must survive restarts:
//! the audit ledger (append-only JSON lines) and the per-run guardrail flags
//! (a JSON snapshot replaced atomically on every write).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::ports::{AuditStore, GuardrailStore};
use crate::types::{GuardrailState, RollbackRecord, RunId};

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}

// ─── Audit ledger ─────────────────────────────────────────────

struct LedgerInner {
    file: File,
    records: Vec<RollbackRecord>,
}

/// Append-only audit ledger stored as one JSON record per line.
pub struct JsonlAuditStore {
    path: PathBuf,
    inner: Mutex<LedgerInner>,
}

impl JsonlAuditStore {
    /// Open (or create) the ledger at `path`, replaying existing records.
    ///
    /// A line that does not parse is an error: the ledger is never silently
    /// truncated.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path).await?;

        let mut records = Vec::new();
        if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading audit ledger {}", path.display()))?;
            for (idx, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: RollbackRecord = serde_json::from_str(line).with_context(|| {
                    format!("audit ledger {} line {} is corrupt", path.display(), idx + 1)
                })?;
                records.push(record);
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening audit ledger {}", path.display()))?;

        info!(path = %path.display(), records = records.len(), "Audit ledger opened");

        Ok(Self {
            path,
            inner: Mutex::new(LedgerInner { file, records }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, record: &RollbackRecord) -> Result<u64> {
        let mut line = serde_json::to_string(record).context("serializing rollback record")?;
        line.push('\n');

        let mut inner = self.inner.lock().await;
        inner
            .file
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("writing audit ledger {}", self.path.display()))?;
        inner.file.flush().await?;
        inner
            .file
            .sync_data()
            .await
            .with_context(|| format!("syncing audit ledger {}", self.path.display()))?;

        inner.records.push(record.clone());
        let seq = inner.records.len() as u64;
        debug!(rollback_id = %record.rollback_id, seq, "Audit record appended");
        Ok(seq)
    }

    async fn query(&self, run_id: Option<&str>) -> Result<Vec<RollbackRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| run_id.map_or(true, |id| r.run_id == id))
            .cloned()
            .collect())
    }
}

// ─── Guardrails ───────────────────────────────────────────────

/// Per-run guardrail flags persisted as a single JSON document.
pub struct FileGuardrailStore {
    path: PathBuf,
    states: Mutex<BTreeMap<RunId, GuardrailState>>,
}

impl FileGuardrailStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path).await?;

        let states = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading guardrails {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("guardrails {} is corrupt", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            states: Mutex::new(states),
        })
    }

    /// Write the snapshot to a sibling temp file, then rename over the target.
    async fn persist(&self, states: &BTreeMap<RunId, GuardrailState>) -> Result<()> {
        let json = serde_json::to_vec_pretty(states).context("serializing guardrails")?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)
                .await
                .with_context(|| format!("creating {}", tmp.display()))?;
            file.write_all(&json).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl GuardrailStore for FileGuardrailStore {
    async fn load(&self, run_id: &str) -> Result<GuardrailState> {
        Ok(self
            .states
            .lock()
            .await
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_ttum_downloaded(
        &self,
        run_id: &str,
        at: DateTime<Utc>,
    ) -> Result<GuardrailState> {
        let mut states = self.states.lock().await;
        if let Some(existing) = states.get(run_id) {
            if existing.ttum_downloaded {
                return Ok(existing.clone());
            }
        }

        // Persist first; memory only changes once the file is replaced.
        let mut next = states.clone();
        let state = GuardrailState {
            ttum_downloaded: true,
            ttum_downloaded_at: Some(at),
        };
        next.insert(run_id.to_string(), state.clone());
        self.persist(&next).await?;
        *states = next;

        info!(run_id, "TTUM download recorded");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordDetails, RecordStatus, RollbackLevel, RollbackRequest};
    use tempfile::TempDir;

    fn record(run_id: &str, level: RollbackLevel) -> RollbackRecord {
        RollbackRecord::new(
            &RollbackRequest::new(run_id, level),
            RecordStatus::Failed,
            RecordDetails::GuardrailDenied {
                reason: "ttum already downloaded".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_audit_ledger_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger/audit.jsonl");

        let first = record("RUN_001", RollbackLevel::Ttum);
        let second = record("RUN_002", RollbackLevel::Complete);
        {
            let store = JsonlAuditStore::open(&path).await.unwrap();
            assert_eq!(store.append(&first).await.unwrap(), 1);
            assert_eq!(store.append(&second).await.unwrap(), 2);
        }

        let reopened = JsonlAuditStore::open(&path).await.unwrap();
        let all = reopened.query(None).await.unwrap();
        assert_eq!(all, vec![first.clone(), second]);
        assert_eq!(reopened.query(Some("RUN_001")).await.unwrap(), vec![first]);

        let third = record("RUN_001", RollbackLevel::Complete);
        assert_eq!(reopened.append(&third).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_ledger_refuses_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        tokio::fs::write(&path, "{not json}\n").await.unwrap();
        assert!(JsonlAuditStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_guardrails_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guardrails.json");
        let at = Utc::now();
        {
            let store = FileGuardrailStore::open(&path).await.unwrap();
            assert!(!store.load("RUN_001").await.unwrap().ttum_downloaded);
            store.mark_ttum_downloaded("RUN_001", at).await.unwrap();
        }

        let reopened = FileGuardrailStore::open(&path).await.unwrap();
        let state = reopened.load("RUN_001").await.unwrap();
        assert!(state.ttum_downloaded);
        assert_eq!(state.ttum_downloaded_at, Some(at));
        assert!(!reopened.load("RUN_002").await.unwrap().ttum_downloaded);
    }

    #[tokio::test]
    async fn test_second_download_keeps_first_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = FileGuardrailStore::open(dir.path().join("guardrails.json"))
            .await
            .unwrap();
        let first = Utc::now();
        store.mark_ttum_downloaded("RUN_001", first).await.unwrap();
        let state = store
            .mark_ttum_downloaded("RUN_001", first + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(state.ttum_downloaded_at, Some(first));
    }
}
