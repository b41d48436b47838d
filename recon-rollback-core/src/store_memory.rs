//! In-memory implementation of every engine port.
//!
//! Used by tests and by the demo server when no external run provider is
//! wired. Each artifact removal happens under a single write lock, which makes
//! it swap-or-nothing.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::ports::{ArtifactStore, AuditStore, CycleLedger, GuardrailStore, RunRegistry};
use crate::types::*;

const DEMO_SEED: &str = include_str!("../seed/demo_runs.yaml");

/// One run plus the artifacts and guardrails it starts with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSeed {
    #[serde(flatten)]
    pub run: Run,
    /// `None` means the ingestion ledger has no record of the run.
    #[serde(default)]
    pub artifacts: Option<ArtifactInventory>,
    #[serde(default)]
    pub guardrails: GuardrailState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedBundle {
    #[serde(default)]
    pub runs: Vec<RunSeed>,
}

impl SeedBundle {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid run seed YAML")
    }

    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading run seed {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    /// Built-in demo runs `RUN_001..RUN_005`.
    pub fn demo() -> Result<Self> {
        Self::from_yaml_str(DEMO_SEED)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    runs: RwLock<BTreeMap<RunId, Run>>,
    artifacts: RwLock<HashMap<RunId, ArtifactInventory>>,
    guardrails: RwLock<HashMap<RunId, GuardrailState>>,
    audit: Mutex<Vec<RollbackRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(bundle: SeedBundle) -> Self {
        let mut runs = BTreeMap::new();
        let mut artifacts = HashMap::new();
        let mut guardrails = HashMap::new();
        for seed in bundle.runs {
            let run_id = seed.run.run_id.clone();
            if let Some(inventory) = seed.artifacts {
                artifacts.insert(run_id.clone(), inventory);
            }
            guardrails.insert(run_id.clone(), seed.guardrails);
            runs.insert(run_id, seed.run);
        }
        Self {
            runs: RwLock::new(runs),
            artifacts: RwLock::new(artifacts),
            guardrails: RwLock::new(guardrails),
            audit: Mutex::new(Vec::new()),
        }
    }

    /// Add or replace a run with its starting artifacts.
    pub async fn seed_run(&self, seed: RunSeed) {
        let run_id = seed.run.run_id.clone();
        match seed.artifacts {
            Some(inventory) => {
                self.artifacts.write().await.insert(run_id.clone(), inventory);
            }
            None => {
                self.artifacts.write().await.remove(&run_id);
            }
        }
        self.guardrails
            .write()
            .await
            .insert(run_id.clone(), seed.guardrails);
        self.runs.write().await.insert(run_id, seed.run);
    }

    /// Re-apply the effects of ledger records onto seeded state.
    ///
    /// Committed and partially applied attempts remove what they removed
    /// before; a committed `complete` marks the run rolled back again.
    /// Records for runs the seed does not know are ignored.
    pub async fn replay(&self, records: &[RollbackRecord]) {
        let mut runs = self.runs.write().await;
        let mut artifacts = self.artifacts.write().await;
        let mut replayed = 0usize;
        for record in records {
            let steps = match &record.details {
                RecordDetails::Committed {
                    steps, run_status, ..
                } => {
                    if let Some(run) = runs.get_mut(&record.run_id) {
                        run.status = *run_status;
                    }
                    steps
                }
                RecordDetails::ExecutionFailed {
                    completed_steps, ..
                } => completed_steps,
                RecordDetails::GuardrailDenied { .. } => continue,
            };
            if let Some(inventory) = artifacts.get_mut(&record.run_id) {
                for step in steps {
                    inventory.remove(step);
                }
            }
            replayed += 1;
        }
        debug!(records = records.len(), replayed, "Ledger replayed onto run store");
    }
}

#[async_trait]
impl RunRegistry for MemoryStore {
    async fn list_runs(&self) -> Result<Vec<Run>> {
        Ok(self.runs.read().await.values().cloned().collect())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| anyhow!("run {run_id} not found"))?;
        run.status = status;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn inventory(&self, run_id: &str) -> Result<ArtifactInventory> {
        Ok(self
            .artifacts
            .read()
            .await
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove(&self, run_id: &str, step: &CascadeStep) -> Result<()> {
        let mut artifacts = self.artifacts.write().await;
        if let Some(inventory) = artifacts.get_mut(run_id) {
            inventory.remove(step);
        }
        Ok(())
    }
}

#[async_trait]
impl CycleLedger for MemoryStore {
    async fn ingested_cycles(&self, run_id: &str) -> Result<Option<BTreeSet<CycleId>>> {
        Ok(self
            .artifacts
            .read()
            .await
            .get(run_id)
            .map(|inventory| inventory.cycles.clone()))
    }
}

#[async_trait]
impl GuardrailStore for MemoryStore {
    async fn load(&self, run_id: &str) -> Result<GuardrailState> {
        Ok(self
            .guardrails
            .read()
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
        let mut guardrails = self.guardrails.write().await;
        let state = guardrails.entry(run_id.to_string()).or_default();
        if !state.ttum_downloaded {
            state.ttum_downloaded = true;
            state.ttum_downloaded_at = Some(at);
        }
        Ok(state.clone())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, record: &RollbackRecord) -> Result<u64> {
        let mut audit = self.audit.lock().await;
        audit.push(record.clone());
        Ok(audit.len() as u64)
    }

    async fn query(&self, run_id: Option<&str>) -> Result<Vec<RollbackRecord>> {
        let audit = self.audit.lock().await;
        Ok(audit
            .iter()
            .filter(|r| run_id.map_or(true, |id| r.run_id == id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(s: &str) -> CycleId {
        s.parse().unwrap()
    }

    #[test]
    fn test_demo_seed_parses() {
        let bundle = SeedBundle::demo().unwrap();
        let ids: Vec<_> = bundle.runs.iter().map(|s| s.run.run_id.as_str()).collect();
        assert_eq!(ids, vec!["RUN_001", "RUN_002", "RUN_003", "RUN_004", "RUN_005"]);

        let run_002 = &bundle.runs[1];
        let inventory = run_002.artifacts.as_ref().unwrap();
        assert_eq!(
            inventory.cycles,
            ["1C", "2C", "3C"].iter().map(|c| cycle(c)).collect()
        );
        assert!(bundle.runs[3].guardrails.ttum_downloaded);
        assert_eq!(bundle.runs[4].run.status, RunStatus::InProgress);
    }

    #[tokio::test]
    async fn test_seeded_store_serves_runs_and_ledger() {
        let store = MemoryStore::from_seed(SeedBundle::demo().unwrap());
        assert_eq!(store.list_runs().await.unwrap().len(), 5);
        let cycles = store.ingested_cycles("RUN_002").await.unwrap().unwrap();
        assert_eq!(cycles.len(), 3);
        assert!(store.ingested_cycles("RUN_404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_cycle_updates_ledger() {
        let store = MemoryStore::from_seed(SeedBundle::demo().unwrap());
        let step = CascadeStep::for_cycle(ArtifactClass::UploadedFiles, cycle("2C"));
        store.remove("RUN_002", &step).await.unwrap();

        let cycles = store.ingested_cycles("RUN_002").await.unwrap().unwrap();
        assert!(!cycles.contains(&cycle("2C")));
        assert!(store.inventory("RUN_002").await.unwrap().recon_output);
    }

    #[tokio::test]
    async fn test_ttum_download_is_sticky_and_keeps_first_time() {
        let store = MemoryStore::new();
        let first = Utc::now();
        let state = store.mark_ttum_downloaded("RUN_001", first).await.unwrap();
        assert!(state.ttum_downloaded);

        let later = first + chrono::Duration::minutes(5);
        let state = store.mark_ttum_downloaded("RUN_001", later).await.unwrap();
        assert_eq!(state.ttum_downloaded_at, Some(first));
        assert!(store.load("RUN_001").await.unwrap().ttum_downloaded);
    }

    #[tokio::test]
    async fn test_replay_restores_removed_artifacts_and_status() {
        let store = MemoryStore::from_seed(SeedBundle::demo().unwrap());
        let complete = RollbackRecord::new(
            &RollbackRequest::new("RUN_003", RollbackLevel::Complete),
            RecordStatus::Completed,
            RecordDetails::Committed {
                steps: vec![
                    CascadeStep::run_wide(ArtifactClass::TtumPackage),
                    CascadeStep::run_wide(ArtifactClass::Reports),
                ],
                skipped_steps: Vec::new(),
                run_status: RunStatus::RolledBack,
            },
        );
        let partial = RollbackRecord::new(
            &RollbackRequest::new("RUN_002", RollbackLevel::Reports),
            RecordStatus::Failed,
            RecordDetails::ExecutionFailed {
                completed_steps: vec![CascadeStep::run_wide(ArtifactClass::TtumPackage)],
                failed_step: Some(CascadeStep::run_wide(ArtifactClass::Reports)),
                error: "disk full".into(),
            },
        );
        let unknown = RollbackRecord::new(
            &RollbackRequest::new("RUN_404", RollbackLevel::Recon),
            RecordStatus::Completed,
            RecordDetails::Committed {
                steps: vec![CascadeStep::run_wide(ArtifactClass::ReconOutput)],
                skipped_steps: Vec::new(),
                run_status: RunStatus::Completed,
            },
        );
        store.replay(&[complete, partial, unknown]).await;

        let run_003 = store.get_run("RUN_003").await.unwrap().unwrap();
        assert_eq!(run_003.status, RunStatus::RolledBack);
        let inventory = store.inventory("RUN_003").await.unwrap();
        assert!(!inventory.ttum_package && !inventory.reports);
        assert!(inventory.recon_output);

        let inventory = store.inventory("RUN_002").await.unwrap();
        assert!(!inventory.ttum_package);
        assert!(inventory.reports);
        assert_eq!(
            store.get_run("RUN_002").await.unwrap().unwrap().status,
            RunStatus::Completed
        );
        assert!(store.get_run("RUN_404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_of_unknown_run_fails() {
        let store = MemoryStore::new();
        assert!(store
            .update_run_status("RUN_404", RunStatus::RolledBack)
            .await
            .is_err());
    }
}
