//! Rollback Data Model
//!
//! Runs, rollback levels, cycles, artifact classes and the immutable
//! audit record produced by every rollback attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RollbackError;

/// Opaque reconciliation run identifier (e.g., "RUN_001").
pub type RunId = String;

// ─── Run ──────────────────────────────────────────────────────

/// Lifecycle status of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    RolledBack,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for RunStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "rolled_back" => Ok(Self::RolledBack),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// One reconciliation execution, as reported by the run/summary provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub total_transactions: u64,
    pub matched_count: u64,
    pub unmatched_count: u64,
    pub status: RunStatus,
}

// ─── Rollback level ───────────────────────────────────────────

/// Rollback granularity, ordered from least to most destructive.
///
/// The derived `Ord` follows declaration order:
/// `File < Recon < Reports < Ttum < Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackLevel {
    /// Ingested input for a single cycle
    File,
    /// Computed match/unmatch results
    Recon,
    /// Generated downstream reports
    Reports,
    /// Regulatory TTUM settlement package
    Ttum,
    /// Everything, including uploaded files
    Complete,
}

impl RollbackLevel {
    pub const ALL: [RollbackLevel; 5] = [
        RollbackLevel::File,
        RollbackLevel::Recon,
        RollbackLevel::Reports,
        RollbackLevel::Ttum,
        RollbackLevel::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Recon => "recon",
            Self::Reports => "reports",
            Self::Ttum => "ttum",
            Self::Complete => "complete",
        }
    }

    /// Only file-level rollback is scoped to a cycle.
    pub fn requires_cycle(&self) -> bool {
        matches!(self, Self::File)
    }

    /// Levels that remove the TTUM package and are therefore blocked
    /// once it has been downloaded.
    pub fn touches_ttum(&self) -> bool {
        matches!(self, Self::Ttum | Self::Complete)
    }

    /// Reason recorded when the caller does not supply one.
    pub fn default_reason(&self, cycle_id: Option<CycleId>) -> String {
        match (self, cycle_id) {
            (Self::File, Some(cycle)) => format!("File rollback for cycle {}", cycle),
            (Self::File, None) => "File rollback".to_string(),
            (Self::Recon, _) => "Reconciliation results rollback".to_string(),
            (Self::Reports, _) => "Report regeneration rollback".to_string(),
            (Self::Ttum, _) => "TTUM package regeneration".to_string(),
            (Self::Complete, _) => "Complete run reset".to_string(),
        }
    }
}

impl fmt::Display for RollbackLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RollbackLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "recon" => Ok(Self::Recon),
            "reports" => Ok(Self::Reports),
            "ttum" => Ok(Self::Ttum),
            "complete" => Ok(Self::Complete),
            _ => Err(format!(
                "unknown rollback level `{}`; expected one of file, recon, reports, ttum, complete",
                s
            )),
        }
    }
}

// ─── Cycle ────────────────────────────────────────────────────

/// NPCI batch window identifier, `1C` through `10C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CycleId(u8);

impl CycleId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(number: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&number)
            .then_some(Self(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// The static `1C..10C` range.
    pub fn full_range() -> BTreeSet<CycleId> {
        (Self::MIN..=Self::MAX).map(CycleId).collect()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}C", self.0)
    }
}

impl FromStr for CycleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid cycle id `{}`; expected 1C..10C", s);
        let digits = s.strip_suffix('C').ok_or_else(invalid)?;
        // Reject leading zeros and signs that u8 parsing would accept
        if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let number: u8 = digits.parse().map_err(|_| invalid())?;
        CycleId::new(number).ok_or_else(invalid)
    }
}

impl TryFrom<String> for CycleId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CycleId> for String {
    fn from(cycle: CycleId) -> Self {
        cycle.to_string()
    }
}

// ─── Artifacts ────────────────────────────────────────────────

/// Class of derived or ingested artifact a rollback can remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactClass {
    TtumPackage,
    Reports,
    ReconOutput,
    UploadedFiles,
}

impl ArtifactClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TtumPackage => "ttum_package",
            Self::Reports => "reports",
            Self::ReconOutput => "recon_output",
            Self::UploadedFiles => "uploaded_files",
        }
    }

    /// The lowest rollback level that removes this class.
    pub fn owner_level(&self) -> RollbackLevel {
        match self {
            Self::TtumPackage => RollbackLevel::Ttum,
            Self::Reports => RollbackLevel::Reports,
            Self::ReconOutput => RollbackLevel::Recon,
            Self::UploadedFiles => RollbackLevel::File,
        }
    }
}

impl fmt::Display for ArtifactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much of an artifact class a step removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactScope {
    Run,
    Cycle(CycleId),
}

/// One artifact-class removal inside a cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "CascadeStepRepr", from = "CascadeStepRepr")]
pub struct CascadeStep {
    pub class: ArtifactClass,
    pub scope: ArtifactScope,
}

/// Flat wire form: `{"class": "...", "cycle_id": "2C"}`
#[derive(Serialize, Deserialize)]
struct CascadeStepRepr {
    class: ArtifactClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cycle_id: Option<CycleId>,
}

impl From<CascadeStep> for CascadeStepRepr {
    fn from(step: CascadeStep) -> Self {
        let cycle_id = match step.scope {
            ArtifactScope::Run => None,
            ArtifactScope::Cycle(cycle) => Some(cycle),
        };
        Self {
            class: step.class,
            cycle_id,
        }
    }
}

impl From<CascadeStepRepr> for CascadeStep {
    fn from(repr: CascadeStepRepr) -> Self {
        let scope = match repr.cycle_id {
            None => ArtifactScope::Run,
            Some(cycle) => ArtifactScope::Cycle(cycle),
        };
        Self {
            class: repr.class,
            scope,
        }
    }
}

impl CascadeStep {
    pub fn run_wide(class: ArtifactClass) -> Self {
        Self {
            class,
            scope: ArtifactScope::Run,
        }
    }

    pub fn for_cycle(class: ArtifactClass, cycle: CycleId) -> Self {
        Self {
            class,
            scope: ArtifactScope::Cycle(cycle),
        }
    }
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            ArtifactScope::Run => write!(f, "{}", self.class),
            ArtifactScope::Cycle(cycle) => write!(f, "{}[{}]", self.class, cycle),
        }
    }
}

/// Artifacts currently held for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactInventory {
    /// Cycles with ingested, validated input files
    pub cycles: BTreeSet<CycleId>,
    pub recon_output: bool,
    pub reports: bool,
    pub ttum_package: bool,
}

impl ArtifactInventory {
    /// A freshly reconciled run: every artifact class present.
    pub fn fully_reconciled(cycles: impl IntoIterator<Item = CycleId>) -> Self {
        Self {
            cycles: cycles.into_iter().collect(),
            recon_output: true,
            reports: true,
            ttum_package: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty() && !self.recon_output && !self.reports && !self.ttum_package
    }

    /// Whether the artifacts a step would remove are present.
    pub fn contains(&self, step: &CascadeStep) -> bool {
        match (step.class, step.scope) {
            (ArtifactClass::TtumPackage, _) => self.ttum_package,
            (ArtifactClass::Reports, _) => self.reports,
            (ArtifactClass::ReconOutput, _) => self.recon_output,
            (ArtifactClass::UploadedFiles, ArtifactScope::Run) => !self.cycles.is_empty(),
            (ArtifactClass::UploadedFiles, ArtifactScope::Cycle(cycle)) => {
                self.cycles.contains(&cycle)
            }
        }
    }

    /// Apply a removal step in place.
    pub fn remove(&mut self, step: &CascadeStep) {
        match (step.class, step.scope) {
            (ArtifactClass::TtumPackage, _) => self.ttum_package = false,
            (ArtifactClass::Reports, _) => self.reports = false,
            (ArtifactClass::ReconOutput, _) => self.recon_output = false,
            (ArtifactClass::UploadedFiles, ArtifactScope::Run) => self.cycles.clear(),
            (ArtifactClass::UploadedFiles, ArtifactScope::Cycle(cycle)) => {
                self.cycles.remove(&cycle);
            }
        }
    }
}

// ─── Guardrails ───────────────────────────────────────────────

/// Per-run flags that permanently gate irreversible rollback levels.
///
/// Written only by the download-completion event; never cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailState {
    pub ttum_downloaded: bool,
    pub ttum_downloaded_at: Option<DateTime<Utc>>,
}

// ─── Request ──────────────────────────────────────────────────

/// A validated rollback request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub run_id: RunId,
    pub level: RollbackLevel,
    pub cycle_id: Option<CycleId>,
    pub reason: String,
}

impl RollbackRequest {
    /// Create a request with the level's default reason
    pub fn new(run_id: impl Into<String>, level: RollbackLevel) -> Self {
        Self {
            run_id: run_id.into(),
            level,
            cycle_id: None,
            reason: level.default_reason(None),
        }
    }

    /// Scope the request to a cycle (file level)
    pub fn with_cycle(mut self, cycle: CycleId) -> Self {
        if self.reason == self.level.default_reason(self.cycle_id) {
            self.reason = self.level.default_reason(Some(cycle));
        }
        self.cycle_id = Some(cycle);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// `cycle_id` must be present if and only if the level is `file`.
    pub fn check_cycle_scope(&self) -> Result<(), RollbackError> {
        match (self.level.requires_cycle(), self.cycle_id) {
            (true, None) => Err(RollbackError::Validation(
                "cycle_id is required for file-level rollback".to_string(),
            )),
            (false, Some(cycle)) => Err(RollbackError::Validation(format!(
                "cycle_id {} is only valid for file-level rollback, got level `{}`",
                cycle, self.level
            ))),
            _ => Ok(()),
        }
    }
}

// ─── Audit record ─────────────────────────────────────────────

/// Outcome recorded in the audit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured cause or summary attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordDetails {
    /// Every step in the cascade succeeded.
    Committed {
        steps: Vec<CascadeStep>,
        /// Steps whose artifacts were already absent
        skipped_steps: Vec<CascadeStep>,
        run_status: RunStatus,
    },
    /// The guardrail refused the level.
    GuardrailDenied { reason: String },
    /// A cascade step raised or the apply phase timed out.
    ExecutionFailed {
        completed_steps: Vec<CascadeStep>,
        failed_step: Option<CascadeStep>,
        error: String,
    },
}

/// Immutable result of one rollback attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub rollback_id: String,
    pub level: RollbackLevel,
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<CycleId>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub status: RecordStatus,
    pub details: RecordDetails,
}

impl RollbackRecord {
    /// Stamp a new record for `request` with a fresh id and the current time.
    pub fn new(request: &RollbackRequest, status: RecordStatus, details: RecordDetails) -> Self {
        Self {
            rollback_id: new_rollback_id(),
            level: request.level,
            run_id: request.run_id.clone(),
            cycle_id: request.cycle_id,
            reason: request.reason.clone(),
            timestamp: Utc::now(),
            status,
            details,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }
}

/// Time-ordered unique rollback identifier.
pub fn new_rollback_id() -> String {
    format!("RB-{}", Uuid::now_v7().simple())
}
