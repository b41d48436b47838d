//! Rollback Level Policy
//!
//! Maps each rollback level to the ordered list of artifact classes it
//! invalidates. The mapping is a static table so the cascade for a level is
//! data, not branch logic spread across call sites.
//!
//! Cascades always run from the most derived artifact to the least derived
//! (TTUM → reports → recon → files) so a partial failure never leaves a higher
//! artifact pointing at a lower one that has already been removed.

use serde::{Deserialize, Serialize};

use crate::error::RollbackError;
use crate::types::{
    ArtifactClass, ArtifactInventory, CascadeStep, CycleId, RollbackLevel, Run,
};

const FILE_CASCADE: &[ArtifactClass] = &[ArtifactClass::UploadedFiles];
const RECON_CASCADE: &[ArtifactClass] = &[ArtifactClass::ReconOutput];
const REPORTS_CASCADE: &[ArtifactClass] = &[ArtifactClass::Reports];
const TTUM_CASCADE: &[ArtifactClass] = &[ArtifactClass::TtumPackage];
const COMPLETE_CASCADE: &[ArtifactClass] = &[
    ArtifactClass::TtumPackage,
    ArtifactClass::Reports,
    ArtifactClass::ReconOutput,
    ArtifactClass::UploadedFiles,
];

/// Ordered artifact removals implied by one rollback level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadePlan {
    pub level: RollbackLevel,
    pub steps: Vec<CascadeStep>,
}

impl CascadePlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn removes(&self, class: ArtifactClass) -> bool {
        self.steps.iter().any(|s| s.class == class)
    }

    /// Split the plan into steps with artifacts present in `inventory` and
    /// steps whose artifacts are already gone. Cascade order is preserved.
    pub fn partition(&self, inventory: &ArtifactInventory) -> (Vec<CascadeStep>, Vec<CascadeStep>) {
        self.steps
            .iter()
            .copied()
            .partition(|step| inventory.contains(step))
    }
}

pub struct RollbackLevelPolicy;

impl RollbackLevelPolicy {
    /// Artifact classes invalidated by `level`, most derived first.
    pub fn cascade_for(level: RollbackLevel) -> &'static [ArtifactClass] {
        match level {
            RollbackLevel::File => FILE_CASCADE,
            RollbackLevel::Recon => RECON_CASCADE,
            RollbackLevel::Reports => REPORTS_CASCADE,
            RollbackLevel::Ttum => TTUM_CASCADE,
            RollbackLevel::Complete => COMPLETE_CASCADE,
        }
    }

    /// Lower levels whose whole effect is contained in `level`'s cascade.
    pub fn subsumed_levels(level: RollbackLevel) -> Vec<RollbackLevel> {
        let cascade = Self::cascade_for(level);
        RollbackLevel::ALL
            .into_iter()
            .filter(|lower| *lower < level)
            .filter(|lower| {
                Self::cascade_for(*lower)
                    .iter()
                    .all(|class| cascade.contains(class))
            })
            .collect()
    }

    /// Compute the cascade plan for rolling `run` back at `level`.
    ///
    /// File level is scoped to `cycle_id`; every other level is run-wide and
    /// must not carry a cycle.
    pub fn apply(
        level: RollbackLevel,
        run: &Run,
        cycle_id: Option<CycleId>,
    ) -> Result<CascadePlan, RollbackError> {
        let steps = match (level, cycle_id) {
            (RollbackLevel::File, Some(cycle)) => FILE_CASCADE
                .iter()
                .map(|class| CascadeStep::for_cycle(*class, cycle))
                .collect(),
            (RollbackLevel::File, None) => {
                return Err(RollbackError::Validation(format!(
                    "file-level rollback of run {} needs a cycle_id",
                    run.run_id
                )))
            }
            (_, Some(cycle)) => {
                return Err(RollbackError::Validation(format!(
                    "level `{}` is run-wide; cycle {} cannot be applied to run {}",
                    level, cycle, run.run_id
                )))
            }
            (_, None) => Self::cascade_for(level)
                .iter()
                .map(|class| CascadeStep::run_wide(*class))
                .collect(),
        };

        Ok(CascadePlan { level, steps })
    }
}
