//! Groups an ordered command list into named steps.
//!
//! A [`SemanticGrouper`] may propose richer groups. Its answer is only used
//! when every step is non-empty and the steps, concatenated, give back the
//! exact input. Anything else falls back to one step per command.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::GroupingError;
use crate::plan::{Command, Step};

/// An external service that proposes step boundaries for a command list.
#[async_trait]
pub trait SemanticGrouper: Send + Sync {
    async fn propose(&self, commands: &[Command]) -> Result<Vec<Step>, GroupingError>;
}

#[derive(Clone, Default)]
pub struct StepGrouper {
    collaborator: Option<Arc<dyn SemanticGrouper>>,
}

impl StepGrouper {
    pub fn new(collaborator: Arc<dyn SemanticGrouper>) -> Self {
        Self {
            collaborator: Some(collaborator),
        }
    }

    /// A grouper that always uses the one-command-per-step grouping.
    pub fn fallback_only() -> Self {
        Self::default()
    }

    pub fn has_collaborator(&self) -> bool {
        self.collaborator.is_some()
    }

    pub async fn group(&self, commands: &[Command]) -> Vec<Step> {
        if commands.is_empty() {
            return Vec::new();
        }

        let Some(collaborator) = &self.collaborator else {
            return fallback_steps(commands);
        };

        let proposal = collaborator
            .propose(commands)
            .await
            .and_then(|steps| validate(commands, steps));

        match proposal {
            Ok(steps) => {
                debug!("Grouped {} commands into {} steps", commands.len(), steps.len());
                steps
            }
            Err(e) => {
                warn!("{}, falling back to individual steps", e);
                fallback_steps(commands)
            }
        }
    }
}

/// One step per command, named after the command itself.
pub fn fallback_steps(commands: &[Command]) -> Vec<Step> {
    commands.iter().cloned().map(Step::single).collect()
}

/// Checks that `steps` only inserted boundaries into `commands`.
pub fn validate(commands: &[Command], steps: Vec<Step>) -> Result<Vec<Step>, GroupingError> {
    if steps.iter().any(|s| s.commands.is_empty()) {
        return Err(GroupingError::Reconstruction);
    }

    let rebuilt = steps.iter().flat_map(|s| s.commands.iter());
    if !rebuilt.eq(commands.iter()) {
        return Err(GroupingError::Reconstruction);
    }

    Ok(steps)
}
