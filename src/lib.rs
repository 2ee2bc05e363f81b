pub mod backend;
pub mod brain;
pub mod clients;
pub mod config;
pub mod error;
pub mod extract;
pub mod group;
pub mod plan;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod telemetry;

use serde::Serialize;

pub use error::{ExtractionError, GroupingError, SchedulerError, StoreError};
pub use group::StepGrouper;
pub use plan::{Command, Step, TestPlan};

/// A test plan as produced from a script, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTest {
    pub start_url: String,
    pub steps: Vec<Step>,
}

/// Extract commands from `script` and group them into steps.
pub async fn plan_from_script(
    script: &str,
    grouper: &StepGrouper,
) -> Result<PlannedTest, ExtractionError> {
    let extraction = extract::extract(script)?;
    let steps = grouper.group(&extraction.commands).await;
    Ok(PlannedTest {
        start_url: extraction.start_url,
        steps,
    })
}
