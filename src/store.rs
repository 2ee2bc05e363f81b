//! JSON-file persistence for test plans and execution results.
//!
//! Each store keeps its records in memory and rewrites its file after every
//! mutation.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::plan::{ExecutionStatus, Step, StepResult, TestPlan, TestResult};

pub const PLANS_FILE: &str = "tests.json";
pub const RESULTS_FILE: &str = "results.json";

fn load_records<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Writes to a sibling temp file and renames it over `path`, so a crash
/// mid-write never leaves a truncated store behind.
fn save_records<T: Serialize>(path: &Path, records: &[T]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Fields supplied by the extraction pipeline when a plan is created.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub start_url: String,
    pub steps: Vec<Step>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub execution_time: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct PlanStore {
    path: PathBuf,
    plans: RwLock<Vec<TestPlan>>,
}

impl PlanStore {
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let path = data_dir.join(PLANS_FILE);
        let plans = load_records(&path)?;
        Ok(Self {
            path,
            plans: RwLock::new(plans),
        })
    }

    pub async fn create(&self, new: NewPlan) -> StoreResult<TestPlan> {
        let now = Utc::now();
        let plan = TestPlan {
            id: Uuid::new_v4().to_string(),
            start_url: new.start_url,
            steps: new.steps,
            name: new.name,
            description: new.description,
            status: None,
            last_execution_time: None,
            last_error: None,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut plans = self.plans.write().await;
        let mut next = plans.clone();
        next.push(plan.clone());
        save_records(&self.path, next.as_slice())?;
        *plans = next;
        info!("Created test with ID: {}", plan.id);
        Ok(plan)
    }

    pub async fn find_all(&self) -> Vec<TestPlan> {
        self.plans.read().await.clone()
    }

    pub async fn find(&self, id: &str) -> StoreResult<TestPlan> {
        self.plans
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::test_not_found(id))
    }

    pub async fn update_details(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> StoreResult<TestPlan> {
        self.modify(id, |plan| {
            if name.is_some() {
                plan.name = name;
            }
            if description.is_some() {
                plan.description = description;
            }
        })
        .await
    }

    pub async fn update_status(&self, id: &str, update: StatusUpdate) -> StoreResult<TestPlan> {
        self.modify(id, |plan| {
            plan.status = Some(update.status);
            plan.last_execution_time = update.execution_time;
            plan.last_error = update.error;
            plan.last_run_at = Some(Utc::now());
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut plans = self.plans.write().await;
        let next: Vec<TestPlan> = plans.iter().filter(|p| p.id != id).cloned().collect();
        if next.len() == plans.len() {
            return Err(StoreError::test_not_found(id));
        }
        save_records(&self.path, next.as_slice())?;
        *plans = next;
        info!("Deleted test with ID: {}", id);
        Ok(())
    }

    async fn modify(&self, id: &str, change: impl FnOnce(&mut TestPlan)) -> StoreResult<TestPlan> {
        let mut plans = self.plans.write().await;
        let mut next = plans.clone();
        let plan = next
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::test_not_found(id))?;
        change(plan);
        plan.updated_at = Utc::now();
        let updated = plan.clone();
        save_records(&self.path, next.as_slice())?;
        *plans = next;
        Ok(updated)
    }
}

/// The outcome report an executor posts after running a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTestResult {
    pub test_id: String,
    pub status: ExecutionStatus,
    pub execution_time: i64,
    pub total_runtime: u64,
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStats {
    pub name: String,
    pub success_rate: f64,
    pub average_duration: f64,
    pub total_runs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultStats {
    pub total_runs: usize,
    pub success_rate: f64,
    pub average_execution_time: f64,
    pub step_stats: Vec<StepStats>,
}

pub struct ResultStore {
    path: PathBuf,
    results: RwLock<Vec<TestResult>>,
}

impl ResultStore {
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let path = data_dir.join(RESULTS_FILE);
        let results = load_records(&path)?;
        Ok(Self {
            path,
            results: RwLock::new(results),
        })
    }

    pub async fn record(&self, new: NewTestResult) -> StoreResult<TestResult> {
        let result = TestResult {
            id: Uuid::new_v4().to_string(),
            test_id: new.test_id,
            status: new.status,
            execution_time: new.execution_time,
            total_runtime: new.total_runtime,
            steps: new.steps,
            error: new.error,
            created_at: Utc::now(),
        };

        let mut results = self.results.write().await;
        let mut next = results.clone();
        next.push(result.clone());
        save_records(&self.path, next.as_slice())?;
        *results = next;
        info!("Saved test result with ID: {}", result.id);
        Ok(result)
    }

    pub async fn list(&self, test_id: Option<&str>) -> Vec<TestResult> {
        let results = self.results.read().await;
        match test_id {
            Some(test_id) => results
                .iter()
                .filter(|r| r.test_id == test_id)
                .cloned()
                .collect(),
            None => results.clone(),
        }
    }

    pub async fn find(&self, id: &str) -> StoreResult<TestResult> {
        self.results
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::result_not_found(id))
    }

    pub async fn latest(&self, test_id: &str) -> StoreResult<TestResult> {
        self.results
            .read()
            .await
            .iter()
            .filter(|r| r.test_id == test_id)
            .max_by_key(|r| r.created_at)
            .cloned()
            .ok_or_else(|| StoreError::result_not_found(test_id))
    }

    pub async fn stats(&self, test_id: &str) -> ResultStats {
        compute_stats(&self.list(Some(test_id)).await)
    }
}

/// Success means `completed`. Step statistics are keyed by step name and keep
/// first-seen order.
pub fn compute_stats(results: &[TestResult]) -> ResultStats {
    if results.is_empty() {
        return ResultStats {
            total_runs: 0,
            success_rate: 0.0,
            average_execution_time: 0.0,
            step_stats: Vec::new(),
        };
    }

    let runs = results.len() as f64;
    let successes = results
        .iter()
        .filter(|r| r.status == ExecutionStatus::Completed)
        .count();
    let total_runtime: u64 = results.iter().map(|r| r.total_runtime).sum();

    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, (usize, usize, u64)> = HashMap::new();
    for step in results.iter().flat_map(|r| r.steps.iter()) {
        let entry = by_name.entry(step.name.clone()).or_insert_with(|| {
            order.push(step.name.clone());
            (0, 0, 0)
        });
        entry.0 += 1;
        if step.status == ExecutionStatus::Completed {
            entry.1 += 1;
        }
        entry.2 += step.duration;
    }

    let step_stats = order
        .into_iter()
        .filter_map(|name| {
            let (total, success, duration) = by_name.get(&name).copied()?;
            Some(StepStats {
                success_rate: success as f64 / total as f64,
                average_duration: duration as f64 / total as f64,
                total_runs: total,
                name,
            })
        })
        .collect();

    ResultStats {
        total_runs: results.len(),
        success_rate: successes as f64 / runs,
        average_execution_time: total_runtime as f64 / runs,
        step_stats,
    }
}

/// Where the services keep their files when no directory is configured.
pub fn default_data_dir() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("proactive"),
        None => {
            warn!("No local data directory on this platform, using ./data");
            PathBuf::from("data")
        }
    }
}
