//! HTTP clients for the services talking to each other.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;

use crate::plan::{PlanSummary, TestPlan, TestResult};
use crate::scheduler::{PlanExecutor, PlanSource};
use crate::store::{NewTestResult, StatusUpdate};

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

fn base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Turns a non-2xx answer into an error carrying the body.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = if body.is_empty() {
        "No response data".to_string()
    } else {
        body
    };
    Err(anyhow!("{} - {}", status, body))
}

/// The backend's internal API.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    internal_secret: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str, internal_secret: Option<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base(base_url),
            internal_secret: internal_secret.filter(|s| !s.is_empty()),
        }
    }

    fn secret(&self) -> Result<&str> {
        self.internal_secret.as_deref().ok_or_else(|| {
            anyhow!("INTERNAL_SECRET is not configured; cannot call internal API")
        })
    }

    pub async fn get_plan(&self, id: &str) -> Result<TestPlan> {
        let response = self
            .client
            .get(format!("{}/tests/{}", self.base_url, id))
            .send()
            .await
            .with_context(|| format!("Failed to fetch test {}", id))?;

        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<()> {
        let response = self
            .client
            .patch(format!("{}/tests/internal/{}/status", self.base_url, id))
            .header(INTERNAL_SECRET_HEADER, self.secret()?)
            .json(update)
            .send()
            .await
            .with_context(|| format!("Failed to update status of test {}", id))?;

        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PlanSource for BackendClient {
    async fn fetch_all_test_plans(&self) -> Result<Vec<PlanSummary>> {
        let secret = self.secret()?;
        let response = self
            .client
            .get(format!("{}/tests/internal/all", self.base_url))
            .header(INTERNAL_SECRET_HEADER, secret)
            .send()
            .await
            .context("Failed to fetch tests")?;

        Ok(ensure_success(response).await?.json().await?)
    }
}

#[derive(Clone)]
pub struct ExecutorClient {
    client: Client,
    base_url: String,
}

impl ExecutorClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base(base_url),
        }
    }
}

#[async_trait]
impl PlanExecutor for ExecutorClient {
    async fn execute_test_plan(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            bail!("refusing to execute a test without an ID");
        }
        let response = self
            .client
            .post(format!("{}/execute/{}", self.base_url, id))
            .send()
            .await
            .with_context(|| format!("Failed to reach executor for test {}", id))?;

        ensure_success(response).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ResultsClient {
    client: Client,
    base_url: String,
}

impl ResultsClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base(base_url),
        }
    }

    pub async fn record(&self, result: &NewTestResult) -> Result<TestResult> {
        let response = self
            .client
            .post(format!("{}/results", self.base_url))
            .json(result)
            .send()
            .await
            .with_context(|| format!("Failed to report result for test {}", result.test_id))?;

        Ok(ensure_success(response).await?.json().await?)
    }
}
