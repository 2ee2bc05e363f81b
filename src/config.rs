//! Per-service settings, read from flags or the environment (`.env` is loaded
//! first by each binary).

use clap::Parser;
use std::path::PathBuf;

use crate::brain::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::store::default_data_dir;

#[derive(Debug, Clone, Parser)]
#[command(name = "backend", about = "Test plan upload, CRUD and result API")]
pub struct BackendConfig {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding tests.json and results.json.
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "INTERNAL_SECRET", hide_env_values = true)]
    pub internal_secret: Option<String>,

    /// Enables LLM step grouping when set.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,
}

impl BackendConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "timer", about = "Periodically dispatches every test plan to the executor")]
pub struct TimerConfig {
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:3000")]
    pub backend_url: String,

    #[arg(long, env = "EXECUTOR_URL", default_value = "http://localhost:8000")]
    pub executor_url: String,

    #[arg(long, env = "INTERNAL_SECRET", hide_env_values = true)]
    pub internal_secret: Option<String>,

    #[arg(long, env = "EXECUTION_INTERVAL_MINUTES", default_value_t = 5)]
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "executor", about = "Runs test plans in headless Chrome")]
pub struct ExecutorConfig {
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:3000")]
    pub backend_url: String,

    /// Where results are recorded. Defaults to the backend.
    #[arg(long, env = "RESULTS_URL")]
    pub results_url: Option<String>,

    #[arg(long, env = "INTERNAL_SECRET", hide_env_values = true)]
    pub internal_secret: Option<String>,

    #[arg(long, env = "HEADLESS", default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,

    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Plans waiting for the browser before new requests are refused.
    #[arg(long, env = "EXECUTOR_QUEUE", default_value_t = 32)]
    pub queue: usize,
}

impl ExecutorConfig {
    pub fn results_url(&self) -> &str {
        self.results_url.as_deref().unwrap_or(&self.backend_url)
    }
}
