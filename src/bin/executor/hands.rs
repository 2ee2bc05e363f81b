use anyhow::{Result, anyhow};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use proactive::plan::{Action, ExecutionStatus, Locator, StepResult, Target, TestPlan};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const ELEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A browser that can be reset to a clean page before each plan.
pub trait Session: Sized {
    fn reset(&mut self) -> Result<()>;
}

/// Reuses `current` when it can still be reset, otherwise launches a new one.
/// Chrome shuts itself down after a long idle period, so a session that
/// worked for the previous plan may be dead by the next.
pub fn ready_session<S: Session>(current: Option<S>, launch: impl FnOnce() -> Result<S>) -> Result<S> {
    if let Some(mut session) = current {
        match session.reset() {
            Ok(()) => return Ok(session),
            Err(e) => warn!("[Hands] Browser unusable ({:#}), relaunching...", e),
        }
    }
    launch()
}

/// Browser session shared across plans while it stays alive.
pub struct BrowserSession {
    browser: Browser,
    pub tab: Arc<Tab>,
}

impl Session for BrowserSession {
    fn reset(&mut self) -> Result<()> {
        self.new_tab()
    }
}

impl BrowserSession {
    pub fn launch(headless: bool, chrome_path: Option<PathBuf>) -> Result<Self> {
        let options = LaunchOptions {
            headless,
            sandbox: false,
            path: chrome_path,
            args: vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        info!("[Hands] Starting Chrome (headless={})...", headless);
        let browser =
            Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {}", e))?;

        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        info!("[Hands] Chrome ready.");

        Ok(Self { browser, tab })
    }

    /// Every plan starts from a fresh tab.
    pub fn new_tab(&mut self) -> Result<()> {
        let tab = self.browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        let old = std::mem::replace(&mut self.tab, tab);
        if let Err(e) = old.close(false) {
            debug!("[Hands] Could not close previous tab: {}", e);
        }
        Ok(())
    }
}

/// Outcome of running one plan in the browser.
pub struct PlanRun {
    pub status: ExecutionStatus,
    pub steps: Vec<StepResult>,
    pub total_runtime: u64,
    pub error: Option<String>,
}

/// Navigate to the plan's start URL and run its steps in order. The first
/// failing step stops the run; the steps after it are reported as skipped.
pub fn run_plan(tab: &Arc<Tab>, plan: &TestPlan) -> PlanRun {
    let started = Instant::now();
    let mut steps = Vec::with_capacity(plan.steps.len());
    let mut error = open_start_url(tab, &plan.start_url)
        .err()
        .map(|e| format!("Failed to open {}: {:#}", plan.start_url, e));

    for step in &plan.steps {
        if error.is_some() {
            steps.push(StepResult {
                name: step.name.clone(),
                status: ExecutionStatus::Skipped,
                duration: 0,
                error: None,
            });
            continue;
        }

        let step_started = Instant::now();
        let outcome = step.commands.iter().try_for_each(|command| {
            debug!("[Hands] {}", command);
            let action = command
                .action()
                .ok_or_else(|| anyhow!("Unsupported command: {}", command))?;
            perform(tab, &action)
        });
        let duration = step_started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => steps.push(StepResult {
                name: step.name.clone(),
                status: ExecutionStatus::Completed,
                duration,
                error: None,
            }),
            Err(e) => {
                let message = format!("{:#}", e);
                warn!("[Hands] Step '{}' failed: {}", step.name, message);
                steps.push(StepResult {
                    name: step.name.clone(),
                    status: ExecutionStatus::Failed,
                    duration,
                    error: Some(message.clone()),
                });
                error = Some(format!("Step '{}' failed: {}", step.name, message));
            }
        }
    }

    PlanRun {
        status: if error.is_none() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        },
        steps,
        total_runtime: started.elapsed().as_millis() as u64,
        error,
    }
}

fn open_start_url(tab: &Arc<Tab>, url: &str) -> Result<()> {
    tab.navigate_to(url)?.wait_until_navigated()?;
    tab.wait_for_element("body")?;
    Ok(())
}

fn locate<'a>(tab: &'a Arc<Tab>, locator: &Locator) -> Result<Element<'a>> {
    match locator.target() {
        Target::Css(selector) => tab.wait_for_element_with_custom_timeout(&selector, ELEMENT_TIMEOUT),
        Target::XPath(xpath) => tab.wait_for_xpath_with_custom_timeout(&xpath, ELEMENT_TIMEOUT),
    }
}

fn perform(tab: &Arc<Tab>, action: &Action) -> Result<()> {
    match action {
        Action::Click { locator } => {
            locate(tab, locator)?.click()?;
            std::thread::sleep(Duration::from_millis(500));
        }
        Action::SendKeys { locator, text } => {
            locate(tab, locator)?.type_into(text)?;
        }
        Action::PressKey { locator, key } => {
            locate(tab, locator)?.focus()?;
            tab.press_key(key)?;
            std::thread::sleep(Duration::from_millis(1000));
        }
        Action::WaitFor { locator } => {
            locate(tab, locator)?;
        }
    }
    Ok(())
}
