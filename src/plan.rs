use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single atomic browser instruction, kept in its canonical text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(String);

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn click(locator: &Locator) -> Self {
        Self(format!("find_element({}).click()", locator))
    }

    pub fn send_keys(locator: &Locator, text: &str) -> Self {
        Self(format!("find_element({}).send_keys(\"{}\")", locator, text))
    }

    pub fn wait_for(locator: &Locator) -> Self {
        Self(format!("wait_for_element({})", locator))
    }

    /// Interpret the canonical text back into something the executor can run.
    /// Returns `None` for text that is not in one of the canonical shapes.
    pub fn action(&self) -> Option<Action> {
        let text = self.0.trim();

        if let Some(rest) = text.strip_prefix("wait_for_element(") {
            let inner = rest.strip_suffix(')')?;
            return Some(Action::WaitFor {
                locator: Locator::parse_args(inner)?,
            });
        }

        let rest = text.strip_prefix("find_element(")?;
        let close = rest.find("\").")?;
        let locator = Locator::parse_args(&rest[..close + 1])?;
        let call = &rest[close + 3..];

        if call == "click()" {
            return Some(Action::Click { locator });
        }

        let arg = call.strip_prefix("send_keys(")?.strip_suffix(')')?;
        let arg = arg.trim().trim_matches('"');
        match special_key(arg) {
            Some(key) => Some(Action::PressKey {
                locator,
                key: key.to_string(),
            }),
            None => Some(Action::SendKeys {
                locator,
                text: arg.to_string(),
            }),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Maps a Selenium `Keys.*` literal to the key name Chrome understands.
pub fn special_key(arg: &str) -> Option<&'static str> {
    match arg.trim() {
        "Keys.ENTER" | "Keys.RETURN" => Some("Enter"),
        "Keys.TAB" => Some("Tab"),
        "Keys.ESCAPE" => Some("Escape"),
        "Keys.BACKSPACE" => Some("Backspace"),
        _ => None,
    }
}

/// Selenium `By.*` locator strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum By {
    Id,
    Name,
    ClassName,
    TagName,
    CssSelector,
    XPath,
    LinkText,
    PartialLinkText,
}

impl By {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim() {
            "ID" => Some(Self::Id),
            "NAME" => Some(Self::Name),
            "CLASS_NAME" => Some(Self::ClassName),
            "TAG_NAME" => Some(Self::TagName),
            "CSS_SELECTOR" => Some(Self::CssSelector),
            "XPATH" => Some(Self::XPath),
            "LINK_TEXT" => Some(Self::LinkText),
            "PARTIAL_LINK_TEXT" => Some(Self::PartialLinkText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Name => "NAME",
            Self::ClassName => "CLASS_NAME",
            Self::TagName => "TAG_NAME",
            Self::CssSelector => "CSS_SELECTOR",
            Self::XPath => "XPATH",
            Self::LinkText => "LINK_TEXT",
            Self::PartialLinkText => "PARTIAL_LINK_TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub by: By,
    pub value: String,
}

impl Locator {
    pub fn new(by: By, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
        }
    }

    /// Parses `By.NAME, "q"` as found between the parentheses of a command.
    fn parse_args(args: &str) -> Option<Self> {
        let (kind, value) = args.split_once(',')?;
        let by = By::parse(kind.trim().strip_prefix("By.")?)?;
        let value = value.trim().strip_prefix('"')?.strip_suffix('"')?;
        Some(Self::new(by, value))
    }

    /// How the browser should look this element up.
    pub fn target(&self) -> Target {
        let v = &self.value;
        match self.by {
            By::Id => Target::Css(format!("#{}", v)),
            By::Name => Target::Css(format!("[name=\"{}\"]", v)),
            By::ClassName => Target::Css(format!(".{}", v)),
            By::TagName | By::CssSelector => Target::Css(v.clone()),
            By::XPath => Target::XPath(v.clone()),
            By::LinkText => Target::XPath(format!("//a[normalize-space()=\"{}\"]", v)),
            By::PartialLinkText => {
                Target::XPath(format!("//a[contains(normalize-space(), \"{}\")]", v))
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "By.{}, \"{}\"", self.by.as_str(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Css(String),
    XPath(String),
}

/// A command interpreted into something runnable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click { locator: Locator },
    SendKeys { locator: Locator, text: String },
    PressKey { locator: Locator, key: String },
    WaitFor { locator: Locator },
}

/// A named group of commands. `commands` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub commands: Vec<Command>,
}

impl Step {
    pub fn single(command: Command) -> Self {
        Self {
            name: command.to_string(),
            commands: vec![command],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPlan {
    pub id: String,
    pub start_url: String,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    /// Milliseconds the last run took.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the scheduler needs to know about a stored plan. The id is optional
/// because the listing comes over the wire and may be incomplete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: String,
    pub status: ExecutionStatus,
    /// Milliseconds.
    pub duration: u64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub test_id: String,
    pub status: ExecutionStatus,
    /// Unix millis when the run started.
    pub execution_time: i64,
    pub total_runtime: u64,
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interprets_canonical_commands() {
        let click = Command::new(r#"find_element(By.NAME, "search_query").click()"#);
        assert_eq!(
            click.action(),
            Some(Action::Click {
                locator: Locator::new(By::Name, "search_query")
            })
        );

        let typed = Command::new(r#"find_element(By.ID, "q").send_keys("nba")"#);
        assert_eq!(
            typed.action(),
            Some(Action::SendKeys {
                locator: Locator::new(By::Id, "q"),
                text: "nba".into()
            })
        );

        let enter = Command::new(r#"find_element(By.ID, "q").send_keys("Keys.ENTER")"#);
        assert!(matches!(enter.action(), Some(Action::PressKey { key, .. }) if key == "Enter"));

        let wait = Command::new(r#"wait_for_element(By.CSS_SELECTOR, "ytd-search #contents")"#);
        assert_eq!(
            wait.action(),
            Some(Action::WaitFor {
                locator: Locator::new(By::CssSelector, "ytd-search #contents")
            })
        );

        assert_eq!(Command::new("click(A)").action(), None);
    }

    #[test]
    fn builders_round_trip_through_action() {
        let loc = Locator::new(By::XPath, "//div[@id='x']");
        assert_eq!(
            Command::click(&loc).action(),
            Some(Action::Click { locator: loc.clone() })
        );
        assert_eq!(
            Command::wait_for(&loc).to_string(),
            r#"wait_for_element(By.XPATH, "//div[@id='x']")"#
        );
    }

    #[test]
    fn locator_targets() {
        assert_eq!(
            Locator::new(By::Name, "q").target(),
            Target::Css("[name=\"q\"]".into())
        );
        assert_eq!(Locator::new(By::Id, "main").target(), Target::Css("#main".into()));
        assert_eq!(
            Locator::new(By::LinkText, "Next").target(),
            Target::XPath("//a[normalize-space()=\"Next\"]".into())
        );
    }

    #[test]
    fn plan_summary_accepts_mongo_style_ids() {
        let s: PlanSummary = serde_json::from_str(r#"{"_id":"abc","startUrl":"x"}"#).unwrap();
        assert_eq!(s.id.as_deref(), Some("abc"));
        let s: PlanSummary = serde_json::from_str(r#"{"startUrl":"x"}"#).unwrap();
        assert!(s.id.is_none());
    }
}
