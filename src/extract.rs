//! Turns a Python/Selenium test script into a start URL and an ordered list
//! of canonical commands.
//!
//! Scanning is line based. Only lines inside a `def test…` body contribute
//! commands; a `setUp`/`tearDown` definition closes the body again, so driver
//! calls made by fixtures are never captured.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::error::ExtractionError;
use crate::plan::{Action, By, Command, Locator};

static START_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:self\.)?driver\.get\(\s*(?:"([^"]+)"|'([^']+)')\s*\)"#).expect("valid regex")
});

static TEST_METHOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:async\s+)?def\s+test\w*\s*\(").expect("valid regex"));

static FIXTURE_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:async\s+)?def\s+(?:set_?up|tear_?down)\w*\s*\(").expect("valid regex")
});

static DRIVER_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:self\.)?driver\.find_element\(\s*By\.(\w+)\s*,\s*(?:"([^"]+)"|'([^']+)')\s*\)\.(?:(click)\(\)|send_keys\(([^)]+)\))"#,
    )
    .expect("valid regex")
});

/// Selector of the search results container that has to exist before the
/// results can be interacted with.
pub const RESULTS_CONTAINER: &str = "ytd-search #contents";

/// Absolute XPaths into the app shell break whenever the layout shifts.
pub const UNSTABLE_SELECTOR: &str = "/html/body/ytd-app/";

pub const STABLE_RESULT_SELECTOR: &str = "ytd-video-renderer a#video-title";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub start_url: String,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Outside,
    TestBody,
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    TestStart,
    FixtureStart,
    Action(Command),
    Other,
}

fn classify(line: &str) -> Line {
    if TEST_METHOD.is_match(line) {
        return Line::TestStart;
    }
    if FIXTURE_METHOD.is_match(line) {
        return Line::FixtureStart;
    }
    match normalize_action(line) {
        Some(command) => Line::Action(command),
        None => Line::Other,
    }
}

/// A string literal is captured by one group per quote style; `double` is the
/// index of the double-quoted one.
fn literal<'h>(caps: &Captures<'h>, double: usize) -> Option<&'h str> {
    caps.get(double)
        .or_else(|| caps.get(double + 1))
        .map(|m| m.as_str())
}

fn normalize_action(line: &str) -> Option<Command> {
    let caps = DRIVER_ACTION.captures(line)?;
    let by = By::parse(&caps[1])?;
    let locator = Locator::new(by, literal(&caps, 2)?);

    if caps.get(4).is_some() {
        return Some(Command::click(&locator));
    }

    let text = caps.get(5)?.as_str().replace(['\'', '"'], "");
    Some(Command::send_keys(&locator, text.trim()))
}

/// Extract the start URL and the post-processed command list from `script`.
pub fn extract(script: &str) -> Result<Extraction, ExtractionError> {
    let start_url = find_start_url(script).ok_or(ExtractionError::NoStartUrl)?;
    let commands = post_process(scan_commands(script));
    Ok(Extraction {
        start_url,
        commands,
    })
}

pub fn find_start_url(script: &str) -> Option<String> {
    script
        .lines()
        .find_map(|line| START_URL.captures(line))
        .and_then(|caps| literal(&caps, 1).map(str::to_string))
}

/// Commands found inside test bodies, in encounter order, before any
/// corrective pass.
pub fn scan_commands(script: &str) -> Vec<Command> {
    let mut region = Region::Outside;
    let mut commands = Vec::new();

    for line in script.lines() {
        match (region, classify(line)) {
            (_, Line::TestStart) => region = Region::TestBody,
            (_, Line::FixtureStart) => region = Region::Outside,
            (Region::TestBody, Line::Action(command)) => commands.push(command),
            _ => {}
        }
    }

    commands
}

/// Applies the two corrective passes, in order: a wait after the first Enter
/// press, then the stable selector for result clicks.
pub fn post_process(mut commands: Vec<Command>) -> Vec<Command> {
    if let Some(pos) = commands.iter().position(presses_enter) {
        let wait = Command::wait_for(&Locator::new(By::CssSelector, RESULTS_CONTAINER));
        commands.insert(pos + 1, wait);
    }

    for command in commands.iter_mut() {
        if let Some(Action::Click { locator }) = command.action() {
            if locator.value.contains(UNSTABLE_SELECTOR) {
                *command =
                    Command::click(&Locator::new(By::CssSelector, STABLE_RESULT_SELECTOR));
            }
        }
    }

    commands
}

fn presses_enter(command: &Command) -> bool {
    matches!(command.action(), Some(Action::PressKey { key, .. }) if key == "Enter")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_SCRIPT: &str = r#"
import unittest
from selenium import webdriver
from selenium.webdriver.common.by import By
from selenium.webdriver.common.keys import Keys

class TestSearch(unittest.TestCase):
    def setUp(self):
        self.driver = webdriver.Chrome()
        self.driver.find_element(By.ID, "consent").click()

    def test_search(self):
        self.driver.get("https://www.youtube.com/")
        self.driver.find_element(By.NAME, "search_query").click()
        self.driver.find_element(By.NAME, "search_query").send_keys("nba")
        self.driver.find_element(By.NAME, "search_query").send_keys(Keys.ENTER)
        self.driver.find_element(By.XPATH, "/html/body/ytd-app/div[1]/ytd-page-manager/ytd-search").click()

    def tearDown(self):
        self.driver.find_element(By.ID, "logout").click()
        self.driver.quit()
"#;

    #[test]
    fn scenario_single_click() {
        let script = r#"
class T:
    def test_x(self):
        self.driver.get("https://example.com")
        self.driver.find_element(By.ID, "go").click()
"#;
        let out = extract(script).unwrap();
        assert_eq!(out.start_url, "https://example.com");
        assert_eq!(
            out.commands,
            vec![Command::new(r#"find_element(By.ID, "go").click()"#)]
        );
    }

    #[test]
    fn missing_start_url_is_an_error() {
        let script = "def test_x(self):\n    self.driver.find_element(By.ID, \"go\").click()\n";
        assert_eq!(extract(script), Err(ExtractionError::NoStartUrl));
    }

    #[test]
    fn empty_command_list_is_valid() {
        let out = extract("self.driver.get('https://example.com')").unwrap();
        assert_eq!(out.start_url, "https://example.com");
        assert!(out.commands.is_empty());
    }

    #[test]
    fn fixture_only_actions_are_ignored() {
        let script = r#"
    def setUp(self):
        self.driver.get("https://example.com")
        self.driver.find_element(By.ID, "a").click()
    def tearDown(self):
        self.driver.find_element(By.ID, "b").click()
"#;
        assert!(scan_commands(script).is_empty());
        assert_eq!(extract(script).unwrap().start_url, "https://example.com");
    }

    #[test]
    fn teardown_closes_test_body() {
        let commands = scan_commands(SEARCH_SCRIPT);
        assert_eq!(commands.len(), 4);
        assert!(commands.iter().all(|c| !c.as_str().contains("consent")));
        assert!(commands.iter().all(|c| !c.as_str().contains("logout")));
    }

    #[test]
    fn send_keys_quotes_are_stripped() {
        let line = r#"        self.driver.find_element(By.NAME, "q").send_keys('hello world')"#;
        assert_eq!(
            normalize_action(line),
            Some(Command::new(
                r#"find_element(By.NAME, "q").send_keys("hello world")"#
            ))
        );
    }

    #[test]
    fn unrecognized_lines_are_skipped() {
        assert_eq!(classify("        time.sleep(2)"), Line::Other);
        assert_eq!(
            classify(r#"self.driver.find_element(By.BOGUS, "x").click()"#),
            Line::Other
        );
        assert_eq!(classify("    def test_login(self):"), Line::TestStart);
        assert_eq!(classify("    def setUpClass(cls):"), Line::FixtureStart);
        assert_eq!(classify("    def teardown_method(self):"), Line::FixtureStart);
    }

    #[test]
    fn wait_inserted_after_first_enter_only() {
        let commands = vec![
            Command::new(r#"find_element(By.NAME, "q").click()"#),
            Command::new(r#"find_element(By.NAME, "q").send_keys("nba")"#),
            Command::new(r#"find_element(By.NAME, "q").send_keys("Keys.ENTER")"#),
            Command::new(r#"find_element(By.ID, "x").click()"#),
            Command::new(r#"find_element(By.NAME, "q").send_keys("Keys.ENTER")"#),
        ];
        let out = post_process(commands.clone());

        assert_eq!(out.len(), commands.len() + 1);
        assert_eq!(
            out[3],
            Command::new(r#"wait_for_element(By.CSS_SELECTOR, "ytd-search #contents")"#)
        );
        assert_eq!(&out[..3], &commands[..3]);
        assert_eq!(&out[4..], &commands[3..]);
    }

    #[test]
    fn unstable_result_click_is_rewritten() {
        let out = extract(SEARCH_SCRIPT).unwrap();
        assert_eq!(out.start_url, "https://www.youtube.com/");
        assert_eq!(out.commands.len(), 5);
        assert_eq!(
            out.commands[4],
            Command::new(r#"find_element(By.CSS_SELECTOR, "ytd-video-renderer a#video-title").click()"#)
        );
        assert_eq!(
            out.commands[2],
            Command::new(r#"find_element(By.NAME, "search_query").send_keys("Keys.ENTER")"#)
        );
    }

    #[test]
    fn selectors_with_quoted_attributes_are_kept() {
        let script = r#"
class T:
    def test_x(self):
        self.driver.get("https://example.com/?q='x'")
        self.driver.find_element(By.XPATH, "//button[@id='submit']").click()
        self.driver.find_element(By.CSS_SELECTOR, "input[name='q']").send_keys("nba")
        self.driver.find_element(By.CSS_SELECTOR, 'a[title="Home"]').click()
"#;
        let out = extract(script).unwrap();
        assert_eq!(out.start_url, "https://example.com/?q='x'");
        assert_eq!(
            out.commands,
            vec![
                Command::new(r#"find_element(By.XPATH, "//button[@id='submit']").click()"#),
                Command::new(
                    r#"find_element(By.CSS_SELECTOR, "input[name='q']").send_keys("nba")"#
                ),
                Command::new(r#"find_element(By.CSS_SELECTOR, "a[title="Home"]").click()"#),
            ]
        );
        assert!(matches!(
            out.commands[0].action(),
            Some(Action::Click { locator }) if locator.value == "//button[@id='submit']"
        ));
    }

    #[test]
    fn return_key_counts_as_enter() {
        let commands = vec![
            Command::new(r#"find_element(By.NAME, "q").send_keys("nba")"#),
            Command::new(r#"find_element(By.NAME, "q").send_keys("Keys.RETURN")"#),
            Command::new(r#"find_element(By.ID, "x").click()"#),
        ];
        let out = post_process(commands);

        assert_eq!(out.len(), 4);
        assert_eq!(
            out[2],
            Command::new(r#"wait_for_element(By.CSS_SELECTOR, "ytd-search #contents")"#)
        );
    }

    #[test]
    fn extraction_is_deterministic() {
        assert_eq!(extract(SEARCH_SCRIPT), extract(SEARCH_SCRIPT));
    }
}
