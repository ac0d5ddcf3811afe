use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::AppError;

/// One unit of work: a page to open and the base name of the file it yields.
///
/// Fields are private so a job cannot change once it has been enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    locator: Url,
    output_name: String,
    row: usize,
}

impl Job {
    /// Validate and build a job.
    ///
    /// `row` is the 1-based position in the input list, used in diagnostics.
    pub fn new(locator: &str, output_name: &str, row: usize) -> Result<Self, AppError> {
        let locator = Url::parse(locator.trim())
            .map_err(|e| AppError::Input(format!("row {row}: invalid URL '{locator}': {e}")))?;
        let output_name = output_name.trim();
        validate_output_name(output_name).map_err(|reason| {
            AppError::Input(format!(
                "row {row}: invalid output name '{output_name}': {reason}"
            ))
        })?;

        Ok(Self {
            locator,
            output_name: output_name.to_string(),
            row,
        })
    }

    pub fn locator(&self) -> &Url {
        &self.locator
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn row(&self) -> usize {
        self.row
    }
}

/// The output name becomes a file name directly under the output directory,
/// so it must not be able to address anything else.
fn validate_output_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("must not be empty");
    }
    if name == "." || name == ".." {
        return Err("must not be a relative directory");
    }
    if name.contains(['/', '\\']) {
        return Err("must not contain path separators");
    }
    if name.contains('\0') {
        return Err("must not contain NUL");
    }
    Ok(())
}

/// How the download trigger is located on the page.
///
/// Exactly one variant is chosen per run and shared read-only by all workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", content = "value", rename_all = "lowercase")]
pub enum SelectorSpec {
    Name(String),
    #[serde(rename = "xpath")]
    XPath(String),
    Id(String),
    #[serde(rename = "tag")]
    TagName(String),
    #[serde(rename = "class")]
    ClassName(String),
    #[serde(rename = "css")]
    CssSelector(String),
}

/// A selector a browser can evaluate directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl SelectorSpec {
    /// Build a selector from a strategy keyword (`name`, `xpath`, `id`,
    /// `tag`, `class`, `css`) and its value.
    pub fn new(strategy: &str, value: impl Into<String>) -> Result<Self, AppError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Config(format!(
                "Selector value for '{strategy}' must not be empty"
            )));
        }
        match strategy.to_lowercase().as_str() {
            "name" => Ok(SelectorSpec::Name(value)),
            "xpath" => Ok(SelectorSpec::XPath(value)),
            "id" => Ok(SelectorSpec::Id(value)),
            "tag" => Ok(SelectorSpec::TagName(value)),
            "class" => Ok(SelectorSpec::ClassName(value)),
            "css" => Ok(SelectorSpec::CssSelector(value)),
            _ => Err(AppError::Config(format!(
                "Unknown selector strategy: {strategy}"
            ))),
        }
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            SelectorSpec::Name(_) => "name",
            SelectorSpec::XPath(_) => "xpath",
            SelectorSpec::Id(_) => "id",
            SelectorSpec::TagName(_) => "tag",
            SelectorSpec::ClassName(_) => "class",
            SelectorSpec::CssSelector(_) => "css",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            SelectorSpec::Name(v)
            | SelectorSpec::XPath(v)
            | SelectorSpec::Id(v)
            | SelectorSpec::TagName(v)
            | SelectorSpec::ClassName(v)
            | SelectorSpec::CssSelector(v) => v,
        }
    }

    /// Resolve to the one query a driver runs. Never falls back to another strategy.
    pub fn to_locator(&self) -> Locator {
        match self {
            SelectorSpec::Name(v) => Locator::Css(format!("[name=\"{}\"]", escape_attr(v))),
            SelectorSpec::Id(v) => Locator::Css(format!("[id=\"{}\"]", escape_attr(v))),
            SelectorSpec::TagName(v) => Locator::Css(v.clone()),
            SelectorSpec::ClassName(v) => Locator::Css(format!(".{v}")),
            SelectorSpec::CssSelector(v) => Locator::Css(v.clone()),
            SelectorSpec::XPath(v) => Locator::XPath(v.clone()),
        }
    }
}

impl fmt::Display for SelectorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Index of a worker in the pool; also its slot in the staging table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

impl WorkerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_accepts_valid_row() {
        let job = Job::new(" https://example.com/export ", " report_2024 ", 3).unwrap();
        assert_eq!(job.locator().as_str(), "https://example.com/export");
        assert_eq!(job.output_name(), "report_2024");
        assert_eq!(job.row(), 3);
    }

    #[test]
    fn test_job_rejects_bad_url() {
        let err = Job::new("not a url", "out", 1).unwrap_err();
        assert!(matches!(err, AppError::Input(msg) if msg.contains("row 1")));
    }

    #[test]
    fn test_job_rejects_escaping_names() {
        for name in ["", "..", ".", "../etc/passwd", "a/b", "a\\b"] {
            assert!(
                Job::new("https://example.com", name, 1).is_err(),
                "accepted {name:?}"
            );
        }
    }

    #[test]
    fn test_selector_strategy_keywords() {
        for (keyword, spec) in [
            ("name", SelectorSpec::Name("q".into())),
            ("xpath", SelectorSpec::XPath("q".into())),
            ("id", SelectorSpec::Id("q".into())),
            ("tag", SelectorSpec::TagName("q".into())),
            ("class", SelectorSpec::ClassName("q".into())),
            ("css", SelectorSpec::CssSelector("q".into())),
        ] {
            let parsed = SelectorSpec::new(keyword, "q").unwrap();
            assert_eq!(parsed, spec);
            assert_eq!(parsed.strategy(), keyword);
        }
    }

    #[test]
    fn test_selector_rejects_unknown_and_empty() {
        assert!(SelectorSpec::new("link_text", "Download").is_err());
        assert!(SelectorSpec::new("css", "  ").is_err());
    }

    #[test]
    fn test_css_selector_passes_through_unchanged() {
        let spec = SelectorSpec::new("css", "#btn").unwrap();
        assert_eq!(spec.to_locator(), Locator::Css("#btn".into()));
    }

    #[test]
    fn test_attribute_selectors_are_quoted() {
        assert_eq!(
            SelectorSpec::Name("dl\"x".into()).to_locator(),
            Locator::Css("[name=\"dl\\\"x\"]".into())
        );
        assert_eq!(
            SelectorSpec::Id("export-btn".into()).to_locator(),
            Locator::Css("[id=\"export-btn\"]".into())
        );
        assert_eq!(
            SelectorSpec::ClassName("download".into()).to_locator(),
            Locator::Css(".download".into())
        );
        assert_eq!(
            SelectorSpec::XPath("//a[@download]".into()).to_locator(),
            Locator::XPath("//a[@download]".into())
        );
    }

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId(7).to_string(), "worker-7");
    }
}
