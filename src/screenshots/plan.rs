use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::jsonc;

pub const DEFAULT_UDID: &str = "booted";
pub const DEFAULT_OUTPUT_DIR: &str = "./screenshots/raw";
pub const DEFAULT_WAIT_FOR_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WAIT_FOR_POLL_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("read plan {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse plan JSON: {0}")]
    ParseJson(#[source] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] PlanValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanValidationCode {
    UnsupportedVersion,
    MissingBundleId,
    MissingSteps,
    NegativePostActionDelay,
    MissingAction,
    TapMissingTarget,
    TypeMissingText,
    KeycodesMissing,
    KeycodeInvalid,
    WaitMissingDurationMs,
    WaitForMissingMatcher,
    WaitForNegativeTimeout,
    WaitForNegativePoll,
    ScreenshotMissingName,
    UnsupportedAction,
}

impl PlanValidationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedVersion => "unsupported_version",
            Self::MissingBundleId => "missing_bundle_id",
            Self::MissingSteps => "missing_steps",
            Self::NegativePostActionDelay => "negative_post_action_delay",
            Self::MissingAction => "missing_action",
            Self::TapMissingTarget => "tap_missing_target",
            Self::TypeMissingText => "type_missing_text",
            Self::KeycodesMissing => "keycodes_missing",
            Self::KeycodeInvalid => "keycode_invalid",
            Self::WaitMissingDurationMs => "wait_missing_duration_ms",
            Self::WaitForMissingMatcher => "wait_for_missing_matcher",
            Self::WaitForNegativeTimeout => "wait_for_negative_timeout",
            Self::WaitForNegativePoll => "wait_for_negative_poll",
            Self::ScreenshotMissingName => "screenshot_missing_name",
            Self::UnsupportedAction => "unsupported_action",
        }
    }
}

impl fmt::Display for PlanValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plan rejected by validation. `step` is 1-based; 0 means the plan header.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct PlanValidationError {
    pub code: PlanValidationCode,
    pub step: usize,
    pub message: String,
}

impl PlanValidationError {
    fn new(code: PlanValidationCode, step: usize, message: impl Into<String>) -> Self {
        Self {
            code,
            step,
            message: message.into(),
        }
    }
}

// ─── On-disk shape ───────────────────────────────────────────────────────────

/// The plan file as written: a flat object per step. Turned into a [`Plan`]
/// by [`PlanFile::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub app: PlanApp,
    #[serde(default)]
    pub defaults: PlanDefaults,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanApp {
    #[serde(default, alias = "bundleId")]
    pub bundle_id: String,
    #[serde(default)]
    pub udid: Option<String>,
    #[serde(default, alias = "outputDir")]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanDefaults {
    #[serde(default, alias = "postActionDelayMs")]
    pub post_action_delay_ms: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanStep {
    #[serde(default)]
    pub action: String,
    pub name: Option<String>,
    pub label: Option<String>,
    pub id: Option<String>,
    pub contains: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub keycodes: Vec<i64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    #[serde(alias = "durationMs")]
    pub duration_ms: Option<i64>,
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: Option<i64>,
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: Option<i64>,
}

// ─── Validated plan ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TapTarget {
    Label(String),
    Id(String),
    Point { x: f64, y: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Label(String),
    Id(String),
    Contains(String),
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Label(v) => write!(f, "label {v:?}"),
            Matcher::Id(v) => write!(f, "id {v:?}"),
            Matcher::Contains(v) => write!(f, "text containing {v:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Launch,
    Tap(TapTarget),
    Type { text: String },
    KeySequence { keycodes: Vec<u32> },
    Wait { duration: Duration },
    WaitFor { matcher: Matcher, timeout: Duration, poll: Duration },
    Screenshot { name: String },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Launch => "launch",
            Step::Tap(_) => "tap",
            Step::Type { .. } => "type",
            Step::KeySequence { .. } => "key_sequence",
            Step::Wait { .. } => "wait",
            Step::WaitFor { .. } => "wait_for",
            Step::Screenshot { .. } => "screenshot",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub bundle_id: String,
    pub udid: String,
    pub output_dir: PathBuf,
    pub post_action_delay: Duration,
    pub steps: Vec<Step>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0).unsigned_abs())
}

/// Positive override or the default.
fn millis_or(ms: Option<i64>, default: u64) -> Duration {
    match ms {
        Some(ms) if ms > 0 => millis(ms),
        _ => Duration::from_millis(default),
    }
}

/// Captures land at `<output_dir>/<name>.png`, so the name must stay a
/// single path segment.
fn is_file_stem(name: &str) -> bool {
    !name.contains(['/', '\\']) && !name.contains("..")
}

impl PlanFile {
    pub fn validate(self) -> Result<Plan, PlanValidationError> {
        use PlanValidationCode as Code;

        if self.version != 1 {
            return Err(PlanValidationError::new(
                Code::UnsupportedVersion,
                0,
                format!("unsupported plan version {} (expected 1)", self.version),
            ));
        }
        let bundle_id = self.app.bundle_id.trim().to_string();
        if bundle_id.is_empty() {
            return Err(PlanValidationError::new(Code::MissingBundleId, 0, "app.bundle_id is required"));
        }
        if self.steps.is_empty() {
            return Err(PlanValidationError::new(Code::MissingSteps, 0, "at least one step is required"));
        }
        if self.defaults.post_action_delay_ms < 0 {
            return Err(PlanValidationError::new(
                Code::NegativePostActionDelay,
                0,
                "defaults.post_action_delay_ms must be >= 0",
            ));
        }

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| step.validate(i + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Plan {
            bundle_id,
            udid: non_blank(&self.app.udid).unwrap_or_else(|| DEFAULT_UDID.to_string()),
            output_dir: PathBuf::from(non_blank(&self.app.output_dir).unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string())),
            post_action_delay: millis(self.defaults.post_action_delay_ms),
            steps,
        })
    }
}

impl PlanStep {
    fn validate(&self, idx: usize) -> Result<Step, PlanValidationError> {
        use PlanValidationCode as Code;
        let fail = |code, message: String| Err(PlanValidationError::new(code, idx, message));

        let action = self.action.trim().to_lowercase();
        match action.as_str() {
            "" => fail(Code::MissingAction, format!("steps[{idx}].action is required")),
            "launch" => Ok(Step::Launch),
            "tap" => {
                if let Some(label) = non_blank(&self.label) {
                    Ok(Step::Tap(TapTarget::Label(label)))
                } else if let Some(id) = non_blank(&self.id) {
                    Ok(Step::Tap(TapTarget::Id(id)))
                } else if let (Some(x), Some(y)) = (self.x, self.y) {
                    Ok(Step::Tap(TapTarget::Point { x, y }))
                } else {
                    fail(
                        Code::TapMissingTarget,
                        format!("steps[{idx}] tap requires label, id, or x+y coordinates"),
                    )
                }
            }
            "type" => match non_blank(&self.text) {
                // Typed text is sent verbatim, surrounding spaces included.
                Some(_) => Ok(Step::Type {
                    text: self.text.clone().unwrap_or_default(),
                }),
                None => fail(Code::TypeMissingText, format!("steps[{idx}] type requires text")),
            },
            "key_sequence" => {
                if self.keycodes.is_empty() {
                    return fail(Code::KeycodesMissing, format!("steps[{idx}] key_sequence requires keycodes"));
                }
                let keycodes = self
                    .keycodes
                    .iter()
                    .map(|&k| u32::try_from(k).ok().filter(|&k| k > 0))
                    .collect::<Option<Vec<u32>>>();
                match keycodes {
                    Some(keycodes) => Ok(Step::KeySequence { keycodes }),
                    None => fail(
                        Code::KeycodeInvalid,
                        format!("steps[{idx}] key_sequence keycodes must be > 0"),
                    ),
                }
            }
            "wait" => match self.duration_ms {
                Some(ms) if ms > 0 => Ok(Step::Wait { duration: millis(ms) }),
                _ => fail(Code::WaitMissingDurationMs, format!("steps[{idx}] wait requires duration_ms > 0")),
            },
            "wait_for" => {
                let matcher = if let Some(v) = non_blank(&self.label) {
                    Matcher::Label(v)
                } else if let Some(v) = non_blank(&self.id) {
                    Matcher::Id(v)
                } else if let Some(v) = non_blank(&self.contains) {
                    Matcher::Contains(v)
                } else {
                    return fail(
                        Code::WaitForMissingMatcher,
                        format!("steps[{idx}] wait_for requires label, id, or contains"),
                    );
                };
                if self.timeout_ms.is_some_and(|ms| ms < 0) {
                    return fail(
                        Code::WaitForNegativeTimeout,
                        format!("steps[{idx}] wait_for timeout_ms must be >= 0"),
                    );
                }
                if self.poll_interval_ms.is_some_and(|ms| ms < 0) {
                    return fail(
                        Code::WaitForNegativePoll,
                        format!("steps[{idx}] wait_for poll_interval_ms must be >= 0"),
                    );
                }
                Ok(Step::WaitFor {
                    matcher,
                    timeout: millis_or(self.timeout_ms, DEFAULT_WAIT_FOR_TIMEOUT_MS),
                    poll: millis_or(self.poll_interval_ms, DEFAULT_WAIT_FOR_POLL_MS),
                })
            }
            "screenshot" => match non_blank(&self.name) {
                Some(name) if !is_file_stem(&name) => fail(
                    Code::ScreenshotMissingName,
                    format!("steps[{idx}] screenshot name {name:?} must not contain path separators or \"..\""),
                ),
                Some(name) => Ok(Step::Screenshot { name }),
                None => fail(Code::ScreenshotMissingName, format!("steps[{idx}] screenshot requires name")),
            },
            other => fail(
                Code::UnsupportedAction,
                format!("steps[{idx}] unsupported action {other:?}"),
            ),
        }
    }
}

/// Parse plan bytes (JSONC allowed) without validating. A missing or zero
/// version is read as 1.
pub fn parse_plan(data: &str) -> Result<PlanFile, PlanError> {
    let mut plan: PlanFile = serde_json::from_str(&jsonc::to_json(data)).map_err(PlanError::ParseJson)?;
    if plan.version == 0 {
        plan.version = 1;
    }
    Ok(plan)
}

pub fn load_plan_unvalidated(path: &Path) -> Result<PlanFile, PlanError> {
    let data = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_plan(&data)
}

pub fn load_plan(path: &Path) -> Result<Plan, PlanError> {
    Ok(load_plan_unvalidated(path)?.validate()?)
}
