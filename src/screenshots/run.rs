use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::plan::{Matcher, Plan, Step, TapTarget};

/// Performs plan actions against a simulator. Every call names the target
/// device by udid.
#[async_trait]
pub trait SimulatorDriver: Send + Sync {
    async fn launch(&self, udid: &str, bundle_id: &str) -> Result<()>;
    async fn tap(&self, udid: &str, target: &TapTarget) -> Result<()>;
    async fn type_text(&self, udid: &str, text: &str) -> Result<()>;
    async fn keys(&self, udid: &str, keycodes: &[u32]) -> Result<()>;
    /// Whether an element matching `matcher` is on screen right now.
    async fn matches(&self, udid: &str, matcher: &Matcher) -> Result<bool>;
    async fn screenshot(&self, udid: &str, path: &Path) -> Result<()>;
}

/// Accepts every action and matches immediately.
pub struct NoopDriver;

#[async_trait]
impl SimulatorDriver for NoopDriver {
    async fn launch(&self, _udid: &str, _bundle_id: &str) -> Result<()> {
        Ok(())
    }
    async fn tap(&self, _udid: &str, _target: &TapTarget) -> Result<()> {
        Ok(())
    }
    async fn type_text(&self, _udid: &str, _text: &str) -> Result<()> {
        Ok(())
    }
    async fn keys(&self, _udid: &str, _keycodes: &[u32]) -> Result<()> {
        Ok(())
    }
    async fn matches(&self, _udid: &str, _matcher: &Matcher) -> Result<bool> {
        Ok(true)
    }
    async fn screenshot(&self, _udid: &str, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Drives a simulator through `xcrun simctl`. simctl can launch apps and
/// capture the screen; UI interaction needs an accessibility backend and
/// fails the step.
pub struct SimctlDriver;

impl SimctlDriver {
    async fn simctl(&self, args: &[&str]) -> Result<()> {
        debug!(?args, "xcrun simctl");
        let output = Command::new("xcrun")
            .arg("simctl")
            .args(args)
            .output()
            .await
            .context("run xcrun simctl")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("simctl {} failed: {}", args.first().unwrap_or(&""), stderr.trim());
        }
        Ok(())
    }
}

fn unsupported(action: &str) -> anyhow::Error {
    anyhow::anyhow!("{action} is not supported by simctl")
}

#[async_trait]
impl SimulatorDriver for SimctlDriver {
    async fn launch(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.simctl(&["launch", udid, bundle_id]).await
    }
    async fn tap(&self, _udid: &str, _target: &TapTarget) -> Result<()> {
        Err(unsupported("tap"))
    }
    async fn type_text(&self, _udid: &str, _text: &str) -> Result<()> {
        Err(unsupported("type"))
    }
    async fn keys(&self, _udid: &str, _keycodes: &[u32]) -> Result<()> {
        Err(unsupported("key_sequence"))
    }
    async fn matches(&self, _udid: &str, _matcher: &Matcher) -> Result<bool> {
        Err(unsupported("wait_for"))
    }
    async fn screenshot(&self, udid: &str, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.simctl(&["io", udid, "screenshot", path.as_ref()]).await
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub index: usize,
    pub action: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub bundle_id: String,
    pub udid: String,
    pub output_dir: String,
    pub steps: Vec<StepResult>,
}

impl RunResult {
    pub fn failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Error)
    }
}

async fn wait_for(driver: &dyn SimulatorDriver, udid: &str, matcher: &Matcher, timeout: std::time::Duration, poll: std::time::Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if driver.matches(udid, matcher).await? {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            bail!("timed out after {}ms waiting for {matcher}", timeout.as_millis());
        }
        sleep(poll.min(deadline - now)).await;
    }
}

async fn run_step(driver: &dyn SimulatorDriver, plan: &Plan, step: &Step) -> Result<Option<PathBuf>> {
    match step {
        Step::Launch => driver.launch(&plan.udid, &plan.bundle_id).await?,
        Step::Tap(target) => driver.tap(&plan.udid, target).await?,
        Step::Type { text } => driver.type_text(&plan.udid, text).await?,
        Step::KeySequence { keycodes } => driver.keys(&plan.udid, keycodes).await?,
        Step::Wait { duration } => sleep(*duration).await,
        Step::WaitFor { matcher, timeout, poll } => wait_for(driver, &plan.udid, matcher, *timeout, *poll).await?,
        Step::Screenshot { name } => {
            tokio::fs::create_dir_all(&plan.output_dir)
                .await
                .with_context(|| format!("create {}", plan.output_dir.display()))?;
            let path = plan.output_dir.join(format!("{name}.png"));
            driver.screenshot(&plan.udid, &path).await?;
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Run every step in order, stopping at the first failure. The returned
/// result holds the steps attempted so far.
pub async fn run_plan(plan: &Plan, driver: &dyn SimulatorDriver) -> RunResult {
    let mut result = RunResult {
        bundle_id: plan.bundle_id.clone(),
        udid: plan.udid.clone(),
        output_dir: plan.output_dir.display().to_string(),
        steps: Vec::with_capacity(plan.steps.len()),
    };

    for (i, step) in plan.steps.iter().enumerate() {
        if i > 0 && !plan.post_action_delay.is_zero() {
            sleep(plan.post_action_delay).await;
        }
        let index = i + 1;
        debug!(index, action = step.action(), "running step");
        match run_step(driver, plan, step).await {
            Ok(path) => result.steps.push(StepResult {
                index,
                action: step.action().to_string(),
                status: StepStatus::Ok,
                error: None,
                path: path.map(|p| p.display().to_string()),
            }),
            Err(err) => {
                warn!(index, action = step.action(), error = %err, "step failed");
                result.steps.push(StepResult {
                    index,
                    action: step.action().to_string(),
                    status: StepStatus::Error,
                    error: Some(format!("{err:#}")),
                    path: None,
                });
                return result;
            }
        }
    }
    info!(steps = result.steps.len(), "plan finished");
    result
}

fn run_rows(result: &RunResult) -> Vec<Vec<String>> {
    result
        .steps
        .iter()
        .map(|s| {
            let status = match s.status {
                StepStatus::Ok => "ok",
                StepStatus::Error => "error",
            };
            vec![
                s.index.to_string(),
                s.action.clone(),
                status.to_string(),
                s.error.clone().or_else(|| s.path.clone()).unwrap_or_default(),
            ]
        })
        .collect()
}

pub fn render_run_table(result: &RunResult) {
    println!("Bundle ID: {}", result.bundle_id);
    println!("UDID: {}", result.udid);
    println!("Output Dir: {}\n", result.output_dir);
    crate::output::render_table(&["#", "action", "status", "detail"], &run_rows(result));
}

pub fn render_run_markdown(result: &RunResult) {
    println!("**Bundle ID:** {}  ", result.bundle_id);
    println!("**UDID:** {}  ", result.udid);
    println!("**Output Dir:** {}\n", result.output_dir);
    crate::output::render_markdown(&["#", "Action", "Status", "Detail"], &run_rows(result));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screenshots::plan::parse_plan;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn plan(src: &str) -> Plan {
        parse_plan(src).unwrap().validate().unwrap()
    }

    /// Records calls; `matches` succeeds after `ready_after` polls.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        polls: AtomicUsize,
        ready_after: usize,
        fail_tap: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl SimulatorDriver for Recorder {
        async fn launch(&self, udid: &str, bundle_id: &str) -> Result<()> {
            self.push(format!("launch {udid} {bundle_id}"));
            Ok(())
        }
        async fn tap(&self, _udid: &str, target: &TapTarget) -> Result<()> {
            self.push(format!("tap {target:?}"));
            if self.fail_tap {
                bail!("element not found");
            }
            Ok(())
        }
        async fn type_text(&self, _udid: &str, text: &str) -> Result<()> {
            self.push(format!("type {text}"));
            Ok(())
        }
        async fn keys(&self, _udid: &str, keycodes: &[u32]) -> Result<()> {
            self.push(format!("keys {keycodes:?}"));
            Ok(())
        }
        async fn matches(&self, _udid: &str, _matcher: &Matcher) -> Result<bool> {
            Ok(self.polls.fetch_add(1, Ordering::SeqCst) + 1 >= self.ready_after)
        }
        async fn screenshot(&self, _udid: &str, path: &Path) -> Result<()> {
            self.push(format!("screenshot {}", path.display()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn wait_only_plan_succeeds_with_noop_driver() {
        let p = plan(r#"{"version":1,"app":{"bundle_id":"com.example.app"},"steps":[{"action":"wait","duration_ms":1}]}"#);
        let first = run_plan(&p, &NoopDriver).await;
        let second = run_plan(&p, &NoopDriver).await;

        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::json!({
                "bundle_id": "com.example.app",
                "udid": "booted",
                "output_dir": "./screenshots/raw",
                "steps": [{"index": 1, "action": "wait", "status": "ok"}]
            })
        );
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
        assert!(!first.failed());
    }

    #[tokio::test]
    async fn steps_run_in_order_and_screenshots_land_in_output_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = format!(
            r#"{{"version":1,"app":{{"bundle_id":"com.example.app","udid":"SIM-1","output_dir":{:?}}},
                "steps":[{{"action":"launch"}},{{"action":"type","text":"hi"}},{{"action":"key_sequence","keycodes":[40]}},
                         {{"action":"screenshot","name":"home"}}]}}"#,
            dir.path().join("raw").display().to_string()
        );
        let driver = Recorder::default();
        let result = run_plan(&plan(&src), &driver).await;

        let shot = dir.path().join("raw").join("home.png");
        assert_eq!(
            driver.calls(),
            vec![
                "launch SIM-1 com.example.app".to_string(),
                "type hi".to_string(),
                "keys [40]".to_string(),
                format!("screenshot {}", shot.display()),
            ]
        );
        assert!(dir.path().join("raw").is_dir());
        assert_eq!(result.steps[3].path.as_deref(), Some(shot.display().to_string().as_str()));
    }

    #[tokio::test]
    async fn failure_stops_the_run_with_partial_results() {
        let p = plan(
            r#"{"version":1,"app":{"bundle_id":"a"},
                "steps":[{"action":"launch"},{"action":"tap","label":"Go"},{"action":"launch"}]}"#,
        );
        let driver = Recorder {
            fail_tap: true,
            ..Default::default()
        };
        let result = run_plan(&p, &driver).await;

        assert!(result.failed());
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].status, StepStatus::Error);
        assert_eq!(result.steps[1].error.as_deref(), Some("element not found"));
        assert_eq!(driver.calls().len(), 2);
    }

    #[tokio::test]
    async fn wait_for_polls_until_match() {
        let p = plan(
            r#"{"version":1,"app":{"bundle_id":"a"},
                "steps":[{"action":"wait_for","label":"Ready","poll_interval_ms":5,"timeout_ms":2000}]}"#,
        );
        let driver = Recorder {
            ready_after: 3,
            ..Default::default()
        };
        let result = run_plan(&p, &driver).await;
        assert!(!result.failed());
        assert_eq!(driver.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let p = plan(
            r#"{"version":1,"app":{"bundle_id":"a"},
                "steps":[{"action":"wait_for","id":"spinner","poll_interval_ms":5,"timeout_ms":30}]}"#,
        );
        let driver = Recorder {
            ready_after: usize::MAX,
            ..Default::default()
        };
        let started = Instant::now();
        let result = run_plan(&p, &driver).await;

        assert!(result.failed());
        let err = result.steps[0].error.clone().unwrap();
        assert!(err.contains("timed out after 30ms"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn post_action_delay_applies_between_steps() {
        let p = plan(
            r#"{"version":1,"app":{"bundle_id":"a"},"defaults":{"post_action_delay_ms":40},
                "steps":[{"action":"launch"},{"action":"launch"},{"action":"launch"}]}"#,
        );
        let started = Instant::now();
        run_plan(&p, &NoopDriver).await;
        assert!(started.elapsed() >= Duration::from_millis(80));
    }
}
