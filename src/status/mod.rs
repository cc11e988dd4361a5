//! Release pipeline dashboard for one app.
//!
//! Three collector groups (builds/testflight, appstore/phased-release,
//! submission/review) run concurrently against ASC; each returns the
//! sections it owns and the results are merged once every group finishes.
//! The summary is derived from the merged payload.

mod collect;
mod render;
mod summary;

pub use collect::{collect_dashboard, StatusSource};
pub use render::{phased_release_progress_bar, render_markdown, render_table};
pub use summary::build_summary;

use serde::Serialize;

pub const ALLOWED_INCLUDES: [&str; 7] = [
    "builds",
    "testflight",
    "appstore",
    "submission",
    "review",
    "phased-release",
    "links",
];

/// Which dashboard sections to collect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncludeSet {
    pub builds: bool,
    pub testflight: bool,
    pub appstore: bool,
    pub submission: bool,
    pub review: bool,
    pub phased_release: bool,
    pub links: bool,
}

impl IncludeSet {
    pub fn all() -> Self {
        Self {
            builds: true,
            testflight: true,
            appstore: true,
            submission: true,
            review: true,
            phased_release: true,
            links: true,
        }
    }
}

/// Parse a comma-separated `--include` value. Empty means everything.
pub fn parse_include(value: &str) -> Result<IncludeSet, String> {
    let lowered = value.trim().to_lowercase();
    let parts: Vec<&str> = lowered
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return Ok(IncludeSet::all());
    }

    let mut includes = IncludeSet::default();
    for part in parts {
        match part {
            "builds" => includes.builds = true,
            "testflight" => includes.testflight = true,
            "appstore" => includes.appstore = true,
            "submission" => includes.submission = true,
            "review" => includes.review = true,
            "phased-release" => includes.phased_release = true,
            "links" => includes.links = true,
            other => {
                return Err(format!(
                    "--include contains unsupported section {other:?} (allowed: {})",
                    ALLOWED_INCLUDES.join(",")
                ))
            }
        }
    }
    Ok(includes)
}

// ─── Payload ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub app: StatusApp,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builds: Option<BuildsSection>,
    #[serde(rename = "testflight", skip_serializing_if = "Option::is_none")]
    pub testflight: Option<TestFlightSection>,
    #[serde(rename = "appstore", skip_serializing_if = "Option::is_none")]
    pub appstore: Option<AppStoreSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phased_release: Option<PhasedReleaseSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<LinksSection>,
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusApp {
    pub id: String,
    pub bundle_id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Green,
    #[default]
    Yellow,
    Red,
}

impl Health {
    pub fn as_str(self) -> &'static str {
        match self {
            Health::Green => "green",
            Health::Yellow => "yellow",
            Health::Red => "red",
        }
    }
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub health: Health,
    pub next_action: String,
    pub blockers: Vec<String>,
}

#[derive(Debug, Serialize, Default, Clone)]
pub struct BuildsSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<LatestBuild>,
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LatestBuild {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub build_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TestFlightSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_distributed_build_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta_review_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_build_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_date: Option<String>,
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AppStoreSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSection {
    pub in_flight: bool,
    pub blocking_issues: Vec<String>,
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_submission_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PhasedReleaseSection {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_day_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pause_duration: Option<i64>,
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LinksSection {
    pub app_store_connect: String,
    pub test_flight: String,
    pub review: String,
}

impl LinksSection {
    pub fn for_app(app_id: &str) -> Self {
        let base = format!("https://appstoreconnect.apple.com/apps/{app_id}");
        Self {
            test_flight: format!("{base}/testflight/ios"),
            review: format!("{base}/appstore/review"),
            app_store_connect: base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_selects_everything() {
        assert_eq!(parse_include("").unwrap(), IncludeSet::all());
        assert_eq!(parse_include(" , ").unwrap(), IncludeSet::all());
    }

    #[test]
    fn include_is_case_insensitive_subset() {
        let inc = parse_include("Builds, phased-release").unwrap();
        assert!(inc.builds && inc.phased_release);
        assert!(!inc.testflight && !inc.appstore && !inc.links);
    }

    #[test]
    fn unknown_include_is_rejected() {
        let err = parse_include("builds,unknown").unwrap_err();
        assert!(err.contains("unsupported section \"unknown\""));
    }

    #[test]
    fn absent_sections_are_omitted_from_json() {
        let dash = Dashboard {
            app: StatusApp {
                id: "1".into(),
                ..Default::default()
            },
            submission: Some(SubmissionSection::default()),
            ..Default::default()
        };
        let v = serde_json::to_value(&dash).unwrap();
        assert!(v.get("builds").is_none());
        assert!(v.get("phasedRelease").is_none());
        assert_eq!(v["submission"]["blockingIssues"], serde_json::json!([]));
        assert_eq!(v["summary"]["health"], "yellow");
    }
}
