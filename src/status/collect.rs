use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::*;
use crate::client::{compare_timestamps, is_not_found, normalize_enum, resolve_app_store_version_state, AscClient};
use crate::types::*;

const BUILDS_LIMIT: u32 = 50;
const PAGE_LIMIT: u32 = 200;
const MAX_PARALLEL: usize = 3;

/// The ASC reads the dashboard needs. Implemented by [`AscClient`]; tests
/// substitute canned data.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn app(&self, app_id: &str) -> Result<AppResource>;
    async fn builds(&self, app_id: &str, limit: u32) -> Result<Vec<BuildResource>>;
    async fn pre_release_version(&self, build_id: &str) -> Result<Resource<PreReleaseVersionAttributes>>;
    async fn build_beta_details(&self, build_ids: &[String], limit: u32) -> Result<Vec<BuildBetaDetailResource>>;
    async fn beta_review_submissions(
        &self,
        build_ids: &[String],
        limit: u32,
    ) -> Result<Vec<BetaReviewSubmissionResource>>;
    async fn app_store_versions(&self, app_id: &str, limit: u32) -> Result<Vec<AppStoreVersionResource>>;
    async fn phased_release(&self, version_id: &str) -> Result<PhasedReleaseResource>;
    async fn review_submissions(&self, app_id: &str, limit: u32) -> Result<Vec<ReviewSubmissionResource>>;
}

#[async_trait]
impl StatusSource for AscClient {
    async fn app(&self, app_id: &str) -> Result<AppResource> {
        self.get_app(app_id).await
    }

    async fn builds(&self, app_id: &str, limit: u32) -> Result<Vec<BuildResource>> {
        self.list_builds(app_id, limit).await
    }

    async fn pre_release_version(&self, build_id: &str) -> Result<Resource<PreReleaseVersionAttributes>> {
        self.get_build_pre_release_version(build_id).await
    }

    async fn build_beta_details(&self, build_ids: &[String], limit: u32) -> Result<Vec<BuildBetaDetailResource>> {
        self.list_build_beta_details(build_ids, limit).await
    }

    async fn beta_review_submissions(
        &self,
        build_ids: &[String],
        limit: u32,
    ) -> Result<Vec<BetaReviewSubmissionResource>> {
        self.list_beta_app_review_submissions(build_ids, limit).await
    }

    async fn app_store_versions(&self, app_id: &str, limit: u32) -> Result<Vec<AppStoreVersionResource>> {
        self.list_app_store_versions(app_id, None, None, limit).await
    }

    async fn phased_release(&self, version_id: &str) -> Result<PhasedReleaseResource> {
        self.get_phased_release(version_id).await
    }

    async fn review_submissions(&self, app_id: &str, limit: u32) -> Result<Vec<ReviewSubmissionResource>> {
        self.list_review_submissions(app_id, limit).await
    }
}

/// Sections produced by one collector group. Groups never fill the same
/// field, so merging is order-independent.
#[derive(Debug, Default)]
struct Sections {
    builds: Option<BuildsSection>,
    testflight: Option<TestFlightSection>,
    appstore: Option<AppStoreSection>,
    phased_release: Option<PhasedReleaseSection>,
    submission: Option<SubmissionSection>,
    review: Option<ReviewSection>,
}

impl Sections {
    fn merge_into(self, dash: &mut Dashboard) {
        dash.builds = dash.builds.take().or(self.builds);
        dash.testflight = dash.testflight.take().or(self.testflight);
        dash.appstore = dash.appstore.take().or(self.appstore);
        dash.phased_release = dash.phased_release.take().or(self.phased_release);
        dash.submission = dash.submission.take().or(self.submission);
        dash.review = dash.review.take().or(self.review);
    }
}

/// Build the full dashboard for `app_id`.
///
/// Dropping the returned future aborts any collectors still running.
pub async fn collect_dashboard(
    source: Arc<dyn StatusSource>,
    app_id: &str,
    includes: IncludeSet,
) -> Result<Dashboard> {
    let app = source.app(app_id).await.context("fetch app")?;
    let mut dash = Dashboard {
        app: StatusApp {
            id: app.id.clone(),
            bundle_id: app.attributes.bundle_id.unwrap_or_default(),
            name: app.attributes.name.unwrap_or_default(),
        },
        links: includes.links.then(|| LinksSection::for_app(app_id)),
        ..Default::default()
    };

    let mut tasks: Vec<Task<Sections>> = Vec::new();
    if includes.builds || includes.testflight {
        let (src, id) = (Arc::clone(&source), app_id.to_string());
        tasks.push(("builds/testflight", Box::pin(async move {
            collect_builds_and_testflight(src.as_ref(), &id, includes).await
        })));
    }
    if includes.appstore || includes.phased_release {
        let (src, id) = (Arc::clone(&source), app_id.to_string());
        tasks.push(("appstore/phased-release", Box::pin(async move {
            collect_appstore_and_phased_release(src.as_ref(), &id, includes).await
        })));
    }
    if includes.submission || includes.review {
        let (src, id) = (Arc::clone(&source), app_id.to_string());
        tasks.push(("submission/review", Box::pin(async move {
            collect_submission_and_review(src.as_ref(), &id, includes).await
        })));
    }

    for sections in run_tasks(tasks, MAX_PARALLEL).await? {
        sections.merge_into(&mut dash);
    }
    dash.summary = build_summary(&dash);
    Ok(dash)
}

// ─── Task fan-out ────────────────────────────────────────────────────────────

pub(crate) type Task<T> = (&'static str, Pin<Box<dyn Future<Output = Result<T>> + Send>>);

/// Run every task with at most `limit` in flight. All tasks are awaited;
/// the first failure observed is returned, prefixed with the task name.
pub(crate) async fn run_tasks<T: Send + 'static>(tasks: Vec<Task<T>>, limit: usize) -> Result<Vec<T>> {
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    for (name, fut) in tasks {
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.context("collector semaphore closed")?;
            debug!(task = name, "collector started");
            fut.await.context(name)
        });
    }

    let mut results = Vec::new();
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(value)) => results.push(value),
            Ok(Err(err)) => {
                first_error.get_or_insert(err);
            }
            Err(join_err) => {
                first_error.get_or_insert(anyhow!("collector task failed: {join_err}"));
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

// ─── Collectors ──────────────────────────────────────────────────────────────

async fn collect_builds_and_testflight(
    source: &dyn StatusSource,
    app_id: &str,
    includes: IncludeSet,
) -> Result<Sections> {
    let builds = source.builds(app_id, BUILDS_LIMIT).await?;
    let mut out = Sections::default();

    if includes.builds {
        let mut section = BuildsSection::default();
        if let Some(first) = builds.first() {
            let mut latest = LatestBuild {
                id: first.id.clone(),
                build_number: first.attributes.version.clone().unwrap_or_default(),
                processing_state: first.attributes.processing_state.clone(),
                uploaded_date: first.attributes.uploaded_date.clone(),
                ..Default::default()
            };
            match source.pre_release_version(&first.id).await {
                Ok(pre) => {
                    latest.version = pre.attributes.version;
                    latest.platform = pre.attributes.platform;
                }
                Err(err) if is_not_found(&err) => {
                    warn!(build = %first.id, "no pre-release version for latest build");
                }
                Err(err) => return Err(err),
            }
            section.latest = Some(latest);
        }
        out.builds = Some(section);
    }

    if !includes.testflight {
        return Ok(out);
    }

    let mut section = TestFlightSection::default();
    if builds.is_empty() {
        out.testflight = Some(section);
        return Ok(out);
    }

    let build_ids: Vec<String> = builds.iter().map(|b| b.id.clone()).collect();
    let details = source.build_beta_details(&build_ids, PAGE_LIMIT).await?;
    let states = external_states_by_build(&build_ids, &details);
    for build in &builds {
        let state = states.get(&build.id).map(|s| normalize_enum(s)).unwrap_or_default();
        if is_distributed_state(&state) {
            section.latest_distributed_build_id = Some(build.id.clone());
            section.external_build_state = Some(state);
            break;
        }
    }

    let submissions = source.beta_review_submissions(&build_ids, PAGE_LIMIT).await?;
    if let Some(latest) = select_latest(&submissions, |s| s.attributes.submitted_date.as_deref()) {
        section.beta_review_state = latest.attributes.beta_review_state.clone();
        section.submitted_date = latest.attributes.submitted_date.clone();
    }

    out.testflight = Some(section);
    Ok(out)
}

async fn collect_appstore_and_phased_release(
    source: &dyn StatusSource,
    app_id: &str,
    includes: IncludeSet,
) -> Result<Sections> {
    let versions = source.app_store_versions(app_id, PAGE_LIMIT).await?;
    let latest = select_latest(&versions, |v| v.attributes.created_date.as_deref());
    let mut out = Sections::default();

    if includes.appstore {
        let mut section = AppStoreSection::default();
        if let Some(v) = latest {
            let state = resolve_app_store_version_state(&v.attributes);
            section.version_id = Some(v.id.clone());
            section.version = v.attributes.version_string.clone();
            section.state = (!state.is_empty()).then_some(state);
            section.platform = v.attributes.platform.clone();
            section.created_date = v.attributes.created_date.clone();
        }
        out.appstore = Some(section);
    }

    if !includes.phased_release {
        return Ok(out);
    }

    let mut phased = PhasedReleaseSection::default();
    if let Some(v) = latest {
        match source.phased_release(&v.id).await {
            Ok(release) => {
                phased.configured = true;
                phased.id = Some(release.id);
                phased.state = release.attributes.phased_release_state;
                phased.start_date = release.attributes.start_date;
                phased.current_day_number = release.attributes.current_day_number;
                phased.total_pause_duration = release.attributes.total_pause_duration;
            }
            Err(err) if is_not_found(&err) => {
                debug!(version = %v.id, "phased release not configured");
            }
            Err(err) => return Err(err),
        }
    }
    out.phased_release = Some(phased);
    Ok(out)
}

async fn collect_submission_and_review(
    source: &dyn StatusSource,
    app_id: &str,
    includes: IncludeSet,
) -> Result<Sections> {
    let submissions = source.review_submissions(app_id, PAGE_LIMIT).await?;
    let mut out = Sections::default();

    if includes.submission {
        let mut section = SubmissionSection::default();
        for sub in &submissions {
            let state = normalize_enum(sub.attributes.state.as_deref().unwrap_or_default());
            if is_in_flight(&state) {
                section.in_flight = true;
            }
            if state == "UNRESOLVED_ISSUES" {
                section
                    .blocking_issues
                    .push(format!("submission {} has unresolved issues", sub.id));
            }
        }
        section.blocking_issues.sort();
        section.blocking_issues.dedup();
        out.submission = Some(section);
    }

    if includes.review {
        let mut section = ReviewSection::default();
        if let Some(latest) = select_latest(&submissions, |s| s.attributes.submitted_date.as_deref()) {
            section.latest_submission_id = Some(latest.id.clone());
            section.state = latest.attributes.state.as_deref().map(normalize_enum);
            section.submitted_date = latest.attributes.submitted_date.clone();
            section.platform = latest.attributes.platform.clone();
        }
        out.review = Some(section);
    }

    Ok(out)
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Map build ID to external TestFlight state.
///
/// Uses the `build` relationship when the response carries it. Without
/// relationships the response order is not trustworthy, so a positional
/// mapping is only made for exactly one requested build and one detail.
pub(crate) fn external_states_by_build(
    build_ids: &[String],
    details: &[BuildBetaDetailResource],
) -> HashMap<String, String> {
    let mut states = HashMap::new();
    let mut used_relationships = false;
    for detail in details {
        if let Some(build_id) = detail.relationship_id("build") {
            used_relationships = true;
            let state = detail.attributes.external_build_state.as_deref().unwrap_or_default();
            states.insert(build_id, state.trim().to_string());
        }
    }
    if !used_relationships {
        if let ([build_id], [detail]) = (build_ids, details) {
            let state = detail.attributes.external_build_state.as_deref().unwrap_or_default();
            states.insert(build_id.clone(), state.trim().to_string());
        }
    }
    states
}

/// Latest record by timestamp, ties broken by the greater `id`.
pub(crate) fn select_latest<'a, A, F>(items: &'a [Resource<A>], timestamp: F) -> Option<&'a Resource<A>>
where
    F: Fn(&Resource<A>) -> Option<&str>,
{
    items.iter().max_by(|a, b| {
        let (ta, tb) = (timestamp(a).unwrap_or_default(), timestamp(b).unwrap_or_default());
        match compare_timestamps(ta, tb) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        }
    })
}

fn is_distributed_state(state: &str) -> bool {
    matches!(state, "IN_BETA_TESTING" | "READY_FOR_TESTING")
}

fn is_in_flight(state: &str) -> bool {
    matches!(
        state,
        "READY_FOR_REVIEW" | "WAITING_FOR_REVIEW" | "IN_REVIEW" | "UNRESOLVED_ISSUES" | "CANCELING"
    )
}
