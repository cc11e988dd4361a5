//! `metadata pull` / `metadata push` against ASC.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::*;
use crate::client::{normalize_enum, AscClient};
use crate::types::{AppInfoResource, AppStoreVersionResource};

pub const PULL_INCLUDE_LOCALIZATIONS: &str = "localizations";

/// App-info states that can no longer be edited.
const LOCKED_APP_INFO_STATES: [&str; 3] = ["READY_FOR_SALE", "READY_FOR_DISTRIBUTION", "REPLACED_WITH_NEW_INFO"];

/// `--include` for pull. Only `localizations` exists today.
pub fn parse_pull_include(value: Option<&str>) -> Result<Vec<String>, String> {
    let Some(value) = value else {
        return Ok(vec![PULL_INCLUDE_LOCALIZATIONS.to_string()]);
    };
    let mut out: Vec<String> = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !part.eq_ignore_ascii_case(PULL_INCLUDE_LOCALIZATIONS) {
            return Err(format!("--include supports only {PULL_INCLUDE_LOCALIZATIONS:?}"));
        }
        if out.is_empty() {
            out.push(PULL_INCLUDE_LOCALIZATIONS.to_string());
        }
    }
    if out.is_empty() {
        return Err(format!("--include supports only {PULL_INCLUDE_LOCALIZATIONS:?}"));
    }
    Ok(out)
}

/// Where a version lives on ASC.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub app_id: &'a str,
    pub version: &'a str,
    pub platform: Option<&'a str>,
    pub app_info_id: Option<&'a str>,
}

/// Pick the editable app info: the only one, or the only one not locked.
pub fn select_app_info_id(infos: &[AppInfoResource]) -> Result<String> {
    match infos {
        [] => bail!("no app info found for app"),
        [only] => return Ok(only.id.clone()),
        _ => {}
    }
    let editable: Vec<&AppInfoResource> = infos
        .iter()
        .filter(|info| {
            let state = info
                .attributes
                .state
                .as_deref()
                .or(info.attributes.app_store_state.as_deref())
                .map(normalize_enum)
                .unwrap_or_default();
            !LOCKED_APP_INFO_STATES.contains(&state.as_str())
        })
        .collect();
    match editable.as_slice() {
        [one] => Ok(one.id.clone()),
        _ => bail!("multiple app infos found; use --app-info to choose one"),
    }
}

pub(crate) async fn resolve_app_info_id(client: &AscClient, target: &Target<'_>) -> Result<String> {
    if let Some(id) = target.app_info_id {
        return Ok(id.to_string());
    }
    let infos = client.list_app_infos(target.app_id).await.context("list app infos")?;
    select_app_info_id(&infos)
}

/// Exact version-string match, narrowed by platform when given.
pub fn select_version<'v>(
    versions: &'v [AppStoreVersionResource],
    version: &str,
    platform: Option<&str>,
) -> Result<&'v AppStoreVersionResource> {
    let platform = platform.map(normalize_enum);
    let matches: Vec<&AppStoreVersionResource> = versions
        .iter()
        .filter(|v| v.attributes.version_string.as_deref().map(str::trim) == Some(version))
        .filter(|v| match &platform {
            Some(p) => v.attributes.platform.as_deref().map(normalize_enum).as_ref() == Some(p),
            None => true,
        })
        .collect();
    match matches.as_slice() {
        [] => bail!("app store version {version:?} not found"),
        [one] => Ok(one),
        _ => bail!("multiple app store versions match {version:?}; use --platform"),
    }
}

pub(crate) async fn resolve_version(client: &AscClient, target: &Target<'_>) -> Result<AppStoreVersionResource> {
    let versions = client
        .list_app_store_versions(target.app_id, Some(target.version), target.platform, 200)
        .await
        .context("list app store versions")?;
    select_version(&versions, target.version, target.platform).cloned()
}

// ─── Pull ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    pub file_count: usize,
    pub files: Vec<String>,
    pub includes: Vec<String>,
}

/// Download app-info and version localizations into the canonical tree.
pub async fn pull(
    client: &AscClient,
    target: &Target<'_>,
    dir: &Path,
    includes: Vec<String>,
    overwrite: bool,
) -> Result<PullResult> {
    let app_info_id = resolve_app_info_id(client, target).await?;
    let version = resolve_version(client, target).await?;

    let mut app_info = AppInfoTree::new();
    for loc in client
        .list_app_info_localizations(&app_info_id)
        .await
        .context("list app info localizations")?
    {
        if let Some(locale) = remote_locale(loc.attributes.locale.as_deref()) {
            app_info.insert(locale, AppInfoLocalization::from_remote(&loc.attributes));
        }
    }

    let mut locales = BTreeMap::new();
    for loc in client
        .list_version_localizations(&version.id)
        .await
        .context("list version localizations")?
    {
        if let Some(locale) = remote_locale(loc.attributes.locale.as_deref()) {
            locales.insert(locale, VersionLocalization::from_remote(&loc.attributes));
        }
    }
    let mut versions = VersionTree::new();
    if !locales.is_empty() {
        versions.insert(target.version.to_string(), locales);
    }

    let plans = build_write_plans(dir, &app_info, &versions)?;
    if !overwrite {
        if let Some(existing) = plans.iter().find(|p| p.path.exists() || p.path.is_symlink()) {
            bail!("{} already exists (use --force to overwrite)", existing.path.display());
        }
    }
    let written = apply_write_plans(&plans, overwrite)?;
    info!(count = written.len(), dir = %dir.display(), "metadata pulled");

    Ok(PullResult {
        file_count: written.len(),
        files: written.iter().map(|p| relative_to(dir, p)).collect(),
        includes,
    })
}

/// `path` below `dir`, `/`-separated. Paths outside `dir` are shown whole.
fn relative_to(dir: &Path, path: &Path) -> String {
    match path.strip_prefix(dir) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

pub(crate) fn remote_locale(locale: Option<&str>) -> Option<String> {
    locale.map(str::trim).filter(|l| !l.is_empty()).map(str::to_string)
}

pub fn render_pull_table(result: &PullResult) {
    let rows: Vec<Vec<String>> = result.files.iter().map(|f| vec![f.clone()]).collect();
    crate::output::render_table(&["file"], &rows);
}

pub fn render_pull_markdown(result: &PullResult) {
    let rows: Vec<Vec<String>> = result.files.iter().map(|f| vec![f.clone()]).collect();
    crate::output::render_markdown(&["file"], &rows);
}

// ─── Push ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PushAction {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalizationKind {
    AppInfo,
    Version,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStep {
    pub locale: String,
    pub kind: LocalizationKind,
    pub action: PushAction,
    pub fields: Vec<String>,
    #[serde(skip)]
    remote_id: Option<String>,
    #[serde(skip)]
    attributes: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub version_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_info_id: Option<String>,
    pub dry_run: bool,
    pub plan: Vec<PushStep>,
    pub applied: usize,
}

/// Non-empty camelCase attributes of a record.
pub(crate) fn attributes_of<T: Serialize>(record: &T) -> Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

pub(crate) fn push_step(
    locale: &str,
    kind: LocalizationKind,
    remote: &BTreeMap<String, String>,
    attributes: Map<String, Value>,
) -> PushStep {
    let remote_id = remote.get(locale).cloned();
    PushStep {
        locale: locale.to_string(),
        kind,
        action: if remote_id.is_some() {
            PushAction::Update
        } else {
            PushAction::Create
        },
        fields: attributes.keys().cloned().collect(),
        remote_id,
        attributes,
    }
}

/// Validate the local tree for `target.version` and create or update the
/// matching ASC localizations. Nothing is sent when `dry_run` is set.
pub async fn push(client: &AscClient, target: &Target<'_>, dir: &Path, dry_run: bool) -> Result<PushResult> {
    let tree = read_tree(dir, Some(target.version))?;
    if tree.is_empty() {
        bail!("no metadata files found under {}", dir.display());
    }

    let version = resolve_version(client, target).await?;
    let remote_versions: BTreeMap<String, String> = client
        .list_version_localizations(&version.id)
        .await
        .context("list version localizations")?
        .into_iter()
        .filter_map(|loc| remote_locale(loc.attributes.locale.as_deref()).map(|l| (l, loc.id)))
        .collect();

    let mut app_info_id = None;
    let mut remote_app_info = BTreeMap::new();
    if !tree.app_info.is_empty() {
        let id = resolve_app_info_id(client, target).await?;
        remote_app_info = client
            .list_app_info_localizations(&id)
            .await
            .context("list app info localizations")?
            .into_iter()
            .filter_map(|loc| remote_locale(loc.attributes.locale.as_deref()).map(|l| (l, loc.id)))
            .collect();
        app_info_id = Some(id);
    }

    let mut plan = Vec::new();
    let mut issues = Vec::new();
    for (locale, record) in &tree.app_info {
        let record = record.normalized();
        let opts = ValidationOptions {
            require_name: !remote_app_info.contains_key(locale),
        };
        let path = app_info_localization_path(dir, locale)?;
        issues.extend(
            validate_app_info_localization(&record, opts)
                .into_iter()
                .map(|i| (path.clone(), i)),
        );
        plan.push(push_step(locale, LocalizationKind::AppInfo, &remote_app_info, attributes_of(&record)));
    }
    for (locale, record) in tree.versions.get(target.version).into_iter().flatten() {
        let record = record.normalized();
        let path = version_localization_path(dir, target.version, locale)?;
        issues.extend(
            validate_version_localization(&record)
                .into_iter()
                .map(|i| (path.clone(), i)),
        );
        plan.push(push_step(locale, LocalizationKind::Version, &remote_versions, attributes_of(&record)));
    }

    let errors: Vec<String> = issues
        .iter()
        .filter(|(_, i)| i.severity == Severity::Error)
        .map(|(path, i)| format!("{}: {}", path.display(), i.message))
        .collect();
    if !errors.is_empty() {
        bail!("metadata is invalid:\n  {}", errors.join("\n  "));
    }

    let mut applied = 0;
    if !dry_run {
        for step in &plan {
            apply_step(client, step, app_info_id.as_deref(), &version.id)
                .await
                .with_context(|| format!("{:?} {} localization {}", step.action, kind_label(step.kind), step.locale))?;
            applied += 1;
        }
        info!(applied, version = %version.id, "metadata pushed");
    }

    Ok(PushResult {
        version_id: version.id,
        app_info_id,
        dry_run,
        plan,
        applied,
    })
}

fn kind_label(kind: LocalizationKind) -> &'static str {
    match kind {
        LocalizationKind::AppInfo => "app-info",
        LocalizationKind::Version => "version",
    }
}

pub(crate) async fn apply_step(client: &AscClient, step: &PushStep, app_info_id: Option<&str>, version_id: &str) -> Result<()> {
    let mut attributes = step.attributes.clone();
    match (step.kind, step.remote_id.as_deref()) {
        (LocalizationKind::AppInfo, Some(id)) => {
            client
                .update_app_info_localization(id, Value::Object(attributes))
                .await
        }
        (LocalizationKind::AppInfo, None) => {
            let parent = app_info_id.context("app info is not resolved")?;
            attributes.insert("locale".into(), Value::String(step.locale.clone()));
            client
                .create_app_info_localization(parent, Value::Object(attributes))
                .await
                .map(|_| ())
        }
        (LocalizationKind::Version, Some(id)) => {
            client
                .update_version_localization(id, Value::Object(attributes))
                .await
        }
        (LocalizationKind::Version, None) => {
            attributes.insert("locale".into(), Value::String(step.locale.clone()));
            client
                .create_version_localization(version_id, Value::Object(attributes))
                .await
                .map(|_| ())
        }
    }
}

fn push_rows(result: &PushResult) -> Vec<Vec<String>> {
    result
        .plan
        .iter()
        .map(|s| {
            vec![
                s.locale.clone(),
                kind_label(s.kind).to_string(),
                format!("{:?}", s.action).to_lowercase(),
                s.fields.join(","),
            ]
        })
        .collect()
}

pub fn render_push_table(result: &PushResult) {
    crate::output::render_table(&["locale", "kind", "action", "fields"], &push_rows(result));
}

pub fn render_push_markdown(result: &PushResult) {
    crate::output::render_markdown(&["locale", "kind", "action", "fields"], &push_rows(result));
}
