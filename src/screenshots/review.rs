//! Review artifacts for captured screenshots: an HTML page, a manifest of
//! entries and the `approved.json` map of approved keys.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::metadata::write_file_safely;

pub const DEFAULT_REVIEW_DIR: &str = "./screenshots/review";
pub const DEFAULT_HTML_NAME: &str = "index.html";
pub const DEFAULT_MANIFEST_NAME: &str = "manifest.json";
pub const DEFAULT_APPROVALS_NAME: &str = "approved.json";

pub const STATUS_READY: &str = "ready";
pub const STATUS_MISSING: &str = "missing";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewManifest {
    #[serde(default)]
    pub entries: Vec<ReviewEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub key: String,
    #[serde(default, alias = "screenshotId")]
    pub screenshot_id: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl ReviewEntry {
    fn matches(&self, locale: Option<&str>, device: Option<&str>) -> bool {
        locale.map_or(true, |l| self.locale == l) && device.map_or(true, |d| self.device == d)
    }
}

pub type Approvals = BTreeMap<String, bool>;

pub fn resolve_output_dir(dir: Option<&str>) -> Result<PathBuf> {
    let dir = dir.map(str::trim).filter(|d| !d.is_empty()).unwrap_or(DEFAULT_REVIEW_DIR);
    absolute(Path::new(dir))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolve current directory")?;
    Ok(cwd.join(path))
}

/// `override` when given (relative to `output_dir`), else `output_dir/default`.
fn artifact_path(output_dir: &Path, override_path: Option<&str>, default: &str) -> Result<PathBuf> {
    match override_path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) if Path::new(p).is_absolute() => Ok(PathBuf::from(p)),
        Some(p) => absolute(&output_dir.join(p)),
        None => absolute(&output_dir.join(default)),
    }
}

pub fn load_manifest(path: &Path) -> Result<ReviewManifest> {
    let data = fs::read(path).with_context(|| format!("read review manifest {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parse review manifest {}", path.display()))
}

/// A missing approvals file is an empty map.
pub fn load_approvals(path: &Path) -> Result<Approvals> {
    match fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).with_context(|| format!("parse approvals {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Approvals::new()),
        Err(e) => Err(e).with_context(|| format!("read approvals {}", path.display())),
    }
}

/// Write approvals restricted to the manifest's keys. Keys come out sorted.
pub fn save_approvals(path: &Path, approvals: &Approvals, manifest: &ReviewManifest) -> Result<()> {
    let keys: BTreeSet<&str> = manifest.entries.iter().map(|e| e.key.as_str()).collect();
    let kept: Approvals = approvals
        .iter()
        .filter(|(k, _)| keys.contains(k.as_str()))
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    let mut data = serde_json::to_vec_pretty(&kept)?;
    data.push(b'\n');
    write_file_safely(path, &data, true)?;
    Ok(())
}

// ─── Open ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct OpenRequest {
    pub output_dir: Option<String>,
    pub html_path: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct OpenResult {
    pub html_path: String,
    pub opened: bool,
}

pub async fn open_review(req: &OpenRequest) -> Result<OpenResult> {
    let output_dir = resolve_output_dir(req.output_dir.as_deref())?;
    let html = artifact_path(&output_dir, req.html_path.as_deref(), DEFAULT_HTML_NAME)?;
    let meta = fs::metadata(&html).with_context(|| format!("read review HTML {}", html.display()))?;
    if meta.is_dir() {
        bail!("review HTML path points to a directory");
    }

    let html_path = html.display().to_string();
    if req.dry_run {
        return Ok(OpenResult { html_path, opened: false });
    }

    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    debug!(opener, path = %html_path, "opening review");
    let status = tokio::process::Command::new(opener)
        .arg(&html)
        .status()
        .await
        .with_context(|| format!("open review HTML with {opener}"))?;
    if !status.success() {
        bail!("open review HTML: {opener} exited with {status}");
    }
    Ok(OpenResult { html_path, opened: true })
}

// ─── Approve ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ApproveRequest {
    pub output_dir: Option<String>,
    pub manifest_path: Option<String>,
    pub approval_path: Option<String>,
    pub all_ready: bool,
    pub keys: Vec<String>,
    pub screenshot_id: Option<String>,
    pub locale: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResult {
    pub manifest_path: String,
    pub approval_path: String,
    pub matched: usize,
    pub added: usize,
    #[serde(rename = "totalApproved")]
    pub total_approved: usize,
    pub keys: Vec<String>,
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Keys selected by `req`, sorted and unique.
pub fn select_keys(manifest: &ReviewManifest, req: &ApproveRequest) -> Result<Vec<String>> {
    let explicit: BTreeSet<&str> = req.keys.iter().map(|k| k.trim()).filter(|k| !k.is_empty()).collect();
    let locale = trimmed(&req.locale);
    let device = trimmed(&req.device);
    let id = trimmed(&req.screenshot_id);

    if !req.all_ready && explicit.is_empty() && id.is_none() && locale.is_none() && device.is_none() {
        bail!("provide at least one selector: --all-ready, --key, --id, --locale, or --device");
    }
    let filters_only = !req.all_ready && explicit.is_empty() && id.is_none();

    let by_key: BTreeMap<&str, &ReviewEntry> = manifest.entries.iter().map(|e| (e.key.as_str(), e)).collect();
    let mut selected = BTreeSet::new();
    for key in &explicit {
        let Some(entry) = by_key.get(key) else {
            bail!("review key not found in manifest: {key}");
        };
        if entry.matches(locale, device) {
            selected.insert(key.to_string());
        }
    }
    for entry in manifest.entries.iter().filter(|e| e.matches(locale, device)) {
        let picked = filters_only
            || (req.all_ready && entry.status == STATUS_READY)
            || id.is_some_and(|id| entry.screenshot_id == id);
        if picked {
            selected.insert(entry.key.clone());
        }
    }

    if selected.is_empty() {
        bail!("no review entries matched approval selectors");
    }
    Ok(selected.into_iter().collect())
}

pub fn approve_review(req: &ApproveRequest) -> Result<ApproveResult> {
    let output_dir = resolve_output_dir(req.output_dir.as_deref())?;
    let manifest_path = artifact_path(&output_dir, req.manifest_path.as_deref(), DEFAULT_MANIFEST_NAME)?;
    let approval_path = artifact_path(&output_dir, req.approval_path.as_deref(), DEFAULT_APPROVALS_NAME)?;

    let manifest = load_manifest(&manifest_path)?;
    let keys = select_keys(&manifest, req)?;
    let mut approvals = load_approvals(&approval_path)?;

    let mut added = 0;
    for key in &keys {
        if approvals.get(key) != Some(&true) {
            approvals.insert(key.clone(), true);
            added += 1;
        }
    }
    save_approvals(&approval_path, &approvals, &manifest)?;
    let total_approved = load_approvals(&approval_path)?.values().filter(|v| **v).count();
    info!(matched = keys.len(), added, total_approved, "approvals updated");

    Ok(ApproveResult {
        manifest_path: manifest_path.display().to_string(),
        approval_path: approval_path.display().to_string(),
        matched: keys.len(),
        added,
        total_approved,
        keys,
    })
}

// ─── Generate ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GenerateResult {
    pub output_dir: String,
    pub html_path: String,
    pub manifest_path: String,
    pub approval_path: String,
    pub total: usize,
    pub ready: usize,
    pub missing: usize,
    pub approved: usize,
}

fn sorted_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str().filter(|n| !n.starts_with('.')) {
            out.push((name.to_string(), entry.path()));
        }
    }
    out.sort();
    Ok(out)
}

/// Entries for `<input>/<locale>/<device>/*.png`, sorted by key.
pub fn scan_screenshots(input_dir: &Path) -> Result<Vec<ReviewEntry>> {
    let mut entries = Vec::new();
    for (locale, locale_dir) in sorted_dirs(input_dir)? {
        for (device, device_dir) in sorted_dirs(&locale_dir)? {
            for file in fs::read_dir(&device_dir).with_context(|| format!("read {}", device_dir.display()))? {
                let path = file?.path();
                let is_png = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"));
                let Some(name) = path.file_stem().and_then(|s| s.to_str()).filter(|_| is_png) else {
                    continue;
                };
                let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                entries.push(ReviewEntry {
                    key: format!("{locale}/{device}/{name}"),
                    screenshot_id: name.to_string(),
                    locale: locale.clone(),
                    device: device.clone(),
                    status: if size > 0 { STATUS_READY } else { STATUS_MISSING }.to_string(),
                    path: absolute(&path)?.display().to_string(),
                });
            }
        }
    }
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_html(manifest: &ReviewManifest, approvals: &Approvals) -> String {
    let mut html = String::from(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Screenshot review</title>\n<style>\n\
         body{font-family:-apple-system,sans-serif;margin:2em}\n\
         .grid{display:flex;flex-wrap:wrap;gap:1em}\n\
         figure{margin:0;width:240px}\nimg{width:100%;border:1px solid #ccc}\n\
         .approved{color:#080}.missing{color:#b00}\n</style>\n</head>\n<body>\n<h1>Screenshot review</h1>\n",
    );

    let mut groups: BTreeMap<(&str, &str), Vec<&ReviewEntry>> = BTreeMap::new();
    for entry in &manifest.entries {
        groups.entry((entry.locale.as_str(), entry.device.as_str())).or_default().push(entry);
    }
    for ((locale, device), entries) in groups {
        html.push_str(&format!(
            "<h2>{} / {}</h2>\n<div class=\"grid\">\n",
            escape_html(locale),
            escape_html(device)
        ));
        for entry in entries {
            let approved = approvals.get(&entry.key) == Some(&true);
            let badge = match (approved, entry.status.as_str()) {
                (true, _) => "<span class=\"approved\">approved</span>".to_string(),
                (false, STATUS_MISSING) => "<span class=\"missing\">missing</span>".to_string(),
                (false, status) => escape_html(status),
            };
            html.push_str(&format!(
                "<figure id=\"{key}\"><img src=\"file://{src}\" alt=\"{key}\"><figcaption>{name} {badge}</figcaption></figure>\n",
                key = escape_html(&entry.key),
                src = escape_html(&entry.path),
                name = escape_html(&entry.screenshot_id),
            ));
        }
        html.push_str("</div>\n");
    }
    html.push_str("</body>\n</html>\n");
    html
}

/// Build the manifest and HTML page for a directory of raw captures.
/// Existing approvals survive for keys still present.
pub fn generate_review(input_dir: &Path, output_dir: Option<&str>) -> Result<GenerateResult> {
    let output_dir = resolve_output_dir(output_dir)?;
    let manifest = ReviewManifest {
        entries: scan_screenshots(input_dir)?,
    };
    let manifest_path = output_dir.join(DEFAULT_MANIFEST_NAME);
    let html_path = output_dir.join(DEFAULT_HTML_NAME);
    let approval_path = output_dir.join(DEFAULT_APPROVALS_NAME);

    let mut data = serde_json::to_vec_pretty(&manifest)?;
    data.push(b'\n');
    write_file_safely(&manifest_path, &data, true)?;

    let previous = load_approvals(&approval_path)?;
    if approval_path.exists() {
        save_approvals(&approval_path, &previous, &manifest)?;
    }
    let approvals = load_approvals(&approval_path)?;
    write_file_safely(&html_path, render_html(&manifest, &approvals).as_bytes(), true)?;

    let ready = manifest.entries.iter().filter(|e| e.status == STATUS_READY).count();
    info!(entries = manifest.entries.len(), ready, "review generated");
    Ok(GenerateResult {
        output_dir: output_dir.display().to_string(),
        html_path: html_path.display().to_string(),
        manifest_path: manifest_path.display().to_string(),
        approval_path: approval_path.display().to_string(),
        total: manifest.entries.len(),
        ready,
        missing: manifest.entries.len() - ready,
        approved: approvals.values().filter(|v| **v).count(),
    })
}

pub fn render_approve_table(result: &ApproveResult) {
    println!("Manifest: {}", result.manifest_path);
    println!("Approvals: {}", result.approval_path);
    println!(
        "Matched: {}  Added: {}  Total Approved: {}\n",
        result.matched, result.added, result.total_approved
    );
    let rows: Vec<Vec<String>> = result.keys.iter().map(|k| vec![k.clone()]).collect();
    crate::output::render_table(&["key"], &rows);
}

pub fn render_approve_markdown(result: &ApproveResult) {
    println!("**Matched:** {}  ", result.matched);
    println!("**Added:** {}  ", result.added);
    println!("**Total Approved:** {}\n", result.total_approved);
    for key in &result.keys {
        println!("- {key}");
    }
}
