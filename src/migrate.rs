//! Fastlane `deliver` metadata import/export.
//!
//! Layout: `<dir>/<locale>/<field>.txt`, one plain-text file per field.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::client::AscClient;
use crate::metadata::{
    apply_step, attributes_of, check_segment, push_step, read_file_safely, remote_locale, resolve_app_info_id, resolve_version,
    validate_app_info_localization, validate_version_localization, write_file_safely, AppInfoLocalization, Issue,
    LocalizationKind, Severity, Target, ValidationOptions, VersionLocalization,
};
use crate::output::{render_markdown, render_table};

/// Fastlane directories that are not locales.
const NON_LOCALE_DIRS: [&str; 3] = ["default", "review_information", "trade_representative_contact_information"];

const VERSION_FILES: [&str; 6] = [
    "description",
    "keywords",
    "release_notes",
    "promotional_text",
    "marketing_url",
    "support_url",
];
const APP_INFO_FILES: [&str; 3] = ["name", "subtitle", "privacy_url"];

fn version_field<'a>(rec: &'a mut VersionLocalization, file: &str) -> Option<&'a mut String> {
    Some(match file {
        "description" => &mut rec.description,
        "keywords" => &mut rec.keywords,
        "release_notes" => &mut rec.whats_new,
        "promotional_text" => &mut rec.promotional_text,
        "marketing_url" => &mut rec.marketing_url,
        "support_url" => &mut rec.support_url,
        _ => return None,
    })
}

fn app_info_field<'a>(rec: &'a mut AppInfoLocalization, file: &str) -> Option<&'a mut String> {
    Some(match file {
        "name" => &mut rec.name,
        "subtitle" => &mut rec.subtitle,
        "privacy_url" => &mut rec.privacy_policy_url,
        _ => return None,
    })
}

// ─── Reading ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FastlaneVersionLocalization {
    pub locale: String,
    #[serde(flatten)]
    pub fields: VersionLocalization,
}

#[derive(Debug, Clone, Serialize)]
pub struct FastlaneAppInfoLocalization {
    pub locale: String,
    #[serde(flatten)]
    pub fields: AppInfoLocalization,
}

#[derive(Debug, Default)]
pub struct FastlaneTree {
    pub versions: Vec<FastlaneVersionLocalization>,
    pub app_info: Vec<FastlaneAppInfoLocalization>,
}

fn read_text(path: &Path) -> Result<Option<String>> {
    if !path.exists() && !path.is_symlink() {
        return Ok(None);
    }
    let bytes = read_file_safely(path)?;
    let text = String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8", path.display()))?;
    Ok(Some(text.trim().to_string()))
}

fn locale_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut locales = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') || NON_LOCALE_DIRS.contains(&name.as_str()) {
            continue;
        }
        locales.push(name);
    }
    locales.sort();
    Ok(locales)
}

/// Read every locale directory under `dir`. Locales with no recognised
/// files are skipped.
pub fn read_fastlane_dir(dir: &Path) -> Result<FastlaneTree> {
    let mut tree = FastlaneTree::default();
    for locale in locale_dirs(dir)? {
        let locale_dir = dir.join(&locale);

        let mut version = VersionLocalization::default();
        for file in VERSION_FILES {
            if let (Some(text), Some(slot)) = (
                read_text(&locale_dir.join(format!("{file}.txt")))?,
                version_field(&mut version, file),
            ) {
                *slot = text;
            }
        }
        let mut app_info = AppInfoLocalization::default();
        for file in APP_INFO_FILES {
            if let (Some(text), Some(slot)) = (
                read_text(&locale_dir.join(format!("{file}.txt")))?,
                app_info_field(&mut app_info, file),
            ) {
                *slot = text;
            }
        }

        if !version.is_empty() {
            tree.versions.push(FastlaneVersionLocalization {
                locale: locale.clone(),
                fields: version,
            });
        }
        if app_info.normalized() != AppInfoLocalization::default() {
            tree.app_info.push(FastlaneAppInfoLocalization {
                locale,
                fields: app_info,
            });
        } else {
            debug!(locale = %locale, "no app info files");
        }
    }
    Ok(tree)
}

// ─── Validate ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateValidateResult {
    pub fastlane_dir: String,
    pub locales: Vec<String>,
    pub valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub issues: Vec<Issue>,
}

fn tree_issues(dir: &Path, tree: &FastlaneTree) -> Vec<Issue> {
    let mut issues = Vec::new();
    for loc in &tree.versions {
        issues.extend(
            validate_version_localization(&loc.fields)
                .into_iter()
                .map(|i| i.at(&dir.join(&loc.locale), &loc.locale)),
        );
    }
    for loc in &tree.app_info {
        issues.extend(
            validate_app_info_localization(&loc.fields, ValidationOptions::default())
                .into_iter()
                .map(|i| i.at(&dir.join(&loc.locale), &loc.locale)),
        );
    }
    issues.sort_by(|a, b| (&a.locale, &a.field).cmp(&(&b.locale, &b.field)));
    issues
}

pub fn validate(dir: &Path) -> Result<MigrateValidateResult> {
    let tree = read_fastlane_dir(dir)?;
    let issues = tree_issues(dir, &tree);
    let mut locales: Vec<String> = tree
        .versions
        .iter()
        .map(|l| l.locale.clone())
        .chain(tree.app_info.iter().map(|l| l.locale.clone()))
        .collect();
    locales.sort();
    locales.dedup();

    let error_count = issues.iter().filter(|i| i.severity == Severity::Error).count();
    Ok(MigrateValidateResult {
        fastlane_dir: dir.display().to_string(),
        locales,
        valid: error_count == 0,
        error_count,
        warning_count: issues.len() - error_count,
        issues,
    })
}

// ─── Import ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub locale: String,
    pub fields: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateImportResult {
    pub version_id: String,
    pub dry_run: bool,
    pub localizations: Vec<FastlaneVersionLocalization>,
    pub app_info_localizations: Vec<FastlaneAppInfoLocalization>,
    pub uploaded: Vec<Uploaded>,
    pub app_info_uploaded: Vec<Uploaded>,
}

/// Upload a fastlane tree to the version named by `target`.
pub async fn import(client: &AscClient, target: &Target<'_>, dir: &Path, dry_run: bool) -> Result<MigrateImportResult> {
    let tree = read_fastlane_dir(dir)?;
    if tree.versions.is_empty() && tree.app_info.is_empty() {
        bail!("no fastlane metadata found under {}", dir.display());
    }
    let errors: Vec<String> = tree_issues(dir, &tree)
        .into_iter()
        .filter(|i| i.severity == Severity::Error)
        .map(|i| format!("{}: {}", i.locale, i.message))
        .collect();
    if !errors.is_empty() {
        bail!("fastlane metadata is invalid:\n  {}", errors.join("\n  "));
    }

    let version = resolve_version(client, target).await?;
    let mut result = MigrateImportResult {
        version_id: version.id.clone(),
        dry_run,
        localizations: tree.versions,
        app_info_localizations: tree.app_info,
        uploaded: Vec::new(),
        app_info_uploaded: Vec::new(),
    };
    if dry_run {
        return Ok(result);
    }

    let remote: BTreeMap<String, String> = client
        .list_version_localizations(&version.id)
        .await
        .context("list version localizations")?
        .into_iter()
        .filter_map(|loc| remote_locale(loc.attributes.locale.as_deref()).map(|l| (l, loc.id)))
        .collect();
    for loc in &result.localizations {
        let step = push_step(&loc.locale, LocalizationKind::Version, &remote, attributes_of(&loc.fields.normalized()));
        apply_step(client, &step, None, &version.id)
            .await
            .with_context(|| format!("upload version localization {}", loc.locale))?;
        result.uploaded.push(Uploaded {
            locale: loc.locale.clone(),
            fields: step.fields.len(),
        });
    }

    if !result.app_info_localizations.is_empty() {
        let app_info_id = resolve_app_info_id(client, target).await?;
        let remote: BTreeMap<String, String> = client
            .list_app_info_localizations(&app_info_id)
            .await
            .context("list app info localizations")?
            .into_iter()
            .filter_map(|loc| remote_locale(loc.attributes.locale.as_deref()).map(|l| (l, loc.id)))
            .collect();
        for loc in &result.app_info_localizations {
            let step = push_step(&loc.locale, LocalizationKind::AppInfo, &remote, attributes_of(&loc.fields.normalized()));
            apply_step(client, &step, Some(&app_info_id), &version.id)
                .await
                .with_context(|| format!("upload app info localization {}", loc.locale))?;
            result.app_info_uploaded.push(Uploaded {
                locale: loc.locale.clone(),
                fields: step.fields.len(),
            });
        }
    }

    info!(
        uploaded = result.uploaded.len(),
        app_info_uploaded = result.app_info_uploaded.len(),
        "fastlane import finished"
    );
    Ok(result)
}

// ─── Export ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateExportResult {
    pub version_id: String,
    pub output_dir: String,
    pub locales: Vec<String>,
    pub total_files: usize,
}

fn write_text(dir: &Path, locale: &str, file: &str, value: &str) -> Result<bool> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(false);
    }
    check_segment("locale", locale)?;
    let path = dir.join(locale).join(format!("{file}.txt"));
    write_file_safely(&path, format!("{value}\n").as_bytes(), true)?;
    Ok(true)
}

/// Write the version's localizations (and the editable app info's) as
/// fastlane text files.
pub async fn export(client: &AscClient, target: &Target<'_>, out: &Path) -> Result<MigrateExportResult> {
    let version = resolve_version(client, target).await?;
    let mut locales = Vec::new();
    let mut total_files = 0;

    for loc in client
        .list_version_localizations(&version.id)
        .await
        .context("list version localizations")?
    {
        let Some(locale) = remote_locale(loc.attributes.locale.as_deref()) else {
            continue;
        };
        let mut rec = VersionLocalization::from_remote(&loc.attributes);
        for file in VERSION_FILES {
            if let Some(value) = version_field(&mut rec, file) {
                total_files += usize::from(write_text(out, &locale, file, value)?);
            }
        }
        locales.push(locale);
    }

    let app_info_id = resolve_app_info_id(client, target).await?;
    for loc in client
        .list_app_info_localizations(&app_info_id)
        .await
        .context("list app info localizations")?
    {
        let Some(locale) = remote_locale(loc.attributes.locale.as_deref()) else {
            continue;
        };
        let mut rec = AppInfoLocalization::from_remote(&loc.attributes);
        for file in APP_INFO_FILES {
            if let Some(value) = app_info_field(&mut rec, file) {
                total_files += usize::from(write_text(out, &locale, file, value)?);
            }
        }
        locales.push(locale);
    }

    locales.sort();
    locales.dedup();
    info!(total_files, dir = %out.display(), "fastlane export finished");
    Ok(MigrateExportResult {
        version_id: version.id,
        output_dir: out.display().to_string(),
        locales,
        total_files,
    })
}

// ─── Rendering ───────────────────────────────────────────────────────────────

fn yes_or_dash(value: &str) -> String {
    let mark = if value.trim().is_empty() { "-" } else { "yes" };
    mark.to_string()
}

fn count_fields(fields: &VersionLocalization) -> usize {
    attributes_of(&fields.normalized()).len()
}

fn uploaded_status(uploaded: &[Uploaded], locale: &str) -> String {
    let status = if uploaded.iter().any(|u| u.locale == locale) { "uploaded" } else { "found" };
    status.to_string()
}

pub fn render_import_table(result: &MigrateImportResult) {
    if result.dry_run {
        println!("DRY RUN - No changes made\n");
    }
    println!("Version ID: {}\n", result.version_id);
    println!("Version Localizations:");
    let rows: Vec<Vec<String>> = result
        .localizations
        .iter()
        .map(|l| {
            vec![
                l.locale.clone(),
                count_fields(&l.fields).to_string(),
                uploaded_status(&result.uploaded, &l.locale),
            ]
        })
        .collect();
    render_table(&["locale", "fields", "status"], &rows);

    if !result.app_info_localizations.is_empty() {
        println!("\nApp Info Localizations:");
        let rows: Vec<Vec<String>> = result
            .app_info_localizations
            .iter()
            .map(|l| {
                vec![
                    l.locale.clone(),
                    yes_or_dash(&l.fields.name),
                    yes_or_dash(&l.fields.subtitle),
                    uploaded_status(&result.app_info_uploaded, &l.locale),
                ]
            })
            .collect();
        render_table(&["locale", "name", "subtitle", "status"], &rows);
    }
}

pub fn render_import_markdown(result: &MigrateImportResult) {
    if result.dry_run {
        println!("## Dry Run - No changes made\n");
    }
    println!("**Version ID:** {}\n", result.version_id);
    println!("### Version Localizations Found\n");
    let rows: Vec<Vec<String>> = result
        .localizations
        .iter()
        .map(|l| vec![l.locale.clone(), count_fields(&l.fields).to_string()])
        .collect();
    render_markdown(&["Locale", "Fields"], &rows);

    if !result.app_info_localizations.is_empty() {
        println!("\n### App Info Localizations Found\n");
        let rows: Vec<Vec<String>> = result
            .app_info_localizations
            .iter()
            .map(|l| vec![l.locale.clone(), yes_or_dash(&l.fields.name), yes_or_dash(&l.fields.subtitle)])
            .collect();
        render_markdown(&["Locale", "Name", "Subtitle"], &rows);
    }
    for (title, list) in [("Uploaded", &result.uploaded), ("App Info Uploaded", &result.app_info_uploaded)] {
        if !list.is_empty() {
            println!("\n### {title}\n");
            for u in list {
                println!("- {} ({} fields)", u.locale, u.fields);
            }
        }
    }
}

pub fn render_export_table(result: &MigrateExportResult) {
    println!("Version ID: {}", result.version_id);
    println!("Output Dir: {}\n", result.output_dir);
    let rows: Vec<Vec<String>> = result.locales.iter().map(|l| vec![l.clone()]).collect();
    render_table(&["locale"], &rows);
    println!("\nTotal Files: {}", result.total_files);
}

pub fn render_export_markdown(result: &MigrateExportResult) {
    println!("**Version ID:** {}\n", result.version_id);
    println!("**Output Directory:** {}\n", result.output_dir);
    println!("### Exported Locales\n");
    for locale in &result.locales {
        println!("- {locale}");
    }
    println!("\n**Total Files:** {}", result.total_files);
}

fn validate_rows(result: &MigrateValidateResult) -> Vec<Vec<String>> {
    let opt = |v: Option<usize>| v.map_or("-".to_string(), |n| n.to_string());
    result
        .issues
        .iter()
        .map(|i| {
            vec![
                i.locale.clone(),
                i.field.clone(),
                i.severity.as_str().to_string(),
                i.message.clone(),
                opt(i.length),
                opt(i.limit),
            ]
        })
        .collect()
}

pub fn render_validate_table(result: &MigrateValidateResult) {
    println!("Fastlane Dir: {}\n", result.fastlane_dir);
    println!("{}", if result.valid { "VALIDATION PASSED" } else { "VALIDATION FAILED" });
    println!(
        "Locales: {}  Errors: {}  Warnings: {}",
        result.locales.len(),
        result.error_count,
        result.warning_count
    );
    if !result.issues.is_empty() {
        println!();
        render_table(&["locale", "field", "severity", "message", "length", "limit"], &validate_rows(result));
    }
}

pub fn render_validate_markdown(result: &MigrateValidateResult) {
    println!("**Fastlane Directory:** {}\n", result.fastlane_dir);
    println!("{}\n", if result.valid { "## Validation Passed" } else { "## Validation Failed" });
    println!("- **Locales:** {}", result.locales.len());
    println!("- **Errors:** {}", result.error_count);
    println!("- **Warnings:** {}", result.warning_count);
    if !result.issues.is_empty() {
        println!("\n### Issues\n");
        render_markdown(
            &["Locale", "Field", "Severity", "Message", "Length", "Limit"],
            &validate_rows(result),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn reads_locales_and_maps_fields() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "en-US/description.txt", "  An app.\n");
        write(dir.path(), "en-US/release_notes.txt", "Fixes\n");
        write(dir.path(), "en-US/name.txt", "My App\n");
        write(dir.path(), "ja/keywords.txt", "a,b");
        write(dir.path(), "review_information/notes.txt", "ignored");
        write(dir.path(), "en-US/unknown.txt", "ignored");

        let tree = read_fastlane_dir(dir.path()).unwrap();
        let locales: Vec<&str> = tree.versions.iter().map(|l| l.locale.as_str()).collect();
        assert_eq!(locales, ["en-US", "ja"]);
        assert_eq!(tree.versions[0].fields.description, "An app.");
        assert_eq!(tree.versions[0].fields.whats_new, "Fixes");
        assert_eq!(tree.app_info.len(), 1);
        assert_eq!(tree.app_info[0].fields.name, "My App");
    }

    #[test]
    fn validate_reports_length_errors_per_locale() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "en-US/keywords.txt", &"k".repeat(101));
        write(dir.path(), "en-US/name.txt", "Fine");
        write(dir.path(), "de-DE/description.txt", "Gut");

        let result = validate(dir.path()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.locales, ["de-DE", "en-US"]);
        let issue = &result.issues[0];
        assert_eq!((issue.locale.as_str(), issue.field.as_str()), ("en-US", "keywords"));
        assert_eq!(issue.length, Some(101));
        assert_eq!(issue.limit, Some(100));
    }

    #[test]
    fn localization_json_is_flat() {
        let loc = FastlaneVersionLocalization {
            locale: "en-US".into(),
            fields: VersionLocalization {
                whats_new: "Fixes".into(),
                ..Default::default()
            },
        };
        assert_eq!(
            serde_json::to_string(&loc).unwrap(),
            r#"{"locale":"en-US","whatsNew":"Fixes"}"#
        );
    }

    #[test]
    fn write_text_skips_empty_and_rejects_bad_locale() {
        let dir = TempDir::new().unwrap();
        assert!(!write_text(dir.path(), "en-US", "name", "  ").unwrap());
        assert!(write_text(dir.path(), "en-US", "name", "App").unwrap());
        assert_eq!(fs::read_to_string(dir.path().join("en-US/name.txt")).unwrap(), "App\n");
        assert!(write_text(dir.path(), "../x", "name", "App").is_err());
    }
}
