use serde::Serialize;
use std::path::Path;

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub locale: String,
    pub field: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Issue {
    fn new(field: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            file: String::new(),
            locale: String::new(),
            field: field.to_string(),
            severity,
            message: message.into(),
            length: None,
            limit: None,
        }
    }

    pub(crate) fn at(mut self, file: &Path, locale: &str) -> Self {
        self.file = file.display().to_string();
        self.locale = locale.to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    /// New app-info localizations cannot be created without a name.
    pub require_name: bool,
}

fn length_issue(field: &str, value: &str, limit: usize) -> Option<Issue> {
    let length = value.trim().chars().count();
    (length > limit).then(|| Issue {
        length: Some(length),
        limit: Some(limit),
        ..Issue::new(
            field,
            Severity::Error,
            format!("{field} exceeds {limit} characters ({length})"),
        )
    })
}

fn url_issue(field: &str, value: &str) -> Option<Issue> {
    let value = value.trim();
    let looks_like_url = value.starts_with("https://") || value.starts_with("http://");
    (!value.is_empty() && !looks_like_url)
        .then(|| Issue::new(field, Severity::Warning, format!("{field} should be an http(s) URL")))
}

pub fn validate_app_info_localization(record: &AppInfoLocalization, opts: ValidationOptions) -> Vec<Issue> {
    let mut issues = Vec::new();
    if opts.require_name && record.name.trim().is_empty() {
        issues.push(Issue::new("name", Severity::Error, "name is required"));
    }
    issues.extend(length_issue("name", &record.name, LIMIT_NAME));
    issues.extend(length_issue("subtitle", &record.subtitle, LIMIT_SUBTITLE));
    issues.extend(url_issue("privacyPolicyUrl", &record.privacy_policy_url));
    issues.extend(url_issue("privacyChoicesUrl", &record.privacy_choices_url));
    issues
}

pub fn validate_version_localization(record: &VersionLocalization) -> Vec<Issue> {
    if record.is_empty() {
        return vec![Issue::new(
            "metadata",
            Severity::Error,
            "at least one version metadata field is required",
        )];
    }
    let mut issues = Vec::new();
    issues.extend(length_issue("description", &record.description, LIMIT_DESCRIPTION));
    issues.extend(length_issue("keywords", &record.keywords, LIMIT_KEYWORDS));
    issues.extend(length_issue("whatsNew", &record.whats_new, LIMIT_WHATS_NEW));
    issues.extend(length_issue("promotionalText", &record.promotional_text, LIMIT_PROMOTIONAL_TEXT));
    issues.extend(url_issue("marketingUrl", &record.marketing_url));
    issues.extend(url_issue("supportUrl", &record.support_url));
    issues
}

/// Outcome of `metadata validate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub dir: String,
    pub valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn from_issues(dir: &Path, issues: Vec<Issue>) -> Self {
        let error_count = issues.iter().filter(|i| i.severity == Severity::Error).count();
        Self {
            dir: dir.display().to_string(),
            valid: error_count == 0,
            error_count,
            warning_count: issues.len() - error_count,
            issues,
        }
    }
}

/// Validate every record in `tree`, tagging issues with file and locale.
pub fn validate_tree(root: &Path, tree: &MetadataTree, opts: ValidationOptions) -> Result<Vec<Issue>, MetadataError> {
    let mut issues = Vec::new();
    for (locale, record) in &tree.app_info {
        let file = app_info_localization_path(root, locale)?;
        issues.extend(
            validate_app_info_localization(record, opts)
                .into_iter()
                .map(|i| i.at(&file, locale)),
        );
    }
    for (version, locales) in &tree.versions {
        for (locale, record) in locales {
            let file = version_localization_path(root, version, locale)?;
            issues.extend(
                validate_version_localization(record)
                    .into_iter()
                    .map(|i| i.at(&file, locale)),
            );
        }
    }
    Ok(issues)
}

pub fn render_validation_table(report: &ValidationReport) {
    crate::output::render_table(&["file", "locale", "field", "severity", "message"], &issue_rows(report));
}

pub fn render_validation_markdown(report: &ValidationReport) {
    crate::output::render_markdown(&["file", "locale", "field", "severity", "message"], &issue_rows(report));
}

fn issue_rows(report: &ValidationReport) -> Vec<Vec<String>> {
    report
        .issues
        .iter()
        .map(|i| {
            vec![
                i.file.clone(),
                i.locale.clone(),
                i.field.clone(),
                i.severity.as_str().to_string(),
                i.message.clone(),
            ]
        })
        .collect()
}
