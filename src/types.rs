//! App Store Connect API response types for the release pipeline.
//!
//! Every resource shares the JSON:API envelope, so records are modeled as
//! `Resource<Attributes>` with per-family attribute structs. Timestamps stay
//! as the raw RFC 3339 strings ASC returns; comparison happens in
//! [`crate::client::compare_timestamps`].

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

// ─── JSON:API envelope ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PagedLinks {
    pub next: Option<String>,
}

impl PagedLinks {
    /// Next page URL, treating an empty string as the end.
    pub fn next_url(&self) -> Option<&str> {
        self.next.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(bound(deserialize = "A: Deserialize<'de> + Default"))]
pub struct ListResponse<A> {
    pub data: Vec<Resource<A>>,
    #[serde(default)]
    pub links: PagedLinks,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(bound(deserialize = "A: Deserialize<'de> + Default"))]
pub struct SingleResponse<A> {
    pub data: Resource<A>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(bound(deserialize = "A: Deserialize<'de> + Default"))]
pub struct Resource<A> {
    pub id: String,
    #[serde(default)]
    pub attributes: A,
    #[serde(default)]
    pub relationships: Option<HashMap<String, RelData>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelData {
    /// Object for to-one relationships, array for to-many.
    pub data: Option<Value>,
}

impl<A> Resource<A> {
    /// ID of a to-one relationship, if the response included it.
    pub fn relationship_id(&self, key: &str) -> Option<String> {
        self.relationships
            .as_ref()?
            .get(key)?
            .data
            .as_ref()?
            .get("id")?
            .as_str()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

// ─── Error document ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ErrorDocument {
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ErrorEntry {
    pub status: Option<String>,
    pub code: Option<String>,
    pub title: Option<String>,
    pub detail: Option<String>,
}

// ─── Apps ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppAttributes {
    pub bundle_id: Option<String>,
    pub name: Option<String>,
}

// ─── Builds ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildAttributes {
    /// The build number (CFBundleVersion).
    pub version: Option<String>,
    pub uploaded_date: Option<String>,
    pub processing_state: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreReleaseVersionAttributes {
    pub version: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildBetaDetailAttributes {
    pub internal_build_state: Option<String>,
    pub external_build_state: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BetaAppReviewSubmissionAttributes {
    pub beta_review_state: Option<String>,
    pub submitted_date: Option<String>,
}

// ─── App Store versions ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppStoreVersionAttributes {
    pub version_string: Option<String>,
    pub platform: Option<String>,
    pub app_store_state: Option<String>,
    pub app_version_state: Option<String>,
    pub created_date: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhasedReleaseAttributes {
    pub phased_release_state: Option<String>,
    pub start_date: Option<String>,
    pub total_pause_duration: Option<i64>,
    pub current_day_number: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmissionAttributes {
    pub state: Option<String>,
    pub submitted_date: Option<String>,
    pub platform: Option<String>,
}

// ─── App info + localizations ────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoAttributes {
    pub app_store_state: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoLocalizationAttributes {
    pub locale: Option<String>,
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub privacy_policy_url: Option<String>,
    pub privacy_policy_text: Option<String>,
    pub privacy_choices_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VersionLocalizationAttributes {
    pub locale: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub whats_new: Option<String>,
    pub promotional_text: Option<String>,
    pub marketing_url: Option<String>,
    pub support_url: Option<String>,
}

pub type AppResource = Resource<AppAttributes>;
pub type BuildResource = Resource<BuildAttributes>;
pub type BuildBetaDetailResource = Resource<BuildBetaDetailAttributes>;
pub type BetaReviewSubmissionResource = Resource<BetaAppReviewSubmissionAttributes>;
pub type AppStoreVersionResource = Resource<AppStoreVersionAttributes>;
pub type PhasedReleaseResource = Resource<PhasedReleaseAttributes>;
pub type ReviewSubmissionResource = Resource<ReviewSubmissionAttributes>;
pub type AppInfoResource = Resource<AppInfoAttributes>;
pub type AppInfoLocalizationResource = Resource<AppInfoLocalizationAttributes>;
pub type VersionLocalizationResource = Resource<VersionLocalizationAttributes>;
