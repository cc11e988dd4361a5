//! HTTP client for the App Store Connect API.

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::Signer;
use crate::config::Credentials;
use crate::types::*;

pub const BASE: &str = "https://api.appstoreconnect.apple.com";
const MAX_PAGES: u32 = 50;

/// Failure talking to ASC, classified so callers can recover from 404s.
#[derive(Debug, Error)]
pub enum AscError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("API {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("parse response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// True when any error in the chain is an ASC 404.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|e| matches!(e.downcast_ref::<AscError>(), Some(AscError::NotFound(_))))
}

/// Trim and uppercase an ASC enum value (`in_review ` → `IN_REVIEW`).
pub fn normalize_enum(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

/// Canonical state of an App Store version: `appVersionState` when present,
/// otherwise the legacy `appStoreState`.
pub fn resolve_app_store_version_state(attrs: &AppStoreVersionAttributes) -> String {
    [&attrs.app_version_state, &attrs.app_store_state]
        .into_iter()
        .flatten()
        .map(|s| normalize_enum(s))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Order two ASC timestamps. RFC 3339 values are compared as instants;
/// anything unparseable falls back to string order.
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (
        chrono::DateTime::parse_from_rfc3339(a.trim()),
        chrono::DateTime::parse_from_rfc3339(b.trim()),
    ) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn error_message(body: &str) -> String {
    let doc: ErrorDocument = serde_json::from_str(body).unwrap_or_default();
    match doc.errors.first() {
        Some(e) => {
            let title = e.title.as_deref().or(e.code.as_deref()).unwrap_or("error");
            match e.detail.as_deref() {
                Some(detail) if !detail.is_empty() => format!("{title}: {detail}"),
                _ => title.to_string(),
            }
        }
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().to_string(),
    }
}

pub struct AscClient {
    http: reqwest::Client,
    signer: Signer,
    base: String,
}

impl AscClient {
    pub fn new(creds: &Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("asc/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            signer: Signer::new(&creds.issuer_id, &creds.key_id, &creds.private_key)?,
            base: BASE.to_string(),
        })
    }

    /// Point the client at another origin (local fake servers in tests).
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = Url::parse_with_params(&format!("{}{path}", self.base), query)
            .with_context(|| format!("invalid request URL for {path}"))?;
        Ok(url.into())
    }

    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<String> {
        let token = self.signer.token()?;
        debug!(%method, url, "request");
        let mut req = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").json(body);
        }
        let resp = req.send().await.map_err(AscError::from)?;

        let status = resp.status();
        let text = resp.text().await.map_err(AscError::from)?;
        if status.is_success() {
            return Ok(text);
        }
        let message = error_message(&text);
        let err = match status {
            StatusCode::NOT_FOUND => AscError::NotFound(message),
            StatusCode::UNAUTHORIZED => AscError::Unauthorized(message),
            _ => AscError::Api {
                status: status.as_u16(),
                message,
            },
        };
        Err(err.into())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.request(Method::GET, url, None).await?;
        Ok(serde_json::from_str(&text).map_err(AscError::from)?)
    }

    async fn send_json<T: DeserializeOwned>(&self, method: Method, url: &str, body: &Value) -> Result<T> {
        let text = self.request(method, url, Some(body)).await?;
        Ok(serde_json::from_str(&text).map_err(AscError::from)?)
    }

    /// Follow `links.next` until exhausted, collecting every page.
    pub async fn paginate<A>(&self, first: String) -> Result<Vec<Resource<A>>>
    where
        A: DeserializeOwned + Default,
    {
        let mut url = first;
        let mut out = Vec::new();
        let mut page = 0u32;
        loop {
            page += 1;
            let resp: ListResponse<A> = self.get_json(&url).await?;
            out.extend(resp.data);
            match resp.links.next_url() {
                Some(next) => url = next.to_string(),
                None => break,
            }
            if page >= MAX_PAGES {
                warn!(url = %url, "hit {MAX_PAGES} page limit, stopping pagination");
                break;
            }
        }
        Ok(out)
    }

    // ─── Apps ────────────────────────────────────────────────────────────

    pub async fn get_app(&self, app_id: &str) -> Result<AppResource> {
        let url = self.url(
            &format!("/v1/apps/{app_id}"),
            &[("fields[apps]", "name,bundleId".into())],
        )?;
        let r: SingleResponse<AppAttributes> = self.get_json(&url).await?;
        Ok(r.data)
    }

    // ─── Builds / TestFlight ─────────────────────────────────────────────

    pub async fn list_builds(&self, app_id: &str, limit: u32) -> Result<Vec<BuildResource>> {
        let url = self.url(
            "/v1/builds",
            &[
                ("filter[app]", app_id.to_string()),
                ("sort", "-uploadedDate".into()),
                ("limit", limit.to_string()),
            ],
        )?;
        let r: ListResponse<BuildAttributes> = self.get_json(&url).await?;
        Ok(r.data)
    }

    pub async fn get_build_pre_release_version(
        &self,
        build_id: &str,
    ) -> Result<Resource<PreReleaseVersionAttributes>> {
        let url = self.url(&format!("/v1/builds/{build_id}/preReleaseVersion"), &[])?;
        let r: SingleResponse<PreReleaseVersionAttributes> = self.get_json(&url).await?;
        Ok(r.data)
    }

    pub async fn list_build_beta_details(
        &self,
        build_ids: &[String],
        limit: u32,
    ) -> Result<Vec<BuildBetaDetailResource>> {
        let url = self.url(
            "/v1/buildBetaDetails",
            &[
                ("filter[build]", build_ids.join(",")),
                ("limit", limit.to_string()),
            ],
        )?;
        let r: ListResponse<BuildBetaDetailAttributes> = self.get_json(&url).await?;
        Ok(r.data)
    }

    pub async fn list_beta_app_review_submissions(
        &self,
        build_ids: &[String],
        limit: u32,
    ) -> Result<Vec<BetaReviewSubmissionResource>> {
        let url = self.url(
            "/v1/betaAppReviewSubmissions",
            &[
                ("filter[build]", build_ids.join(",")),
                ("limit", limit.to_string()),
            ],
        )?;
        let r: ListResponse<BetaAppReviewSubmissionAttributes> = self.get_json(&url).await?;
        Ok(r.data)
    }

    // ─── App Store versions ──────────────────────────────────────────────

    pub async fn list_app_store_versions(
        &self,
        app_id: &str,
        version_string: Option<&str>,
        platform: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AppStoreVersionResource>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(v) = version_string {
            query.push(("filter[versionString]", v.to_string()));
        }
        if let Some(p) = platform {
            query.push(("filter[platform]", p.to_string()));
        }
        let url = self.url(&format!("/v1/apps/{app_id}/appStoreVersions"), &query)?;
        self.paginate(url).await
    }

    /// Phased release for a version. ASC answers 404 when none is configured.
    pub async fn get_phased_release(&self, version_id: &str) -> Result<PhasedReleaseResource> {
        let url = self.url(
            &format!("/v1/appStoreVersions/{version_id}/appStoreVersionPhasedRelease"),
            &[],
        )?;
        let r: SingleResponse<PhasedReleaseAttributes> = self.get_json(&url).await?;
        Ok(r.data)
    }

    pub async fn list_review_submissions(
        &self,
        app_id: &str,
        limit: u32,
    ) -> Result<Vec<ReviewSubmissionResource>> {
        let url = self.url(
            "/v1/reviewSubmissions",
            &[
                ("filter[app]", app_id.to_string()),
                ("limit", limit.to_string()),
            ],
        )?;
        let r: ListResponse<ReviewSubmissionAttributes> = self.get_json(&url).await?;
        Ok(r.data)
    }

    // ─── App infos + localizations ───────────────────────────────────────

    pub async fn list_app_infos(&self, app_id: &str) -> Result<Vec<AppInfoResource>> {
        let url = self.url(&format!("/v1/apps/{app_id}/appInfos"), &[])?;
        self.paginate(url).await
    }

    pub async fn list_app_info_localizations(
        &self,
        app_info_id: &str,
    ) -> Result<Vec<AppInfoLocalizationResource>> {
        let url = self.url(
            &format!("/v1/appInfos/{app_info_id}/appInfoLocalizations"),
            &[("limit", "200".into())],
        )?;
        self.paginate(url).await
    }

    pub async fn list_version_localizations(
        &self,
        version_id: &str,
    ) -> Result<Vec<VersionLocalizationResource>> {
        let url = self.url(
            &format!("/v1/appStoreVersions/{version_id}/appStoreVersionLocalizations"),
            &[("limit", "200".into())],
        )?;
        self.paginate(url).await
    }

    pub async fn create_app_info_localization(&self, app_info_id: &str, attributes: Value) -> Result<String> {
        let body = serde_json::json!({
            "data": {
                "type": "appInfoLocalizations",
                "attributes": attributes,
                "relationships": {
                    "appInfo": { "data": { "type": "appInfos", "id": app_info_id } }
                }
            }
        });
        let url = self.url("/v1/appInfoLocalizations", &[])?;
        let r: Created = self.send_json(Method::POST, &url, &body).await?;
        Ok(r.data.id)
    }

    pub async fn update_app_info_localization(&self, id: &str, attributes: Value) -> Result<()> {
        let body = serde_json::json!({
            "data": { "type": "appInfoLocalizations", "id": id, "attributes": attributes }
        });
        let url = self.url(&format!("/v1/appInfoLocalizations/{id}"), &[])?;
        let _: Created = self.send_json(Method::PATCH, &url, &body).await?;
        Ok(())
    }

    pub async fn create_version_localization(&self, version_id: &str, attributes: Value) -> Result<String> {
        let body = serde_json::json!({
            "data": {
                "type": "appStoreVersionLocalizations",
                "attributes": attributes,
                "relationships": {
                    "appStoreVersion": { "data": { "type": "appStoreVersions", "id": version_id } }
                }
            }
        });
        let url = self.url("/v1/appStoreVersionLocalizations", &[])?;
        let r: Created = self.send_json(Method::POST, &url, &body).await?;
        Ok(r.data.id)
    }

    pub async fn update_version_localization(&self, id: &str, attributes: Value) -> Result<()> {
        let body = serde_json::json!({
            "data": { "type": "appStoreVersionLocalizations", "id": id, "attributes": attributes }
        });
        let url = self.url(&format!("/v1/appStoreVersionLocalizations/{id}"), &[])?;
        let _: Created = self.send_json(Method::PATCH, &url, &body).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct Created {
    data: CreatedData,
}

#[derive(Deserialize)]
struct CreatedData {
    id: String,
}
