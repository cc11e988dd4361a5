//! Localized App Store metadata kept as a canonical JSON tree on disk:
//!
//! ```text
//! <dir>/app-info/<locale>.json
//! <dir>/version/<version>/<locale>.json
//! ```
//!
//! The locale is the file name; records carry only the localized strings.

mod files;
mod sync;
mod validate;

pub use files::*;
pub use sync::*;
pub use validate::*;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const LIMIT_NAME: usize = 30;
pub const LIMIT_SUBTITLE: usize = 30;
pub const LIMIT_DESCRIPTION: usize = 4000;
pub const LIMIT_KEYWORDS: usize = 100;
pub const LIMIT_WHATS_NEW: usize = 4000;
pub const LIMIT_PROMOTIONAL_TEXT: usize = 170;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid {kind} {value:?}: must be non-empty without path separators or \"..\"")]
    InvalidSegment { kind: &'static str, value: String },
    #[error("refusing to follow symlink {}", .0.display())]
    Symlink(PathBuf),
    #[error("{} is not a regular file", .0.display())]
    NotRegularFile(PathBuf),
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("{} is larger than {limit} bytes", .path.display())]
    TooLarge { path: PathBuf, limit: u64 },
    #[error("invalid metadata JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid metadata JSON: trailing data after first value")]
    TrailingData,
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// App-level localized strings (`app-info/<locale>.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppInfoLocalization {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subtitle: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub privacy_policy_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub privacy_policy_text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub privacy_choices_url: String,
}

/// Per-version localized strings (`version/<version>/<locale>.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VersionLocalization {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keywords: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub whats_new: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub promotional_text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub marketing_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub support_url: String,
}

fn trimmed(s: &str) -> String {
    s.trim().to_string()
}

impl AppInfoLocalization {
    pub fn normalized(&self) -> Self {
        Self {
            name: trimmed(&self.name),
            subtitle: trimmed(&self.subtitle),
            privacy_policy_url: trimmed(&self.privacy_policy_url),
            privacy_policy_text: trimmed(&self.privacy_policy_text),
            privacy_choices_url: trimmed(&self.privacy_choices_url),
        }
    }

    pub fn from_remote(attrs: &crate::types::AppInfoLocalizationAttributes) -> Self {
        Self {
            name: attrs.name.clone().unwrap_or_default(),
            subtitle: attrs.subtitle.clone().unwrap_or_default(),
            privacy_policy_url: attrs.privacy_policy_url.clone().unwrap_or_default(),
            privacy_policy_text: attrs.privacy_policy_text.clone().unwrap_or_default(),
            privacy_choices_url: attrs.privacy_choices_url.clone().unwrap_or_default(),
        }
        .normalized()
    }
}

impl VersionLocalization {
    pub fn normalized(&self) -> Self {
        Self {
            description: trimmed(&self.description),
            keywords: trimmed(&self.keywords),
            whats_new: trimmed(&self.whats_new),
            promotional_text: trimmed(&self.promotional_text),
            marketing_url: trimmed(&self.marketing_url),
            support_url: trimmed(&self.support_url),
        }
    }

    pub fn from_remote(attrs: &crate::types::VersionLocalizationAttributes) -> Self {
        Self {
            description: attrs.description.clone().unwrap_or_default(),
            keywords: attrs.keywords.clone().unwrap_or_default(),
            whats_new: attrs.whats_new.clone().unwrap_or_default(),
            promotional_text: attrs.promotional_text.clone().unwrap_or_default(),
            marketing_url: attrs.marketing_url.clone().unwrap_or_default(),
            support_url: attrs.support_url.clone().unwrap_or_default(),
        }
        .normalized()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized() == Self::default()
    }
}

// ─── Codec ───────────────────────────────────────────────────────────────────

fn decode_strict<T: DeserializeOwned>(data: &[u8]) -> Result<T, MetadataError> {
    let mut de = serde_json::Deserializer::from_slice(data);
    let value = T::deserialize(&mut de).map_err(MetadataError::Decode)?;
    de.end().map_err(|_| MetadataError::TrailingData)?;
    Ok(value)
}

pub fn decode_app_info_localization(data: &[u8]) -> Result<AppInfoLocalization, MetadataError> {
    decode_strict(data)
}

pub fn decode_version_localization(data: &[u8]) -> Result<VersionLocalization, MetadataError> {
    decode_strict(data)
}

/// Canonical bytes: fixed field order, trimmed values, empty fields omitted,
/// no trailing newline.
pub fn encode_app_info_localization(record: &AppInfoLocalization) -> Vec<u8> {
    encode(&record.normalized())
}

pub fn encode_version_localization(record: &VersionLocalization) -> Vec<u8> {
    encode(&record.normalized())
}

fn encode<T: Serialize>(record: &T) -> Vec<u8> {
    // Plain structs of strings always serialize.
    serde_json::to_vec(record).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_unknown_fields() {
        let err = decode_app_info_localization(br#"{"name":"App Name","unknown":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"), "{err}");
    }

    #[test]
    fn decode_rejects_trailing_data() {
        let err = decode_version_localization(br#"{"description":"Hello"}{"description":"Again"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("trailing data"), "{err}");
    }

    #[test]
    fn decode_allows_trailing_newline() {
        let rec = decode_version_localization(b"{\"keywords\":\"a,b\"}\n").unwrap();
        assert_eq!(rec.keywords, "a,b");
    }

    #[test]
    fn encode_is_canonical() {
        let got = encode_version_localization(&VersionLocalization {
            description: " Desc ".into(),
            keywords: " one,two ".into(),
            ..Default::default()
        });
        assert_eq!(got, br#"{"description":"Desc","keywords":"one,two"}"#);
    }

    #[test]
    fn encode_keeps_declared_field_order() {
        let got = encode_app_info_localization(&AppInfoLocalization {
            privacy_policy_url: "https://example.com/p".into(),
            name: "App".into(),
            subtitle: "  ".into(),
            ..Default::default()
        });
        assert_eq!(
            String::from_utf8(got).unwrap(),
            r#"{"name":"App","privacyPolicyUrl":"https://example.com/p"}"#
        );
    }

    #[test]
    fn trimmed_records_survive_encode_decode() {
        let rec = VersionLocalization {
            whats_new: "Bug fixes".into(),
            support_url: "https://example.com".into(),
            ..Default::default()
        };
        let back = decode_version_localization(&encode_version_localization(&rec)).unwrap();
        assert_eq!(back, rec);
    }
}
