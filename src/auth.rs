//! ES256 JWT generation for App Store Connect API authentication.

use anyhow::{Context, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

const AUDIENCE: &str = "appstoreconnect-v1";
const TOKEN_LIFETIME_SECS: u64 = 20 * 60;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: u64,
    exp: u64,
    aud: &'a str,
}

/// Parsed signing material for one API key.
pub struct Signer {
    issuer_id: String,
    key_id: String,
    key: EncodingKey,
}

impl Signer {
    /// Parse the `.p8` PEM up front so a bad key fails before any request.
    pub fn new(issuer_id: &str, key_id: &str, private_key: &str) -> Result<Self> {
        let key = EncodingKey::from_ec_pem(private_key.as_bytes())
            .context("failed to parse .p8 private key")?;
        Ok(Self {
            issuer_id: issuer_id.to_string(),
            key_id: key_id.to_string(),
            key,
        })
    }

    /// Generate a short-lived ES256 JWT.
    pub fn token(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("clock error")?
            .as_secs();

        let claims = Claims {
            iss: &self.issuer_id,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
            aud: AUDIENCE,
        };

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        header.typ = Some("JWT".to_string());

        encode(&header, &claims, &self.key).context("failed to encode JWT")
    }
}
