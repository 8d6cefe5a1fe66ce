use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::ServiceIdentity;
use crate::error::{BridgeError, BridgeResult};

/// Audience Tableau expects on every connected-app JWT
pub const AUDIENCE: &str = "tableau";

/// Lifetime of a minted assertion, in seconds
pub const ASSERTION_TTL_SECS: i64 = 5 * 60;

/// Capabilities requested by every assertion.
pub const SCOPES: [&str; 5] = [
    "tableau:insights:embed",                   // embed Pulse metrics
    "tableau:insight_metrics:read",             // Pulse metrics
    "tableau:insight_definitions_metrics:read", // Pulse definitions
    "tableau:content:read",                     // datasources
    "tableau:viz_data_service:read",            // VizQL Data Service
];

/// Connected-app JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub iss: String,      // connected app client id
    pub sub: String,      // user to act as
    pub aud: String,      // always "tableau"
    pub exp: i64,         // expiry timestamp
    pub jti: String,      // unique per assertion
    pub scp: Vec<String>, // scopes
}

impl Claims {
    pub fn new(issuer: String, subject: String) -> Self {
        let exp = OffsetDateTime::now_utc() + Duration::seconds(ASSERTION_TTL_SECS);

        Self {
            iss: issuer,
            sub: subject,
            aud: AUDIENCE.to_string(),
            exp: exp.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            scp: SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Signs short-lived assertions for the configured connected app.
///
/// A fresh assertion is minted for every sign-in and every direct VizQL
/// Data Service call; they are never cached.
#[derive(Clone, Debug)]
pub struct AssertionSigner {
    identity: ServiceIdentity,
}

impl AssertionSigner {
    pub fn new(identity: ServiceIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Mint a signed assertion for the configured user
    pub fn mint(&self) -> BridgeResult<String> {
        self.mint_for(None)
    }

    /// Mint a signed assertion, optionally acting as a different user
    pub fn mint_for(&self, subject: Option<&str>) -> BridgeResult<String> {
        if self.identity.signing_secret.trim().is_empty() {
            return Err(BridgeError::Signing(
                "connected app secret value is empty".to_string(),
            ));
        }

        let subject = subject.unwrap_or(&self.identity.subject_email).to_string();
        let claims = Claims::new(self.identity.issuer_id.clone(), subject);

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.identity.signing_key_id.clone());

        let token = encode(
            &header,
            &claims,
            &EncodingKey::from_secret(self.identity.signing_secret.as_bytes()),
        )
        .map_err(|e| BridgeError::Signing(e.to_string()))?;

        debug!("Minted assertion {} for {}", claims.jti, claims.sub);
        Ok(token)
    }
}
