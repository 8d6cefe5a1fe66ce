use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use super::TableauClient;
use crate::error::{BridgeError, BridgeResult};

/// REST API session obtained by signing in with a connected-app assertion
#[derive(Debug, Clone)]
pub struct Session {
    pub api_token: String,
    pub site_id: String,
    /// The assertion exchanged for this session. Only kept for callers;
    /// VDS calls mint their own.
    pub assertion: String,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    credentials: Option<SignInCredentials>,
}

#[derive(Debug, Deserialize)]
struct SignInCredentials {
    token: Option<String>,
    site: Option<SignInSite>,
}

#[derive(Debug, Deserialize)]
struct SignInSite {
    id: Option<String>,
}

impl TableauClient {
    /// Sign in to the configured site. Any failure here is fatal for the
    /// request; there is no retry.
    pub async fn authenticate(&self) -> BridgeResult<Session> {
        let assertion = self.signer.mint()?;
        let url = self.rest_url(&["auth", "signin"])?;
        let body = json!({
            "credentials": {
                "jwt": assertion,
                "site": { "contentUrl": self.identity().site_name }
            }
        });

        debug!("Signing in to site {}", self.identity().site_name);
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Sign-in request failed: {}", e);
                BridgeError::Authentication(format!("sign-in request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Authentication(format!(
                "sign-in returned HTTP {}",
                status
            )));
        }

        let parsed: SignInResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Authentication(format!("unreadable sign-in response: {}", e)))?;

        let credentials = parsed.credentials.ok_or_else(|| {
            BridgeError::Authentication("sign-in response has no credentials".to_string())
        })?;
        let api_token = credentials.token.ok_or_else(|| {
            BridgeError::Authentication("sign-in response has no credentials.token".to_string())
        })?;
        let site_id = credentials
            .site
            .and_then(|site| site.id)
            .ok_or_else(|| {
                BridgeError::Authentication("sign-in response has no credentials.site.id".to_string())
            })?;

        debug!("Signed in, site id {}", site_id);
        Ok(Session {
            api_token,
            site_id,
            assertion,
        })
    }
}
