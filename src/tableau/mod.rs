//! HTTP client for the Tableau REST API and the VizQL Data Service.
//!
//! The client is cheap to clone and holds no per-request state: every call
//! receives the session token or mints the assertion it needs.

use reqwest::{header, Client, Url};
use std::time::Duration;

use crate::auth::AssertionSigner;
use crate::config::{ServiceIdentity, TableauEndpoints};
use crate::error::{BridgeError, BridgeResult};

pub mod pulse;
pub mod session;
pub mod vds;

/// Header carrying the REST session token
pub const AUTH_HEADER: &str = "X-Tableau-Auth";
/// Header carrying a connected-app assertion on VDS calls
pub const CREDENTIAL_HEADER: &str = "credential-jwt";

#[derive(Clone, Debug)]
pub struct TableauClient {
    http: Client,
    endpoints: TableauEndpoints,
    signer: AssertionSigner,
}

impl TableauClient {
    pub fn new(
        endpoints: TableauEndpoints,
        signer: AssertionSigner,
        timeout: Duration,
    ) -> BridgeResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoints,
            signer,
        })
    }

    pub fn signer(&self) -> &AssertionSigner {
        &self.signer
    }

    pub fn identity(&self) -> &ServiceIdentity {
        self.signer.identity()
    }

    /// `{base}/api/{version}/...`
    fn rest_url(&self, segments: &[&str]) -> BridgeResult<Url> {
        let mut path = vec!["api", self.endpoints.api_version.as_str()];
        path.extend_from_slice(segments);
        join_segments(&self.endpoints.base_url, &path)
    }

    /// `{base}/api/-/pulse/...`
    fn pulse_url(&self, segments: &[&str]) -> BridgeResult<Url> {
        let mut path = vec!["api", "-", "pulse"];
        path.extend_from_slice(segments);
        join_segments(&self.endpoints.base_url, &path)
    }

    fn vds_url(&self, endpoint: &str) -> BridgeResult<Url> {
        join_segments(&self.endpoints.vds_base_url, &[endpoint])
    }
}

/// Append percent-encoded path segments to a base url.
pub fn join_segments(base: &Url, segments: &[&str]) -> BridgeResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BridgeError::Configuration(format!("base url {} cannot carry a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
