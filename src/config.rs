use clap::Parser;
use reqwest::Url;
use std::{net::SocketAddr, time::Duration};

use crate::error::{BridgeError, BridgeResult};

pub const DEFAULT_API_VERSION: &str = "3.21";
pub const DEFAULT_VDS_BASE_URL: &str = "https://developer.salesforce.com/tools/tableau/headless-bi/v1";

/// Command line / environment arguments. Every flag falls back to the
/// environment variable names used by the dashboard's `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(name = "pulse-dashboard-backend", version, about = "Tableau Pulse dashboard backend")]
pub struct Cli {
    /// Tableau Cloud pod domain, e.g. 10ax.online.tableau.com
    #[arg(long, env = "TABLEAUDOMAIN")]
    pub domain: String,

    /// Site content url
    #[arg(long, env = "TABLEAUSITE")]
    pub site: String,

    /// User every assertion is issued for
    #[arg(long, env = "TABLEAUUSERNAME")]
    pub username: String,

    /// Connected app client id
    #[arg(long, env = "CONNECTEDAPPID")]
    pub connected_app_id: String,

    /// Connected app secret id
    #[arg(long, env = "CONNECTEDAPPSECRETID")]
    pub connected_app_secret_id: String,

    #[arg(long, env = "CONNECTEDAPPSECRETVALUE", hide_env_values = true)]
    pub connected_app_secret_value: String,

    /// Comma separated Pulse metric ids to embed
    #[arg(long, env = "METRICIDS", value_delimiter = ',')]
    pub metric_ids: Vec<String>,

    #[arg(long, env = "TABLEAU_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Overrides the REST base url derived from the domain
    #[arg(long, env = "TABLEAU_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "VDS_BASE_URL", default_value = DEFAULT_VDS_BASE_URL)]
    pub vds_base_url: String,

    /// Timeout applied to each outbound call, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind_addr: SocketAddr,

    #[arg(long, env = "FRONTEND_ORIGIN")]
    pub cors_origin: Option<String>,
}

/// The connected app and user every outbound call acts as.
#[derive(Clone)]
pub struct ServiceIdentity {
    pub issuer_id: String,
    pub signing_key_id: String,
    pub signing_secret: String,
    pub subject_email: String,
    pub site_name: String,
    pub domain: String,
}

// Hand-written so the secret never ends up in a log line.
impl std::fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("issuer_id", &self.issuer_id)
            .field("signing_key_id", &self.signing_key_id)
            .field("subject_email", &self.subject_email)
            .field("site_name", &self.site_name)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct TableauEndpoints {
    /// REST API root, `https://{domain}` unless overridden
    pub base_url: Url,
    /// VizQL Data Service root
    pub vds_base_url: Url,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub identity: ServiceIdentity,
    pub endpoints: TableauEndpoints,
    pub metric_ids: Vec<String>,
    pub request_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> BridgeResult<Self> {
        let base_url = cli
            .base_url
            .unwrap_or_else(|| format!("https://{}", cli.domain));
        let endpoints = TableauEndpoints {
            base_url: parse_base_url(&base_url)?,
            vds_base_url: parse_base_url(&cli.vds_base_url)?,
            api_version: cli.api_version,
        };

        let metric_ids = cli
            .metric_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        Ok(Self {
            identity: ServiceIdentity {
                issuer_id: cli.connected_app_id,
                signing_key_id: cli.connected_app_secret_id,
                signing_secret: cli.connected_app_secret_value,
                subject_email: cli.username,
                site_name: cli.site,
                domain: cli.domain,
            },
            endpoints,
            metric_ids,
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
            bind_addr: cli.bind_addr,
            cors_origin: cli.cors_origin,
        })
    }
}

/// Parses a base url that path segments can later be appended to.
pub fn parse_base_url(raw: &str) -> BridgeResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| BridgeError::Configuration(format!("invalid base url {}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(BridgeError::Configuration(format!(
            "base url {} cannot carry a path",
            raw
        )));
    }
    Ok(url)
}
