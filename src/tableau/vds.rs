//! VizQL Data Service calls: datasource metadata and query execution.
//!
//! VDS authorizes with a connected-app assertion in the `credential-jwt`
//! header rather than the REST session token.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{TableauClient, CREDENTIAL_HEADER};
use crate::error::{BridgeError, BridgeResult};
use crate::query::{ColumnMetadata, Connection, VdsQuery};

/// One result row, keyed by output label
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Row>),
    /// VDS refused the query; the message is meant for the end user
    Rejected { message: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadMetadataRequest<'a> {
    connection: Connection,
    options: ReadMetadataOptions<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadMetadataOptions<'a> {
    return_format: &'a str,
}

// Entries are decoded one at a time; one without a `columnName` is dropped.
#[derive(Debug, Deserialize)]
struct MetadataEnvelope {
    data: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryEnvelope {
    error_code: Option<Value>,
    message: Option<String>,
    data: Option<Vec<Row>>,
}

impl TableauClient {
    /// Read the field list of a published datasource.
    pub async fn fetch_schema(
        &self,
        datasource_content_url: &str,
        assertion: &str,
    ) -> BridgeResult<Vec<ColumnMetadata>> {
        let url = self.vds_url("read-metadata")?;
        let body = ReadMetadataRequest {
            connection: Connection::new(self.identity(), datasource_content_url),
            options: ReadMetadataOptions {
                return_format: "OBJECTS",
            },
        };

        let response = self
            .http
            .post(url)
            .header(CREDENTIAL_HEADER, assertion)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let entries = serde_json::from_slice::<MetadataEnvelope>(&bytes)
            .ok()
            .and_then(|envelope| envelope.data);
        let entries = match entries {
            Some(entries) => entries,
            None if !status.is_success() => {
                return Err(BridgeError::Transport(format!(
                    "read-metadata returned HTTP {}",
                    status
                )))
            }
            None => {
                return Err(BridgeError::Metadata(format!(
                    "read-metadata response (HTTP {}) has no data field",
                    status
                )))
            }
        };

        let total = entries.len();
        let schema: Vec<ColumnMetadata> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        if schema.len() < total {
            debug!(
                "Skipped {} read-metadata entries without a columnName",
                total - schema.len()
            );
        }

        debug!("Datasource {} has {} fields", datasource_content_url, schema.len());
        Ok(schema)
    }

    /// Run a query. A body carrying `errorCode` is a rejection, whatever the
    /// HTTP status; any other non-success status is a transport failure.
    pub async fn execute_query(&self, query: &VdsQuery, assertion: &str) -> BridgeResult<QueryOutcome> {
        let url = self.vds_url("query-datasource")?;

        let response = self
            .http
            .post(url)
            .header(CREDENTIAL_HEADER, assertion)
            .json(query)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let envelope: QueryEnvelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                return Err(BridgeError::Transport(format!(
                    "unreadable query-datasource response (HTTP {}): {}",
                    status, e
                )))
            }
        };

        if let Some(code) = envelope.error_code {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("query rejected with error code {}", code));
            warn!("VDS rejected query on {}: {}", query.connection.datasource, message);
            return Ok(QueryOutcome::Rejected { message });
        }

        if !status.is_success() {
            return Err(BridgeError::Transport(format!(
                "query-datasource returned HTTP {}",
                status
            )));
        }

        let rows = envelope.data.unwrap_or_else(|| {
            warn!("query-datasource response has no data field, treating as empty");
            Vec::new()
        });
        debug!("Query on {} returned {} rows", query.connection.datasource, rows.len());
        Ok(QueryOutcome::Rows(rows))
    }
}
