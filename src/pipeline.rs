use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::BridgeResult;
use crate::query::{build_query, reconcile_columns, ColumnMetadata};
use crate::tableau::vds::{QueryOutcome, Row};
use crate::tableau::TableauClient;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub datasource: String,
}

/// Payload of `GET /getMetricData`.
///
/// An empty `data` with no `error` is a query that legitimately matched no
/// rows. When `error` is present `data` is always empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricData {
    pub metric: MetricSummary,
    pub data: Vec<Row>,
    pub columns: Vec<ColumnMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolve a Pulse metric into a VDS query, run it and describe its columns.
///
/// Every step waits for the one before it. Nothing is cached, so two
/// requests for the same metric each walk the full chain.
#[instrument(skip(client))]
pub async fn get_metric_data(client: &TableauClient, metric_id: &str) -> BridgeResult<MetricData> {
    // Step 1: REST session
    let session = client.authenticate().await?;

    // Step 2: metric -> definition -> datasource
    let resolved = client
        .resolve_metric(metric_id, &session.site_id, &session.api_token)
        .await?;

    // Step 3: datasource fields
    let schema = client
        .fetch_schema(&resolved.datasource.content_url, &client.signer().mint()?)
        .await?;

    // Step 4: query
    let built = build_query(client.identity(), &resolved.definition, &resolved.datasource);
    debug!("Query output labels: {:?}", built.output_labels);

    // Step 5: column metadata for the query's output
    let columns = reconcile_columns(&built.output_labels, &schema);

    // Step 6: run it
    let outcome = client.execute_query(&built.query, &client.signer().mint()?).await?;

    let metric = MetricSummary {
        name: resolved.definition.display_name,
        datasource: resolved.datasource.display_name,
    };

    let data = match outcome {
        QueryOutcome::Rows(rows) => {
            info!("Metric {} returned {} rows", metric_id, rows.len());
            MetricData {
                metric,
                data: rows,
                columns,
                error: None,
            }
        }
        QueryOutcome::Rejected { message } => MetricData {
            metric,
            data: Vec::new(),
            columns,
            error: Some(message),
        },
    };
    Ok(data)
}
