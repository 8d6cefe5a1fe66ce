//! Pulse metric resolution: metric → definition → datasource.
//!
//! Each hop needs an identifier pulled from the previous response, so the
//! three calls run strictly in order and the first missing identifier ends
//! the chain.

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{TableauClient, AUTH_HEADER};
use crate::error::{BridgeError, BridgeResult, ResolutionHop};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub id: String,
    pub definition_id: String,
}

/// What a Pulse definition says about the data behind a metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    pub display_name: String,
    pub allowed_dimensions: Vec<String>,
    pub time_dimension_field: String,
    pub measure_field: String,
    pub measure_aggregation: String,
    pub datasource_id: String,
}

/// Published datasource as listed by the REST API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasourceRef {
    pub id: String,
    pub content_url: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedMetric {
    pub metric: MetricDescriptor,
    pub definition: MetricDefinition,
    pub datasource: DatasourceRef,
}

// Wire shapes. Everything is optional so that a missing field becomes a
// resolution error naming the hop instead of a generic decode failure.

#[derive(Deserialize)]
struct MetricEnvelope {
    metric: Option<RawMetric>,
}

#[derive(Deserialize)]
struct RawMetric {
    id: Option<String>,
    definition_id: Option<String>,
}

#[derive(Deserialize)]
struct DefinitionEnvelope {
    definition: Option<RawDefinition>,
}

#[derive(Deserialize)]
struct RawDefinition {
    metadata: Option<RawDefinitionMetadata>,
    specification: Option<RawSpecification>,
    extension_options: Option<RawExtensionOptions>,
}

#[derive(Deserialize)]
struct RawDefinitionMetadata {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawSpecification {
    datasource: Option<RawIdRef>,
    basic_specification: Option<RawBasicSpecification>,
}

#[derive(Deserialize)]
struct RawIdRef {
    id: Option<String>,
}

#[derive(Deserialize)]
struct RawBasicSpecification {
    measure: Option<RawMeasure>,
    time_dimension: Option<RawTimeDimension>,
}

#[derive(Deserialize)]
struct RawMeasure {
    field: Option<String>,
    aggregation: Option<String>,
}

#[derive(Deserialize)]
struct RawTimeDimension {
    field: Option<String>,
}

#[derive(Deserialize)]
struct RawExtensionOptions {
    #[serde(default)]
    allowed_dimensions: Vec<String>,
}

#[derive(Deserialize)]
struct DatasourceEnvelope {
    datasource: Option<RawDatasource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDatasource {
    id: Option<String>,
    name: Option<String>,
    content_url: Option<String>,
}

fn missing(hop: ResolutionHop, field: &str) -> BridgeError {
    BridgeError::resolution(hop, format!("response has no {}", field))
}

impl RawMetric {
    fn into_descriptor(self, requested_id: &str) -> BridgeResult<MetricDescriptor> {
        let definition_id = self
            .definition_id
            .ok_or_else(|| missing(ResolutionHop::Metric, "metric.definition_id"))?;
        Ok(MetricDescriptor {
            id: self.id.unwrap_or_else(|| requested_id.to_string()),
            definition_id,
        })
    }
}

impl RawDefinition {
    fn into_definition(self) -> BridgeResult<MetricDefinition> {
        let hop = ResolutionHop::Definition;
        let specification = self
            .specification
            .ok_or_else(|| missing(hop, "definition.specification"))?;
        let datasource_id = specification
            .datasource
            .and_then(|ds| ds.id)
            .ok_or_else(|| missing(hop, "specification.datasource.id"))?;
        let basic = specification
            .basic_specification
            .ok_or_else(|| missing(hop, "specification.basic_specification"))?;
        let measure = basic
            .measure
            .ok_or_else(|| missing(hop, "basic_specification.measure"))?;
        let time_dimension_field = basic
            .time_dimension
            .and_then(|td| td.field)
            .ok_or_else(|| missing(hop, "basic_specification.time_dimension.field"))?;

        Ok(MetricDefinition {
            display_name: self.metadata.and_then(|m| m.name).unwrap_or_default(),
            allowed_dimensions: self
                .extension_options
                .map(|ext| ext.allowed_dimensions)
                .unwrap_or_default(),
            time_dimension_field,
            measure_field: measure
                .field
                .ok_or_else(|| missing(hop, "measure.field"))?,
            measure_aggregation: measure
                .aggregation
                .ok_or_else(|| missing(hop, "measure.aggregation"))?,
            datasource_id,
        })
    }
}

impl RawDatasource {
    fn into_ref(self) -> BridgeResult<DatasourceRef> {
        let hop = ResolutionHop::Datasource;
        let id = self.id.ok_or_else(|| missing(hop, "datasource.id"))?;
        let content_url = self
            .content_url
            .ok_or_else(|| missing(hop, "datasource.contentUrl"))?;
        Ok(DatasourceRef {
            id,
            display_name: self.name.unwrap_or_else(|| content_url.clone()),
            content_url,
        })
    }
}

impl TableauClient {
    /// Walk metric → definition → datasource for one metric id.
    pub async fn resolve_metric(
        &self,
        metric_id: &str,
        site_id: &str,
        api_token: &str,
    ) -> BridgeResult<ResolvedMetric> {
        let url = self.pulse_url(&["metrics", metric_id])?;
        let metric = self
            .get_hop::<MetricEnvelope>(ResolutionHop::Metric, url, api_token)
            .await?
            .metric
            .ok_or_else(|| missing(ResolutionHop::Metric, "metric"))?
            .into_descriptor(metric_id)?;
        debug!("Metric {} uses definition {}", metric.id, metric.definition_id);

        let url = self.pulse_url(&["definitions", metric.definition_id.as_str()])?;
        let definition = self
            .get_hop::<DefinitionEnvelope>(ResolutionHop::Definition, url, api_token)
            .await?
            .definition
            .ok_or_else(|| missing(ResolutionHop::Definition, "definition"))?
            .into_definition()?;
        debug!(
            "Definition {} reads datasource {}",
            metric.definition_id, definition.datasource_id
        );

        let url = self.rest_url(&["sites", site_id, "datasources", definition.datasource_id.as_str()])?;
        let datasource = self
            .get_hop::<DatasourceEnvelope>(ResolutionHop::Datasource, url, api_token)
            .await?
            .datasource
            .ok_or_else(|| missing(ResolutionHop::Datasource, "datasource"))?
            .into_ref()?;
        debug!("Datasource {} is published as {}", datasource.id, datasource.content_url);

        Ok(ResolvedMetric {
            metric,
            definition,
            datasource,
        })
    }

    async fn get_hop<T: DeserializeOwned>(
        &self,
        hop: ResolutionHop,
        url: Url,
        api_token: &str,
    ) -> BridgeResult<T> {
        let response = self
            .http
            .get(url)
            .header(AUTH_HEADER, api_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Transport(format!(
                "{} lookup returned HTTP {}",
                hop, status
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BridgeError::resolution(hop, format!("unreadable response: {}", e)))
    }
}
