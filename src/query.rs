//! VizQL Data Service query construction and result-column labelling.
//!
//! Nothing in here performs I/O: a Pulse definition goes in, a query and the
//! labels its result rows will carry come out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ServiceIdentity;
use crate::tableau::pulse::{DatasourceRef, MetricDefinition};

const AGGREGATION_PREFIX: &str = "AGGREGATION_";

/// Map a Pulse aggregation kind onto the VDS function name.
///
/// Kinds missing from the table are forwarded with the `AGGREGATION_` prefix
/// removed, so newer Pulse aggregations still reach VDS. `MEDIUM` is what
/// Pulse sends and is kept as is.
pub fn aggregation_function(kind: &str) -> String {
    let function = match kind {
        "AGGREGATION_AVERAGE" => "AVG",
        "AGGREGATION_SUM" => "SUM",
        "AGGREGATION_MEDIUM" => "MEDIUM",
        "AGGREGATION_COUNT" => "COUNT",
        "AGGREGATION_MIN" => "MIN",
        "AGGREGATION_MAX" => "MAX",
        "AGGREGATION_COUNT_DISTINCT" => "COUNT_DIST",
        other => other.strip_prefix(AGGREGATION_PREFIX).unwrap_or(other),
    };
    function.to_string()
}

/// Which published datasource a VDS request targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub tableau_server_name: String,
    pub site_id: String,
    pub datasource: String,
}

impl Connection {
    pub fn new(identity: &ServiceIdentity, datasource: &str) -> Self {
        Self {
            tableau_server_name: identity.domain.clone(),
            site_id: identity.site_name.clone(),
            datasource: datasource.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    Dimension {
        #[serde(rename = "columnName")]
        column_name: String,
    },
    Measure {
        #[serde(rename = "columnName")]
        column_name: String,
        function: String,
    },
}

impl ColumnSpec {
    pub fn dimension(field: &str) -> Self {
        ColumnSpec::Dimension {
            column_name: field.to_string(),
        }
    }

    pub fn measure(field: &str, function: String) -> Self {
        ColumnSpec::Measure {
            column_name: field.to_string(),
            function,
        }
    }

    /// Key this column has in every returned row
    pub fn output_label(&self) -> String {
        match self {
            ColumnSpec::Dimension { column_name } => column_name.clone(),
            ColumnSpec::Measure {
                column_name,
                function,
            } => format!("{}({})", function, column_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryBody {
    pub columns: Vec<ColumnSpec>,
}

/// Body of a `query-datasource` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VdsQuery {
    pub connection: Connection,
    pub query: QueryBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub query: VdsQuery,
    /// Row keys the query produces, in column order
    pub output_labels: Vec<String>,
}

/// Build the tabular query behind a Pulse metric: its filterable
/// dimensions, then the time dimension, then the aggregated measure.
pub fn build_query(
    identity: &ServiceIdentity,
    definition: &MetricDefinition,
    datasource: &DatasourceRef,
) -> BuiltQuery {
    let mut columns: Vec<ColumnSpec> = definition
        .allowed_dimensions
        .iter()
        .map(|field| ColumnSpec::dimension(field))
        .collect();

    columns.push(ColumnSpec::dimension(&definition.time_dimension_field));

    let function = aggregation_function(&definition.measure_aggregation);
    columns.push(ColumnSpec::measure(&definition.measure_field, function));

    let output_labels = columns.iter().map(ColumnSpec::output_label).collect();

    BuiltQuery {
        query: VdsQuery {
            connection: Connection::new(identity, &datasource.content_url),
            query: QueryBody { columns },
        },
        output_labels,
    }
}

/// One field of a datasource as described by `read-metadata`.
///
/// Only `columnName` is interpreted; caption, data type and anything else VDS
/// returns is carried through untouched for the frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    #[serde(rename = "columnName")]
    pub column_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ColumnMetadata {
    /// Descriptor for a column the datasource metadata does not know about
    pub fn bare(column_name: &str) -> Self {
        Self {
            column_name: column_name.to_string(),
            extra: Map::new(),
        }
    }

    pub fn caption(&self) -> Option<&str> {
        self.extra.get("caption").and_then(Value::as_str)
    }
}

/// Describe each output label with its datasource metadata, keeping label
/// order. Labels without an exact `columnName` match get a bare descriptor;
/// the first match wins if the schema repeats a name.
pub fn reconcile_columns(labels: &[String], schema: &[ColumnMetadata]) -> Vec<ColumnMetadata> {
    labels
        .iter()
        .map(|label| {
            schema
                .iter()
                .find(|column| column.column_name == *label)
                .cloned()
                .unwrap_or_else(|| ColumnMetadata::bare(label))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn identity() -> ServiceIdentity {
        ServiceIdentity {
            issuer_id: "app".to_string(),
            signing_key_id: "kid".to_string(),
            signing_secret: "secret".to_string(),
            subject_email: "analyst@example.com".to_string(),
            site_name: "datafam".to_string(),
            domain: "10ax.online.tableau.com".to_string(),
        }
    }

    fn definition(aggregation: &str) -> MetricDefinition {
        MetricDefinition {
            display_name: "Revenue".to_string(),
            allowed_dimensions: vec!["region".to_string(), "segment".to_string()],
            time_dimension_field: "order_date".to_string(),
            measure_field: "amount".to_string(),
            measure_aggregation: aggregation.to_string(),
            datasource_id: "ds-1".to_string(),
        }
    }

    fn datasource() -> DatasourceRef {
        DatasourceRef {
            id: "ds-1".to_string(),
            content_url: "Superstore".to_string(),
            display_name: "Superstore Orders".to_string(),
        }
    }

    #[test]
    fn maps_known_aggregations() {
        assert_eq!(aggregation_function("AGGREGATION_AVERAGE"), "AVG");
        assert_eq!(aggregation_function("AGGREGATION_SUM"), "SUM");
        assert_eq!(aggregation_function("AGGREGATION_MEDIUM"), "MEDIUM");
        assert_eq!(aggregation_function("AGGREGATION_COUNT"), "COUNT");
        assert_eq!(aggregation_function("AGGREGATION_MIN"), "MIN");
        assert_eq!(aggregation_function("AGGREGATION_MAX"), "MAX");
        assert_eq!(aggregation_function("AGGREGATION_COUNT_DISTINCT"), "COUNT_DIST");
    }

    #[test]
    fn unknown_aggregations_pass_through() {
        assert_eq!(aggregation_function("AGGREGATION_FOO"), "FOO");
        assert_eq!(aggregation_function("STDEV"), "STDEV");
    }

    #[test]
    fn builds_dimensions_then_time_then_measure() {
        let built = build_query(&identity(), &definition("AGGREGATION_SUM"), &datasource());

        assert_eq!(
            built.output_labels,
            vec!["region", "segment", "order_date", "SUM(amount)"]
        );
        assert_eq!(
            serde_json::to_value(&built.query).unwrap(),
            json!({
                "connection": {
                    "tableauServerName": "10ax.online.tableau.com",
                    "siteId": "datafam",
                    "datasource": "Superstore"
                },
                "query": {
                    "columns": [
                        {"columnName": "region"},
                        {"columnName": "segment"},
                        {"columnName": "order_date"},
                        {"columnName": "amount", "function": "SUM"}
                    ]
                }
            })
        );
    }

    #[test]
    fn measure_label_uses_the_function_sent_in_the_query() {
        for kind in ["AGGREGATION_COUNT_DISTINCT", "AGGREGATION_FOO", "AGGREGATION_MEDIUM"] {
            let built = build_query(&identity(), &definition(kind), &datasource());
            let measure = built.query.query.columns.last().unwrap();
            let ColumnSpec::Measure { function, .. } = measure else {
                panic!("last column should be the measure");
            };
            assert_eq!(
                built.output_labels.last().unwrap(),
                &format!("{}(amount)", function)
            );
        }
    }

    #[test]
    fn building_is_deterministic() {
        let first = build_query(&identity(), &definition("AGGREGATION_MAX"), &datasource());
        let second = build_query(&identity(), &definition("AGGREGATION_MAX"), &datasource());
        assert_eq!(first, second);
    }

    #[test]
    fn definition_without_filterable_dimensions_still_queries_time_and_measure() {
        let mut definition = definition("AGGREGATION_COUNT");
        definition.allowed_dimensions.clear();
        let built = build_query(&identity(), &definition, &datasource());
        assert_eq!(built.output_labels, vec!["order_date", "COUNT(amount)"]);
    }

    #[test]
    fn reconcile_keeps_label_order_and_falls_back_to_bare_columns() {
        let schema: Vec<ColumnMetadata> =
            serde_json::from_value(json!([{"columnName": "region", "caption": "Region"}])).unwrap();
        let labels = vec!["region".to_string(), "SUM(amount)".to_string()];

        let columns = reconcile_columns(&labels, &schema);

        assert_eq!(
            serde_json::to_value(&columns).unwrap(),
            json!([
                {"columnName": "region", "caption": "Region"},
                {"columnName": "SUM(amount)"}
            ])
        );
        assert_eq!(columns[0].caption(), Some("Region"));
        assert_eq!(columns[1].caption(), None);
    }

    #[test]
    fn reconcile_matches_exactly_and_takes_the_first_duplicate() {
        let schema: Vec<ColumnMetadata> = serde_json::from_value(json!([
            {"columnName": "Region", "caption": "wrong case"},
            {"columnName": "region", "caption": "first"},
            {"columnName": "region", "caption": "second"}
        ]))
        .unwrap();

        let columns = reconcile_columns(&["region".to_string()], &schema);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].caption(), Some("first"));
    }
}
