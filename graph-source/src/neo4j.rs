use async_trait::async_trait;
use neo4rs::Graph;
use neo4rs::Query;
use neo4rs::query;
use spatial_protocol::DatasetIndex;
use tracing::debug;
use tracing::info;

use crate::GraphSource;
use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::error::Result;
use crate::row::DatasetRow;
use crate::row::GraphRow;
use crate::row::SampleBatch;
use crate::row::collect_datasets;
use crate::row::process_rows;

const SAMPLE_MATCH: &str = "MATCH (dn:Donor)-[:ACTIVITY_INPUT]->(:Activity)-[:ACTIVITY_OUTPUT]->\
(o:Sample {specimen_type: 'organ'})-[*]->(s:Sample) \
WHERE s.rui_location IS NOT NULL AND trim(s.rui_location) <> ''";

const SAMPLE_RETURN: &str = " RETURN DISTINCT s.uuid AS sample_uuid, \
s.hubmap_id AS sample_hubmap_id, \
s.rui_location AS sample_rui_location, \
coalesce(s.sample_category, s.specimen_type) AS sample_category, \
s.last_modified_timestamp AS sample_last_modified_timestamp, \
dn.uuid AS donor_uuid, dn.metadata AS donor_metadata, \
o.uuid AS organ_uuid, o.organ AS organ_code";

const DATASET_MATCH: &str = "MATCH (s:Sample)-[*]->(ds:Dataset) \
WHERE s.rui_location IS NOT NULL AND trim(s.rui_location) <> '' \
AND ds.status IN $statuses \
AND any(t IN $dataset_types WHERE ds.data_types CONTAINS t)";

const DATASET_RETURN: &str = " RETURN DISTINCT s.uuid AS sample_uuid, \
ds.uuid AS dataset_uuid, \
ds.last_modified_timestamp AS dataset_last_modified_timestamp";

/// Which samples a sample query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SampleFilter<'a> {
    All,
    Organ(&'a str),
    Uuid(&'a str),
}

pub(crate) fn sample_cypher(filter: SampleFilter<'_>) -> String {
    let condition = match filter {
        SampleFilter::All => "",
        SampleFilter::Organ(_) => " AND o.organ = $organ_code",
        SampleFilter::Uuid(_) => " AND s.uuid = $sample_uuid",
    };
    format!("{SAMPLE_MATCH}{condition}{SAMPLE_RETURN}")
}

pub(crate) fn dataset_cypher(sample_uuid: Option<&str>) -> String {
    let condition = if sample_uuid.is_some() {
        " AND s.uuid = $sample_uuid"
    } else {
        ""
    };
    format!("{DATASET_MATCH}{condition}{DATASET_RETURN}")
}

/// `GraphSource` backed by a Neo4j provenance graph.
pub struct Neo4jGraphSource {
    graph: Graph,
    config: GraphConfig,
}

impl Neo4jGraphSource {
    pub async fn connect(config: GraphConfig) -> Result<Self> {
        config.validate().map_err(GraphError::Config)?;
        info!("Connecting to graph at {} as {}", config.uri, config.username);
        let graph = Graph::new(&config.uri, &config.username, &config.password).await?;
        Ok(Self { graph, config })
    }

    async fn fetch_samples(&self, filter: SampleFilter<'_>) -> Result<SampleBatch> {
        let mut q = query(&sample_cypher(filter));
        q = match filter {
            SampleFilter::All => q,
            SampleFilter::Organ(code) => q.param("organ_code", code),
            SampleFilter::Uuid(uuid) => q.param("sample_uuid", uuid),
        };
        debug!("Sample query: {filter:?}");

        let rows: Vec<GraphRow> = self.fetch(q).await?;
        Ok(process_rows(rows))
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, q: Query) -> Result<Vec<T>> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row.to::<T>()?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphSource for Neo4jGraphSource {
    async fn sample_records(&self, organ_code: Option<&str>) -> Result<SampleBatch> {
        let filter = organ_code.map_or(SampleFilter::All, SampleFilter::Organ);
        self.fetch_samples(filter).await
    }

    async fn sample_record(&self, sample_uuid: &str) -> Result<SampleBatch> {
        self.fetch_samples(SampleFilter::Uuid(sample_uuid)).await
    }

    async fn sample_datasets(&self, sample_uuid: Option<&str>) -> Result<DatasetIndex> {
        let mut q = query(&dataset_cypher(sample_uuid))
            .param("statuses", self.config.statuses.clone())
            .param("dataset_types", self.config.dataset_types.clone());
        if let Some(uuid) = sample_uuid {
            q = q.param("sample_uuid", uuid);
        }

        let rows: Vec<DatasetRow> = self.fetch(q).await?;
        let total = rows.len();
        let index = collect_datasets(rows);
        info!(
            "Dataset query returned {total} rows for {} samples",
            index.len()
        );
        Ok(index)
    }
}
