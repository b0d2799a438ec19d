use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use spatial_geometry::{PlacedSolid, Point3};
use spatial_protocol::{DatasetDigest, DatasetIndex, ReferenceFrame, RuiLocation, SampleRecord};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;

use crate::config::{StoreConfig, TableName};
use crate::error::{Result, StoreError};
use crate::schema::schema_statements;
use crate::{SpatialStore, check_radius};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// PostGIS-backed spatial store
pub struct PgSpatialStore {
    pool: PgPool,
    sql: Statements,
}

impl PgSpatialStore {
    /// Connect a pool using `config`
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::Config)?;
        let table = TableName::parse(&config.table)?;
        info!("Connecting spatial store (table {table})");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.url)
            .await?;
        Ok(Self::with_pool(pool, table))
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: PgPool, table: TableName) -> Self {
        Self {
            pool,
            sql: Statements::new(&table),
        }
    }

    /// Create the extension and tables if they do not exist
    pub async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in &self.sql.schema {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("Spatial store schema is up to date");
        Ok(())
    }

    async fn upsert_row(
        &self,
        conn: &mut PgConnection,
        frame: &ReferenceFrame,
        record: &SampleRecord,
        placed: &PlacedSolid,
    ) -> std::result::Result<i64, sqlx::Error> {
        let sample = &record.sample;
        let mut query = sqlx::query_scalar::<_, i64>(&self.sql.upsert)
            .bind(&record.organ.uuid)
            .bind(&record.organ.code)
            .bind(&record.donor.uuid)
            .bind(record.donor.sex.as_ref())
            .bind(frame.code())
            .bind(&sample.uuid)
            .bind(&sample.hubmap_id)
            .bind(sample.category.as_deref())
            .bind(Json(&sample.rui_location))
            .bind(sample.last_modified_timestamp)
            .bind(placed.base.to_wkt());
        for value in placed.pipeline.bind_values() {
            query = query.bind(value);
        }
        query.fetch_one(conn).await
    }

    async fn link_datasets(
        conn: &mut PgConnection,
        sample_uuid: &str,
        datasets: &[DatasetDigest],
    ) -> std::result::Result<(), sqlx::Error> {
        let keep: Vec<String> = datasets.iter().map(|d| d.dataset_uuid.clone()).collect();
        let dropped = sqlx::query(
            "DELETE FROM sample_dataset WHERE sample_uuid = $1 AND NOT (dataset_uuid = ANY($2))",
        )
        .bind(sample_uuid)
        .bind(keep)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        if dropped > 0 {
            debug!("Unlinked {dropped} datasets from sample {sample_uuid}");
        }

        for digest in datasets {
            sqlx::query(
                "INSERT INTO dataset (uuid, last_modified_timestamp) VALUES ($1, $2) \
                 ON CONFLICT (uuid) DO UPDATE SET last_modified_timestamp = EXCLUDED.last_modified_timestamp",
            )
            .bind(&digest.dataset_uuid)
            .bind(digest.last_modified_timestamp)
            .execute(&mut *conn)
            .await?;
            sqlx::query(
                "INSERT INTO sample_dataset (sample_uuid, dataset_uuid) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(sample_uuid)
            .bind(&digest.dataset_uuid)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn write_counts(
        conn: &mut PgConnection,
        sample_uuid: &str,
        counts: &BTreeMap<String, i64>,
    ) -> std::result::Result<Vec<String>, sqlx::Error> {
        let mut unknown = Vec::new();
        let mut verified = Vec::new();
        for (name, count) in counts {
            let id: Option<i32> =
                sqlx::query_scalar("SELECT id FROM cell_annotation_details WHERE cell_type_name = $1")
                    .bind(name)
                    .fetch_optional(&mut *conn)
                    .await?;
            match id {
                Some(id) => verified.push((id, *count)),
                None => unknown.push(name.clone()),
            }
        }

        sqlx::query("DELETE FROM cell_types WHERE sample_uuid = $1")
            .bind(sample_uuid)
            .execute(&mut *conn)
            .await?;
        for (id, count) in verified {
            sqlx::query(
                "INSERT INTO cell_types (sample_uuid, cell_annotation_details_id, cell_type_count) \
                 VALUES ($1, $2, $3)",
            )
            .bind(sample_uuid)
            .bind(id)
            .bind(count)
            .execute(&mut *conn)
            .await?;
        }
        Ok(unknown)
    }
}

/// Counts as stored in the `BIGINT` count column.
fn column_counts(counts: &BTreeMap<String, u64>) -> Result<BTreeMap<String, i64>> {
    counts
        .iter()
        .map(|(name, &count)| {
            i64::try_from(count)
                .map(|count| (name.clone(), count))
                .map_err(|_| {
                    StoreError::InvalidQuery(format!(
                        "cell type count {count} for '{name}' does not fit a BIGINT"
                    ))
                })
        })
        .collect()
}

/// Identify a failed statement by its SQLSTATE and constraint where the
/// database reported them.
fn describe(err: &sqlx::Error) -> String {
    match err.as_database_error() {
        Some(db) => format!(
            "database error {} (constraint {}): {}",
            db.code().as_deref().unwrap_or("?"),
            db.constraint().unwrap_or("-"),
            db.message()
        ),
        None => format!("{err:?}"),
    }
}

#[async_trait]
impl SpatialStore for PgSpatialStore {
    async fn upsert(&self, frame: &ReferenceFrame, record: &SampleRecord) -> Result<i64> {
        let placed = PlacedSolid::from_location(&record.sample.rui_location)?;
        let mut tx = self.pool.begin().await?;
        match self.upsert_row(&mut tx, frame, record, &placed).await {
            Ok(id) => {
                tx.commit().await?;
                debug!(
                    "Upserted sample {} in {frame} as id={id}",
                    record.sample.uuid
                );
                Ok(id)
            }
            Err(err) => {
                error!(
                    "Upsert of sample {} in {frame} rolled back: {}",
                    record.sample.uuid,
                    describe(&err)
                );
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed: {rollback}");
                }
                Err(err.into())
            }
        }
    }

    async fn find_within_radius(
        &self,
        frame: &ReferenceFrame,
        radius: f64,
        origin: Point3,
    ) -> Result<Vec<String>> {
        check_radius(radius)?;
        let ids = sqlx::query_scalar::<_, String>(&self.sql.within_radius)
            .bind(frame.code())
            .bind(origin.x)
            .bind(origin.y)
            .bind(origin.z)
            .bind(radius)
            .fetch_all(&self.pool)
            .await?;
        debug!("Radius {radius} around {origin:?} in {frame}: {} samples", ids.len());
        Ok(ids)
    }

    async fn find_within_radius_by_annotation(
        &self,
        frame: &ReferenceFrame,
        radius: f64,
        origin: Point3,
        cell_type: &str,
    ) -> Result<Vec<String>> {
        check_radius(radius)?;
        let ids = sqlx::query_scalar::<_, String>(&self.sql.within_radius_by_annotation)
            .bind(frame.code())
            .bind(cell_type)
            .bind(origin.x)
            .bind(origin.y)
            .bind(origin.z)
            .bind(radius)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn location_of(&self, hubmap_id: &str, frame: &ReferenceFrame) -> Result<RuiLocation> {
        let rows = sqlx::query_scalar::<_, Json<RuiLocation>>(&self.sql.location_of)
            .bind(hubmap_id)
            .bind(frame.code())
            .fetch_all(&self.pool)
            .await?;
        if rows.len() > 1 {
            error!(
                "Query for a single sample_hubmap_id={hubmap_id} in {frame} returned {} rows; using the first",
                rows.len()
            );
        }
        rows.into_iter()
            .next()
            .map(|Json(location)| location)
            .ok_or_else(|| StoreError::NotFound {
                hubmap_id: hubmap_id.to_string(),
                reference_frame: frame.to_string(),
            })
    }

    async fn sample_timestamps(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(&self.sql.sample_timestamps)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn sample_datasets(&self) -> Result<DatasetIndex> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT sd.sample_uuid, d.uuid, d.last_modified_timestamp \
             FROM sample_dataset AS sd JOIN dataset AS d ON d.uuid = sd.dataset_uuid",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut index = DatasetIndex::new();
        for (sample_uuid, dataset_uuid, ts) in rows {
            index.entry(sample_uuid).or_default().insert(dataset_uuid, ts);
        }
        Ok(index)
    }

    async fn record_sample_datasets(
        &self,
        sample_uuid: &str,
        datasets: &[DatasetDigest],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        match Self::link_datasets(&mut tx, sample_uuid, datasets).await {
            Ok(()) => {
                tx.commit().await?;
                info!(
                    "Recorded {} datasets for sample {sample_uuid}",
                    datasets.len()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "Recording datasets for sample {sample_uuid} rolled back: {}",
                    describe(&err)
                );
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed: {rollback}");
                }
                Err(err.into())
            }
        }
    }

    async fn replace_cell_type_counts(
        &self,
        sample_uuid: &str,
        counts: &BTreeMap<String, u64>,
    ) -> Result<Vec<String>> {
        let counts = column_counts(counts)?;
        let mut tx = self.pool.begin().await?;
        match Self::write_counts(&mut tx, sample_uuid, &counts).await {
            Ok(unknown) => {
                tx.commit().await?;
                info!(
                    "Replaced cell type counts for sample {sample_uuid} ({} names, {} unknown)",
                    counts.len(),
                    unknown.len()
                );
                Ok(unknown)
            }
            Err(err) => {
                error!(
                    "Cell type counts for sample {sample_uuid} rolled back: {}",
                    describe(&err)
                );
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed: {rollback}");
                }
                Err(err.into())
            }
        }
    }
}

/// SQL text for one table name. Values are always bound, never spliced.
#[derive(Debug, Clone)]
struct Statements {
    schema: Vec<String>,
    upsert: String,
    within_radius: String,
    within_radius_by_annotation: String,
    location_of: String,
    sample_timestamps: String,
}

impl Statements {
    fn new(table: &TableName) -> Self {
        let placed = spatial_geometry::TransformPipeline::identity()
            .postgis_expression("ST_GeomFromText($11)", 12);
        let geometry = format!("ST_MakeSolid({placed})");
        Self {
            schema: schema_statements(table),
            upsert: format!(
                "INSERT INTO {table} (\
                    organ_uuid, organ_code, donor_uuid, donor_sex, relative_spatial_entry_iri, \
                    sample_uuid, sample_hubmap_id, sample_specimen_type, sample_rui_location, \
                    last_modified_timestamp, sample_geom\
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, {geometry}) \
                 ON CONFLICT (sample_uuid, relative_spatial_entry_iri) DO UPDATE SET \
                    organ_uuid = EXCLUDED.organ_uuid, \
                    organ_code = EXCLUDED.organ_code, \
                    donor_uuid = EXCLUDED.donor_uuid, \
                    donor_sex = EXCLUDED.donor_sex, \
                    sample_hubmap_id = EXCLUDED.sample_hubmap_id, \
                    sample_specimen_type = EXCLUDED.sample_specimen_type, \
                    sample_rui_location = EXCLUDED.sample_rui_location, \
                    last_modified_timestamp = EXCLUDED.last_modified_timestamp, \
                    sample_geom = EXCLUDED.sample_geom, \
                    updated_at = now() \
                 RETURNING id"
            ),
            within_radius: format!(
                "SELECT sample_hubmap_id FROM {table} \
                 WHERE relative_spatial_entry_iri = $1 \
                 AND ST_3DDWithin(sample_geom, ST_MakePoint($2, $3, $4), $5) \
                 ORDER BY sample_hubmap_id"
            ),
            within_radius_by_annotation: format!(
                "SELECT DISTINCT s.sample_hubmap_id FROM {table} AS s \
                 JOIN cell_types AS ct ON ct.sample_uuid = s.sample_uuid \
                 JOIN cell_annotation_details AS cad ON cad.id = ct.cell_annotation_details_id \
                 WHERE s.relative_spatial_entry_iri = $1 \
                 AND cad.cell_type_name = $2 \
                 AND ST_3DDWithin(s.sample_geom, ST_MakePoint($3, $4, $5), $6) \
                 ORDER BY s.sample_hubmap_id"
            ),
            location_of: format!(
                "SELECT sample_rui_location FROM {table} \
                 WHERE sample_hubmap_id = $1 AND relative_spatial_entry_iri = $2 \
                 ORDER BY id"
            ),
            sample_timestamps: format!(
                "SELECT sample_uuid, MAX(last_modified_timestamp) FROM {table} \
                 GROUP BY sample_uuid"
            ),
        }
    }
}
