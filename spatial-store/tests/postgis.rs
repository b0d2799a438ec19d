//! Runs against a live PostGIS with SFCGAL. Set `SPATIAL_STORE_TEST_URL`
//! and run with `--ignored`.

use pretty_assertions::assert_eq;
use serde_json::json;
use spatial_geometry::Point3;
use spatial_protocol::{Donor, Organ, ReferenceFrame, Sample, SampleRecord, Sex};
use spatial_store::{PgSpatialStore, SpatialStore, StoreConfig};
use sqlx::postgres::PgPoolOptions;

const URL_ENV_VAR: &str = "SPATIAL_STORE_TEST_URL";

fn record(uuid: &str) -> SampleRecord {
    SampleRecord {
        sample: Sample {
            uuid: uuid.to_string(),
            hubmap_id: format!("HBM-{uuid}"),
            category: Some("block".to_string()),
            last_modified_timestamp: 100,
            rui_location: serde_json::from_value(json!({
                "@type": "SpatialEntity",
                "x_dimension": 10, "y_dimension": 12, "z_dimension": 3,
                "placement": {
                    "@type": "SpatialPlacement",
                    "target": "http://purl.org/ccf/latest/ccf.owl#VHMale",
                    "x_rotation": 0.3, "y_rotation": 1.1, "z_rotation": -2.0,
                    "x_scaling": 2, "y_scaling": 1, "z_scaling": 0.25,
                    "x_translation": 100, "y_translation": -40, "z_translation": 7
                }
            }))
            .unwrap(),
        },
        organ: Organ {
            uuid: "organ-1".to_string(),
            code: "LK".to_string(),
        },
        donor: Donor {
            uuid: "donor-1".to_string(),
            sex: Sex::Male,
        },
    }
}

#[tokio::test]
#[ignore = "needs PostGIS with SFCGAL"]
async fn stored_solid_is_closed_with_scaled_volume() -> anyhow::Result<()> {
    let Ok(url) = std::env::var(URL_ENV_VAR) else {
        eprintln!("{URL_ENV_VAR} not set, skipping");
        return Ok(());
    };
    let table = format!("sample_it_{}", std::process::id());
    let config = StoreConfig {
        table: table.clone(),
        ..StoreConfig::new(url.clone())
    };
    let store = PgSpatialStore::connect(&config).await?;
    store.migrate().await?;

    let frame = ReferenceFrame::MaleBody;
    let first = store.upsert(&frame, &record("s-1")).await?;
    let second = store.upsert(&frame, &record("s-1")).await?;
    assert_eq!(first, second);

    let pool = PgPoolOptions::new().max_connections(1).connect(&url).await?;
    let (volume, closed, rows): (f64, bool, i64) = sqlx::query_as(&format!(
        "SELECT ST_Volume(sample_geom), ST_IsClosed(sample_geom), COUNT(*) OVER () \
         FROM {table} WHERE sample_uuid = $1"
    ))
    .bind("s-1")
    .fetch_one(&pool)
    .await?;
    // 10 * 2 by 12 * 1 by 3 * 0.25
    assert_eq!(volume.round(), 180.0);
    assert!(closed);
    assert_eq!(rows, 1);

    // Every face lies within 50 of the placed centroid.
    let centre = Point3::new(100.0, -40.0, 7.0);
    let far = Point3::new(1000.0, 1000.0, 1000.0);
    assert_eq!(
        store.find_within_radius(&frame, 50.0, centre).await?,
        vec!["HBM-s-1".to_string()]
    );
    assert!(store.find_within_radius(&frame, 1.0, far).await?.is_empty());

    sqlx::query(&format!("DROP TABLE {table}"))
        .execute(&pool)
        .await?;
    Ok(())
}
