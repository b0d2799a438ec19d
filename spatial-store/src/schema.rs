use crate::config::TableName;

/// DDL creating the PostGIS extensions and every table the store uses.
/// Each statement is idempotent. `postgis_sfcgal` provides `ST_MakeSolid`
/// and `ST_Volume`.
pub fn schema_statements(table: &TableName) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS postgis".to_string(),
        "CREATE EXTENSION IF NOT EXISTS postgis_sfcgal".to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                organ_uuid TEXT NOT NULL,
                organ_code TEXT NOT NULL,
                donor_uuid TEXT NOT NULL,
                donor_sex TEXT NOT NULL,
                relative_spatial_entry_iri TEXT NOT NULL,
                sample_uuid TEXT NOT NULL,
                sample_hubmap_id TEXT NOT NULL,
                sample_specimen_type TEXT,
                sample_rui_location JSONB NOT NULL,
                last_modified_timestamp BIGINT NOT NULL,
                sample_geom geometry(POLYHEDRALSURFACEZ) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT {table}_sample_frame_key UNIQUE (sample_uuid, relative_spatial_entry_iri)
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_geom_idx ON {table} USING GIST (sample_geom gist_geometry_ops_nd)"
        ),
        format!("CREATE INDEX IF NOT EXISTS {table}_hubmap_id_idx ON {table} (sample_hubmap_id)"),
        "CREATE TABLE IF NOT EXISTS dataset (
            uuid TEXT PRIMARY KEY,
            last_modified_timestamp BIGINT NOT NULL
        )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS sample_dataset (
            sample_uuid TEXT NOT NULL,
            dataset_uuid TEXT NOT NULL REFERENCES dataset (uuid) ON DELETE CASCADE,
            PRIMARY KEY (sample_uuid, dataset_uuid)
        )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS cell_annotation_details (
            id SERIAL PRIMARY KEY,
            cell_type_name TEXT NOT NULL UNIQUE,
            obo_ontology_id_uri TEXT,
            ontology_id TEXT
        )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS cell_types (
            sample_uuid TEXT NOT NULL,
            cell_annotation_details_id INTEGER NOT NULL REFERENCES cell_annotation_details (id),
            cell_type_count BIGINT NOT NULL,
            PRIMARY KEY (sample_uuid, cell_annotation_details_id)
        )"
        .to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_uses_configured_table() {
        let table = TableName::parse("sample_v2").unwrap();
        let statements = schema_statements(&table);

        assert!(statements[0].contains("postgis"));
        assert!(statements[1].contains("postgis_sfcgal"));
        assert!(statements[2].contains("CREATE TABLE IF NOT EXISTS sample_v2 ("));
        assert!(statements[2].contains("UNIQUE (sample_uuid, relative_spatial_entry_iri)"));
        assert!(statements[2].contains("sample_geom geometry(POLYHEDRALSURFACEZ)"));
        assert!(statements[3].contains("sample_v2_geom_idx ON sample_v2"));
        assert!(statements.iter().all(|s| s.contains("IF NOT EXISTS")));
        for name in ["dataset (", "sample_dataset (", "cell_annotation_details (", "cell_types ("] {
            assert!(
                statements.iter().any(|s| s.contains(&format!("EXISTS {name}"))),
                "missing {name}"
            );
        }
    }
}
