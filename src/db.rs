// 🏠 Relational Store - buildings, EPC assessments and structure units in SQLite
// Spatial filtering goes through an ST_Intersects function registered on every connection

use crate::geometry::{parse_point, BoundingBox};
use crate::query::{BUILDINGS_IN_BOUNDING_BOX, BUILDING_BY_UPRN, FILTERABLE_BUILDINGS_IN_BOUNDING_BOX};
use anyhow::{Context, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::{named_params, params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// ROWS
// ============================================================================

/// One row of the bounding-box search; a UPRN repeats once per assessment
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingRow {
    pub uprn: String,
    pub first_line_of_address: Option<String>,
    pub toid: Option<String>,
    /// WKT `POINT(lon lat)`
    pub point: String,
    pub epc_rating: Option<String>,
    pub structure_unit_type: Option<String>,
}

/// Address-level facts the graph does not hold: identifiers, location, latest rating
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredBuilding {
    pub uprn: String,
    pub toid: Option<String>,
    pub post_code: Option<String>,
    pub point: Option<String>,
    pub epc_rating: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterableRow {
    pub uprn: String,
    pub toid: Option<String>,
    pub post_code: Option<String>,
    pub epc_rating: Option<String>,
    pub lodgement_date: Option<String>,
    pub built_form: Option<String>,
    pub fuel_type: Option<String>,
    pub window_glazing: Option<String>,
    pub wall_construction: Option<String>,
    pub wall_insulation: Option<String>,
    pub floor_construction: Option<String>,
    pub floor_insulation: Option<String>,
    pub roof_construction: Option<String>,
    pub roof_insulation: Option<String>,
    pub roof_insulation_thickness: Option<String>,
}

/// One line of the building import CSV
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BuildingRecord {
    pub uprn: String,
    pub toid: Option<String>,
    pub first_line_of_address: Option<String>,
    pub post_code: Option<String>,
    pub point: Option<String>,
    pub epc_rating: Option<String>,
    pub lodgement_date: Option<String>,
    pub structure_unit_type: Option<String>,
    pub built_form: Option<String>,
    pub fuel_type: Option<String>,
    pub window_glazing: Option<String>,
    pub wall_construction: Option<String>,
    pub wall_insulation: Option<String>,
    pub roof_construction: Option<String>,
    pub roof_insulation: Option<String>,
    pub roof_insulation_thickness: Option<String>,
    pub floor_construction: Option<String>,
    pub floor_insulation: Option<String>,
}

impl BuildingRecord {
    /// One assessment per building per lodgement date
    pub fn compute_assessment_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}{}",
            self.uprn,
            self.lodgement_date.as_deref().unwrap_or_default()
        ));
        format!("{:x}", hasher.finalize())
    }

    fn has_assessment(&self) -> bool {
        self.epc_rating.is_some() || self.lodgement_date.is_some() || self.structure_unit_type.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub buildings: usize,
    pub assessments: usize,
    pub duplicates: usize,
}

// ============================================================================
// CONNECTION SETUP
// ============================================================================

/// Open (or create) the database file and prepare the connection
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    register_functions(&conn)?;
    setup_database(&conn)?;
    Ok(conn)
}

/// `ST_Intersects(point_wkt, polygon_wkt)`: true when the point lies in the polygon's envelope
pub fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_Intersects",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let point: Option<String> = ctx.get(0)?;
            let polygon: String = ctx.get(1)?;

            let envelope = BoundingBox::from_polygon_wkt(&polygon)
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;

            Ok(point
                .and_then(|p| parse_point(&p).ok())
                .map_or(false, |p| envelope.contains(&p)))
        },
    )
    .context("Failed to register ST_Intersects")?;

    Ok(())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS building (
            uprn TEXT PRIMARY KEY,
            toid TEXT,
            first_line_of_address TEXT,
            post_code TEXT,
            point TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS epc_assessment (
            id TEXT PRIMARY KEY,
            uprn TEXT REFERENCES building(uprn) ON DELETE NO ACTION,
            epc_rating CHAR(1),
            lodgement_date TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS structure_unit (
            epc_assessment_id TEXT REFERENCES epc_assessment(id) ON DELETE CASCADE,
            type VARCHAR(20),
            built_form VARCHAR(25),
            fuel_type TEXT,
            window_glazing TEXT,
            wall_construction TEXT,
            wall_insulation TEXT,
            roof_construction TEXT,
            roof_insulation TEXT,
            roof_insulation_thickness TEXT,
            floor_construction TEXT,
            floor_insulation TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_epc_assessment_uprn ON epc_assessment(uprn)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_structure_unit_epc ON structure_unit(epc_assessment_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn buildings_in_bounding_box(conn: &Connection, bbox: &BoundingBox) -> rusqlite::Result<Vec<BuildingRow>> {
    let mut stmt = conn.prepare(BUILDINGS_IN_BOUNDING_BOX)?;
    let polygon = bbox.to_polygon_wkt();

    let rows = stmt
        .query_map(named_params! { ":polygon": polygon }, |row| {
            Ok(BuildingRow {
                uprn: row.get(0)?,
                first_line_of_address: row.get(1)?,
                toid: row.get(2)?,
                point: row.get(3)?,
                epc_rating: row.get(4)?,
                structure_unit_type: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(rows = rows.len(), "bounding box search");
    Ok(rows)
}

pub fn filterable_buildings_in_bounding_box(
    conn: &Connection,
    bbox: &BoundingBox,
) -> rusqlite::Result<Vec<FilterableRow>> {
    let mut stmt = conn.prepare(FILTERABLE_BUILDINGS_IN_BOUNDING_BOX)?;
    let polygon = bbox.to_polygon_wkt();

    let rows = stmt
        .query_map(named_params! { ":polygon": polygon }, |row| {
            Ok(FilterableRow {
                uprn: row.get(0)?,
                toid: row.get(1)?,
                post_code: row.get(2)?,
                epc_rating: row.get(3)?,
                lodgement_date: row.get(4)?,
                built_form: row.get(5)?,
                fuel_type: row.get(6)?,
                window_glazing: row.get(7)?,
                wall_construction: row.get(8)?,
                wall_insulation: row.get(9)?,
                floor_construction: row.get(10)?,
                floor_insulation: row.get(11)?,
                roof_construction: row.get(12)?,
                roof_insulation: row.get(13)?,
                roof_insulation_thickness: row.get(14)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(rows = rows.len(), "filterable bounding box search");
    Ok(rows)
}

pub fn building_by_uprn(conn: &Connection, uprn: &str) -> rusqlite::Result<Option<StoredBuilding>> {
    conn.query_row(BUILDING_BY_UPRN, named_params! { ":uprn": uprn }, |row| {
        Ok(StoredBuilding {
            uprn: row.get(0)?,
            toid: row.get(1)?,
            post_code: row.get(2)?,
            point: row.get(3)?,
            epc_rating: row.get(4)?,
        })
    })
    .optional()
}

pub fn count_buildings(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM building", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// IMPORT
// ============================================================================

pub fn load_csv(csv_path: &Path) -> Result<Vec<BuildingRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut records = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let record: BuildingRecord =
            result.with_context(|| format!("Failed to deserialize building on data line {}", line + 1))?;
        records.push(record);
    }

    Ok(records)
}

/// Insert buildings and their assessments; importing the same file twice changes nothing
pub fn import_records(conn: &mut Connection, records: &[BuildingRecord]) -> Result<ImportStats> {
    let tx = conn.transaction()?;
    let mut stats = ImportStats::default();

    for record in records {
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO building (uprn, toid, first_line_of_address, post_code, point)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.uprn,
                record.toid,
                record.first_line_of_address,
                record.post_code,
                record.point,
            ],
        )?;
        stats.buildings += inserted;

        if !record.has_assessment() {
            if inserted == 0 {
                stats.duplicates += 1;
            }
            continue;
        }

        let assessment_id = record.compute_assessment_id();
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO epc_assessment (id, uprn, epc_rating, lodgement_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![assessment_id, record.uprn, record.epc_rating, record.lodgement_date],
        )?;

        if inserted == 0 {
            stats.duplicates += 1;
            continue;
        }
        stats.assessments += 1;

        tx.execute(
            "INSERT INTO structure_unit (
                epc_assessment_id, type, built_form, fuel_type, window_glazing,
                wall_construction, wall_insulation, roof_construction, roof_insulation,
                roof_insulation_thickness, floor_construction, floor_insulation
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                assessment_id,
                record.structure_unit_type,
                record.built_form,
                record.fuel_type,
                record.window_glazing,
                record.wall_construction,
                record.wall_insulation,
                record.roof_construction,
                record.roof_insulation,
                record.roof_insulation_thickness,
                record.floor_construction,
                record.floor_insulation,
            ],
        )?;
    }

    tx.commit()?;

    info!(
        buildings = stats.buildings,
        assessments = stats.assessments,
        duplicates = stats.duplicates,
        "import finished"
    );
    Ok(stats)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    pub(crate) fn record(uprn: &str, point: &str, unit_type: Option<&str>, lodged: &str) -> BuildingRecord {
        BuildingRecord {
            uprn: uprn.to_string(),
            toid: Some(format!("osgb{}", uprn)),
            first_line_of_address: Some(format!("{} Test Street", uprn)),
            post_code: Some("PO33 1AA".to_string()),
            point: Some(point.to_string()),
            epc_rating: Some("C".to_string()),
            lodgement_date: Some(lodged.to_string()),
            structure_unit_type: unit_type.map(|t| t.to_string()),
            built_form: Some("SemiDetached".to_string()),
            fuel_type: Some("MainsGas".to_string()),
            ..Default::default()
        }
    }

    fn isle_of_wight() -> BoundingBox {
        BoundingBox {
            min_long: -1.1835,
            max_long: -1.1507,
            min_lat: 50.6445,
            max_lat: 50.7261,
        }
    }

    #[test]
    fn test_st_intersects_function() {
        let conn = test_connection();
        let polygon = isle_of_wight().to_polygon_wkt();

        let inside: bool = conn
            .query_row(
                "SELECT ST_Intersects(?1, ?2)",
                params!["POINT(-1.1834759844410794 50.72234886358317)", polygon],
                |row| row.get(0),
            )
            .unwrap();
        let outside: bool = conn
            .query_row("SELECT ST_Intersects(?1, ?2)", params!["POINT(-1.3 50.7)", polygon], |row| row.get(0))
            .unwrap();
        let null_point: bool = conn
            .query_row("SELECT ST_Intersects(NULL, ?1)", params![polygon], |row| row.get(0))
            .unwrap();

        assert!(inside);
        assert!(!outside);
        assert!(!null_point);
    }

    #[test]
    fn test_st_intersects_rejects_bad_polygon() {
        let conn = test_connection();
        let result: rusqlite::Result<bool> =
            conn.query_row("SELECT ST_Intersects('POINT(1.0 1.0)', 'nonsense')", [], |row| row.get(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_bounding_box_search_joins_assessments() {
        let mut conn = test_connection();
        import_records(
            &mut conn,
            &[
                record("100060763456", "POINT(-1.1834759844410794 50.72234886358317)", Some("House"), "2024-03-30"),
                record("100060768638", "POINT(-1.16 50.70)", Some("Flat"), "2023-01-01"),
                record("100060768638", "POINT(-1.16 50.70)", Some("Maisonette"), "2024-01-01"),
                record("999", "POINT(-2.5 51.0)", Some("House"), "2024-01-01"),
            ],
        )
        .unwrap();

        let rows = buildings_in_bounding_box(&conn, &isle_of_wight()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.uprn != "999"));

        let flat_rows: Vec<_> = rows.iter().filter(|r| r.uprn == "100060768638").collect();
        assert_eq!(flat_rows.len(), 2);
        // most recent lodgement first
        assert_eq!(flat_rows[0].structure_unit_type.as_deref(), Some("Maisonette"));
    }

    #[test]
    fn test_building_without_assessment_still_found() {
        let mut conn = test_connection();
        let bare = BuildingRecord {
            uprn: "42".to_string(),
            point: Some("POINT(-1.17 50.70)".to_string()),
            ..Default::default()
        };
        import_records(&mut conn, &[bare]).unwrap();

        let rows = buildings_in_bounding_box(&conn, &isle_of_wight()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].epc_rating, None);
        assert_eq!(rows[0].structure_unit_type, None);

        let filterable = filterable_buildings_in_bounding_box(&conn, &isle_of_wight()).unwrap();
        assert_eq!(filterable.len(), 1);
        assert_eq!(filterable[0].built_form, None);
    }

    #[test]
    fn test_building_by_uprn_takes_latest_rating() {
        let mut conn = test_connection();
        let older = BuildingRecord {
            epc_rating: Some("E".to_string()),
            ..record("10023456789", "POINT(-1.1835 50.7223)", Some("House"), "2015-06-01")
        };
        let newer = record("10023456789", "POINT(-1.1835 50.7223)", Some("House"), "2024-03-30");
        import_records(&mut conn, &[older, newer]).unwrap();

        let stored = building_by_uprn(&conn, "10023456789").unwrap().unwrap();
        assert_eq!(stored.toid.as_deref(), Some("osgb10023456789"));
        assert_eq!(stored.post_code.as_deref(), Some("PO33 1AA"));
        assert_eq!(stored.point.as_deref(), Some("POINT(-1.1835 50.7223)"));
        assert_eq!(stored.epc_rating.as_deref(), Some("C"));

        assert_eq!(building_by_uprn(&conn, "1").unwrap(), None);
    }

    #[test]
    fn test_import_twice_is_idempotent() {
        let mut conn = test_connection();
        let records = vec![
            record("1", "POINT(-1.17 50.70)", Some("House"), "2024-03-30"),
            record("2", "POINT(-1.16 50.71)", Some("Flat"), "2024-03-30"),
        ];

        let first = import_records(&mut conn, &records).unwrap();
        assert_eq!(first, ImportStats { buildings: 2, assessments: 2, duplicates: 0 });

        let second = import_records(&mut conn, &records).unwrap();
        assert_eq!(second, ImportStats { buildings: 0, assessments: 0, duplicates: 2 });

        assert_eq!(count_buildings(&conn).unwrap(), 2);
        let units: i64 = conn
            .query_row("SELECT COUNT(*) FROM structure_unit", [], |row| row.get(0))
            .unwrap();
        assert_eq!(units, 2);
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "uprn,toid,first_line_of_address,post_code,point,epc_rating,lodgement_date,structure_unit_type,built_form,fuel_type,window_glazing,wall_construction,wall_insulation,roof_construction,roof_insulation,roof_insulation_thickness,floor_construction,floor_insulation"
        )
        .unwrap();
        writeln!(
            file,
            "100060763456,osgb1000013062259,1 Apple Avenue,PO33 1AA,POINT(-1.1834759844410794 50.72234886358317),C,2024-03-30,House,SemiDetached,MainsGas,DoubleGlazingBefore2002,CavityWall,InsulatedWall,PitchedRoof,Joists,250mm,Suspended,NoInsulationInFloor"
        )
        .unwrap();
        writeln!(file, "100060768638,,,,POINT(-1.16 50.70),,,,,,,,,,,,,").unwrap();

        let records = load_csv(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].roof_insulation_thickness.as_deref(), Some("250mm"));
        assert_eq!(records[1].toid, None);
        assert!(!records[1].has_assessment());
    }

    #[test]
    fn test_assessment_id_is_stable() {
        let a = record("1", "POINT(0.1 0.1)", None, "2024-03-30");
        let b = record("1", "POINT(0.1 0.1)", Some("Flat"), "2024-03-30");
        let c = record("1", "POINT(0.1 0.1)", None, "2024-04-01");

        assert_eq!(a.compute_assessment_id(), b.compute_assessment_id());
        assert_ne!(a.compute_assessment_id(), c.compute_assessment_id());
        assert_eq!(a.compute_assessment_id().len(), 64);
    }
}
