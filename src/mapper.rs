// 🗂️ Result Mapper - flattens SPARQL bindings and SQL rows into response DTOs
// Every DTO is built in one expression; nothing is patched after construction

use crate::db::{BuildingRow, FilterableRow, StoredBuilding};
use crate::geometry::{parse_point, GeometryError};
use crate::models::{
    DetailedBuilding, EpcStatistics, FilterSummary, FilterableBuilding, FlagHistory, FlaggedBuilding,
    SimpleBuilding,
};
use crate::sparql::{Binding, SparqlResults};
use crate::uri::strip_uri;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("Invalid integer value '{value}' for {field}")]
    InvalidInteger { field: String, value: String },
}

// ============================================================================
// BINDING ACCESS
// ============================================================================

/// Raw value of a bound variable, `""` when unbound
pub fn uri_of(binding: &Binding, field: &str) -> String {
    binding
        .get(field)
        .map(|term| term.value.clone())
        .unwrap_or_default()
}

/// Bound value with its URI stripped down to the resource name
pub fn value_of(binding: &Binding, field: &str) -> String {
    strip_uri(&uri_of(binding, field))
}

/// Integer count; unbound counts as zero
pub fn int_of(binding: &Binding, field: &str) -> Result<i64, MappingError> {
    let Some(term) = binding.get(field) else {
        return Ok(0);
    };

    let value = strip_uri(&term.value);
    value.trim().parse::<i64>().map_err(|_| MappingError::InvalidInteger {
        field: field.to_string(),
        value,
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn optional_value(binding: Option<&Binding>, field: &str) -> Option<String> {
    binding.and_then(|b| non_empty(value_of(b, field)))
}

// ============================================================================
// BUILDINGS
// ============================================================================

/// Combine the stored building with the four per-aspect query results
pub fn map_detailed_building(
    uprn: &str,
    stored: Option<&StoredBuilding>,
    generic: &SparqlResults,
    roof: &SparqlResults,
    floor: &SparqlResults,
    wall_window: &SparqlResults,
) -> Result<DetailedBuilding, MappingError> {
    // queries are LIMIT 1; the last row wins if an endpoint ignores that
    let generic = generic.bindings().last();
    let roof = roof.bindings().last();
    let floor = floor.bindings().last();
    let wall_window = wall_window.bindings().last();

    let point = stored
        .and_then(|b| b.point.as_deref())
        .map(parse_point)
        .transpose()?;

    Ok(DetailedBuilding {
        uprn: uprn.to_string(),
        toid: stored.and_then(|b| b.toid.clone()),
        energy_rating: stored.and_then(|b| b.epc_rating.clone()),
        postcode: stored.and_then(|b| b.post_code.clone()),
        latitude: point.map(|p| p.latitude),
        longitude: point.map(|p| p.longitude),
        lodgement_date: optional_value(generic, "lodgementDate"),
        built_form: optional_value(generic, "builtForm"),
        structure_unit_type: optional_value(generic, "structureUnitType"),
        roof_construction: optional_value(roof, "roofConstruction"),
        roof_insulation_location: optional_value(roof, "roofInsulation"),
        roof_insulation_thickness: optional_value(roof, "roofInsulationThickness"),
        floor_construction: optional_value(floor, "floorConstruction"),
        floor_insulation: optional_value(floor, "floorInsulation"),
        wall_construction: optional_value(wall_window, "wallConstruction"),
        wall_insulation: optional_value(wall_window, "wallInsulation"),
        window_glazing: optional_value(wall_window, "windowGlazing"),
    })
}

/// Rank used to pick one structure unit per UPRN; unranked types are 0
pub fn type_rank(structure_unit_type: Option<&str>) -> u8 {
    match structure_unit_type {
        Some("House") | Some("Flat") | Some("Park Home") => 1,
        Some("Maisonette") | Some("Bungalow") => 2,
        _ => 0,
    }
}

/// One building per UPRN, keeping the highest ranked structure unit type.
/// Ties keep the row seen first; output follows first-seen UPRN order.
pub fn map_bounded_buildings(rows: &[BuildingRow]) -> Result<Vec<SimpleBuilding>, MappingError> {
    let mut buildings: Vec<SimpleBuilding> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        let existing = positions.get(row.uprn.as_str()).copied();
        if let Some(index) = existing {
            let current = type_rank(buildings[index].structure_unit_type.as_deref());
            if type_rank(row.structure_unit_type.as_deref()) <= current {
                continue;
            }
        }

        let point = parse_point(&row.point)?;
        let building = SimpleBuilding {
            uprn: row.uprn.clone(),
            first_line_of_address: row.first_line_of_address.clone(),
            toid: row.toid.clone(),
            energy_rating: row.epc_rating.clone(),
            structure_unit_type: row.structure_unit_type.clone(),
            latitude: point.latitude,
            longitude: point.longitude,
        };

        match existing {
            Some(index) => buildings[index] = building,
            None => {
                positions.insert(row.uprn.as_str(), buildings.len());
                buildings.push(building);
            }
        }
    }

    Ok(buildings)
}

pub fn map_filterable_buildings(rows: &[FilterableRow]) -> Vec<FilterableBuilding> {
    rows.iter()
        .map(|row| FilterableBuilding {
            uprn: row.uprn.clone(),
            toid: row.toid.clone(),
            postcode: row.post_code.clone(),
            built_form: row.built_form.clone(),
            fuel_type: row.fuel_type.clone(),
            lodgement_date: row.lodgement_date.clone(),
            window_glazing: row.window_glazing.clone(),
            wall_construction: row.wall_construction.clone(),
            wall_insulation: row.wall_insulation.clone(),
            floor_construction: row.floor_construction.clone(),
            floor_insulation: row.floor_insulation.clone(),
            roof_construction: row.roof_construction.clone(),
            roof_insulation_location: row.roof_insulation.clone(),
            roof_insulation_thickness: row.roof_insulation_thickness.clone(),
        })
        .collect()
}

/// Outward code of a UK postcode (`PO33 1AA` or `PO331AA` → `PO33`); the inward code is always three characters
fn outward_code(postcode: &str) -> Option<String> {
    let compact: String = postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let split = compact.len().checked_sub(3).filter(|&n| n > 0)?;
    compact.get(..split).map(str::to_string)
}

fn inspection_year(lodgement_date: &str) -> Option<String> {
    let year = lodgement_date.trim().get(..4)?;
    year.bytes().all(|b| b.is_ascii_digit()).then(|| year.to_string())
}

/// Sorted distinct values of every filterable attribute
pub fn summarise_filters(rows: &[FilterableRow]) -> FilterSummary {
    fn collect<'a>(values: impl Iterator<Item = Option<&'a String>>) -> Vec<String> {
        values
            .flatten()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn derive<'a>(values: impl Iterator<Item = Option<&'a String>>, f: fn(&str) -> Option<String>) -> Vec<String> {
        values
            .flatten()
            .filter_map(|v| f(v))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    FilterSummary {
        postcode: derive(rows.iter().map(|r| r.post_code.as_ref()), outward_code),
        built_form: collect(rows.iter().map(|r| r.built_form.as_ref())),
        inspection_year: derive(rows.iter().map(|r| r.lodgement_date.as_ref()), inspection_year),
        energy_rating: collect(rows.iter().map(|r| r.epc_rating.as_ref())),
        fuel_type: collect(rows.iter().map(|r| r.fuel_type.as_ref())),
        window_glazing: collect(rows.iter().map(|r| r.window_glazing.as_ref())),
        wall_construction: collect(rows.iter().map(|r| r.wall_construction.as_ref())),
        wall_insulation: collect(rows.iter().map(|r| r.wall_insulation.as_ref())),
        floor_construction: collect(rows.iter().map(|r| r.floor_construction.as_ref())),
        floor_insulation: collect(rows.iter().map(|r| r.floor_insulation.as_ref())),
        roof_construction: collect(rows.iter().map(|r| r.roof_construction.as_ref())),
        roof_insulation_location: collect(rows.iter().map(|r| r.roof_insulation.as_ref())),
        roof_insulation_thickness: collect(rows.iter().map(|r| r.roof_insulation_thickness.as_ref())),
    }
}

// ============================================================================
// STATISTICS & FLAGS
// ============================================================================

pub fn map_epc_statistics(results: &SparqlResults) -> Result<Vec<EpcStatistics>, MappingError> {
    results
        .bindings()
        .iter()
        .map(|b| {
            Ok(EpcStatistics {
                name: value_of(b, "wardName"),
                a_rating: int_of(b, "EPC_Rating_A")?,
                b_rating: int_of(b, "EPC_Rating_B")?,
                c_rating: int_of(b, "EPC_Rating_C")?,
                d_rating: int_of(b, "EPC_Rating_D")?,
                e_rating: int_of(b, "EPC_Rating_E")?,
                f_rating: int_of(b, "EPC_Rating_F")?,
                g_rating: int_of(b, "EPC_Rating_G")?,
                no_rating: int_of(b, "No_EPC_Rating")?,
            })
        })
        .collect()
}

/// One row per flag (and assessment, when present); no de-duplication
pub fn map_flag_history(results: &SparqlResults) -> Vec<FlagHistory> {
    results
        .bindings()
        .iter()
        .map(|b| FlagHistory {
            uprn: value_of(b, "uprn"),
            flagged: uri_of(b, "flag"),
            flag_type: value_of(b, "flagType"),
            flagged_by_name: value_of(b, "retrofitterName"),
            flag_date: value_of(b, "flagDate"),
            assessment_date: value_of(b, "assessmentDate"),
            assessor_name: value_of(b, "assessorName"),
            assessment_reason: value_of(b, "assessmentReason"),
        })
        .collect()
}

pub fn map_flagged_buildings(results: &SparqlResults) -> Vec<FlaggedBuilding> {
    results
        .bindings()
        .iter()
        .map(|b| FlaggedBuilding {
            uprn: value_of(b, "uprn"),
            toid: value_of(b, "toid"),
            flagged: uri_of(b, "flag"),
        })
        .collect()
}
