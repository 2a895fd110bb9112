// 🧾 Query Templates - SPARQL and SQL text for every read path
// Parameters are validated before they reach a template; SQL values are bound, never formatted in

use oxrdf::{Literal, NamedNode};
use thiserror::Error;

/// Namespace of the UPRN and data nodes in the imported knowledge graph
pub const KNOWLEDGE_DATA: &str = "http://ndtp.co.uk/data#";

/// Named graph holding the pre-computed ward statistics
pub const WARD_STATISTICS_GRAPH: &str = "http://ndtp.co.uk/epc-ward-statistics";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("Invalid UPRN '{0}': expected 1 to 12 digits")]
    Uprn(String),

    #[error("Invalid URI '{0}'")]
    Iri(String),
}

// ============================================================================
// VALIDATED IDENTIFIERS
// ============================================================================

/// Unique Property Reference Number, digits only
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uprn(String);

impl Uprn {
    pub const MAX_DIGITS: usize = 12;

    pub fn parse(value: &str) -> Result<Uprn, InputError> {
        let trimmed = value.trim();
        if trimmed.is_empty()
            || trimmed.len() > Self::MAX_DIGITS
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(InputError::Uprn(value.to_string()));
        }
        Ok(Uprn(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<http://ndtp.co.uk/data#UPRN_{uprn}>`
    pub fn node(&self) -> NamedNode {
        NamedNode::new_unchecked(format!("{}UPRN_{}", KNOWLEDGE_DATA, self.0))
    }
}

impl std::fmt::Display for Uprn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate an absolute IRI
pub fn parse_iri(value: &str) -> Result<NamedNode, InputError> {
    NamedNode::new(value.trim()).map_err(|_| InputError::Iri(value.to_string()))
}

// ============================================================================
// SPARQL - BUILDINGS
// ============================================================================

const BUILDING_PREFIXES: &str = "PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX ies: <http://informationexchangestandard.org/ont/ies#>
PREFIX building: <http://ies.data.gov.uk/ontology/ies-building1#>
";

/// Graph pattern binding `?structureUnitState` for one UPRN
fn structure_unit_state(uprn: &Uprn) -> String {
    format!(
        "    ?structureUnit ies:isIdentifiedBy {} .
    ?structureUnit a building:StructureUnit .
    ?structureUnitState a building:StructureUnitState .
    ?structureUnitState ies:isStateOf ?structureUnit .
",
        uprn.node()
    )
}

/// Lodgement date, built form and structure unit type of a building
pub fn building(uprn: &Uprn) -> String {
    format!(
        "{prefixes}
SELECT ?lodgementDate ?builtForm ?structureUnitType WHERE {{
{state}
    ?epc_result building:lodgementDate ?lodgementDate .
    ?epc_result ies:isParticipantIn ?epc_assessment .
    ?epc_assessment building:assessedStateForEnergyPerformance ?structureUnitState .

    ?_bf a ?builtForm .
    ?builtForm a building:BuiltForm .
    ?_bf ies:isStateOf ?structureUnit .

    ?_sut a ?structureUnitType .
    ?structureUnitType a building:StructureUnitType .
    ?_sut ies:isStateOf ?structureUnit .
}}
LIMIT 1
",
        prefixes = BUILDING_PREFIXES,
        state = structure_unit_state(uprn),
    )
}

pub fn roof_for_building(uprn: &Uprn) -> String {
    format!(
        "{prefixes}
SELECT ?roofConstruction ?roofInsulation ?roofInsulationThickness WHERE {{
{state}
    ?_rc a ?roofConstruction .
    ?roofConstruction a building:RoofConstruction .
    ?_rc ies:isPartOf ?structureUnitState .

    ?_ri a ?roofInsulation .
    ?roofInsulation a building:RoofInsulationLocation .
    ?_ri ies:isPartOf ?structureUnitState .

    OPTIONAL {{
        ?_rit a ?roofInsulationThickness .
        ?roofInsulationThickness a building:RoofInsulationThickness .
        ?_rit ies:isPartOf ?structureUnitState .
    }}
}}
LIMIT 1
",
        prefixes = BUILDING_PREFIXES,
        state = structure_unit_state(uprn),
    )
}

pub fn floor_for_building(uprn: &Uprn) -> String {
    format!(
        "{prefixes}
SELECT ?floorConstruction ?floorInsulation WHERE {{
{state}
    ?_fc a ?floorConstruction .
    ?floorConstruction a building:FloorConstruction .
    ?_fc ies:isPartOf ?structureUnitState .

    ?_fi a ?floorInsulation .
    ?floorInsulation a building:FloorInsulation .
    ?_fi ies:isPartOf ?structureUnitState .
}}
LIMIT 1
",
        prefixes = BUILDING_PREFIXES,
        state = structure_unit_state(uprn),
    )
}

pub fn walls_and_windows_for_building(uprn: &Uprn) -> String {
    format!(
        "{prefixes}
SELECT ?wallConstruction ?wallInsulation ?windowGlazing WHERE {{
{state}
    ?_wc a ?wallConstruction .
    ?wallConstruction a building:WallConstruction .
    ?_wc ies:isPartOf ?structureUnitState .

    ?_wi a ?wallInsulation .
    ?wallInsulation a building:WallInsulation .
    ?_wi ies:isPartOf ?structureUnitState .

    ?_wg a ?windowGlazing .
    ?windowGlazing a building:GlazingType .
    ?_wg ies:isPartOf ?structureUnitState .
}}
LIMIT 1
",
        prefixes = BUILDING_PREFIXES,
        state = structure_unit_state(uprn),
    )
}

// ============================================================================
// SPARQL - STATISTICS & FLAGS
// ============================================================================

/// EPC rating counts per ward, ordered by ward name
pub fn statistics_for_wards() -> String {
    let ratings = ["A", "B", "C", "D", "E", "F", "G"];

    let projection: String = ratings
        .iter()
        .map(|r| format!(" ?EPC_Rating_{}", r))
        .collect();
    let patterns: String = ratings
        .iter()
        .map(|r| format!("            stats:EPC_Rating_{r} ?EPC_Rating_{r} ;\n"))
        .collect();

    format!(
        "PREFIX stats: <http://ndtp.co.uk/stats#>

SELECT ?wardName{projection} ?No_EPC_Rating
WHERE {{
    GRAPH <{graph}> {{
        ?stats a stats:EPCWardStats ;
            stats:wardName ?wardName ;
{patterns}            stats:No_EPC_Rating ?No_EPC_Rating .
    }}
}}
ORDER BY ?wardName
",
        graph = WARD_STATISTICS_GRAPH,
    )
}

/// Every flag that no assessment has targeted yet
pub fn flagged_buildings() -> String {
    "PREFIX building: <http://ies.data.gov.uk/ontology/ies-building1#>
PREFIX ies: <http://informationexchangestandard.org/ont/ies#>

SELECT ?toid ?uprn ?flag WHERE {
    ?flag a ?flagType ;
        ies:interestedIn ?structureUnitState .
    ?structureUnitState a building:StructureUnitState ;
        ies:isStateOf ?structureUnit .
    ?structureUnit a building:StructureUnit ;
        ies:isIdentifiedBy ?uprn ;
        ies:isIdentifiedBy ?_toid .

    ?uprn a building:UPRN .
    ?_toid a ies:TOID ;
        ies:representationValue ?toid .

    FILTER NOT EXISTS { ?flag_assessment ies:assessed ?flag . }
}
"
    .to_string()
}

/// Active and historic flags on a building, with their assessments when present
pub fn flag_history(uprn: &Uprn) -> String {
    format!(
        "{prefixes}
SELECT ?uprn ?flag ?flagType ?retrofitterName ?flagDate ?assessmentDate ?assessorName ?assessmentReason
WHERE {{
    ?uprn a building:UPRN .
    ?uprn ies:representationValue {uprn} .

    ?structureUnit ies:isIdentifiedBy ?uprn ;
        a building:StructureUnit .
    ?structureUnitState a building:StructureUnitState ;
        ies:isStateOf ?structureUnit .

    ?flag a ?flagType ;
        ies:interestedIn ?structureUnitState ;
        ies:inPeriod ?flagDate ;
        ies:isStateOf ?retrofitter .
    ?retrofitter ies:hasName ?_retrofitterName .
    ?_retrofitterName ies:representationValue ?retrofitterName .

    OPTIONAL {{
        ?assessment a ?assessmentReason ;
            ies:assessed ?flag ;
            ies:inPeriod ?assessmentDate ;
            ies:assessor ?assessor .
        ?assessor ies:hasName ?_assessorName .
        ?_assessorName ies:representationValue ?assessorName .
    }}
}}
",
        prefixes = BUILDING_PREFIXES,
        uprn = Literal::new_simple_literal(uprn.as_str()),
    )
}

// ============================================================================
// SPARQL - ONTOLOGY
// ============================================================================

/// Transitive subclasses of `super_class` with their direct parents and comments
pub fn subclasses(super_class: &NamedNode, exclude: Option<&NamedNode>) -> String {
    let filter = exclude
        .map(|ex| format!("    FILTER NOT EXISTS {{ ?sub rdfs:subClassOf* {} }}\n", ex))
        .unwrap_or_default();

    format!(
        "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>

SELECT ?sub ?parent ?comment WHERE {{
    ?sub rdfs:subClassOf* {super_class} .
    ?sub rdfs:subClassOf ?parent .
    OPTIONAL {{ ?sub rdfs:comment ?comment }}
{filter}}}
"
    )
}

// ============================================================================
// SQL
// ============================================================================

/// Buildings whose point lies in `:polygon`, joined to their EPC and structure unit rows
pub const BUILDINGS_IN_BOUNDING_BOX: &str = "
    WITH filtered_buildings AS (
        SELECT uprn, first_line_of_address, toid, point
        FROM building
        WHERE ST_Intersects(point, :polygon)
    )
    SELECT fb.uprn, fb.first_line_of_address,
        fb.toid, fb.point, ea.epc_rating,
        su.type AS structure_unit_type
    FROM filtered_buildings fb
    LEFT JOIN epc_assessment ea ON fb.uprn = ea.uprn
    LEFT JOIN structure_unit su ON ea.id = su.epc_assessment_id
    ORDER BY fb.uprn, ea.lodgement_date DESC
";

/// Buildings in `:polygon` with every attribute the front-end can filter on
pub const FILTERABLE_BUILDINGS_IN_BOUNDING_BOX: &str = "
    WITH filtered_buildings AS (
        SELECT uprn, toid, post_code, point
        FROM building
        WHERE ST_Intersects(point, :polygon)
    )
    SELECT fb.uprn, fb.toid, fb.post_code,
        ea.epc_rating, ea.lodgement_date,
        su.built_form, su.fuel_type, su.window_glazing,
        su.wall_construction, su.wall_insulation,
        su.floor_construction, su.floor_insulation,
        su.roof_construction, su.roof_insulation,
        su.roof_insulation_thickness
    FROM filtered_buildings fb
    LEFT JOIN epc_assessment ea ON fb.uprn = ea.uprn
    LEFT JOIN structure_unit su ON ea.id = su.epc_assessment_id
    ORDER BY fb.uprn, ea.lodgement_date DESC
";

/// Stored building for `:uprn` with its most recent EPC rating
pub const BUILDING_BY_UPRN: &str = "
    SELECT b.uprn, b.toid, b.post_code, b.point, ea.epc_rating
    FROM building b
    LEFT JOIN epc_assessment ea ON b.uprn = ea.uprn
    WHERE b.uprn = :uprn
    ORDER BY ea.lodgement_date DESC
    LIMIT 1
";
