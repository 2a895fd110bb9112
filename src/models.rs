// 📦 Response DTOs and request bodies
// Every DTO is built in one go by a mapper; nothing is filled in after the fact

use crate::security::SecurityLabel;
use serde::{Deserialize, Serialize};

// ============================================================================
// BUILDINGS
// ============================================================================

/// Building returned by the bounding-box search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleBuilding {
    pub uprn: String,
    pub first_line_of_address: Option<String>,
    pub toid: Option<String>,
    pub energy_rating: Option<String>,
    pub structure_unit_type: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Single building with its fabric attributes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailedBuilding {
    pub uprn: String,
    pub toid: Option<String>,
    pub structure_unit_type: Option<String>,
    pub energy_rating: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub postcode: Option<String>,
    pub lodgement_date: Option<String>,
    pub built_form: Option<String>,
    pub floor_construction: Option<String>,
    pub floor_insulation: Option<String>,
    pub roof_construction: Option<String>,
    pub roof_insulation_location: Option<String>,
    pub roof_insulation_thickness: Option<String>,
    pub wall_construction: Option<String>,
    pub wall_insulation: Option<String>,
    pub window_glazing: Option<String>,
}

/// Building in a bounding box together with the attributes the front-end filters on
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterableBuilding {
    pub uprn: String,
    pub toid: Option<String>,
    pub postcode: Option<String>,
    pub built_form: Option<String>,
    pub fuel_type: Option<String>,
    pub lodgement_date: Option<String>,
    pub window_glazing: Option<String>,
    pub wall_construction: Option<String>,
    pub wall_insulation: Option<String>,
    pub floor_construction: Option<String>,
    pub floor_insulation: Option<String>,
    pub roof_construction: Option<String>,
    pub roof_insulation_location: Option<String>,
    pub roof_insulation_thickness: Option<String>,
}

/// Distinct filter values present in a bounding box, each list sorted
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterSummary {
    pub postcode: Vec<String>,
    pub built_form: Vec<String>,
    pub inspection_year: Vec<String>,
    pub energy_rating: Vec<String>,
    pub fuel_type: Vec<String>,
    pub window_glazing: Vec<String>,
    pub wall_construction: Vec<String>,
    pub wall_insulation: Vec<String>,
    pub floor_construction: Vec<String>,
    pub floor_insulation: Vec<String>,
    pub roof_construction: Vec<String>,
    pub roof_insulation_location: Vec<String>,
    pub roof_insulation_thickness: Vec<String>,
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EpcStatistics {
    pub name: String,
    pub a_rating: i64,
    pub b_rating: i64,
    pub c_rating: i64,
    pub d_rating: i64,
    pub e_rating: i64,
    pub f_rating: i64,
    pub g_rating: i64,
    pub no_rating: i64,
}

// ============================================================================
// FLAGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlaggedBuilding {
    pub uprn: String,
    pub toid: String,
    /// Full URI of the active flag
    pub flagged: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlagHistory {
    pub uprn: String,
    pub flagged: String,
    pub flag_type: String,
    pub flagged_by_name: String,
    pub flag_date: String,
    pub assessment_date: String,
    pub assessor_name: String,
    pub assessment_reason: String,
}

impl FlagHistory {
    /// A flag without an assessment is still active
    pub fn is_active(&self) -> bool {
        self.assessment_date.is_empty() && self.assessment_reason.is_empty()
    }
}

// ============================================================================
// ONTOLOGY & USERS
// ============================================================================

/// Ontology class with its direct parents and comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IesClass {
    pub uri: String,
    pub short_name: String,
    pub super_classes: Vec<String>,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub username: String,
    pub user_id: String,
    pub email: Option<String>,
}

// ============================================================================
// REQUEST BODIES
// ============================================================================

/// Body of `/flag-to-investigate` and `/flag-to-visit`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRequest {
    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default)]
    pub security_label: Option<SecurityLabel>,
}

/// Body of `/invalidate-flag`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateFlag {
    pub flag_uri: String,

    /// Full URI or CURIE; defaults to `ndt_ont:AssessToBeFalse`
    #[serde(default)]
    pub assessment_type_override: Option<String>,

    #[serde(default)]
    pub security_label: Option<SecurityLabel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ies_class_uses_camel_case() {
        let class = IesClass {
            uri: "http://example.com/A".to_string(),
            short_name: "ex:A".to_string(),
            super_classes: vec!["http://example.com/B".to_string()],
            description: vec![],
        };

        let json = serde_json::to_value(&class).unwrap();
        assert_eq!(json["shortName"], "ex:A");
        assert_eq!(json["superClasses"][0], "http://example.com/B");
    }

    #[test]
    fn test_invalidate_flag_body() {
        let body: InvalidateFlag = serde_json::from_str(
            r#"{"flagUri":"data:flag-1","securityLabel":{"classification":"OS"}}"#,
        )
        .unwrap();

        assert_eq!(body.flag_uri, "data:flag-1");
        assert!(body.assessment_type_override.is_none());
        assert!(body.security_label.is_some());
    }

    #[test]
    fn test_flag_history_activity() {
        let mut flag = FlagHistory::default();
        assert!(flag.is_active());

        flag.assessment_date = "2020-01-02T00:00:00".to_string();
        assert!(!flag.is_active());
    }
}
