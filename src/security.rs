// 🔒 Security Labels (EDH) - access-control tags attached to written triples

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Classification {
    /// Official
    #[default]
    #[serde(rename = "O")]
    Official,

    /// Official-Sensitive
    #[serde(rename = "OS")]
    OfficialSensitive,

    /// Secret
    #[serde(rename = "S")]
    Secret,

    /// Top Secret
    #[serde(rename = "TS")]
    TopSecret,
}

impl Classification {
    pub fn code(&self) -> &'static str {
        match self {
            Classification::Official => "O",
            Classification::OfficialSensitive => "OS",
            Classification::Secret => "S",
            Classification::TopSecret => "TS",
        }
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "O" => Ok(Classification::Official),
            "OS" => Ok(Classification::OfficialSensitive),
            "S" => Ok(Classification::Secret),
            "TS" => Ok(Classification::TopSecret),
            other => Err(format!("unknown classification: {}", other)),
        }
    }
}

// ============================================================================
// SECURITY LABEL
// ============================================================================

const PERMITTED_ORGANISATIONS: &str = "permitted_organisations";
const PERMITTED_NATIONALITIES: &str = "permitted_nationalities";
const CLASSIFICATION: &str = "classification";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SecurityLabelError {
    #[error("Invalid value '{value}' in {attribute}: only letters, digits, spaces, '-' and '_' are allowed")]
    InvalidValue { attribute: &'static str, value: String },
}

/// Values end up inside the header expression, so operators and control characters are refused
fn value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\- ]+$").expect("label value pattern is valid"))
}

/// EDH security label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SecurityLabel {
    #[serde(default)]
    pub permitted_organisations: Vec<String>,

    #[serde(default)]
    pub permitted_nationalities: Vec<String>,

    #[serde(default)]
    pub classification: Classification,
}

impl SecurityLabel {
    pub fn new(classification: Classification) -> Self {
        SecurityLabel {
            classification,
            ..Default::default()
        }
    }

    /// Every organisation and nationality must be a plain token
    pub fn validate(&self) -> Result<(), SecurityLabelError> {
        let attributes = [
            (PERMITTED_ORGANISATIONS, &self.permitted_organisations),
            (PERMITTED_NATIONALITIES, &self.permitted_nationalities),
        ];

        for (attribute, values) in attributes {
            if let Some(bad) = values.iter().find(|v| !value_pattern().is_match(v)) {
                return Err(SecurityLabelError::InvalidValue {
                    attribute,
                    value: bad.escape_debug().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Render the `Security-Label` header value.
    ///
    /// Multi-valued attributes become a disjunction, attributes are joined
    /// with `&&`: `(permitted_organisations=A||permitted_organisations=B)&&classification=O`
    pub fn to_header_value(&self) -> String {
        let mut clauses = Vec::new();

        if let Some(clause) = any_of(PERMITTED_ORGANISATIONS, &self.permitted_organisations) {
            clauses.push(clause);
        }
        if let Some(clause) = any_of(PERMITTED_NATIONALITIES, &self.permitted_nationalities) {
            clauses.push(clause);
        }
        clauses.push(format!("{}={}", CLASSIFICATION, self.classification.code()));

        clauses.join("&&")
    }
}

fn any_of(key: &str, values: &[String]) -> Option<String> {
    match values {
        [] => None,
        [single] => Some(format!("{}={}", key, single)),
        many => Some(format!(
            "({})",
            many.iter()
                .map(|v| format!("{}={}", key, v))
                .collect::<Vec<_>>()
                .join("||")
        )),
    }
}

impl fmt::Display for SecurityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}
