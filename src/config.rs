// ⚙️ Configuration - environment driven settings, validated once at startup

use crate::security::Classification;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

// ============================================================================
// UPDATE MODE
// ============================================================================

/// Where graph writes go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// SPARQL UPDATE straight to the graph store
    Scg,
    /// N-Triples published to a topic
    Topic,
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SCG" => Ok(UpdateMode::Scg),
            "TOPIC" | "KAFKA" => Ok(UpdateMode::Topic),
            other => Err(format!("expected SCG or TOPIC, got {}", other)),
        }
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub db_path: PathBuf,
    pub jena_protocol: String,
    pub jena_url: String,
    pub jena_port: u16,
    pub dataset: String,
    pub onto_dataset: String,
    /// Stub every minted URI starts with
    pub data_uri: String,
    pub update_mode: UpdateMode,
    pub topic_broker_url: String,
    pub ies_topic: String,
    pub dev_mode: bool,
    pub identity_api_url: Option<String>,
    pub subclass_cache_ttl: Duration,
    pub upstream_timeout: Duration,
    pub default_classification: Classification,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Settings, ConfigError> {
        Settings::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &'static str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let dev_mode = parse(&lookup, "DEV_MODE", true, parse_bool)?;

        let identity_api_url = lookup("IDENTITY_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());
        if !dev_mode && identity_api_url.is_none() {
            return Err(ConfigError::Missing("IDENTITY_API_URL"));
        }

        let data_uri = text("DATA_URI", "http://ndtp.co.uk/data#");
        if oxrdf::NamedNode::new(format!("{}probe", data_uri)).is_err() {
            return Err(ConfigError::Invalid {
                key: "DATA_URI",
                value: data_uri,
                reason: "minted URIs would not be valid IRIs".to_string(),
            });
        }

        Ok(Settings {
            port: parse(&lookup, "PORT", 5021, |v| v.parse::<u16>().map_err(|e| e.to_string()))?,
            db_path: PathBuf::from(text("DB_PATH", "retrofit.db")),
            jena_protocol: text("JENA_PROTOCOL", "http"),
            jena_url: text("JENA_URL", "localhost"),
            jena_port: parse(&lookup, "JENA_PORT", 3030, |v| {
                v.parse::<u16>().map_err(|e| e.to_string())
            })?,
            dataset: text("DATASET", "knowledge"),
            onto_dataset: text("ONTO_DATASET", "ontology"),
            data_uri,
            update_mode: parse(&lookup, "UPDATE_MODE", UpdateMode::Scg, UpdateMode::from_str)?,
            topic_broker_url: text("TOPIC_BROKER_URL", "http://localhost:8082")
                .trim_end_matches('/')
                .to_string(),
            ies_topic: text("IES_TOPIC", "knowledge"),
            dev_mode,
            identity_api_url,
            subclass_cache_ttl: Duration::from_secs(parse(&lookup, "SUBCLASS_CACHE_TTL_SECS", 300, |v| {
                v.parse::<u64>().map_err(|e| e.to_string())
            })?),
            upstream_timeout: Duration::from_secs(parse(&lookup, "UPSTREAM_TIMEOUT_SECS", 30, |v| {
                v.parse::<u64>().map_err(|e| e.to_string())
            })?),
            default_classification: parse(
                &lookup,
                "DEFAULT_CLASSIFICATION",
                Classification::Official,
                Classification::from_str,
            )?,
        })
    }

    /// `{protocol}://{host}:{port}` of the triple store
    pub fn jena_base_url(&self) -> String {
        format!("{}://{}:{}", self.jena_protocol, self.jena_url, self.jena_port)
    }
}

fn parse<F, T, P>(lookup: &F, key: &'static str, default: T, parser: P) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, String>,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(value) if !value.is_empty() => parser(&value).map_err(|reason| ConfigError::Invalid {
            key,
            value,
            reason,
        }),
        _ => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("expected true or false, got {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();

        assert_eq!(settings.port, 5021);
        assert_eq!(settings.jena_base_url(), "http://localhost:3030");
        assert_eq!(settings.dataset, "knowledge");
        assert_eq!(settings.onto_dataset, "ontology");
        assert_eq!(settings.data_uri, "http://ndtp.co.uk/data#");
        assert_eq!(settings.update_mode, UpdateMode::Scg);
        assert!(settings.dev_mode);
        assert_eq!(settings.subclass_cache_ttl, Duration::from_secs(300));
        assert_eq!(settings.default_classification, Classification::Official);
    }

    #[test]
    fn test_update_mode_aliases() {
        assert_eq!(settings(&[("UPDATE_MODE", "kafka")]).unwrap().update_mode, UpdateMode::Topic);
        assert_eq!(settings(&[("UPDATE_MODE", "TOPIC")]).unwrap().update_mode, UpdateMode::Topic);

        let err = settings(&[("UPDATE_MODE", "carrier-pigeon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "UPDATE_MODE", .. }));
    }

    #[test]
    fn test_identity_url_required_outside_dev_mode() {
        assert_eq!(
            settings(&[("DEV_MODE", "false")]).unwrap_err(),
            ConfigError::Missing("IDENTITY_API_URL")
        );

        let settings = settings(&[
            ("DEV_MODE", "false"),
            ("IDENTITY_API_URL", "http://access.local/"),
        ])
        .unwrap();
        assert_eq!(settings.identity_api_url.as_deref(), Some("http://access.local"));
    }

    #[test]
    fn test_invalid_numbers_fail_fast() {
        assert!(settings(&[("PORT", "eighty")]).is_err());
        assert!(settings(&[("JENA_PORT", "70000")]).is_err());
        assert!(settings(&[("DATA_URI", "not a stub ")]).is_err());
    }
}
