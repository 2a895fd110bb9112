// 🕸️ SPARQL Executor - runs read queries against the triple store
// Results are kept in the SPARQL 1.1 JSON shape; the mapper flattens them

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One bound RDF term in a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    #[serde(rename = "type", default)]
    pub kind: String,

    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl Term {
    pub fn uri(value: &str) -> Self {
        Term {
            kind: "uri".to_string(),
            value: value.to_string(),
            datatype: None,
        }
    }

    pub fn literal(value: &str) -> Self {
        Term {
            kind: "literal".to_string(),
            value: value.to_string(),
            datatype: None,
        }
    }
}

/// Variable name → bound term. Unbound variables are simply absent.
pub type Binding = HashMap<String, Term>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// `application/sparql-results+json` document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparqlResults {
    #[serde(default)]
    pub head: Head,

    #[serde(default)]
    pub results: ResultSet,
}

impl SparqlResults {
    pub fn from_bindings(bindings: Vec<Binding>) -> Self {
        SparqlResults {
            head: Head::default(),
            results: ResultSet { bindings },
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.results.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }
}

// ============================================================================
// FORWARDED HEADERS
// ============================================================================

/// Incoming headers relayed to upstream services
pub const FORWARDED_HEADERS: [&str; 2] = ["authorization", "x-auth-request-access-token"];

/// Auth headers copied from the incoming request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardedHeaders(Vec<(String, String)>);

impl ForwardedHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let kept = FORWARDED_HEADERS
            .iter()
            .filter_map(|name| {
                let value = headers.get(*name)?.to_str().ok()?;
                Some((name.to_string(), value.to_string()))
            })
            .collect();
        ForwardedHeaders(kept)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every kept header onto an outgoing request
    pub fn apply(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in self.iter() {
            request = request.header(name, value);
        }
        request
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpstreamError {
    /// The upstream answered with a non-2xx status
    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("could not reach {target}: {message}")]
    Connection { target: String, message: String },

    #[error("could not decode upstream response: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub(crate) fn transport(target: &str, err: reqwest::Error) -> Self {
        UpstreamError::Connection {
            target: target.to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// GRAPH STORE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// Buildings, flags and assessments
    Knowledge,
    /// Class hierarchy
    Ontology,
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Knowledge => f.write_str("knowledge"),
            Dataset::Ontology => f.write_str("ontology"),
        }
    }
}

/// Read side of the triple store
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn query(
        &self,
        dataset: Dataset,
        query: &str,
        headers: &ForwardedHeaders,
    ) -> Result<SparqlResults, UpstreamError>;
}

/// Fuseki-style SPARQL protocol endpoint
pub struct HttpGraphStore {
    client: reqwest::Client,
    base_url: String,
    knowledge: String,
    ontology: String,
}

impl HttpGraphStore {
    pub fn new(client: reqwest::Client, base_url: &str, knowledge: &str, ontology: &str) -> Self {
        HttpGraphStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            knowledge: knowledge.to_string(),
            ontology: ontology.to_string(),
        }
    }

    pub fn dataset_name(&self, dataset: Dataset) -> &str {
        match dataset {
            Dataset::Knowledge => &self.knowledge,
            Dataset::Ontology => &self.ontology,
        }
    }

    /// `{base}/{dataset}/query?query=<urlencoded>`
    pub fn query_url(&self, dataset: Dataset, query: &str) -> String {
        format!(
            "{}/{}/query?query={}",
            self.base_url,
            self.dataset_name(dataset),
            urlencoding::encode(query)
        )
    }

    /// `{base}/{dataset}/update`
    pub fn update_url(&self, dataset: Dataset) -> String {
        format!("{}/{}/update", self.base_url, self.dataset_name(dataset))
    }
}

#[async_trait]
impl GraphStore for HttpGraphStore {
    async fn query(
        &self,
        dataset: Dataset,
        query: &str,
        headers: &ForwardedHeaders,
    ) -> Result<SparqlResults, UpstreamError> {
        let url = self.query_url(dataset, query);
        debug!(dataset = %self.dataset_name(dataset), "running SPARQL query");

        let request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/sparql-results+json");

        let response = headers
            .apply(request)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), dataset = %self.dataset_name(dataset), "SPARQL query failed");
            return Err(UpstreamError::Status(status.as_u16()));
        }

        response
            .json::<SparqlResults>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_deserialize() {
        let json = r#"{
            "head": {"vars": ["uprn", "flag"]},
            "results": {"bindings": [
                {"uprn": {"type": "literal", "value": "12345"},
                 "flag": {"type": "uri", "value": "http://ndtp.co.uk/data#flag1"}},
                {"uprn": {"type": "literal", "value": "2", "datatype": "http://www.w3.org/2001/XMLSchema#integer"}}
            ]}
        }"#;

        let results: SparqlResults = serde_json::from_str(json).unwrap();
        assert_eq!(results.head.vars, vec!["uprn", "flag"]);
        assert_eq!(results.bindings().len(), 2);
        assert_eq!(results.bindings()[0]["flag"].kind, "uri");
        assert!(!results.bindings()[1].contains_key("flag"));
    }

    #[test]
    fn test_results_tolerate_missing_sections() {
        let results: SparqlResults = serde_json::from_str("{}").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_forwarded_headers_keep_only_auth() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        headers.insert("x-auth-request-access-token", "token".parse().unwrap());
        headers.insert("cookie", "session=1".parse().unwrap());

        let forwarded = ForwardedHeaders::from_headers(&headers);
        let kept: Vec<_> = forwarded.iter().collect();
        assert_eq!(
            kept,
            vec![("authorization", "Bearer abc"), ("x-auth-request-access-token", "token")]
        );
    }

    #[test]
    fn test_urls() {
        let client = reqwest::Client::new();
        let store = HttpGraphStore::new(client, "http://localhost:3030/", "knowledge", "ontology");

        assert_eq!(
            store.query_url(Dataset::Ontology, "SELECT * WHERE {}"),
            "http://localhost:3030/ontology/query?query=SELECT%20%2A%20WHERE%20%7B%7D"
        );
        assert_eq!(store.update_url(Dataset::Knowledge), "http://localhost:3030/knowledge/update");
    }
}
