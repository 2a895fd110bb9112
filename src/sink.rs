// 📤 Update Sinks - where composed graph writes are delivered
// Chosen once at startup: direct SPARQL UPDATE, or N-Triples published to a topic

use crate::config::{Settings, UpdateMode};
use crate::security::SecurityLabel;
use crate::sparql::{ForwardedHeaders, UpstreamError};
use async_trait::async_trait;
use oxrdf::Triple;
use std::sync::Arc;
use tracing::{info, warn};

pub const SECURITY_LABEL_HEADER: &str = "Security-Label";

// ============================================================================
// GRAPH UPDATE
// ============================================================================

/// A batch of triples written in one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphUpdate {
    pub triples: Vec<Triple>,
}

impl GraphUpdate {
    pub fn new() -> Self {
        GraphUpdate::default()
    }

    pub fn push(&mut self, triple: Triple) {
        self.triples.push(triple);
    }

    pub fn extend(&mut self, triples: impl IntoIterator<Item = Triple>) {
        self.triples.extend(triples);
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// `INSERT DATA { ... }` with one triple per line
    pub fn to_sparql_insert(&self) -> String {
        let body: String = self
            .triples
            .iter()
            .map(|t| format!("    {} .\n", t))
            .collect();
        format!("INSERT DATA {{\n{}}}\n", body)
    }

    pub fn to_ntriples(&self) -> String {
        self.triples.iter().map(|t| format!("{} .\n", t)).collect()
    }
}

// ============================================================================
// SINKS
// ============================================================================

#[async_trait]
pub trait UpdateSink: Send + Sync {
    fn mode(&self) -> UpdateMode;

    async fn apply(
        &self,
        update: &GraphUpdate,
        label: &SecurityLabel,
        headers: &ForwardedHeaders,
    ) -> Result<(), UpstreamError>;
}

/// SPARQL UPDATE against `{base}/{dataset}/update`
pub struct HttpUpdateSink {
    client: reqwest::Client,
    update_url: String,
}

impl HttpUpdateSink {
    pub fn new(client: reqwest::Client, update_url: String) -> Self {
        HttpUpdateSink { client, update_url }
    }
}

#[async_trait]
impl UpdateSink for HttpUpdateSink {
    fn mode(&self) -> UpdateMode {
        UpdateMode::Scg
    }

    async fn apply(
        &self,
        update: &GraphUpdate,
        label: &SecurityLabel,
        headers: &ForwardedHeaders,
    ) -> Result<(), UpstreamError> {
        let request = self
            .client
            .post(&self.update_url)
            .header(reqwest::header::CONTENT_TYPE, "application/sparql-update")
            .header(SECURITY_LABEL_HEADER, label.to_header_value())
            .body(update.to_sparql_insert());

        let response = headers
            .apply(request)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(&self.update_url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "SPARQL update rejected");
            return Err(UpstreamError::Status(status.as_u16()));
        }

        info!(triples = update.triples.len(), "SPARQL update applied");
        Ok(())
    }
}

/// N-Triples published to `{broker}/topics/{topic}`
pub struct TopicUpdateSink {
    client: reqwest::Client,
    publish_url: String,
}

impl TopicUpdateSink {
    pub fn new(client: reqwest::Client, broker_url: &str, topic: &str) -> Self {
        TopicUpdateSink {
            client,
            publish_url: format!(
                "{}/topics/{}",
                broker_url.trim_end_matches('/'),
                urlencoding::encode(topic)
            ),
        }
    }

    pub fn publish_url(&self) -> &str {
        &self.publish_url
    }
}

#[async_trait]
impl UpdateSink for TopicUpdateSink {
    fn mode(&self) -> UpdateMode {
        UpdateMode::Topic
    }

    /// Topic records carry the label only; caller credentials stay in-process
    async fn apply(
        &self,
        update: &GraphUpdate,
        label: &SecurityLabel,
        _headers: &ForwardedHeaders,
    ) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(self.publish_url())
            .header(reqwest::header::CONTENT_TYPE, "application/n-triples")
            .header(SECURITY_LABEL_HEADER, label.to_header_value())
            .body(update.to_ntriples())
            .send()
            .await
            .map_err(|e| UpstreamError::transport(&self.publish_url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), topic_url = %self.publish_url, "topic publish rejected");
            return Err(UpstreamError::Status(status.as_u16()));
        }

        info!(triples = update.triples.len(), topic_url = %self.publish_url, "update published");
        Ok(())
    }
}

/// Sink for the configured update mode
pub fn build_sink(settings: &Settings, client: reqwest::Client, update_url: String) -> Arc<dyn UpdateSink> {
    match settings.update_mode {
        UpdateMode::Scg => Arc::new(HttpUpdateSink::new(client, update_url)),
        UpdateMode::Topic => Arc::new(TopicUpdateSink::new(
            client,
            &settings.topic_broker_url,
            &settings.ies_topic,
        )),
    }
}
