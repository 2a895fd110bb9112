// 🌳 Ontology Lookup - transitive subclasses of a class, plus a bounded TTL cache

use crate::models::IesClass;
use crate::query;
use crate::sparql::{Dataset, ForwardedHeaders, GraphStore, SparqlResults, UpstreamError};
use crate::uri::PrefixTable;
use oxrdf::NamedNode;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

// ============================================================================
// SUBCLASS INDEX
// ============================================================================

/// Subclasses keyed by full URI, kept in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubclassIndex {
    classes: Vec<IesClass>,
    positions: HashMap<String, usize>,
}

impl SubclassIndex {
    /// Aggregate `?sub ?parent ?comment` rows; parents and comments are de-duplicated
    pub fn from_results(results: &SparqlResults, prefixes: &PrefixTable) -> Self {
        let mut index = SubclassIndex::default();

        for binding in results.bindings() {
            let Some(sub) = binding.get("sub") else {
                continue;
            };

            let position = match index.positions.get(&sub.value) {
                Some(&position) => position,
                None => {
                    index.classes.push(IesClass {
                        uri: sub.value.clone(),
                        short_name: prefixes.shorten(&sub.value),
                        super_classes: Vec::new(),
                        description: Vec::new(),
                    });
                    index.positions.insert(sub.value.clone(), index.classes.len() - 1);
                    index.classes.len() - 1
                }
            };

            let class = &mut index.classes[position];
            if let Some(comment) = binding.get("comment") {
                if !class.description.contains(&comment.value) {
                    class.description.push(comment.value.clone());
                }
            }
            if let Some(parent) = binding.get("parent") {
                if !class.super_classes.contains(&parent.value) {
                    class.super_classes.push(parent.value.clone());
                }
            }
        }

        index
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.positions.contains_key(uri)
    }

    pub fn classes(&self) -> &[IesClass] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Run the subclass query against the ontology dataset
pub async fn get_subtypes(
    graph: &dyn GraphStore,
    prefixes: &PrefixTable,
    super_class: &NamedNode,
    exclude: Option<&NamedNode>,
    headers: &ForwardedHeaders,
) -> Result<SubclassIndex, UpstreamError> {
    let text = query::subclasses(super_class, exclude);
    let results = graph.query(Dataset::Ontology, &text, headers).await?;
    let index = SubclassIndex::from_results(&results, prefixes);

    debug!(super_class = %super_class.as_str(), classes = index.len(), "resolved subclasses");
    Ok(index)
}

// ============================================================================
// CACHE
// ============================================================================

type CacheKey = (String, Option<String>);

struct CachedIndex {
    index: Arc<SubclassIndex>,
    loaded_at: Instant,
}

/// TTL'd subclass lookups keyed by `(super, exclude)`
pub struct SubclassCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<CacheKey, CachedIndex>>,
}

impl SubclassCache {
    pub const DEFAULT_MAX_ENTRIES: usize = 64;

    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        SubclassCache {
            ttl,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(super_class: &NamedNode, exclude: Option<&NamedNode>) -> CacheKey {
        (
            super_class.as_str().to_string(),
            exclude.map(|e| e.as_str().to_string()),
        )
    }

    /// Fresh entry, if one exists
    pub fn cached(&self, super_class: &NamedNode, exclude: Option<&NamedNode>) -> Option<Arc<SubclassIndex>> {
        let entries = self.entries.read().ok()?;
        entries
            .get(&Self::key(super_class, exclude))
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.index))
    }

    /// Cached index, loading it when absent or stale
    pub async fn get_or_load(
        &self,
        graph: &dyn GraphStore,
        prefixes: &PrefixTable,
        super_class: &NamedNode,
        exclude: Option<&NamedNode>,
        headers: &ForwardedHeaders,
    ) -> Result<Arc<SubclassIndex>, UpstreamError> {
        if let Some(index) = self.cached(super_class, exclude) {
            return Ok(index);
        }
        self.refresh(graph, prefixes, super_class, exclude, headers).await
    }

    /// Always query, then store the result
    pub async fn refresh(
        &self,
        graph: &dyn GraphStore,
        prefixes: &PrefixTable,
        super_class: &NamedNode,
        exclude: Option<&NamedNode>,
        headers: &ForwardedHeaders,
    ) -> Result<Arc<SubclassIndex>, UpstreamError> {
        let index = Arc::new(get_subtypes(graph, prefixes, super_class, exclude, headers).await?);
        self.store(Self::key(super_class, exclude), Arc::clone(&index));
        Ok(index)
    }

    fn store(&self, key: CacheKey, index: Arc<SubclassIndex>) {
        // a poisoned lock only costs us the cache entry
        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.loaded_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CachedIndex {
                index,
                loaded_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::{Binding, Term};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const IES: &str = "http://informationexchangestandard.org/ont/ies#";
    const NDT_ONT: &str = "http://nationaldigitaltwin.gov.uk/ontology#";

    fn row(sub: &str, parent: &str, comment: Option<&str>) -> Binding {
        let mut binding = Binding::new();
        binding.insert("sub".to_string(), Term::uri(sub));
        binding.insert("parent".to_string(), Term::uri(parent));
        if let Some(comment) = comment {
            binding.insert("comment".to_string(), Term::literal(comment));
        }
        binding
    }

    fn assessment_rows() -> SparqlResults {
        let base = format!("{}AssessToBeFalse", NDT_ONT);
        let dup = format!("{}AssessToBeDuplicate", NDT_ONT);
        SparqlResults::from_bindings(vec![
            row(&base, &format!("{}Assessment", IES), Some("Flag was raised in error")),
            row(&base, &format!("{}Assessment", IES), Some("Flag was raised in error")),
            row(&dup, &base, None),
            row(&dup, &format!("{}Event", IES), Some("Duplicate flag")),
        ])
    }

    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GraphStore for CountingStore {
        async fn query(
            &self,
            dataset: Dataset,
            _query: &str,
            _headers: &ForwardedHeaders,
        ) -> Result<SparqlResults, UpstreamError> {
            assert_eq!(dataset, Dataset::Ontology);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(assessment_rows())
        }
    }

    fn node(iri: &str) -> NamedNode {
        NamedNode::new(iri).unwrap()
    }

    #[test]
    fn test_index_aggregates_parents_and_comments() {
        let prefixes = PrefixTable::standard("http://ndtp.co.uk/data#");
        let index = SubclassIndex::from_results(&assessment_rows(), &prefixes);

        assert_eq!(index.len(), 2);

        let base_uri = format!("{}AssessToBeFalse", NDT_ONT);
        let base = index.classes().iter().find(|c| c.uri == base_uri).unwrap();
        assert_eq!(base.short_name, "ndt_ont:AssessToBeFalse");
        assert_eq!(base.super_classes, vec![format!("{}Assessment", IES)]);
        assert_eq!(base.description, vec!["Flag was raised in error"]);

        let dup = &index.classes()[1];
        assert_eq!(dup.super_classes.len(), 2);
        assert_eq!(dup.description, vec!["Duplicate flag"]);
    }

    #[tokio::test]
    async fn test_cache_reuses_fresh_entries() {
        let store = CountingStore { calls: AtomicUsize::new(0) };
        let prefixes = PrefixTable::standard("http://ndtp.co.uk/data#");
        let cache = SubclassCache::new(Duration::from_secs(60), 8);
        let base = node(&format!("{}AssessToBeFalse", NDT_ONT));
        let headers = ForwardedHeaders::default();

        let first = cache.get_or_load(&store, &prefixes, &base, None, &headers).await.unwrap();
        let second = cache.get_or_load(&store, &prefixes, &base, None, &headers).await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate();
        assert!(cache.is_empty());
        cache.get_or_load(&store, &prefixes, &base, None, &headers).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_expires_entries() {
        let store = CountingStore { calls: AtomicUsize::new(0) };
        let prefixes = PrefixTable::standard("http://ndtp.co.uk/data#");
        let cache = SubclassCache::new(Duration::ZERO, 8);
        let base = node(&format!("{}AssessToBeFalse", NDT_ONT));
        let headers = ForwardedHeaders::default();

        cache.get_or_load(&store, &prefixes, &base, None, &headers).await.unwrap();
        cache.get_or_load(&store, &prefixes, &base, None, &headers).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let store = CountingStore { calls: AtomicUsize::new(0) };
        let prefixes = PrefixTable::standard("http://ndtp.co.uk/data#");
        let cache = SubclassCache::new(Duration::from_secs(60), 2);
        let headers = ForwardedHeaders::default();
        let location = node(&format!("{}Location", IES));

        for class in ["A", "B", "C"] {
            let super_class = node(&format!("{}{}", IES, class));
            cache
                .get_or_load(&store, &prefixes, &super_class, Some(&location), &headers)
                .await
                .unwrap();
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.cached(&node(&format!("{}A", IES)), Some(&location)).is_none());
        assert!(cache.cached(&node(&format!("{}C", IES)), Some(&location)).is_some());
    }
}
