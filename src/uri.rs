// 🔗 URI Prefix Table - shorten/lengthen between full ontology URIs and CURIEs
// Plus the resource-stripping rules used when flattening query results

// ============================================================================
// NAMESPACES
// ============================================================================

pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const DC: &str = "http://purl.org/dc/elements/1.1/";
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
pub const IES: &str = "http://informationexchangestandard.org/ont/ies#";
pub const BUILDING: &str = "http://ies.data.gov.uk/ontology/ies-building1#";
pub const NDT_ONT: &str = "http://nationaldigitaltwin.gov.uk/ontology#";
pub const NDT: &str = "http://nationaldigitaltwin.gov.uk/data#";
pub const GP: &str = "https://www.geoplace.co.uk/addresses-streets/location-data/the-uprn#";
pub const EPC: &str =
    "http://gov.uk/government/organisations/department-for-levelling-up-housing-and-communities/ontology/epc#";
pub const STATS: &str = "http://ndtp.co.uk/stats#";

/// Stub prepended to timestamps written as `ies:inPeriod` targets
pub const ISO_8601: &str = "http://iso.org/iso8601#";

/// Date namespace used by lodgement dates in the knowledge graph
const ISO_8601_DATE_STUB: &str = "iso8601.iso.org/";

// ============================================================================
// PREFIX TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub name: String,
    pub stub: String,
}

/// Ordered, bidirectional prefix ↔ stub table
#[derive(Debug, Clone)]
pub struct PrefixTable {
    prefixes: Vec<Prefix>,
}

impl PrefixTable {
    pub fn new() -> Self {
        PrefixTable {
            prefixes: Vec::new(),
        }
    }

    /// The table every handler works with. `data:` is deployment specific.
    pub fn standard(data_uri_stub: &str) -> Self {
        let mut table = PrefixTable::new();
        table.add("xsd", XSD);
        table.add("dc", DC);
        table.add("rdf", RDF);
        table.add("rdfs", RDFS);
        table.add("owl", OWL);
        table.add("ies", IES);
        table.add("building", BUILDING);
        table.add("data", data_uri_stub);
        table.add("ndt_ont", NDT_ONT);
        table.add("ndt", NDT);
        table.add("gp", GP);
        table.add("epc", EPC);
        table.add("stats", STATS);
        table
    }

    /// Register a prefix; re-registering a name replaces its stub
    pub fn add(&mut self, name: &str, stub: &str) {
        if let Some(existing) = self.prefixes.iter_mut().find(|p| p.name == name) {
            existing.stub = stub.to_string();
            return;
        }
        self.prefixes.push(Prefix {
            name: name.to_string(),
            stub: stub.to_string(),
        });
    }

    pub fn stub(&self, name: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.stub.as_str())
    }

    pub fn prefixes(&self) -> &[Prefix] {
        &self.prefixes
    }

    /// `PREFIX name: <stub>` lines for every registered entry
    pub fn sparql_prologue(&self) -> String {
        self.prefixes
            .iter()
            .map(|p| format!("PREFIX {}: <{}>\n", p.name, p.stub))
            .collect()
    }

    /// Full URI → CURIE. The longest matching stub wins; the first registered
    /// prefix wins among equal stubs. Unregistered URIs come back unchanged.
    pub fn shorten(&self, uri: &str) -> String {
        let best = self
            .prefixes
            .iter()
            .filter(|p| !p.stub.is_empty() && uri.starts_with(&p.stub))
            .fold(None::<&Prefix>, |best, p| match best {
                Some(b) if b.stub.len() >= p.stub.len() => Some(b),
                _ => Some(p),
            });

        match best {
            Some(p) => format!("{}:{}", p.name, &uri[p.stub.len()..]),
            None => uri.to_string(),
        }
    }

    /// CURIE → full URI. Anything without a registered prefix comes back unchanged.
    pub fn lengthen(&self, curie: &str) -> String {
        if let Some((name, local)) = curie.split_once(':') {
            if let Some(stub) = self.stub(name) {
                return format!("{}{}", stub, local);
            }
        }
        curie.to_string()
    }
}

impl Default for PrefixTable {
    fn default() -> Self {
        PrefixTable::new()
    }
}

// ============================================================================
// RESOURCE STRIPPING
// ============================================================================

/// Strip a URI down to its trailing resource identifier.
///
/// Literals (anything without `http`) are returned as-is. URIs are split on
/// `UPRN_`, then the ISO 8601 date stub, then `#`, in that order of
/// preference. Returns an empty string when the chosen marker is absent.
pub fn strip_uri(value: &str) -> String {
    if !value.contains("http") {
        return value.to_string();
    }

    let marker = if value.contains("UPRN_") {
        "UPRN_"
    } else if value.contains(ISO_8601_DATE_STUB) {
        ISO_8601_DATE_STUB
    } else {
        "#"
    };

    match value.rsplit_once(marker) {
        Some((_, resource)) => resource.to_string(),
        None => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
