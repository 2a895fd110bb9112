// Retrofit Assessment API - Core Library
// Query building, result mapping and the HTTP surface, shared by the server and loader binaries

pub mod config;
pub mod db;
pub mod error;
pub mod flags;
pub mod geometry;
pub mod identity;
pub mod mapper;
pub mod models;
pub mod ontology;
pub mod query;
pub mod routes;
pub mod security;
pub mod sink;
pub mod sparql;
pub mod uri;

// Re-export commonly used types
pub use config::{ConfigError, Settings, UpdateMode};
pub use db::{
    BuildingRecord, ImportStats, StoredBuilding,
    open_database, setup_database, register_functions, load_csv, import_records, count_buildings,
};
pub use error::{ApiError, ApiResult};
pub use identity::{AccessClient, DevIdentity, IdentityError, IdentityProvider};
pub use models::{
    DetailedBuilding, EpcStatistics, FilterSummary, FilterableBuilding, FlagHistory, FlaggedBuilding,
    IesClass, SimpleBuilding, UserDetails,
};
pub use ontology::{SubclassCache, SubclassIndex};
pub use routes::{build_router, AppState};
pub use security::{Classification, SecurityLabel, SecurityLabelError};
pub use sink::{GraphUpdate, UpdateSink};
pub use sparql::{Dataset, ForwardedHeaders, GraphStore, SparqlResults, UpstreamError};
pub use uri::PrefixTable;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
