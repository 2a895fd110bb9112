// 🌐 REST API - axum routes over the graph store and the building database

use crate::config::Settings;
use crate::db::{self, BuildingRow, FilterableRow, StoredBuilding};
use crate::error::{ApiError, ApiResult};
use crate::flags::{self, FlagKind};
use crate::geometry::BoundingBox;
use crate::identity::{AccessClient, DevIdentity, IdentityProvider};
use crate::mapper;
use crate::models::{
    DetailedBuilding, EpcStatistics, FilterSummary, FilterableBuilding, FlagHistory, FlagRequest,
    FlaggedBuilding, IesClass, InvalidateFlag, SimpleBuilding, UserDetails,
};
use crate::ontology::SubclassCache;
use crate::query::{self, parse_iri, Uprn};
use crate::security::SecurityLabel;
use crate::sink::{self, GraphUpdate, UpdateSink};
use crate::sparql::{Dataset, ForwardedHeaders, GraphStore, HttpGraphStore};
use crate::uri::{PrefixTable, IES, NDT_ONT};
use anyhow::Context;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use oxrdf::NamedNode;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, RwLock};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// STATE
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub graph: Arc<dyn GraphStore>,
    pub sink: Arc<dyn UpdateSink>,
    pub identity: Arc<dyn IdentityProvider>,
    pub prefixes: Arc<PrefixTable>,
    pub data_uri: Arc<str>,
    pub default_label: Arc<RwLock<SecurityLabel>>,
    pub subclasses: Arc<SubclassCache>,
}

impl AppState {
    pub fn new(
        db: Connection,
        graph: Arc<dyn GraphStore>,
        sink: Arc<dyn UpdateSink>,
        identity: Arc<dyn IdentityProvider>,
        data_uri: &str,
        default_label: SecurityLabel,
        subclasses: SubclassCache,
    ) -> Self {
        AppState {
            db: Arc::new(Mutex::new(db)),
            graph,
            sink,
            identity,
            prefixes: Arc::new(PrefixTable::standard(data_uri)),
            data_uri: Arc::from(data_uri),
            default_label: Arc::new(RwLock::new(default_label)),
            subclasses: Arc::new(subclasses),
        }
    }

    /// Wire the real upstream clients from configuration
    pub fn from_settings(settings: &Settings, db: Connection) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.upstream_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let store = HttpGraphStore::new(
            client.clone(),
            &settings.jena_base_url(),
            &settings.dataset,
            &settings.onto_dataset,
        );
        let update_url = store.update_url(Dataset::Knowledge);
        let sink = sink::build_sink(settings, client.clone(), update_url);

        let identity: Arc<dyn IdentityProvider> = match (&settings.identity_api_url, settings.dev_mode) {
            (_, true) => Arc::new(DevIdentity),
            (Some(url), false) => Arc::new(AccessClient::new(client, url)),
            (None, false) => anyhow::bail!("IDENTITY_API_URL environment variable is not set"),
        };

        info!(
            jena = %settings.jena_base_url(),
            update_mode = ?sink.mode(),
            dev_mode = settings.dev_mode,
            "upstream clients ready"
        );

        Ok(AppState::new(
            db,
            Arc::new(store),
            sink,
            identity,
            &settings.data_uri,
            SecurityLabel::new(settings.default_classification),
            SubclassCache::new(settings.subclass_cache_ttl, SubclassCache::DEFAULT_MAX_ENTRIES),
        ))
    }

    fn default_label(&self) -> SecurityLabel {
        match self.default_label.read() {
            Ok(label) => label.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run a blocking database call off the async runtime
    async fn with_db<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
            f(&conn).map_err(ApiError::from)
        })
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?
    }

    async fn apply(&self, update: &GraphUpdate, label: Option<SecurityLabel>, headers: &ForwardedHeaders) -> ApiResult<()> {
        if update.is_empty() {
            warn!("empty graph update skipped");
            return Ok(());
        }

        let label = label.unwrap_or_else(|| self.default_label());
        self.sink.apply(update, &label, headers).await?;
        Ok(())
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/health", get(health_check))
        .route("/version-info", get(version_info))
        .route("/buildings", get(buildings_in_bounding_box))
        .route("/buildings/:uprn", get(building_by_uprn))
        .route("/buildings/:uprn/flag-history", get(flag_history))
        .route("/buildings/states/classes", get(building_state_classes))
        .route("/detailed-buildings", get(detailed_buildings_in_bounding_box))
        .route("/detailed-buildings/filter-summary", get(filter_summary))
        .route("/flagged-buildings", get(flagged_buildings))
        .route("/epc-statistics/wards", get(ward_statistics))
        .route("/flag-to-investigate", post(flag_to_investigate))
        .route("/flag-to-visit", post(flag_to_visit))
        .route("/invalidate-flag", post(invalidate_flag))
        .route("/assessment-classes", get(assessment_classes))
        .route("/user-details", get(user_details))
        .route(
            "/default-security-label",
            get(get_default_security_label).post(set_default_security_label),
        )
        .route("/uri-stub", get(uri_stub))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

// ============================================================================
// HANDLERS - SERVICE
// ============================================================================

async fn read_root() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn version_info() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": crate::VERSION,
    }))
}

async fn uri_stub(State(state): State<AppState>) -> Json<String> {
    Json(state.data_uri.to_string())
}

async fn get_default_security_label(State(state): State<AppState>) -> Json<SecurityLabel> {
    Json(state.default_label())
}

async fn set_default_security_label(
    State(state): State<AppState>,
    body: Result<Json<SecurityLabel>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(label) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    label.validate()?;

    let mut current = state
        .default_label
        .write()
        .map_err(|_| anyhow::anyhow!("security label lock poisoned"))?;
    info!(label = %label, "default security label replaced");
    *current = label;

    Ok(StatusCode::NO_CONTENT)
}

async fn user_details(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<UserDetails>> {
    let user = state
        .identity
        .get_user_details(&ForwardedHeaders::from_headers(&headers))
        .await?;
    Ok(Json(user))
}

// ============================================================================
// HANDLERS - BUILDINGS
// ============================================================================

fn bounding_box(query: Result<Query<BoundingBox>, QueryRejection>) -> ApiResult<BoundingBox> {
    let Query(bbox) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    bbox.validate()?;
    Ok(bbox)
}

/// GET /buildings - one building per UPRN inside the box
async fn buildings_in_bounding_box(
    State(state): State<AppState>,
    query: Result<Query<BoundingBox>, QueryRejection>,
) -> ApiResult<Json<Vec<SimpleBuilding>>> {
    let bbox = bounding_box(query)?;
    let rows: Vec<BuildingRow> = state
        .with_db(move |conn| db::buildings_in_bounding_box(conn, &bbox))
        .await?;

    Ok(Json(mapper::map_bounded_buildings(&rows)?))
}

/// GET /detailed-buildings - fabric attributes for every building in the box
async fn detailed_buildings_in_bounding_box(
    State(state): State<AppState>,
    query: Result<Query<BoundingBox>, QueryRejection>,
) -> ApiResult<Json<Vec<FilterableBuilding>>> {
    let bbox = bounding_box(query)?;
    let rows: Vec<FilterableRow> = state
        .with_db(move |conn| db::filterable_buildings_in_bounding_box(conn, &bbox))
        .await?;

    Ok(Json(mapper::map_filterable_buildings(&rows)))
}

async fn filter_summary(
    State(state): State<AppState>,
    query: Result<Query<BoundingBox>, QueryRejection>,
) -> ApiResult<Json<FilterSummary>> {
    let bbox = bounding_box(query)?;
    let rows: Vec<FilterableRow> = state
        .with_db(move |conn| db::filterable_buildings_in_bounding_box(conn, &bbox))
        .await?;

    Ok(Json(mapper::summarise_filters(&rows)))
}

/// GET /buildings/:uprn - stored row plus four aspect queries run concurrently
async fn building_by_uprn(
    State(state): State<AppState>,
    Path(uprn): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<DetailedBuilding>> {
    let uprn = Uprn::parse(&uprn)?;
    let headers = ForwardedHeaders::from_headers(&headers);

    let building_query = query::building(&uprn);
    let roof_query = query::roof_for_building(&uprn);
    let floor_query = query::floor_for_building(&uprn);
    let walls_query = query::walls_and_windows_for_building(&uprn);

    let key = uprn.as_str().to_string();
    let stored: Option<StoredBuilding> = state.with_db(move |conn| db::building_by_uprn(conn, &key)).await?;

    let (generic, roof, floor, walls) = tokio::try_join!(
        state.graph.query(Dataset::Knowledge, &building_query, &headers),
        state.graph.query(Dataset::Knowledge, &roof_query, &headers),
        state.graph.query(Dataset::Knowledge, &floor_query, &headers),
        state.graph.query(Dataset::Knowledge, &walls_query, &headers),
    )?;

    let graph_empty = generic.is_empty() && roof.is_empty() && floor.is_empty() && walls.is_empty();
    if stored.is_none() && graph_empty {
        return Err(ApiError::NotFound(format!("Building with UPRN {} not found", uprn)));
    }

    Ok(Json(mapper::map_detailed_building(
        uprn.as_str(),
        stored.as_ref(),
        &generic,
        &roof,
        &floor,
        &walls,
    )?))
}

async fn flag_history(
    State(state): State<AppState>,
    Path(uprn): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FlagHistory>>> {
    let uprn = Uprn::parse(&uprn)?;
    let results = state
        .graph
        .query(
            Dataset::Knowledge,
            &query::flag_history(&uprn),
            &ForwardedHeaders::from_headers(&headers),
        )
        .await?;

    Ok(Json(mapper::map_flag_history(&results)))
}

async fn flagged_buildings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FlaggedBuilding>>> {
    let results = state
        .graph
        .query(
            Dataset::Knowledge,
            &query::flagged_buildings(),
            &ForwardedHeaders::from_headers(&headers),
        )
        .await?;

    Ok(Json(mapper::map_flagged_buildings(&results)))
}

async fn ward_statistics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<EpcStatistics>>> {
    let results = state
        .graph
        .query(
            Dataset::Knowledge,
            &query::statistics_for_wards(),
            &ForwardedHeaders::from_headers(&headers),
        )
        .await?;

    Ok(Json(mapper::map_epc_statistics(&results)?))
}

// ============================================================================
// HANDLERS - ONTOLOGY
// ============================================================================

async fn assessment_classes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<IesClass>>> {
    let assessment = NamedNode::new_unchecked(format!("{}Assessment", IES));
    let index = state
        .subclasses
        .refresh(
            state.graph.as_ref(),
            &state.prefixes,
            &assessment,
            None,
            &ForwardedHeaders::from_headers(&headers),
        )
        .await?;

    Ok(Json(index.classes().to_vec()))
}

async fn building_state_classes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<IesClass>>> {
    let building_state = NamedNode::new_unchecked(format!("{}BuildingState", NDT_ONT));
    let location = NamedNode::new_unchecked(format!("{}Location", IES));
    let index = state
        .subclasses
        .refresh(
            state.graph.as_ref(),
            &state.prefixes,
            &building_state,
            Some(&location),
            &ForwardedHeaders::from_headers(&headers),
        )
        .await?;

    Ok(Json(index.classes().to_vec()))
}

// ============================================================================
// HANDLERS - FLAGS
// ============================================================================

fn validate_label(label: Option<&SecurityLabel>) -> ApiResult<()> {
    if let Some(label) = label {
        label.validate()?;
    }
    Ok(())
}

async fn flag_to_investigate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<FlagRequest>, JsonRejection>,
) -> ApiResult<Json<String>> {
    raise_flag(state, headers, body, FlagKind::Investigate).await
}

async fn flag_to_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<FlagRequest>, JsonRejection>,
) -> ApiResult<Json<String>> {
    raise_flag(state, headers, body, FlagKind::Visit).await
}

async fn raise_flag(
    state: AppState,
    headers: HeaderMap,
    body: Result<Json<FlagRequest>, JsonRejection>,
    kind: FlagKind,
) -> ApiResult<Json<String>> {
    let Json(request) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    validate_label(request.security_label.as_ref())?;
    let target = request.uri.as_deref().map(|uri| state.prefixes.lengthen(uri.trim()));
    let target = flags::flag_target(target.as_deref())?;

    let headers = ForwardedHeaders::from_headers(&headers);
    let user = state.identity.get_user_details(&headers).await?;

    let (flag, update) = flags::flag_update(&state.data_uri, kind, &target, &user, Uuid::new_v4(), Utc::now())?;
    state.apply(&update, request.security_label, &headers).await?;

    info!(flag = %flag.as_str(), target = %target.as_str(), kind = ?kind, "flag raised");
    Ok(Json(flag.into_string()))
}

/// POST /invalidate-flag - assessment that turns an active flag historic
async fn invalidate_flag(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<InvalidateFlag>, JsonRejection>,
) -> ApiResult<Json<String>> {
    let Json(request) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    validate_label(request.security_label.as_ref())?;
    let headers = ForwardedHeaders::from_headers(&headers);

    let user = state.identity.get_user_details(&headers).await?;

    let base = flags::assess_to_be_false();
    let assessment_type = match request.assessment_type_override.as_deref().map(str::trim) {
        Some(requested) if !requested.is_empty() => parse_iri(&state.prefixes.lengthen(requested))?,
        _ => base.clone(),
    };

    let subclasses = state
        .subclasses
        .get_or_load(state.graph.as_ref(), &state.prefixes, &base, None, &headers)
        .await?;
    if let Err(err) = flags::check_assessment_type(&assessment_type, &base, &subclasses) {
        warn!(assessment_type = %assessment_type.as_str(), "rejected invalidation type");
        return Err(err.into());
    }

    let flag = parse_iri(&state.prefixes.lengthen(request.flag_uri.trim()))?;
    let (assessment, update) = flags::invalidation_update(
        &state.data_uri,
        &flag,
        &assessment_type,
        &user,
        Uuid::new_v4(),
        Utc::now(),
    )?;
    state.apply(&update, request.security_label, &headers).await?;

    info!(flag = %flag.as_str(), assessment = %assessment.as_str(), "flag invalidated");
    Ok(Json(assessment.into_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_rejection_is_validation() {
        let bbox = BoundingBox {
            min_long: 1.0,
            max_long: 0.0,
            min_lat: 0.0,
            max_lat: 1.0,
        };
        let err = bounding_box(Ok(Query(bbox))).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
