// 🌐 Retrofit Assessment API - Web Server
// Read endpoints over the graph store and building database, write-back of flags and assessments

use anyhow::Context;
use retrofit_api::{build_router, open_database, AppState, Settings, VERSION};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retrofit_api=info,tower_http=debug".into()),
        )
        .init();

    println!("🌐 Retrofit Assessment API v{} - Web Server", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let settings = Settings::from_env().context("Invalid configuration")?;

    // Open database
    let conn = open_database(&settings.db_path)?;
    info!(path = %settings.db_path.display(), "database opened");

    // Create shared state
    let state = AppState::from_settings(&settings, conn)?;
    let app = build_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://localhost:{}", settings.port);
    println!("   Graph store: {}", settings.jena_base_url());
    println!("   Update mode: {:?}", settings.update_mode);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
