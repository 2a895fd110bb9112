// 📥 Retrofit Assessment API - building loader
// Populates the SQLite building store from an EPC export

use anyhow::{bail, Result};
use retrofit_api::{count_buildings, import_records, load_csv, open_database, Settings};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

const USAGE: &str = "usage: retrofit-loader import <buildings.csv> [database]";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retrofit_api=info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import") => {
            let Some(csv_path) = args.get(2) else {
                bail!(USAGE);
            };
            let db_path = match args.get(3) {
                Some(path) => PathBuf::from(path),
                None => Settings::from_env()?.db_path,
            };
            run_import(Path::new(csv_path), &db_path)
        }
        _ => bail!(USAGE),
    }
}

fn run_import(csv_path: &Path, db_path: &Path) -> Result<()> {
    println!("🏠 Building import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading {}...", csv_path.display());
    let records = load_csv(csv_path)?;
    println!("✓ Loaded {} rows", records.len());

    // 2. Setup database
    println!("\n🔧 Opening {}...", db_path.display());
    let mut conn = open_database(db_path)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Insert buildings and assessments
    println!("\n💾 Importing...");
    let stats = import_records(&mut conn, &records)?;
    info!(?stats, "import complete");

    // 4. Verify count
    let count = count_buildings(&conn)?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ New buildings: {}", stats.buildings);
    println!("✓ New assessments: {}", stats.assessments);
    println!("✓ Duplicates skipped: {}", stats.duplicates);
    println!("✓ Database contains {} buildings", count);

    Ok(())
}
