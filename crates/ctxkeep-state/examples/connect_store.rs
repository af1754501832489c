//! Connect to the store configured in the environment and list one project.
//! Run with: cargo run --package ctxkeep-state --example connect_store -- <project>

use ctxkeep_state::{RemoteConfig, SnapshotStore, SurrealSnapshotStore};

#[tokio::main]
async fn main() {
    let project = std::env::args().nth(1).unwrap_or_else(|| "default".to_string());

    match RemoteConfig::from_env() {
        Some(config) => {
            println!("Remote store:");
            println!("  Endpoint: {}", config.endpoint);
            println!("  Namespace: {}", config.namespace);
            println!("  Database: {}", config.database);
        }
        None => println!("No remote credentials, using SURREALDB_URL or local storage"),
    }

    let store = match SurrealSnapshotStore::from_env().await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Connection failed: {}", e);
            std::process::exit(1);
        }
    };

    match store.find_by_project(&project, 10).await {
        Ok(snapshots) => {
            println!("{} most recent snapshot(s) in {project}:", snapshots.len());
            for s in snapshots {
                println!("  {} [{}] {}", s.id(), s.memory_tier(), s.summary());
            }
        }
        Err(e) => {
            eprintln!("Query failed: {}", e);
            std::process::exit(1);
        }
    }
}
