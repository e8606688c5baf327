use std::env;

use axum::{Router, routing::get, serve};
use axum_session_mongo::{MongoCollection, SessionHandle, SessionStorage, StorageConfig};
use mongodb::Client;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

async fn counter(session: SessionHandle) -> String {
    let mut session = session.lock().await;
    let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
    session.insert("visits", visits);

    format!("You have visited this page {visits} times")
}

async fn forget(session: SessionHandle) -> &'static str {
    session.lock().await.invalidate();
    "Session cleared"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let uri = env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let database = env::var("MONGODB_DATABASE").unwrap_or_else(|_| "demo".into());
    let collection = env::var("MONGODB_COLLECTION").unwrap_or_else(|_| "sessions".into());
    let addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());

    let client = Client::with_uri_str(&uri).await?;
    let collection = MongoCollection::from_database(&client.database(&database), &collection);
    collection.ensure_indexes().await?;

    let storage = SessionStorage::new(collection, StorageConfig::from_env()?)?;

    let router = Router::new()
        .route("/", get(counter))
        .route("/forget", get(forget))
        .layer(storage.clone());

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    storage.finalize();
    Ok(())
}
