//! TrailTales - quest engine server
//!
//! Reads newline-delimited JSON gateway requests from stdin and writes one
//! JSON response per line to stdout. An optional first argument names a JSON
//! file of quest definitions to publish before serving.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trailtales::gateway::{
    CollectionGateway, GatewayRequest, GatewayResponse, StaticIdentityResolver,
};
use trailtales::quests::{MarkerMatchValidator, QuestDefinition, QuestEngine};
use trailtales::storage::{config, DocumentStore, RetryPolicy, SqliteStore};
use trailtales::RewardLedger;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries responses
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("Starting TrailTales v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config().context("loading configuration")?;
    let store = Arc::new(
        SqliteStore::open(&config.database_path(), RetryPolicy::from(&config.retry))
            .context("opening quest database")?,
    );

    let engine = QuestEngine::new(
        store,
        RewardLedger::new(config.rewards.clone()),
        MarkerMatchValidator,
    );

    if let Some(seed) = std::env::args().nth(1) {
        let published = seed_quests(&engine, Path::new(&seed))?;
        tracing::info!("Seeded {} quests from {}", published, seed);
    }

    let gateway = CollectionGateway::new(
        engine,
        StaticIdentityResolver::new(config.auth.credentials.clone()),
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("reading request")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<GatewayRequest>(&line) {
            Ok(request) => gateway.handle(&request),
            Err(e) => GatewayResponse::malformed(&e.to_string()),
        };

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    tracing::info!("Input closed, shutting down");
    Ok(())
}

fn seed_quests<S: DocumentStore>(
    engine: &QuestEngine<S, MarkerMatchValidator>,
    path: &Path,
) -> anyhow::Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let quests: Vec<QuestDefinition> =
        serde_json::from_str(&content).context("parsing seed file")?;

    for quest in &quests {
        engine
            .catalog()
            .publish_quest(quest)
            .with_context(|| format!("publishing quest {}", quest.id))?;
    }

    Ok(quests.len())
}
