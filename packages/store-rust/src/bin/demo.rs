//! Registers a record type, saves a few entities to an in-memory store and
//! reads them back.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dsorm_core::{Entity, Field, RecordType, Value};
use dsorm_store::{init_tracing, EntityStore, MemoryStore, StoreConfig};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "dsorm-demo", about = "Save and fetch entities in an in-memory store")]
struct Args {
    /// Namespace for every key the demo writes.
    #[arg(long, env = "DSORM_NAMESPACE")]
    namespace: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "DSORM_LOG", default_value = "info")]
    log_filter: String,

    /// Emit JSON log lines.
    #[arg(long, env = "DSORM_JSON_LOGS")]
    json_logs: bool,

    /// Number of people to create.
    #[arg(long, default_value_t = 3)]
    people: usize,
}

impl From<&Args> for StoreConfig {
    fn from(args: &Args) -> Self {
        Self {
            namespace: args.namespace.clone(),
            log_filter: args.log_filter.clone(),
            json_logs: args.json_logs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = StoreConfig::from(&args);
    init_tracing(&config)?;

    let person = RecordType::builder("Person")
        .field("name", Field::text().required(true))
        .field("age", Field::integer().default(0))
        .field("tags", Field::text().repeated(true))
        .field("created", Field::datetime().auto_now_add(true))
        .register()
        .context("registering Person")?;

    let store = EntityStore::new(Arc::new(MemoryStore::new()), config.clone());

    let mut people = (0..args.people)
        .map(|i| {
            let mut builder = Entity::builder(&person)
                .value("name", format!("person-{i}"))
                .value("age", i64::try_from(i).unwrap_or(i64::MAX))
                .value("tags", Value::Array(vec![Value::from("demo")]));
            if let Some(namespace) = &config.namespace {
                builder = builder.namespace(namespace.clone());
            }
            builder.build()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let keys = store.save_all(&mut people).await?;
    for key in &keys {
        info!(key = %key, "saved");
    }

    let ids = keys.iter().map(|key| key.id().to_value());
    for mut entity in store.fetch_many(&person, ids).await? {
        let name = entity.get("name")?;
        let age = entity.get("age")?;
        let created = entity.get("created")?;
        info!(
            key = %entity.key(),
            name = ?name,
            age = ?age,
            created = ?created,
            "fetched"
        );
    }

    store.delete_keys(&keys).await?;
    info!(deleted = keys.len(), "done");
    Ok(())
}
