mod cli;
mod config;
mod storage;

use crate::cli::{ConfigCommand, StoreTarget};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use lockbox_core::{
    encode::base64url, storage::SecureStore, KeyDerivationMethod, PassKey, RawKey, StoreUri,
};
use lockbox_storage::Store;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();
    let config = config::load()?;
    init_tracing(&config);

    match cli.command.unwrap_or(cli::Command::Health) {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check().await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::GenerateKey { seed } => println!("{}", generate_key(seed.as_deref())?),
        cli::Command::Provision {
            target,
            method,
            recreate,
        } => run_provision(&target, method.as_deref(), recreate, &config).await?,
        cli::Command::Open { target, category } => {
            run_open(&target, category.as_deref(), &config).await?
        }
        cli::Command::Rekey {
            target,
            new_method,
            new_key,
        } => run_rekey(&target, new_method.as_deref(), new_key, &config).await?,
        cli::Command::Remove { uri } => run_remove(uri.as_deref(), &config).await?,
        cli::Command::Encode { text } => println!("{}", base64url(&text)),
    }

    Ok(())
}

fn init_tracing(config: &config::Config) {
    // Respect user-provided filters, default to the configured level (info) to avoid noisy stdout.
    let fallback = config
        .log_level
        .map(|level| level.as_str())
        .unwrap_or("info");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("lockbox {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

fn generate_key(seed: Option<&str>) -> Result<RawKey> {
    match seed {
        Some(seed) => Ok(RawKey::from_seed(seed.as_bytes())?),
        None => Ok(RawKey::random()),
    }
}

/// Provisions a throwaway in-memory store and round-trips an entry through it.
async fn run_health_check() -> Result<()> {
    let store = Store::provision(
        &StoreUri::in_memory(),
        KeyDerivationMethod::Raw,
        &PassKey::from(RawKey::random()),
        true,
    )
    .await?;
    let outcome = run_store_health(&store).await;
    store.close().await?;
    outcome?;
    println!("Storage: ok");
    Ok(())
}

async fn run_store_health<S: SecureStore>(store: &S) -> Result<()> {
    let (category, name) = ("health", "probe");
    let payload = b"ok";
    store.replace(category, name, payload).await?;
    let round_trip = store
        .fetch(category, name)
        .await?
        .ok_or_else(|| eyre!("probe entry missing after write"))?;
    store.delete(category, name).await?;

    if round_trip.value != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

async fn run_provision(
    target: &StoreTarget,
    method: Option<&str>,
    recreate: bool,
    config: &config::Config,
) -> Result<()> {
    let method = match method {
        Some(method) => method.parse()?,
        None => config.key_method()?,
    };
    let (uri, key) = storage::resolve_target(target, config, method)?;
    let store = Store::provision(&uri, method, &key, recreate).await?;
    store.close().await?;
    info!(%uri, %method, "store provisioned");
    println!("Provisioned {uri} ({method})");
    Ok(())
}

async fn run_open(
    target: &StoreTarget,
    category: Option<&str>,
    config: &config::Config,
) -> Result<()> {
    // The store records its own method; an absent key is tried as empty.
    let (uri, key) = storage::resolve_target(target, config, KeyDerivationMethod::Unprotected)?;
    let store = Store::open(&uri, &key).await?;
    let method = store.key_method().await?;
    println!("Opened {uri} ({method})");
    if let Some(category) = category {
        println!("{category}: {} entries", store.count(category).await?);
    }
    store.close().await?;
    Ok(())
}

async fn run_rekey(
    target: &StoreTarget,
    new_method: Option<&str>,
    new_key: String,
    config: &config::Config,
) -> Result<()> {
    let new_method = match new_method {
        Some(method) => method.parse()?,
        None => config.key_method()?,
    };
    let (uri, key) = storage::resolve_target(target, config, KeyDerivationMethod::Unprotected)?;
    let store = Store::open(&uri, &key).await?;
    store.rekey(new_method, &PassKey::new(new_key)).await?;
    store.close().await?;
    println!("Rekeyed {uri} ({new_method})");
    Ok(())
}

async fn run_remove(uri: Option<&str>, config: &config::Config) -> Result<()> {
    let uri = storage::resolve_uri(uri, config)?;
    if Store::remove(&uri).await? {
        println!("Removed {uri}");
    } else {
        println!("No store at {uri}");
    }
    Ok(())
}
