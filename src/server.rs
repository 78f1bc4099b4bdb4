use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use kubecd_common::{
    kube::{
        DEFAULT_ACCOUNT_TIMEOUT_SECS, DEFAULT_DISCOVERY_CACHE_TTL_SECS, DEFAULT_LIST_TIMEOUT_SECS,
        DEFAULT_RESOURCE_CHANNEL_CAPACITY,
    },
    ProviderConfig, ResourceStore,
};
use kubecd_db::api::DbApi;
use kubecd_kube::{ClusterClientFactory, DiscoveryCache, ReconcileOptions, ResourceReconciler};
use serde::Deserialize;
use tracing::{error, info, warn};

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
const DEFAULT_SYNC_CONCURRENCY: usize = 4;

#[derive(Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct KubecdConfig {
    db: Option<String>,
    discovery_cache_ttl_secs: Option<u64>,
    list_timeout_secs: Option<u64>,
    account_timeout_secs: Option<u64>,
    sync_interval_secs: Option<u64>,
    sync_concurrency: Option<usize>,
    channel_capacity: Option<usize>,
    #[serde(default)]
    providers: Vec<ProviderConfig>,
}

impl KubecdConfig {
    fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            list_timeout: Duration::from_secs(
                self.list_timeout_secs.unwrap_or(DEFAULT_LIST_TIMEOUT_SECS),
            ),
            account_timeout: Duration::from_secs(
                self.account_timeout_secs
                    .unwrap_or(DEFAULT_ACCOUNT_TIMEOUT_SECS),
            ),
            channel_capacity: self
                .channel_capacity
                .unwrap_or(DEFAULT_RESOURCE_CHANNEL_CAPACITY),
        }
    }

    fn discovery_cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.discovery_cache_ttl_secs
                .unwrap_or(DEFAULT_DISCOVERY_CACHE_TTL_SECS),
        )
    }

    fn sync_interval(&self) -> Duration {
        Duration::from_secs(
            self.sync_interval_secs
                .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS)
                .max(1),
        )
    }
}

#[derive(Parser)]
#[clap(name = "kubecd")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// The config file path
    #[clap(short, long, action, value_hint = clap::ValueHint::AnyPath)]
    config_file: Option<PathBuf>,
    /// The folder for putting logs
    #[clap(short, long, action, value_hint = clap::ValueHint::AnyPath)]
    logs_folder: Option<PathBuf>,
    /// Don't run db migration on startup
    #[clap(short, long, action)]
    no_migration: bool,
    /// Reconcile every account once and exit
    #[clap(long, action)]
    once: bool,
}

async fn load_config(cli: &Cli) -> Result<KubecdConfig> {
    let config_file = cli
        .config_file
        .clone()
        .unwrap_or_else(|| PathBuf::from("/etc/kubecd.conf"));
    let config_content = tokio::fs::read_to_string(&config_file)
        .await
        .with_context(|| format!("can't read config file {}", config_file.to_string_lossy()))?;
    toml::from_str(&config_content).with_context(|| "wrong config file format")
}

pub async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli).await?;
    let db_url = config
        .db
        .clone()
        .ok_or_else(|| anyhow!("can't find database url in your config file"))?;
    let db = DbApi::new(&db_url, cli.no_migration).await?;
    for provider in &config.providers {
        db.upsert_provider(provider)
            .await
            .with_context(|| format!("saving provider {}", provider.name))?;
    }

    let discovery_cache = Arc::new(DiscoveryCache::new(config.discovery_cache_ttl()));
    let factory = Arc::new(ClusterClientFactory::new(discovery_cache.clone()));
    let store: Arc<dyn ResourceStore> = Arc::new(db);
    let reconciler = ResourceReconciler::new(factory, store, config.reconcile_options());
    let concurrency = config.sync_concurrency.unwrap_or(DEFAULT_SYNC_CONCURRENCY);

    let mut ticker = tokio::time::interval(config.sync_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(
        interval = ?config.sync_interval(),
        concurrency,
        "kubecd started"
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("kubecd shutting down");
                return Ok(());
            }
        }

        discovery_cache.purge_expired();
        match reconciler.reconcile_all(concurrency).await {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|(_, o)| o.is_err()).count();
                if failed > 0 {
                    warn!(accounts = outcomes.len(), failed, "sync pass finished with failures");
                } else {
                    info!(accounts = outcomes.len(), "sync pass finished");
                }
            }
            Err(e) => error!("sync pass failed: {e:#}"),
        }

        if cli.once {
            return Ok(());
        }
    }
}

pub async fn setup_log(cli: &Cli) -> Result<tracing_appender::non_blocking::WorkerGuard, anyhow::Error> {
    let folder = cli
        .logs_folder
        .clone()
        .unwrap_or_else(|| PathBuf::from("/var/lib/kubecd/logs"));
    tokio::fs::create_dir_all(&folder).await?;
    let file_appender = tracing_appender::rolling::Builder::new()
        .max_log_files(30)
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("kubecd.log")
        .build(folder)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let var = std::env::var("RUST_LOG").unwrap_or_default();
    let var = format!(
        "error,kubecd=info,kubecd_common=info,kubecd_kube=info,kubecd_db=info,{var}"
    );
    let filter = tracing_subscriber::EnvFilter::builder().parse_lossy(var);
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .init();
    Ok(guard)
}
