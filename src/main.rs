use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xipd::config::{Config, SharedConfig};
use xipd::dns::blocklist::{self, Blocklist, SharedBlocklist};
use xipd::error::Error::DNSError;
use xipd::kv_store::{DynKvStore, EtcdKvStore, InMemoryKvStore};
use xipd::metrics::{refill_amplification_tokens, Metrics};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("xipd".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    let metrics = Arc::new(Metrics::new());
    tokio::spawn(refill_amplification_tokens(metrics.token_sender()));

    let kv_store = kv_store_from_config(&config).await;
    let blocklist: SharedBlocklist = Arc::new(RwLock::new(Blocklist::default()));
    tokio::spawn(blocklist::refresh_periodically(
        config.blocklist_url.clone(),
        blocklist.clone(),
    ));

    tracing::info!("DNS listening on UDP {}", &config.dns_udp_bind_addr);
    tracing::info!("DNS listening on TCP {}", &config.dns_tcp_bind_addr);
    let dns_server = xipd::dns::server::new(config, kv_store, blocklist, metrics).await?;
    let dns_handle = tokio::spawn(dns_server.block_until_done());

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        Ok(dns_res) = dns_handle => {
            if let Err(err) = dns_res {
                return Err(DNSError(err).into())
            }
        }
    }
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xipd=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<SharedConfig> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            tracing::debug!("loading config from {config_file}");
            let config = Config::try_from_file(&config_file)?;
            Ok(Arc::new(config))
        }
    }
}

async fn kv_store_from_config(config: &SharedConfig) -> DynKvStore {
    match &config.etcd_endpoint {
        Some(endpoint) => match EtcdKvStore::connect(endpoint).await {
            Ok(store) => {
                tracing::info!("successfully connected to etcd at {endpoint}");
                Arc::new(RwLock::new(store))
            }
            Err(err) => {
                tracing::warn!(
                    "failed to connect to etcd at {endpoint}; using the in-process key-value store instead: {err}"
                );
                Arc::new(RwLock::new(InMemoryKvStore::default()))
            }
        },
        None => {
            tracing::debug!("using the in-process key-value store");
            Arc::new(RwLock::new(InMemoryKvStore::default()))
        }
    }
}
