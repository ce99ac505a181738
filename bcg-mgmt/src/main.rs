use anyhow::{Context, Result};
use bcg_cluster::{MemberView, Membership, MembershipConfig, NodeMeta, NodeRole};
use bcg_discovery::{detect_local_ip, search_for_cluster, Advertiser};
use bcg_mgmt::logging::{self, LoggingMode};
use bcg_mgmt::{api, MemberHandler, MgmtClient, MgmtConfig, SpeakerApiControl, ZoneService};
use bcg_store::{DistributedStore, StoreConfig};
use clap::Parser;
use speaker_api::SpeakerClient;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Bobcaygeon management node
///
/// Joins (or founds) the cluster, replicates speaker and zone configuration
/// with the other management nodes and serves the management API.
#[derive(Parser, Debug)]
#[command(name = "bcg-mgmt")]
#[command(about = "Bobcaygeon management node")]
struct Args {
    /// Path to the config file for the node
    #[arg(short, long, default_value = "bcg-mgmt.toml")]
    config: PathBuf,

    /// Log format: silent, development, debug or json (overrides BCG_LOG_MODE)
    #[arg(long)]
    log_mode: Option<String>,

    /// Seconds to search for an existing cluster before founding one
    #[arg(long, default_value = "5")]
    discovery_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = MgmtConfig::load(&args.config)
        .with_context(|| format!("Could not load config file {}", args.config.display()))?;

    let mode = match &args.log_mode {
        Some(mode) => mode.parse::<LoggingMode>()?,
        None => logging::mode_from_env(LoggingMode::Development)?,
    };
    logging::init_logging(mode)?;

    let name = config.node.name.clone();
    let local_ip = detect_local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    info!(node = %name, %local_ip, "starting management node");

    // gossip
    let meta = NodeMeta::management(config.node.api_port, config.mgmt.raft_port);
    let mut membership_config = MembershipConfig::new(
        name.clone(),
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.node.cluster_port)),
        meta,
    );
    membership_config.advertise_addr = Some(SocketAddr::new(local_ip, config.node.cluster_port));
    let membership = Membership::new(membership_config)
        .await
        .context("Failed to start cluster membership")?;
    membership.start();

    match search_for_cluster(Duration::from_secs(args.discovery_timeout)).await {
        Ok(Some(entry)) => match entry.addr() {
            Some(seed) => {
                info!(instance = %entry.instance, %seed, "joining cluster");
                membership
                    .join(seed)
                    .await
                    .context("Failed to join cluster")?;
            }
            None => warn!(instance = %entry.instance, "cluster advertisement has no address"),
        },
        Ok(None) => info!("no cluster found, founding a new one"),
        Err(e) => warn!("cluster search failed: {}", e),
    }

    let advertiser = match Advertiser::start(name.clone(), config.node.cluster_port).await {
        Ok(advertiser) => Some(advertiser),
        Err(e) => {
            warn!("could not advertise cluster: {}", e);
            None
        }
    };

    // replicated store; only the first management node founds the raft group
    let management_nodes = membership.filter_by_role(NodeRole::Management).len();
    let bootstrap = management_nodes <= 1;
    let raft_addr = SocketAddr::new(local_ip, config.mgmt.raft_port);
    let store = Arc::new(
        DistributedStore::open(
            StoreConfig::new(name.clone(), raft_addr.to_string(), config.mgmt.storage_dir.clone()),
            bootstrap,
        )
        .await
        .context("Failed to open distributed store")?,
    );

    let speakers = Arc::new(SpeakerApiControl::new(SpeakerClient::new()?));
    let forwarder = Arc::new(MgmtClient::new()?);
    let service = Arc::new(
        ZoneService::new(membership.clone(), store.clone(), speakers, forwarder)
            .with_local_ips(vec![local_ip]),
    );
    membership.register_observer(Arc::new(MemberHandler::new(store.clone(), service.clone())));

    // servers
    let (raft_shutdown, raft_signal) = oneshot::channel::<()>();
    let (_, raft_server) = warp::serve(store.routes())
        .try_bind_with_graceful_shutdown(
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.mgmt.raft_port)),
            async {
                raft_signal.await.ok();
            },
        )
        .context("Failed to bind consensus port")?;
    let raft_task = tokio::spawn(raft_server);

    let (api_shutdown, api_signal) = oneshot::channel::<()>();
    let (api_addr, api_server) = warp::serve(api::routes(service.clone()))
        .try_bind_with_graceful_shutdown(
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.node.api_port)),
            async {
                api_signal.await.ok();
            },
        )
        .context("Failed to bind API port")?;
    let api_task = tokio::spawn(api_server);
    info!(%api_addr, %raft_addr, bootstrap, "management node ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("ctrl-c detected, shutting down");

    membership.leave().await;
    if let Some(advertiser) = advertiser {
        advertiser.shutdown().await;
    }

    let _ = api_shutdown.send(());
    let _ = raft_shutdown.send(());
    let _ = api_task.await;
    let _ = raft_task.await;

    if let Err(e) = store.shutdown().await {
        warn!("store shutdown failed: {}", e);
    }
    membership.shutdown();

    info!("goodbye");
    Ok(())
}
