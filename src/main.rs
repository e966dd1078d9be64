//! Ember (EMB) node
//!
//! Wires the components together: configuration, then the ledger (which
//! loads or creates the snapshot), then the gossip server, then the miner
//! and staking service.

use std::process;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use ember_core::ledger::Ledger;
use ember_core::mining::Miner;
use ember_core::node::{Config, Opt};
use ember_core::p2p::{PeerHub, Server};
use ember_core::staking::StakingService;
use ember_core::storage::{ChainStore, PeerLog};
use ember_core::wallet::Wallet;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from(Opt::parse());

    // A miner forking off alone produces a chain nobody will accept.
    if config.miner_address.is_some() && config.peers.is_empty() {
        error!("mining requires at least one peer (--peers)");
        process::exit(1);
    }

    let ledger = match Ledger::open(ChainStore::new(config.chain_path())) {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            error!("failed to load chain snapshot: {e}");
            process::exit(1);
        }
    };
    info!(
        "ledger ready at height {} ({})",
        ledger.chain_len() - 1,
        ledger.latest_block().hash
    );

    // Load the node wallet, creating one key on first start. An existing
    // but unreadable wallet is fatal; never overwrite it.
    let wallet_path = config.wallet_path();
    let wallet = if wallet_path.exists() {
        match Wallet::load(&wallet_path) {
            Ok(wallet) => wallet,
            Err(e) => {
                error!("failed to load wallet: {e}");
                process::exit(1);
            }
        }
    } else {
        let mut wallet = Wallet::new();
        let address = wallet.create_key();
        if let Err(e) = wallet.save(&wallet_path) {
            error!("failed to write wallet: {e}");
            process::exit(1);
        }
        info!("created wallet with address {address}");
        wallet
    };
    for address in wallet.addresses() {
        info!("wallet address: {address}");
    }

    let hub = Arc::new(PeerHub::new(PeerLog::open(config.peer_log_path())));
    let server = Server::new(Arc::clone(&ledger), Arc::clone(&hub));

    for peer in &config.peers {
        server.connect(peer);
    }

    let miner = Arc::new(Miner::new(Arc::clone(&ledger), Arc::clone(&hub)));
    if let Some(address) = config.miner_address.clone() {
        miner.start(address);
    }

    let staker = Arc::new(StakingService::new(Arc::clone(&ledger), Arc::clone(&hub)));
    if let Some(address) = config.staker_address.clone() {
        staker.start(address);
    }

    let listener = tokio::spawn(Arc::clone(&server).run(config.p2p_port));

    tokio::select! {
        result = listener => {
            if let Ok(Err(e)) = result {
                error!("p2p listener failed: {e}");
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, stopping node");
            miner.stop();
            staker.stop();
        }
    }
}
