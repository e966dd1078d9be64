//! Node configuration
//!
//! CLI flags and environment variables resolved into one injected config
//! value; everything else reads from it, never from the environment.

use std::path::PathBuf;

use clap::Parser;

use crate::constants::DEFAULT_P2P_PORT;

/// Command line options
#[derive(Debug, Parser)]
#[command(name = "ember-node", about = "Ember (EMB) cryptocurrency node")]
pub struct Opt {
    /// P2P listen port
    #[arg(long, env = "P2P_PORT", default_value_t = DEFAULT_P2P_PORT)]
    pub port: u16,

    /// Comma-separated peer URLs to dial on startup
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Directory for the chain snapshot, peer log and wallet
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Mine PoW blocks to this address
    #[arg(long, value_name = "ADDRESS")]
    pub mine: Option<String>,

    /// Propose PoS blocks for this address
    #[arg(long, value_name = "ADDRESS")]
    pub stake: Option<String>,
}

/// Resolved node configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub p2p_port: u16,
    pub peers: Vec<String>,
    pub data_dir: PathBuf,
    pub miner_address: Option<String>,
    pub staker_address: Option<String>,
}

impl From<Opt> for Config {
    fn from(opt: Opt) -> Self {
        Self {
            p2p_port: opt.port,
            peers: opt.peers,
            data_dir: opt.data_dir,
            miner_address: opt.mine,
            staker_address: opt.stake,
        }
    }
}

impl Config {
    /// Location of the chain snapshot
    pub fn chain_path(&self) -> PathBuf {
        self.data_dir.join("chain.json")
    }

    /// Location of the peer log
    pub fn peer_log_path(&self) -> PathBuf {
        self.data_dir.join("peers.json")
    }

    /// Location of the wallet file
    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join("wallet.json")
    }
}
