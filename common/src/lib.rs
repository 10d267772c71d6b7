// common/src/lib.rs
use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use reqwest::Client;
use std::env;

pub mod account;
pub mod client;
pub mod flashloan;
pub mod types;

pub use account::{parse_private_key, KeyError, LocalAccount};
pub use client::{AptosClient, NodeApi, NodeError, TransactionResult};
pub use flashloan::flashloan_flow;

// ─────────────────── Configuration ───────────────────

pub const DEFAULT_NODE_URL: &str = "https://fullnode.testnet.aptoslabs.com";

/// Runtime settings, read from flags or the environment (`.env` included).
/// Private keys come from the environment only and are checked when an
/// account is built from them.
#[derive(Parser, Debug, Clone)]
#[command(name = "flashloan", about = "Submit flashloan/swap batches and report the outcome")]
pub struct Config {
    /// Full node REST endpoint
    #[arg(long, env = "APTOS_NODE_URL", default_value = DEFAULT_NODE_URL)]
    pub node_url: String,

    #[arg(skip)]
    pub pk_loan: Option<String>,

    #[arg(skip)]
    pub pk_loan_2: Option<String>,

    #[arg(skip)]
    pub pk_trader: Option<String>,

    /// Number of rounds; each round submits one transaction per account
    #[arg(long, env = "FLASHLOAN_ROUNDS", default_value_t = 25)]
    pub rounds: u64,

    /// Print `Done` without waiting for transactions to commit
    #[arg(long, env = "FLASHLOAN_NO_WAIT")]
    pub no_wait: bool,

    /// How long to wait for each transaction to commit
    #[arg(long, env = "FLASHLOAN_POLL_TIMEOUT_SECS", default_value_t = 20)]
    pub poll_timeout_secs: u64,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Loaner,
    Loaner2,
    Trader,
}

impl Role {
    pub fn env_var(self) -> &'static str {
        match self {
            Role::Loaner => "PK_LOAN",
            Role::Loaner2 => "PK_LOAN_2",
            Role::Trader => "PK_TRADER",
        }
    }
}

impl Config {
    /// Fills the private keys through `lookup` (the process environment in `load_config`).
    pub fn with_keys(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.pk_loan = lookup(Role::Loaner.env_var());
        self.pk_loan_2 = lookup(Role::Loaner2.env_var());
        self.pk_trader = lookup(Role::Trader.env_var());
        self
    }

    pub fn private_key(&self, role: Role) -> Result<&str, KeyError> {
        let key = match role {
            Role::Loaner => &self.pk_loan,
            Role::Loaner2 => &self.pk_loan_2,
            Role::Trader => &self.pk_trader,
        };
        key.as_deref().ok_or(KeyError::Missing(role.env_var()))
    }
}

pub fn load_config() -> Config {
    dotenv().ok();
    Config::parse().with_keys(|var| env::var(var).ok())
}

pub fn http_client() -> Result<Client> {
    Ok(Client::builder().build()?)
}
