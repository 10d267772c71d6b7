// common/src/flashloan.rs
//
// Flashloan load run: two lenders call `identity_swap` while a trader calls `swap`
// on the same module, round after round, all submitted at once.

use anyhow::{anyhow, Context, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::account::LocalAccount;
use crate::client::{AptosClient, NodeApi, NodeError, TransactionResult};
use crate::types::{
    AccountAddress, ChainId, CoinType, EntryFunction, ModuleId, RawTransaction,
    SignedTransaction, TransactionPayload,
};
use crate::{http_client, Config, Role};

// ─────────────────── Constants ───────────────────

pub const APTOS_COIN: &str = "0x1::aptos_coin::AptosCoin";
pub const USDT_COIN: &str =
    "0x43417434fd869edee76cca2a4d2301e528a1551b1d719b75c350c3c97d15b8b9::coins::USDT";

pub const FLASHLOAN_MODULE: &str =
    "09f85897f830d193f15d7232fa1c714daae3bf0215d7ad19d0c8afb7f35afb9e::flashloan_swap";
pub const IDENTITY_SWAP: &str = "identity_swap";
pub const SWAP: &str = "swap";
pub const FLASHLOAN_AMOUNT: u64 = 1000;
pub const SWAP_AMOUNT: u64 = 100;

pub const MAX_GAS_AMOUNT: u64 = 2000;
pub const GAS_UNIT_PRICE: u64 = 500;
pub const EXPIRATION_WINDOW_SECS: u64 = 10;

pub fn unix_now() -> Result<u64> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the Unix epoch")?;
    Ok(since_epoch.as_secs())
}

/// `<module>::<function>(amount: u64)` with no type arguments.
pub fn u64_entry_payload(module: &str, function: &str, amount: u64) -> Result<TransactionPayload> {
    let module = ModuleId::parse(module)?;
    let arg = bcs::to_bytes(&amount)?;
    Ok(TransactionPayload::EntryFunction(EntryFunction::new(
        module,
        function,
        vec![],
        vec![arg],
    )))
}

// ─────────────────── Balances ───────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceLine {
    pub address: AccountAddress,
    pub coin: CoinType,
    pub balance: u64,
}

/// Sequential on purpose: accounts outer, coins inner, each query awaited.
/// The first failing query stops the report.
pub async fn report_balances(
    client: &dyn NodeApi,
    addresses: &[AccountAddress],
    coins: &[CoinType],
) -> Result<Vec<BalanceLine>> {
    let mut lines = Vec::with_capacity(addresses.len() * coins.len());
    for &address in addresses {
        println!("Account: {address}");
        for coin in coins {
            let balance = client
                .coin_balance(address, coin)
                .await
                .map_err(|e| anyhow!("balance of {} for {address}: {e}", coin.name()))?;
            println!("Balance {}: {balance}", coin.name());
            lines.push(BalanceLine {
                address,
                coin: coin.clone(),
                balance,
            });
        }
    }
    Ok(lines)
}

// ─────────────────── Batch builder ───────────────────

/// Locally tracked sequence number. Assumes nothing else submits from the
/// account while a batch is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTracker(u64);

impl SequenceTracker {
    pub fn new(start: u64) -> Self {
        Self(start)
    }

    /// Current value; the tracker then moves to the next one.
    pub fn next(&mut self) -> u64 {
        let current = self.0;
        self.0 += 1;
        current
    }
}

#[derive(Debug)]
struct Lane {
    sender: AccountAddress,
    sequence: SequenceTracker,
    payload: Arc<TransactionPayload>,
}

/// Builds one raw transaction per lane per round.
#[derive(Debug)]
pub struct BatchBuilder {
    chain_id: ChainId,
    lanes: Vec<Lane>,
}

impl BatchBuilder {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            lanes: Vec::new(),
        }
    }

    pub fn add_lane(&mut self, sender: AccountAddress, sequence_number: u64, payload: Arc<TransactionPayload>) {
        self.lanes.push(Lane {
            sender,
            sequence: SequenceTracker::new(sequence_number),
            payload,
        });
    }

    /// One round: a single expiration shared by every lane.
    pub fn build_round(&mut self, now_secs: u64) -> Vec<RawTransaction> {
        let expiration_timestamp_secs = now_secs + EXPIRATION_WINDOW_SECS;
        let chain_id = self.chain_id;
        self.lanes
            .iter_mut()
            .map(|lane| RawTransaction {
                sender: lane.sender,
                sequence_number: lane.sequence.next(),
                payload: Arc::clone(&lane.payload),
                max_gas_amount: MAX_GAS_AMOUNT,
                gas_unit_price: GAS_UNIT_PRICE,
                expiration_timestamp_secs,
                chain_id,
            })
            .collect()
    }

    /// `rounds` rounds, reading the clock once per round.
    pub fn build(
        &mut self,
        rounds: u64,
        mut clock: impl FnMut() -> Result<u64>,
    ) -> Result<Vec<Vec<RawTransaction>>> {
        (0..rounds)
            .map(|_| -> Result<Vec<RawTransaction>> { Ok(self.build_round(clock()?)) })
            .collect()
    }
}

/// Signs each transaction with the account matching its sender.
pub fn sign_rounds(
    rounds: Vec<Vec<RawTransaction>>,
    accounts: &[&LocalAccount],
) -> Result<Vec<SignedTransaction>> {
    rounds
        .into_iter()
        .flatten()
        .map(|raw| {
            let account = accounts
                .iter()
                .find(|a| a.address() == raw.sender)
                .ok_or_else(|| anyhow!("no signer for {}", raw.sender))?;
            Ok(account.sign_transaction(raw)?)
        })
        .collect()
}

// ─────────────────── Submission & polling ───────────────────

/// Submits everything concurrently; returns hashes in input order or the
/// first error.
pub async fn submit_all(client: &dyn NodeApi, signed: &[SignedTransaction]) -> Result<Vec<String>, NodeError> {
    try_join_all(signed.iter().map(|txn| client.submit_bcs(txn))).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedTransaction {
    pub hash: String,
    pub result: TransactionResult,
}

#[derive(Debug, Default)]
pub struct PollReport {
    pub succeeded: usize,
    pub failed: Vec<FailedTransaction>,
    pub errored: usize,
}

impl PollReport {
    fn record(&mut self, hash: String, outcome: Result<TransactionResult, NodeError>) {
        match outcome {
            Ok(result) if result.success() => self.succeeded += 1,
            Ok(result) => {
                log_failure(&hash, &result);
                self.failed.push(FailedTransaction { hash, result });
            }
            Err(e) => {
                error!(hash = %hash, error = %e, "Failed to poll transaction");
                self.errored += 1;
            }
        }
    }
}

fn log_failure(hash: &str, result: &TransactionResult) {
    warn!(hash, vm_status = result.vm_status(), "Transaction failed");
    println!("Fail! {hash}");
    match serde_json::to_string_pretty(&result.0) {
        Ok(body) => println!("{body}"),
        Err(_) => println!("{:#?}", result.0),
    }
}

/// Polls every hash concurrently and waits for all of them.
pub async fn poll_all(client: Arc<dyn NodeApi>, hashes: Vec<String>, timeout: Duration) -> PollReport {
    let mut tasks = JoinSet::new();
    for hash in hashes {
        let client = Arc::clone(&client);
        tasks.spawn(async move {
            let outcome = client.wait_for_transaction(&hash, timeout).await;
            (hash, outcome)
        });
    }

    let mut report = PollReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((hash, outcome)) => report.record(hash, outcome),
            Err(e) => {
                error!(error = %e, "Poll task aborted");
                report.errored += 1;
            }
        }
    }
    report
}

/// Fast-exit mode: polls are left running and die with the process.
/// Dropping the returned handles does not cancel them.
pub fn spawn_detached_polls(
    client: Arc<dyn NodeApi>,
    hashes: Vec<String>,
    timeout: Duration,
) -> Vec<JoinHandle<PollReport>> {
    hashes
        .into_iter()
        .map(|hash| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let outcome = client.wait_for_transaction(&hash, timeout).await;
                let mut report = PollReport::default();
                report.record(hash, outcome);
                report
            })
        })
        .collect()
}

// ─────────────────── Flow ───────────────────

/// What a run submitted and, unless polls were detached, how they ended.
#[derive(Debug)]
pub struct RunSummary {
    pub hashes: Vec<String>,
    pub report: Option<PollReport>,
}

pub async fn flashloan_flow(cfg: &Config) -> Result<()> {
    let client: Arc<dyn NodeApi> = Arc::new(AptosClient::new(&cfg.node_url, http_client()?));
    run(client, cfg).await?;
    Ok(())
}

/// Everything after the client is chosen; split out so it runs against any node.
pub async fn run(client: Arc<dyn NodeApi>, cfg: &Config) -> Result<RunSummary> {
    let loaner = LocalAccount::from_private_key(cfg.private_key(Role::Loaner)?)?;
    let loaner_2 = LocalAccount::from_private_key(cfg.private_key(Role::Loaner2)?)?;
    let trader = LocalAccount::from_private_key(cfg.private_key(Role::Trader)?)?;

    println!("=== Addresses ===");
    println!("Loaner: {}", loaner.address());
    println!("Loaner 2: {}", loaner_2.address());
    println!("Trader: {}", trader.address());
    println!();

    let coins = [CoinType::parse(APTOS_COIN)?, CoinType::parse(USDT_COIN)?];
    report_balances(
        client.as_ref(),
        &[loaner.address(), loaner_2.address(), trader.address()],
        &coins,
    )
    .await?;

    let flashloan = Arc::new(u64_entry_payload(FLASHLOAN_MODULE, IDENTITY_SWAP, FLASHLOAN_AMOUNT)?);
    let swap = Arc::new(u64_entry_payload(FLASHLOAN_MODULE, SWAP, SWAP_AMOUNT)?);

    let chain_id = client.chain_id().await?;
    let mut builder = BatchBuilder::new(chain_id);
    // Both lenders send the same call every round.
    for (account, payload) in [(&loaner, &flashloan), (&loaner_2, &flashloan), (&trader, &swap)] {
        let sequence_number = client.sequence_number(account.address()).await?;
        info!(address = %account.address(), sequence_number, "Fetched sequence number");
        builder.add_lane(account.address(), sequence_number, Arc::clone(payload));
    }

    let rounds = builder.build(cfg.rounds, unix_now)?;
    let signed = sign_rounds(rounds, &[&loaner, &loaner_2, &trader])?;
    info!(count = signed.len(), "Submitting transactions");

    let hashes = submit_all(client.as_ref(), &signed).await?;
    println!("Hashes: ");
    for hash in &hashes {
        println!("{hash}");
    }

    let timeout = Duration::from_secs(cfg.poll_timeout_secs);
    let report = if cfg.no_wait {
        spawn_detached_polls(client, hashes.clone(), timeout);
        warn!("Exiting without confirmation; pending polls are dropped at exit");
        None
    } else {
        let report = poll_all(client, hashes.clone(), timeout).await;
        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            errored = report.errored,
            "Polling finished"
        );
        Some(report)
    };

    println!("Done");
    Ok(RunSummary { hashes, report })
}
