//! Wrap Cycle - The Round-trip Schedule Driver
//!
//! Runs the configured number of wrap/unwrap round trips, strictly one
//! transaction at a time:
//! 1. Draw a gas price, read the native balance, check it covers the
//!    pre-iteration gas budget
//! 2. Wrap a fraction of the balance
//! 3. Journal the broadcast and wait for its receipt
//! 4. Wait for the wrapped token balance to show up
//! 5. Unwrap the whole token balance and wait for its receipt
//! 6. Wait for the native balance to rise above its pre-unwrap level
//! 7. Sleep a randomized delay before the next iteration
//!
//! Any timeout, revert or exhausted retry halts the schedule with a
//! logged reason instead of crashing the process. Broadcasts whose fate
//! the executor could not establish are journaled as unconfirmed.

use std::sync::Arc;

use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, U256};
use anyhow::Context;
use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::executor::{
  ExecutionError, ExecutionOutcome, RetryPolicy, Submission, TransactionExecutor, UnconfirmedTx,
};
use super::failover::Failover;
use super::waiter::{BalanceQuery, BalanceWaiter, ConfirmationWaiter, PollPolicy, WaitError};
use crate::adapters::chain::WrappedNative;
use crate::config::AppConfig;
use crate::domain::gas::wei_to_gwei;
use crate::domain::{
  ActionCall, ActionKind, GasBand, GasPriceSelector, IterationDelay, TxHash, WrapFraction,
  estimated_cost, explorer_link,
};
use crate::ports::{
  ChainClient, ChainConnector, ChainError, Journal, JournalEntry, Telemetry, TxSigner,
};

/// Why the schedule stopped early.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HaltReason {
  #[error("cancelled")]
  Cancelled,
  #[error("insufficient funds: balance {balance} wei, need {required} wei")]
  InsufficientFunds { balance: U256, required: U256 },
  #[error("{action} transaction {hash} reverted")]
  Reverted { action: ActionKind, hash: TxHash },
  #[error("execution failed: {0}")]
  Execution(ExecutionError),
  #[error("wait failed: {0}")]
  Wait(WaitError),
  #[error("chain read failed: {0}")]
  Chain(ChainError),
}

impl From<ExecutionError> for HaltReason {
  fn from(err: ExecutionError) -> Self {
    match err {
      ExecutionError::Cancelled { .. } => Self::Cancelled,
      other => Self::Execution(other),
    }
  }
}

impl From<WaitError> for HaltReason {
  fn from(err: WaitError) -> Self {
    match err {
      WaitError::Cancelled => Self::Cancelled,
      other => Self::Wait(other),
    }
  }
}

impl From<ChainError> for HaltReason {
  fn from(err: ChainError) -> Self {
    Self::Chain(err)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
  /// Every iteration ran, possibly with some skipped.
  Completed,
  Halted(HaltReason),
}

/// Result of a schedule run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
  /// Round trips that finished both legs.
  pub completed: u32,
  /// Iterations skipped for lack of funds.
  pub skipped: u32,
  pub outcome: ScheduleOutcome,
}

impl ScheduleReport {
  pub const fn is_completed(&self) -> bool {
    matches!(self.outcome, ScheduleOutcome::Completed)
  }

  /// 0 when every iteration completed its round trip, 1 for any halt
  /// or skipped iteration.
  pub const fn exit_code(&self) -> u8 {
    if self.is_completed() && self.skipped == 0 { 0 } else { 1 }
  }
}

/// Schedule knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct CycleSettings {
  pub iterations: u32,
  pub delay: IterationDelay,
  pub wrap_fraction: WrapFraction,
  /// Gas units the pre-iteration balance check budgets for.
  pub precheck_gas_limit: u64,
  /// Halt on insufficient funds; otherwise skip the iteration.
  pub halt_on_insufficient_funds: bool,
  pub explorer_tx_url: String,
}

impl CycleSettings {
  pub fn from_config(config: &AppConfig) -> Self {
    Self {
      iterations: config.schedule.iterations,
      delay: IterationDelay::new(config.schedule.duration(), config.schedule.iterations),
      wrap_fraction: WrapFraction::from_fraction(config.schedule.wrap_fraction),
      precheck_gas_limit: config.gas.precheck_gas_limit,
      halt_on_insufficient_funds: config.schedule.halt_on_insufficient_funds,
      explorer_tx_url: config.network.explorer_tx_url.clone(),
    }
  }
}

enum Iteration {
  Completed,
  Skipped,
}

/// Drives the wrap/unwrap schedule for one account.
pub struct WrapCycle<K: ChainConnector, S: TxSigner> {
  failover: Arc<Failover<K>>,
  signer: Arc<S>,
  journal: Arc<dyn Journal>,
  telemetry: Arc<dyn Telemetry>,
  executor: TransactionExecutor<K, S>,
  confirmations: ConfirmationWaiter<K>,
  balances: BalanceWaiter<K>,
  contract: WrappedNative,
  gas: GasPriceSelector,
  settings: CycleSettings,
  cancel: CancellationToken,
}

impl<K: ChainConnector, S: TxSigner> WrapCycle<K, S> {
  /// Wire the executor and waiters from `config`.
  pub fn new(
    config: &AppConfig,
    failover: Arc<Failover<K>>,
    signer: Arc<S>,
    journal: Arc<dyn Journal>,
    telemetry: Arc<dyn Telemetry>,
    cancel: CancellationToken,
  ) -> anyhow::Result<Self> {
    let wrapped_native: Address = config
      .contracts
      .wrapped_native
      .parse()
      .context("Invalid wrapped_native address")?;
    let band = GasBand::from_gwei(config.gas.min_price_gwei, config.gas.max_price_gwei)
      .context("Invalid gas price band")?;

    let executor = TransactionExecutor::new(
      Arc::clone(&failover),
      Arc::clone(&signer),
      config.network.chain_id,
      config.gas.gas_limit,
      RetryPolicy::from_config(&config.retry),
      cancel.clone(),
    )
    .with_telemetry(Arc::clone(&telemetry));

    let confirmations = ConfirmationWaiter::new(
      Arc::clone(&failover),
      PollPolicy::confirmation(&config.polling),
      cancel.clone(),
    );
    let balances = BalanceWaiter::new(
      Arc::clone(&failover),
      PollPolicy::balance(&config.polling),
      cancel.clone(),
    );

    Ok(Self {
      failover,
      signer,
      journal,
      telemetry,
      executor,
      confirmations,
      balances,
      contract: WrappedNative::new(wrapped_native),
      gas: GasPriceSelector::new(band),
      settings: CycleSettings::from_config(config),
      cancel,
    })
  }

  /// Run every iteration, or stop at the first halt.
  #[instrument(skip(self), fields(iterations = self.settings.iterations))]
  pub async fn run(&self) -> ScheduleReport {
    let mut completed = 0;
    let mut skipped = 0;

    info!(
      address = %self.signer.address(),
      endpoint = %self.failover.endpoint(),
      contract = %self.contract.address(),
      avg_delay_secs = self.settings.delay.average().as_secs(),
      "Starting wrap/unwrap schedule"
    );

    for iteration in 1..=self.settings.iterations {
      if self.cancel.is_cancelled() {
        return self.halt(completed, skipped, HaltReason::Cancelled);
      }

      match self.run_iteration(iteration).await {
        Ok(Iteration::Completed) => {
          completed += 1;
          self.telemetry.iteration_completed();
          info!(iteration, completed, "Round trip complete");
        }
        Ok(Iteration::Skipped) => {
          skipped += 1;
        }
        Err(reason) => return self.halt(completed, skipped, reason),
      }

      if iteration < self.settings.iterations {
        let delay = self.settings.delay.sample();
        info!(delay_secs = delay.as_secs(), "Waiting before next iteration");
        tokio::select! {
          () = self.cancel.cancelled() => {
            return self.halt(completed, skipped, HaltReason::Cancelled);
          }
          () = tokio::time::sleep(delay) => {}
        }
      }
    }

    if skipped > 0 {
      warn!(completed, skipped, "Schedule finished with skipped iterations");
    } else {
      info!(completed, "Schedule finished");
    }
    ScheduleReport {
      completed,
      skipped,
      outcome: ScheduleOutcome::Completed,
    }
  }

  fn halt(&self, completed: u32, skipped: u32, reason: HaltReason) -> ScheduleReport {
    error!(completed, skipped, reason = %reason, "Schedule halted");
    ScheduleReport {
      completed,
      skipped,
      outcome: ScheduleOutcome::Halted(reason),
    }
  }

  #[instrument(skip(self))]
  async fn run_iteration(&self, iteration: u32) -> Result<Iteration, HaltReason> {
    let owner = self.signer.address();

    let gas_price = self.select_gas_price();
    let balance = self.native_balance(owner).await?;
    let precheck = estimated_cost(self.settings.precheck_gas_limit, gas_price);
    info!(
      balance = %format_ether(balance),
      precheck_cost = %format_ether(precheck),
      "Iteration started"
    );
    if balance < precheck {
      self.telemetry.insufficient_funds();
      return self.insufficient(balance, precheck);
    }

    // The wrap value and its own gas both come out of the balance.
    let spendable = balance.saturating_sub(estimated_cost(self.executor.gas_limit(), gas_price));
    let amount = self.settings.wrap_fraction.apply(balance).min(spendable);
    let nonce = self.pending_nonce(owner).await?;
    let wrap = self.contract.wrap(amount);
    let Some(submission) = self.execute(iteration, &wrap, gas_price, nonce).await? else {
      return Ok(Iteration::Skipped);
    };
    self.confirm(iteration, &wrap, &submission).await?;

    let token_balance = self
      .balances
      .wait(
        BalanceQuery::Token {
          token: self.contract.address(),
          owner,
        },
        |balance| !balance.is_zero(),
      )
      .await?;

    let native_before = self.native_balance(owner).await?;
    let gas_price = self.select_gas_price();
    let nonce = self.pending_nonce(owner).await?;
    let unwrap = self.contract.unwrap(token_balance);
    let Some(submission) = self.execute(iteration, &unwrap, gas_price, nonce).await? else {
      return Ok(Iteration::Skipped);
    };
    self.confirm(iteration, &unwrap, &submission).await?;

    self
      .balances
      .wait(BalanceQuery::Native(owner), move |balance| balance > native_before)
      .await?;

    Ok(Iteration::Completed)
  }

  fn select_gas_price(&self) -> u128 {
    let price = self.gas.select();
    self.telemetry.gas_price_selected(price);
    info!(gas_price_gwei = wei_to_gwei(price), "Selected gas price");
    price
  }

  /// Run one action. `None` means it was skipped for lack of funds.
  async fn execute(
    &self,
    iteration: u32,
    call: &ActionCall,
    gas_price: u128,
    nonce: u64,
  ) -> Result<Option<Submission>, HaltReason> {
    let outcome = match self.executor.execute(call, gas_price, nonce).await {
      Ok(outcome) => outcome,
      Err(e) => {
        self.record_unconfirmed(iteration, call, e.unconfirmed()).await;
        return Err(e.into());
      }
    };
    match outcome {
      ExecutionOutcome::Submitted(submission) => {
        self.record_unconfirmed(iteration, call, &submission.unconfirmed).await;
        Ok(Some(submission))
      }
      ExecutionOutcome::InsufficientFunds { balance, required } => {
        self.insufficient(balance, required)?;
        Ok(None)
      }
    }
  }

  fn insufficient(&self, balance: U256, required: U256) -> Result<Iteration, HaltReason> {
    if self.settings.halt_on_insufficient_funds {
      Err(HaltReason::InsufficientFunds { balance, required })
    } else {
      warn!(
        balance = %format_ether(balance),
        required = %format_ether(required),
        "Insufficient funds, skipping iteration"
      );
      Ok(Iteration::Skipped)
    }
  }

  async fn confirm(
    &self,
    iteration: u32,
    call: &ActionCall,
    submission: &Submission,
  ) -> Result<(), HaltReason> {
    info!(
      action = %call.kind,
      amount = %format_ether(call.amount),
      tx_hash = %submission.hash,
      link = %explorer_link(&self.settings.explorer_tx_url, &submission.hash),
      "Transaction broadcast"
    );
    self
      .record(JournalEntry::Broadcast {
        iteration,
        action: call.kind,
        tx_hash: submission.hash,
        amount_wei: call.amount.to_string(),
        gas_price_wei: submission.gas_price.to_string(),
        nonce: submission.nonce,
        endpoint: submission.endpoint.to_string(),
        timestamp: Utc::now(),
      })
      .await;

    let receipt = self.confirmations.wait(submission.hash).await?;
    self.telemetry.confirmed(receipt.status);
    self
      .record(JournalEntry::Confirmed {
        iteration,
        action: call.kind,
        tx_hash: submission.hash,
        status: receipt.status,
        block_number: receipt.block_number,
        timestamp: Utc::now(),
      })
      .await;

    if receipt.succeeded() {
      Ok(())
    } else {
      Err(HaltReason::Reverted {
        action: call.kind,
        hash: submission.hash,
      })
    }
  }

  async fn record_unconfirmed(
    &self,
    iteration: u32,
    call: &ActionCall,
    unconfirmed: &[UnconfirmedTx],
  ) {
    for tx in unconfirmed {
      warn!(
        action = %call.kind,
        tx_hash = %tx.hash,
        nonce = tx.nonce,
        endpoint = %tx.endpoint,
        link = %explorer_link(&self.settings.explorer_tx_url, &tx.hash),
        "Broadcast of unknown fate"
      );
      self
        .record(JournalEntry::Unconfirmed {
          iteration,
          action: call.kind,
          tx_hash: tx.hash,
          nonce: tx.nonce,
          endpoint: tx.endpoint.to_string(),
          timestamp: Utc::now(),
        })
        .await;
    }
  }

  async fn record(&self, entry: JournalEntry) {
    if let Err(e) = self.journal.record(&entry).await {
      warn!(tx_hash = %entry.tx_hash(), error = %e, "Failed to write journal entry");
    }
  }

  async fn native_balance(&self, owner: Address) -> Result<U256, HaltReason> {
    Ok(
      self
        .failover
        .read(|client| async move { client.balance(owner).await })
        .await?,
    )
  }

  async fn pending_nonce(&self, owner: Address) -> Result<u64, HaltReason> {
    Ok(
      self
        .failover
        .read(|client| async move { client.pending_nonce(owner).await })
        .await?,
    )
  }
}
