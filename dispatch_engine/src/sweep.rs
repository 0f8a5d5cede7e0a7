//! The background reconciliation sweep.
//!
//! Dispatch is event-driven on the happy path (webhook confirms payment, assignment runs immediately), but events
//! get lost: webhooks are retried out of order, every candidate can be busy, the process can restart mid-flow. The
//! sweep is the catch-up mechanism. On a timer it re-attempts assignment for paid-but-unassigned orders and resolves
//! stale pending payments by asking the provider for the authoritative status. Per-item failures are logged and
//! skipped; one bad order must never stall the batch.

use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use log::*;

use crate::{
    db_types::{Actor, ConfirmationSource, PaymentStatusType},
    dispatch_api::DispatchApi,
    traits::{ChatService, DispatchDatabase, DistanceService, PaymentProvider, PaymentProviderError},
};
use dsp_common::parse_boolean_flag;

const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_PAYMENT_EXPIRY_HOURS: i64 = 24;
const DEFAULT_BATCH_SIZE: i64 = 20;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweep runs.
    pub interval: StdDuration,
    /// How long a pending payment may sit untouched before the sweep re-queries the provider.
    pub payment_expiry: Duration,
    /// Maximum orders re-processed per run.
    pub batch_size: i64,
    /// When false the sweep leaves assignment alone and only reconciles payments.
    pub auto_assign: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(DEFAULT_INTERVAL_SECS),
            payment_expiry: Duration::hours(DEFAULT_PAYMENT_EXPIRY_HOURS),
            batch_size: DEFAULT_BATCH_SIZE,
            auto_assign: true,
        }
    }
}

impl SweepConfig {
    /// Builds the config from `DISPATCH_SWEEP_INTERVAL_SECS`, `DISPATCH_PAYMENT_EXPIRY_HOURS`,
    /// `DISPATCH_SWEEP_BATCH_SIZE` and `DISPATCH_AUTO_ASSIGN`, falling back to the defaults for anything unset or
    /// unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let interval = env::var("DISPATCH_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(StdDuration::from_secs)
            .unwrap_or(defaults.interval);
        let payment_expiry = env::var("DISPATCH_PAYMENT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .map(Duration::hours)
            .unwrap_or(defaults.payment_expiry);
        let batch_size = env::var("DISPATCH_SWEEP_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults.batch_size);
        let auto_assign = parse_boolean_flag(env::var("DISPATCH_AUTO_ASSIGN").ok(), defaults.auto_assign);
        Self { interval, payment_expiry, batch_size, auto_assign }
    }
}

/// What one sweep run did. Returned from [`ReconciliationSweep::run_once`] and logged by the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub orders_considered: usize,
    pub assigned: usize,
    pub payments_confirmed: usize,
    pub payments_failed: usize,
    pub payments_expired: usize,
    pub errors: usize,
}

pub struct ReconciliationSweep<B, D, C, P> {
    api: DispatchApi<B, D, C>,
    provider: P,
    config: SweepConfig,
}

impl<B, D, C, P> ReconciliationSweep<B, D, C, P>
where
    B: DispatchDatabase,
    D: DistanceService,
    C: ChatService,
    P: PaymentProvider,
{
    pub fn new(api: DispatchApi<B, D, C>, provider: P, config: SweepConfig) -> Self {
        Self { api, provider, config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Runs the sweep on its configured interval until the task is aborted.
    pub async fn run(self) {
        info!(
            "🔁️ Reconciliation sweep started. Interval: {:?}, payment expiry: {}h, auto-assign: {}",
            self.config.interval,
            self.config.payment_expiry.num_hours(),
            self.config.auto_assign
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.run_once().await;
            debug!("🔁️ Sweep complete: {report:?}");
        }
    }

    /// A single sweep pass. Never returns an error; everything that goes wrong is counted and logged.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        if self.config.auto_assign {
            self.reassign_stranded_orders(&mut report).await;
        }
        self.reconcile_stale_payments(&mut report).await;
        report
    }

    async fn reassign_stranded_orders(&self, report: &mut SweepReport) {
        let orders = match self.api.pending_agent_assignment_orders(self.config.batch_size).await {
            Ok(orders) => orders,
            Err(e) => {
                error!("🔁️ Could not fetch the assignment backlog: {e}");
                report.errors += 1;
                return;
            },
        };
        report.orders_considered = orders.len();
        for order in orders {
            match self.api.assign_agent_to_order(order.id).await {
                Ok(outcome) => {
                    if let Some(agent_id) = outcome.assigned_agent_id() {
                        info!("🔁️ Sweep assigned order {} to agent {agent_id}", order.order_number);
                        report.assigned += 1;
                    }
                },
                Err(e) => {
                    warn!("🔁️ Sweep could not assign order {}: {e}", order.order_number);
                    report.errors += 1;
                },
            }
            if let Err(e) = self.api.validate_status_consistency(order.id).await {
                warn!("🔁️ Consistency check for order {} failed: {e}", order.order_number);
            }
        }
    }

    /// Resolves pending payments that have gone quiet. The provider's answer is authoritative: a payment is only
    /// confirmed, failed, or expired based on what the provider reports, never on the timeout alone.
    async fn reconcile_stale_payments(&self, report: &mut SweepReport) {
        let stale = match self.api.db().stale_pending_payments(self.config.payment_expiry).await {
            Ok(records) => records,
            Err(e) => {
                error!("🔁️ Could not fetch stale pending payments: {e}");
                report.errors += 1;
                return;
            },
        };
        for record in stale {
            match self.provider.get_transaction_status(&record.provider_tx_id).await {
                Ok(tx) => match tx.status {
                    PaymentStatusType::Completed => {
                        let confirmed = self
                            .api
                            .confirm_payment(record.order_id, &record.provider_tx_id, ConfirmationSource::ApiSync, &Actor::System)
                            .await;
                        match confirmed {
                            Ok(_) => {
                                if let Err(e) = self
                                    .api
                                    .db()
                                    .mark_payment_record(record.id, PaymentStatusType::Completed, Some(&tx.raw))
                                    .await
                                {
                                    warn!("🔁️ Payment record {} could not be finalised: {e}", record.id);
                                }
                                info!("🔁️ Sweep recovered a completed payment for order {}", record.order_id);
                                report.payments_confirmed += 1;
                            },
                            Err(e) => {
                                error!("🔁️ Provider reports tx {} complete but confirmation failed: {e}", record.provider_tx_id);
                                report.errors += 1;
                            },
                        }
                    },
                    PaymentStatusType::Failed => {
                        if let Err(e) =
                            self.api.db().mark_payment_record(record.id, PaymentStatusType::Failed, Some(&tx.raw)).await
                        {
                            warn!("🔁️ Payment record {} could not be marked failed: {e}", record.id);
                            report.errors += 1;
                        } else {
                            report.payments_failed += 1;
                        }
                    },
                    PaymentStatusType::Pending | PaymentStatusType::Expired => {
                        // Still unresolved after the expiry window. Close it out; a late webhook for the order will
                        // still be honoured via the idempotent confirmation path.
                        if let Err(e) =
                            self.api.db().mark_payment_record(record.id, PaymentStatusType::Expired, Some(&tx.raw)).await
                        {
                            warn!("🔁️ Payment record {} could not be expired: {e}", record.id);
                            report.errors += 1;
                        } else {
                            info!("🔁️ Payment record {} for order {} expired", record.id, record.order_id);
                            report.payments_expired += 1;
                        }
                    },
                },
                Err(PaymentProviderError::UnknownTransaction(txid)) => {
                    warn!("🔁️ Provider has no record of tx {txid}. Expiring payment record {}.", record.id);
                    if let Err(e) = self.api.db().mark_payment_record(record.id, PaymentStatusType::Expired, None).await
                    {
                        warn!("🔁️ Payment record {} could not be expired: {e}", record.id);
                        report.errors += 1;
                    } else {
                        report.payments_expired += 1;
                    }
                },
                Err(e) => {
                    warn!("🔁️ Could not query tx {}: {e}. Will retry next sweep.", record.provider_tx_id);
                    report.errors += 1;
                },
            }
        }
    }
}
