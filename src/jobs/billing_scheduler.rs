//! Billing scheduler.
//!
//! Two jobs share one loop:
//! 1. Monthly at 00:00 UTC on the 1st: generate cycles for the month that just
//!    ended, then mark $0 cycles paid.
//! 2. Daily at `daily_sweep_hour` UTC: move unpaid cycles past their grace
//!    period to overdue.
//!
//! Generation also runs once at startup, and after a failed generation every
//! later tick (daily included) retries it until it succeeds. Each run starts
//! from the most recently billed month, so months missed while the process
//! was down or while the store was failing are still generated. A failed
//! sweep is logged and counted and the next daily tick runs it again.
//!
//! ```toml
//! [billing.scheduler]
//! enabled = true
//! daily_sweep_hour = 1
//! ```

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    config::SchedulerConfig, models::BillingPeriod, observability::metrics,
    services::BillingService,
};

/// Next monthly fire strictly after `after`: midnight on the 1st.
pub fn next_monthly_run(after: DateTime<Utc>) -> DateTime<Utc> {
    BillingPeriod::containing(after).end
}

/// Next daily fire strictly after `after`, at `hour`:00 UTC.
pub fn next_daily_run(after: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = after.date_naive().and_time(time).and_utc();
    if today > after {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Run the monthly jobs for a fire at `at`. Returns false when generation
/// failed and must be retried.
pub async fn run_monthly(billing: &BillingService, at: DateTime<Utc>) -> bool {
    let generated = match billing.generate_outstanding(at).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "Monthly billing generation failed");
            metrics::record_billing_job("generate", "failed");
            false
        }
    };

    // Auto-pay runs even after a partial generation: it only touches cycles
    // that exist.
    if let Err(e) = billing.auto_pay_zero_amount(at).await {
        tracing::error!(error = %e, "Zero-amount auto-pay failed");
        metrics::record_billing_job("autopay", "failed");
    }
    generated
}

/// Run the daily overdue sweep for a fire at `at`.
pub async fn run_daily(billing: &BillingService, at: DateTime<Utc>) {
    if let Err(e) = billing.sweep_overdue(at).await {
        tracing::error!(error = %e, "Overdue sweep failed");
        metrics::record_billing_job("overdue", "failed");
    }
}

/// Run the billing scheduler until `shutdown` is cancelled.
pub async fn start_billing_scheduler(
    billing: BillingService,
    config: SchedulerConfig,
    shutdown: CancellationToken,
) {
    if !config.enabled {
        tracing::info!("Billing scheduler disabled by configuration");
        return;
    }

    tracing::info!(
        daily_sweep_hour = config.daily_sweep_hour,
        "Starting billing scheduler"
    );

    let mut after = Utc::now();
    let mut generation_pending = !run_monthly(&billing, after).await;
    loop {
        let monthly = next_monthly_run(after);
        let daily = next_daily_run(after, config.daily_sweep_hour);
        let next = monthly.min(daily);
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tracing::debug!(next = %next, "Billing scheduler sleeping");

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Billing scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // Generation first so the sweep sees this month's cycles.
        if next == monthly || generation_pending {
            generation_pending = !run_monthly(&billing, next).await;
        }
        if next == daily {
            run_daily(&billing, next).await;
        }
        after = next;
    }
}
