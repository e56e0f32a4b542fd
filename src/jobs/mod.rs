//! Background jobs.
//!
//! - **Billing scheduler**: monthly cycle generation with $0 auto-pay, and the
//!   daily overdue sweep.
//!
//! Each job has a worker function that loops until its cancellation token
//! fires, and single-pass `run_*` functions the CLI reuses for one-off runs.

mod billing_scheduler;

pub use billing_scheduler::{
    next_daily_run, next_monthly_run, run_daily, run_monthly, start_billing_scheduler,
};
