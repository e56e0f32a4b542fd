//! Usage-based billing.
//!
//! Cycle generation runs once a month for the previous calendar month, plus
//! any earlier month a failed or missed run left behind. A follow-up sweep marks zero-amount cycles paid, and a daily sweep moves
//! unpaid cycles past their grace period to overdue.
//!
//! None of the sweeps take a lock. Generation checks for an existing cycle
//! before inserting and the store's unique `(organization_id, period_start)`
//! constraint rejects a concurrent duplicate; status transitions are guarded
//! in the update itself. Any store error aborts the run so the next run picks
//! up where this one stopped.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::BillingConfig,
    db::{DbError, DbPool, ListParams, TimeRange},
    models::{
        BillingCycle, BillingPeriod, BillingStatus, CreateBillingCycle, EndpointUsage,
        Organization, Plan,
    },
    observability::metrics,
};

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Organization {0} not found")]
    OrganizationNotFound(Uuid),

    #[error("Organization is already on the {0} plan")]
    SamePlan(Plan),
}

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    /// Calendar months processed.
    pub periods: usize,
    pub tenants_scanned: usize,
    pub cycles_created: usize,
    /// Tenants that already had a cycle for the period.
    pub already_generated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverdueReport {
    pub marked_overdue: usize,
    /// Overdue cycles past the suspension threshold. Logged only.
    pub suspension_candidates: Vec<Uuid>,
}

/// Month-to-date usage and what it would cost today.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentBill {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub plan: Plan,
    pub total_requests: i64,
    pub estimated_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    #[serde(flatten)]
    pub cycle: BillingCycle,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BillingSummary {
    pub total_billed: Decimal,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingHistory {
    pub invoices: Vec<Invoice>,
    pub summary: BillingSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_requests: i64,
    pub successful_requests: i64,
    pub failed_requests: i64,
    pub by_endpoint: Vec<EndpointUsage>,
}

#[derive(Clone)]
pub struct BillingService {
    db: Arc<DbPool>,
    config: BillingConfig,
}

impl BillingService {
    pub fn new(db: Arc<DbPool>, config: BillingConfig) -> Self {
        Self { db, config }
    }

    /// Generate every month that may still lack cycles, up to and including
    /// the month before `now`.
    ///
    /// Starts from the most recent month that has any cycle, which a failed
    /// run may have left half done, or from the previous month when nothing
    /// has been billed yet. Months are processed oldest first and the first
    /// error stops the run, so a later run resumes at the same month.
    pub async fn generate_outstanding(
        &self,
        now: DateTime<Utc>,
    ) -> BillingResult<GenerationReport> {
        let last = BillingPeriod::previous(now);
        let mut period = match self.db.billing_cycles().latest_period_start().await? {
            Some(start) if start < last.start => BillingPeriod::containing(start),
            _ => last,
        };

        let mut report = GenerationReport::default();
        loop {
            let month = self.generate_cycles(period).await?;
            report.periods += month.periods;
            report.tenants_scanned += month.tenants_scanned;
            report.cycles_created += month.cycles_created;
            report.already_generated += month.already_generated;

            let next = period.next();
            if period.start >= last.start || next.start <= period.start {
                break;
            }
            period = next;
        }

        if report.periods > 1 {
            tracing::info!(
                periods = report.periods,
                created = report.cycles_created,
                "Caught up on missed billing periods"
            );
        }
        Ok(report)
    }

    /// Create a pending cycle for every tenant that lacks one for `period`.
    #[tracing::instrument(name = "billing.generate", skip(self, period), fields(period = %period))]
    pub async fn generate_cycles(&self, period: BillingPeriod) -> BillingResult<GenerationReport> {
        let organizations = self.db.organizations();
        let page_size = i64::from(self.config.page_size);
        let mut report = GenerationReport {
            periods: 1,
            ..Default::default()
        };
        let mut offset = 0;

        loop {
            let page = organizations
                .list(ListParams::page(page_size, offset))
                .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;

            for org in &page {
                report.tenants_scanned += 1;
                if self.generate_for_org(org, period).await? {
                    report.cycles_created += 1;
                } else {
                    report.already_generated += 1;
                }
            }
        }

        tracing::info!(
            tenants = report.tenants_scanned,
            created = report.cycles_created,
            existing = report.already_generated,
            "Billing cycle generation complete"
        );
        Ok(report)
    }

    /// Returns true when a cycle was created.
    async fn generate_for_org(
        &self,
        org: &Organization,
        period: BillingPeriod,
    ) -> BillingResult<bool> {
        let cycles = self.db.billing_cycles();
        if cycles.find_for_period(org.id, period.start).await?.is_some() {
            metrics::record_billing_job("generate", "exists");
            return Ok(false);
        }

        let total_requests = self.db.usage().count_for_org(org.id, period.into()).await?;
        let total_amount = self.config.pricing.amount_for(org.plan, total_requests);

        let created = cycles
            .create(CreateBillingCycle {
                organization_id: org.id,
                period,
                total_requests,
                total_amount,
            })
            .await;

        match created {
            Ok(cycle) => {
                metrics::record_billing_job("generate", "created");
                tracing::info!(
                    org_id = %org.id,
                    cycle_id = %cycle.id,
                    plan = %org.plan,
                    total_requests,
                    total_amount = %total_amount,
                    "Created billing cycle"
                );
                Ok(true)
            }
            // Another run inserted it between our check and insert.
            Err(DbError::Conflict(_)) => {
                metrics::record_billing_job("generate", "exists");
                Ok(false)
            }
            Err(e) => {
                metrics::record_billing_job("generate", "error");
                tracing::error!(org_id = %org.id, error = %e, "Failed to create billing cycle");
                Err(e.into())
            }
        }
    }

    /// Mark every pending zero-amount cycle paid. No payment is ever
    /// requested for a zero invoice.
    #[tracing::instrument(name = "billing.autopay", skip(self))]
    pub async fn auto_pay_zero_amount(&self, now: DateTime<Utc>) -> BillingResult<usize> {
        let cycles = self.db.billing_cycles();
        let mut paid = 0;

        for cycle in cycles.list_by_status(BillingStatus::Pending).await? {
            if !cycle.total_amount.is_zero() {
                continue;
            }
            if cycles.mark_paid(cycle.id, now).await? {
                paid += 1;
                metrics::record_billing_job("autopay", "paid");
                tracing::debug!(
                    cycle_id = %cycle.id,
                    org_id = %cycle.organization_id,
                    "Auto-paid zero-amount cycle"
                );
            }
        }

        tracing::info!(paid, "Zero-amount auto-pay complete");
        Ok(paid)
    }

    /// Move pending cycles past their due date to overdue, and report
    /// overdue cycles past the suspension threshold.
    #[tracing::instrument(name = "billing.sweep_overdue", skip(self))]
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> BillingResult<OverdueReport> {
        let cycles = self.db.billing_cycles();
        let grace = self.config.grace_period_days;
        let mut report = OverdueReport::default();

        for cycle in cycles.list_by_status(BillingStatus::Pending).await? {
            if now <= cycle.due_date(grace) {
                continue;
            }
            if cycles.mark_overdue(cycle.id).await? {
                report.marked_overdue += 1;
                metrics::record_billing_job("overdue", "marked");
                tracing::info!(
                    cycle_id = %cycle.id,
                    org_id = %cycle.organization_id,
                    amount = %cycle.total_amount,
                    "Billing cycle is overdue"
                );
            }
        }

        let threshold = i64::from(self.config.suspension_threshold_days);
        for cycle in cycles.list_by_status(BillingStatus::Overdue).await? {
            let days = cycle.days_past_due(grace, now);
            if days > threshold {
                metrics::record_billing_job("overdue", "suspension_candidate");
                tracing::warn!(
                    cycle_id = %cycle.id,
                    org_id = %cycle.organization_id,
                    days_past_due = days,
                    "Tenant is a suspension candidate"
                );
                report.suspension_candidates.push(cycle.id);
            }
        }

        tracing::info!(
            marked = report.marked_overdue,
            suspension_candidates = report.suspension_candidates.len(),
            "Overdue sweep complete"
        );
        Ok(report)
    }

    /// Usage so far in the month containing `now`, priced on the tenant's
    /// current plan.
    pub async fn calculate_current(
        &self,
        org_id: Uuid,
        now: DateTime<Utc>,
    ) -> BillingResult<CurrentBill> {
        let org = self.organization(org_id).await?;
        let period = BillingPeriod::containing(now);
        let total_requests = self.db.usage().count_for_org(org_id, period.into()).await?;

        Ok(CurrentBill {
            period_start: period.start,
            period_end: period.end,
            plan: org.plan,
            total_requests,
            estimated_amount: self.config.pricing.amount_for(org.plan, total_requests),
        })
    }

    /// All cycles of the tenant, newest first, with due dates and totals.
    pub async fn history(&self, org_id: Uuid) -> BillingResult<BillingHistory> {
        let cycles = self.db.billing_cycles().list_by_org(org_id).await?;
        let grace = self.config.grace_period_days;

        let mut summary = BillingSummary::default();
        let invoices = cycles
            .into_iter()
            .map(|cycle| {
                summary.total_billed += cycle.total_amount;
                match cycle.status {
                    BillingStatus::Paid => summary.total_paid += cycle.total_amount,
                    BillingStatus::Pending | BillingStatus::Overdue => {
                        summary.outstanding += cycle.total_amount
                    }
                }
                Invoice {
                    due_date: cycle.due_date(grace),
                    cycle,
                }
            })
            .collect();

        Ok(BillingHistory { invoices, summary })
    }

    /// Per-endpoint usage in `[start, end)`. Defaults to the 30 days before `now`.
    pub async fn usage_report(
        &self,
        org_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> BillingResult<UsageReport> {
        let end = end.unwrap_or(now);
        let start = start
            .or_else(|| end.checked_sub_signed(Duration::days(30)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let by_endpoint = self
            .db
            .usage()
            .summary_by_endpoint(org_id, TimeRange::new(start, end))
            .await?;

        let (total, success, errors) = by_endpoint.iter().fold((0, 0, 0), |acc, e| {
            (
                acc.0 + e.total_requests,
                acc.1 + e.success_count,
                acc.2 + e.error_count,
            )
        });

        Ok(UsageReport {
            start,
            end,
            total_requests: total,
            successful_requests: success,
            failed_requests: errors,
            by_endpoint,
        })
    }

    /// Switch the tenant to `plan`. Takes effect for the next generated cycle.
    pub async fn change_plan(&self, org_id: Uuid, plan: Plan) -> BillingResult<Organization> {
        let org = self.organization(org_id).await?;
        if org.plan == plan {
            return Err(BillingError::SamePlan(plan));
        }
        let updated = self.db.organizations().update_plan(org_id, plan).await?;
        tracing::info!(org_id = %org_id, from = %org.plan, to = %plan, "Plan changed");
        Ok(updated)
    }

    async fn organization(&self, org_id: Uuid) -> BillingResult<Organization> {
        self.db
            .organizations()
            .get_by_id(org_id)
            .await?
            .ok_or(BillingError::OrganizationNotFound(org_id))
    }
}
