use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a billing cycle.
///
/// Transitions are one-way: `Pending → Paid`, `Pending → Overdue`,
/// `Overdue → Paid`. Nothing ever leaves `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Pending,
    Paid,
    Overdue,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Pending => "pending",
            BillingStatus::Paid => "paid",
            BillingStatus::Overdue => "overdue",
        }
    }

    pub fn can_transition_to(&self, next: BillingStatus) -> bool {
        matches!(
            (self, next),
            (BillingStatus::Pending, BillingStatus::Paid)
                | (BillingStatus::Pending, BillingStatus::Overdue)
                | (BillingStatus::Overdue, BillingStatus::Paid)
        )
    }
}

impl fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BillingStatus::Pending),
            "paid" => Ok(BillingStatus::Paid),
            "overdue" => Ok(BillingStatus::Overdue),
            other => Err(format!("unknown billing status '{other}'")),
        }
    }
}

/// A calendar month as the half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    /// The month `year-month`. Returns `None` for an invalid month.
    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        let start = month_start(year, month)?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let end = month_start(next_year, next_month)?;
        Some(Self { start, end })
    }

    /// The month containing `at`.
    pub fn containing(at: DateTime<Utc>) -> Self {
        // A valid timestamp always has a valid year and month.
        Self::for_month(at.year(), at.month()).unwrap_or(Self { start: at, end: at })
    }

    /// The calendar month before the one containing `now`.
    pub fn previous(now: DateTime<Utc>) -> Self {
        let current = Self::containing(now);
        Self::containing(current.start - Duration::seconds(1))
    }

    /// The calendar month after this one.
    pub fn next(&self) -> Self {
        Self::containing(self.end)
    }

    /// Parse `YYYY-MM`.
    pub fn parse_year_month(s: &str) -> Option<Self> {
        let (year, month) = s.split_once('-')?;
        Self::for_month(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.format("%Y-%m"))
    }
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// One invoice for one tenant over one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingCycle {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_requests: i64,
    pub total_amount: Decimal,
    pub status: BillingStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingCycle {
    /// Payment is due `grace_days` after the period ends.
    pub fn due_date(&self, grace_days: u32) -> DateTime<Utc> {
        self.period_end + Duration::days(i64::from(grace_days))
    }

    /// Whole days elapsed since the due date; negative before it.
    pub fn days_past_due(&self, grace_days: u32, now: DateTime<Utc>) -> i64 {
        (now - self.due_date(grace_days)).num_days()
    }
}

#[derive(Debug, Clone)]
pub struct CreateBillingCycle {
    pub organization_id: Uuid,
    pub period: BillingPeriod,
    pub total_requests: i64,
    pub total_amount: Decimal,
}
