//! Dashboard and spending-trend aggregation.
//!
//! Both aggregators are pure functions of (transactions, categories, now);
//! the clock is always passed in explicitly so windows are reproducible in
//! tests. All money math is integer cents, formatted only at the edge.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::Serialize;

use crate::error::ApiError;
use crate::models::{
    CategoryRecord, Kind, TransactionRecord, TransactionView, format_money, transaction_view,
};
use crate::time::parse_ts;

/// How many transactions the dashboard lists as "recent".
pub const RECENT_LIMIT: usize = 5;
pub const DEFAULT_TREND_MONTHS: i64 = 6;
pub const MAX_TREND_MONTHS: i64 = 24;

/// Fallback display metadata for transactions whose category no longer
/// resolves. Folding them into one entry keeps the breakdown summing to
/// total expenses.
const UNKNOWN_NAME: &str = "Unknown";
const UNKNOWN_COLOR: &str = "#9CA3AF";
const UNKNOWN_ICON: &str = "❓";

/// Half-open aggregation interval `[start, end)` in UTC. Derived per
/// request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Last24Hours,
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
}

impl Period {
    pub fn parse(token: &str) -> Result<Period, ApiError> {
        match token {
            "24h" => Ok(Period::Last24Hours),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "3months" => Ok(Period::ThreeMonths),
            "6months" => Ok(Period::SixMonths),
            "year" => Ok(Period::Year),
            _ => Err(ApiError::InvalidPeriod),
        }
    }

    /// Resolves the token to a concrete window ending at `now` (exclusive).
    /// `month`/`3months`/`6months` are calendar-aligned to the first instant
    /// of a month; `24h`/`week`/`year` are rolling offsets from `now`.
    pub fn resolve(self, now: DateTime<Utc>) -> Window {
        let start = match self {
            Period::Last24Hours => now - Duration::hours(24),
            Period::Week => now - Duration::days(7),
            Period::Month => month_start(now),
            Period::ThreeMonths => months_before(month_start(now), 2),
            Period::SixMonths => months_before(month_start(now), 5),
            Period::Year => now - Duration::days(365),
        };
        Window { start, end: now }
    }

    pub fn label(self, window: &Window) -> String {
        match self {
            Period::Last24Hours => "Last 24 Hours".to_string(),
            Period::Week => "Last 7 Days".to_string(),
            Period::Month => window.start.format("%B %Y").to_string(),
            Period::ThreeMonths => {
                format!("Last 3 Months (from {})", window.start.format("%B %d, %Y"))
            }
            Period::SixMonths => {
                format!("Last 6 Months (from {})", window.start.format("%B %d, %Y"))
            }
            Period::Year => format!("Last Year (from {})", window.start.format("%B %d, %Y")),
        }
    }

    /// Trend bucket count implied by the token.
    pub fn trend_months(self) -> i64 {
        match self {
            Period::Last24Hours | Period::Week | Period::Month => 1,
            Period::ThreeMonths => 3,
            Period::SixMonths => 6,
            Period::Year => 12,
        }
    }
}

fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .with_day(1)
        .expect("first of month")
        .and_hms_opt(0, 0, 0)
        .expect("midnight")
        .and_utc()
}

fn months_before(ts: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    ts.checked_sub_months(Months::new(months))
        .expect("month arithmetic")
}

fn months_after(ts: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    ts.checked_add_months(Months::new(months))
        .expect("month arithmetic")
}

#[derive(Debug, Serialize)]
pub struct CategorySpend {
    pub category_id: String,
    pub category: String,
    pub amount: String,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardSnapshot {
    pub period: String,
    pub total_income: String,
    pub total_expenses: String,
    pub balance: String,
    /// `balance / total_income`; `null` when there is no income, never NaN.
    pub savings_rate: Option<f64>,
    pub category_spending: Vec<CategorySpend>,
    pub recent_transactions: Vec<TransactionView>,
    /// Malformed rows skipped during aggregation; non-zero values signal
    /// that totals exclude some records.
    pub skipped_records: u32,
}

#[derive(Debug, Serialize)]
pub struct TrendPoint {
    pub period: String,
    pub income: String,
    pub expenses: String,
    pub net: String,
}

fn parse_row(tx: &TransactionRecord) -> Option<Kind> {
    let kind = Kind::parse(&tx.kind);
    if kind.is_none() || tx.amount_cents < 0 {
        log::warn!(
            "skipping malformed transaction {} (kind={:?}, amount_cents={})",
            tx.id,
            tx.kind,
            tx.amount_cents
        );
        return None;
    }
    kind
}

/// Computes the dashboard snapshot for one owner's transactions inside a
/// resolved window. The caller is responsible for window-filtering the
/// transaction fetch; this function only transforms.
pub fn dashboard(
    period: Period,
    window: &Window,
    transactions: &[TransactionRecord],
    categories: &[CategoryRecord],
) -> DashboardSnapshot {
    let category_map: HashMap<&str, &CategoryRecord> =
        categories.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut valid: Vec<(&TransactionRecord, Kind)> = Vec::with_capacity(transactions.len());
    let mut skipped: u32 = 0;
    for tx in transactions {
        match parse_row(tx) {
            Some(kind) => valid.push((tx, kind)),
            None => skipped += 1,
        }
    }

    let mut total_income: i64 = 0;
    let mut total_expenses: i64 = 0;
    let mut spending: HashMap<&str, i64> = HashMap::new();

    for (tx, kind) in &valid {
        match kind {
            Kind::Income => total_income += tx.amount_cents,
            Kind::Expense => {
                total_expenses += tx.amount_cents;
                *spending.entry(tx.category_id.as_str()).or_insert(0) += tx.amount_cents;
            }
        }
    }

    let balance = total_income - total_expenses;
    let savings_rate = if total_income > 0 {
        Some(balance as f64 / total_income as f64)
    } else {
        None
    };

    let mut grouped: Vec<(&str, i64)> = spending.into_iter().collect();
    // Largest spend first; category id breaks ties so output is deterministic.
    grouped.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let category_spending: Vec<CategorySpend> = grouped
        .into_iter()
        .map(|(category_id, cents)| match category_map.get(category_id) {
            Some(category) => CategorySpend {
                category_id: category_id.to_string(),
                category: category.name.clone(),
                amount: format_money(cents),
                color: category.color.clone(),
                icon: category.icon.clone(),
            },
            None => CategorySpend {
                category_id: category_id.to_string(),
                category: UNKNOWN_NAME.to_string(),
                amount: format_money(cents),
                color: UNKNOWN_COLOR.to_string(),
                icon: UNKNOWN_ICON.to_string(),
            },
        })
        .collect();

    let mut recent: Vec<&TransactionRecord> = valid.iter().map(|(tx, _)| *tx).collect();
    recent.sort_by(|a, b| {
        b.occurred_at
            .cmp(&a.occurred_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    let recent_transactions = recent
        .into_iter()
        .take(RECENT_LIMIT)
        .map(|tx| transaction_view(tx, category_map.get(tx.category_id.as_str()).copied()))
        .collect();

    DashboardSnapshot {
        period: period.label(window),
        total_income: format_money(total_income),
        total_expenses: format_money(total_expenses),
        balance: format_money(balance),
        savings_rate,
        category_spending,
        recent_transactions,
        skipped_records: skipped,
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    window: Window,
    label: String,
}

/// `count` consecutive calendar-month buckets, oldest first, the last one
/// covering the month containing `now`. Callers validate `count` against
/// `1..=MAX_TREND_MONTHS` before calling.
fn month_buckets(count: i64, now: DateTime<Utc>) -> Vec<Bucket> {
    let first = months_before(month_start(now), (count - 1) as u32);
    (0..count)
        .map(|i| {
            let start = months_after(first, i as u32);
            let end = months_after(start, 1);
            Bucket {
                window: Window { start, end },
                label: start.format("%b %Y").to_string(),
            }
        })
        .collect()
}

/// Overall fetch window covering every trend bucket.
pub fn trend_window(months: i64, now: DateTime<Utc>) -> Result<Window, ApiError> {
    if !(1..=MAX_TREND_MONTHS).contains(&months) {
        return Err(ApiError::InvalidBucketCount);
    }
    let start = months_before(month_start(now), (months - 1) as u32);
    Ok(Window {
        start,
        end: months_after(month_start(now), 1),
    })
}

/// Buckets transactions into monthly income/expense/net points, oldest
/// first. Months without transactions still produce an all-zero point.
pub fn spending_trend(
    months: i64,
    now: DateTime<Utc>,
    transactions: &[TransactionRecord],
) -> Result<Vec<TrendPoint>, ApiError> {
    if !(1..=MAX_TREND_MONTHS).contains(&months) {
        return Err(ApiError::InvalidBucketCount);
    }

    let buckets = month_buckets(months, now);
    let first = buckets[0].window.start;
    let mut income = vec![0i64; buckets.len()];
    let mut expenses = vec![0i64; buckets.len()];

    for tx in transactions {
        let Some(kind) = parse_row(tx) else { continue };
        let Some(occurred) = parse_ts(&tx.occurred_at) else {
            log::warn!("skipping transaction {} with unparsable timestamp", tx.id);
            continue;
        };
        let idx = (occurred.year() - first.year()) * 12
            + (occurred.month() as i32 - first.month() as i32);
        if idx < 0 || idx as usize >= buckets.len() {
            continue;
        }
        match kind {
            Kind::Income => income[idx as usize] += tx.amount_cents,
            Kind::Expense => expenses[idx as usize] += tx.amount_cents,
        }
    }

    Ok(buckets
        .iter()
        .enumerate()
        .map(|(i, bucket)| TrendPoint {
            period: bucket.label.clone(),
            income: format_money(income[i]),
            expenses: format_money(expenses[i]),
            net: format_money(income[i] - expenses[i]),
        })
        .collect())
}
