use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Income,
    Expense,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Income => "income",
            Kind::Expense => "expense",
        }
    }

    /// Stored kinds are plain text; anything else is a malformed row the
    /// aggregators skip rather than abort on.
    pub fn parse(raw: &str) -> Option<Kind> {
        match raw {
            "income" => Some(Kind::Income),
            "expense" => Some(Kind::Expense),
            _ => None,
        }
    }
}

pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Converts a positive decimal amount from the API into integer cents.
/// Rejects non-finite, non-positive, and absurdly large values.
pub fn cents_from_amount(amount: f64) -> Option<i64> {
    if amount <= 0.0 {
        return None;
    }
    cents_from_progress(amount)
}

/// Same bounds, but zero is allowed. Used for goal progress updates.
pub fn cents_from_progress(amount: f64) -> Option<i64> {
    if !amount.is_finite() || amount < 0.0 || amount > 1_000_000_000.0 {
        return None;
    }
    Some((amount * 100.0).round() as i64)
}

// --- database records ---

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub settings: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: Kind,
    pub color: String,
    pub icon: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: String,
    /// Raw kind text from storage; parsed (and possibly rejected) at the
    /// point of use.
    pub kind: String,
    pub amount_cents: i64,
    pub category_id: String,
    pub description: String,
    pub occurred_at: String,
    pub is_recurring: bool,
    pub recurring_frequency: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct BudgetRecord {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub category_name: String,
    pub amount_cents: i64,
    pub period: String,
    pub starts_on: String,
    pub ends_on: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct GoalRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub target_cents: i64,
    pub current_cents: i64,
    pub target_on: String,
    pub description: String,
    pub created_at: String,
}

// --- request payloads ---

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryCreate {
    pub name: String,
    pub kind: Kind,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_icon")]
    pub icon: String,
}

fn default_color() -> String {
    "#3B82F6".to_string()
}

fn default_icon() -> String {
    "💰".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TransactionCreate {
    pub amount: f64,
    pub kind: Kind,
    pub category_id: String,
    pub description: String,
    pub occurred_at: String,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_frequency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BudgetCreate {
    pub category_id: String,
    pub amount: f64,
    #[serde(default = "default_budget_period")]
    pub period: String,
    pub starts_on: String,
    pub ends_on: String,
}

fn default_budget_period() -> String {
    "monthly".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GoalCreate {
    pub title: String,
    pub target_amount: f64,
    pub target_on: String,
    #[serde(default)]
    pub description: String,
}

// --- response views ---

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: String,
    pub settings: serde_json::Value,
}

impl UserView {
    pub fn from_record(record: &UserRecord) -> UserView {
        UserView {
            id: record.id.clone(),
            email: record.email.clone(),
            name: record.name.clone(),
            created_at: record.created_at.clone(),
            settings: serde_json::from_str(&record.settings)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserView,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: String,
    pub kind: String,
    pub amount: String,
    pub category_id: String,
    pub category_name: Option<String>,
    pub category_icon: Option<String>,
    pub description: String,
    pub occurred_at: String,
    pub is_recurring: bool,
    pub recurring_frequency: Option<String>,
    pub created_at: String,
}

pub fn transaction_view(
    record: &TransactionRecord,
    category: Option<&CategoryRecord>,
) -> TransactionView {
    TransactionView {
        id: record.id.clone(),
        kind: record.kind.clone(),
        amount: format_money(record.amount_cents),
        category_id: record.category_id.clone(),
        category_name: category.map(|c| c.name.clone()),
        category_icon: category.map(|c| c.icon.clone()),
        description: record.description.clone(),
        occurred_at: record.occurred_at.clone(),
        is_recurring: record.is_recurring,
        recurring_frequency: record.recurring_frequency.clone(),
        created_at: record.created_at.clone(),
    }
}

#[derive(Debug, Serialize)]
pub struct BudgetView {
    pub id: String,
    pub category_id: String,
    pub category_name: String,
    pub amount: String,
    pub period: String,
    pub starts_on: String,
    pub ends_on: String,
    pub created_at: String,
}

pub fn budget_view(record: BudgetRecord) -> BudgetView {
    BudgetView {
        id: record.id,
        category_id: record.category_id,
        category_name: record.category_name,
        amount: format_money(record.amount_cents),
        period: record.period,
        starts_on: record.starts_on,
        ends_on: record.ends_on,
        created_at: record.created_at,
    }
}

#[derive(Debug, Serialize)]
pub struct GoalView {
    pub id: String,
    pub title: String,
    pub target_amount: String,
    pub current_amount: String,
    pub target_on: String,
    pub description: String,
    pub created_at: String,
}

pub fn goal_view(record: GoalRecord) -> GoalView {
    GoalView {
        id: record.id,
        title: record.title,
        target_amount: format_money(record.target_cents),
        current_amount: format_money(record.current_cents),
        target_on: record.target_on,
        description: record.description,
        created_at: record.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_money_pads_cents() {
        assert_eq!(format_money(0), "0.00");
        assert_eq!(format_money(5), "0.05");
        assert_eq!(format_money(100_000), "1000.00");
        assert_eq!(format_money(-25_050), "-250.50");
    }

    #[test]
    fn cents_from_amount_rejects_bad_input() {
        assert_eq!(cents_from_amount(12.34), Some(1234));
        assert_eq!(cents_from_amount(0.005), Some(1));
        assert_eq!(cents_from_amount(0.0), None);
        assert_eq!(cents_from_amount(-5.0), None);
        assert_eq!(cents_from_amount(f64::NAN), None);
        assert_eq!(cents_from_amount(f64::INFINITY), None);
        assert_eq!(cents_from_amount(1e18), None);
    }

    #[test]
    fn cents_from_progress_allows_zero_but_stays_bounded() {
        assert_eq!(cents_from_progress(0.0), Some(0));
        assert_eq!(cents_from_progress(1250.5), Some(125_050));
        assert_eq!(cents_from_progress(-0.01), None);
        assert_eq!(cents_from_progress(1e18), None);
        assert_eq!(cents_from_progress(f64::NAN), None);
    }

    #[test]
    fn kind_parse_rejects_unknown_text() {
        assert_eq!(Kind::parse("income"), Some(Kind::Income));
        assert_eq!(Kind::parse("expense"), Some(Kind::Expense));
        assert_eq!(Kind::parse("transfer"), None);
        assert_eq!(Kind::parse(""), None);
    }
}
