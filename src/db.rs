use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Result, params, params_from_iter};

use crate::models::{
    BudgetRecord, CategoryRecord, GoalRecord, Kind, TransactionRecord, UserRecord,
};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Stock categories every new account starts with.
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str, &str)] = &[
    ("Salary", "income", "#10B981", "💰"),
    ("Freelance", "income", "#059669", "💼"),
    ("Investment Returns", "income", "#047857", "📈"),
    ("Bank Interest", "income", "#065F46", "🏦"),
    ("Cash Income", "income", "#064E3B", "💵"),
    ("Bonus", "income", "#34D399", "🎁"),
    ("Food & Dining", "expense", "#EF4444", "🍕"),
    ("Transportation", "expense", "#F59E0B", "🚗"),
    ("Shopping", "expense", "#8B5CF6", "🛒"),
    ("Entertainment", "expense", "#EC4899", "🎬"),
    ("Bills & Utilities", "expense", "#6B7280", "⚡"),
    ("Healthcare", "expense", "#14B8A6", "🏥"),
    ("Gas & Fuel", "expense", "#F97316", "⛽"),
    ("Groceries", "expense", "#84CC16", "🛍️"),
    ("Rent/Mortgage", "expense", "#DC2626", "🏠"),
    ("Coffee & Drinks", "expense", "#A3A3A3", "☕"),
    ("Technology", "expense", "#3B82F6", "💻"),
    ("Cash Expenses", "expense", "#6366F1", "💳"),
];

pub fn init_db(path: &Path) -> DbPool {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::new(manager).expect("db pool");
    {
        let conn = pool.get().expect("db connection");
        run_migrations(&conn).expect("db migrations");
    }
    pool
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            settings TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            token TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('income', 'expense')),
            color TEXT NOT NULL,
            icon TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            category_id TEXT NOT NULL,
            description TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            is_recurring INTEGER NOT NULL DEFAULT 0,
            recurring_frequency TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_user_date
            ON transactions(user_id, occurred_at);

        CREATE TABLE IF NOT EXISTS budgets (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            category_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            period TEXT NOT NULL CHECK(period IN ('weekly', 'monthly', 'yearly')),
            starts_on TEXT NOT NULL,
            ends_on TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS goals (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            target_cents INTEGER NOT NULL,
            current_cents INTEGER NOT NULL DEFAULT 0,
            target_on TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );
        ",
    )?;
    Ok(())
}

// --- users & sessions ---

pub fn insert_user(conn: &Connection, user: &UserRecord) -> Result<()> {
    conn.execute(
        "
        INSERT INTO users (id, email, name, password_hash, settings, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
        params![
            user.id,
            user.email,
            user.name,
            user.password_hash,
            user.settings,
            user.created_at
        ],
    )?;
    Ok(())
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
        params![email],
        |row| row.get::<_, i64>(0),
    )
    .map(|value| value == 1)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        settings: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, email, name, password_hash, settings, created_at
        FROM users
        WHERE email = ?1
        ",
    )?;
    let mut rows = stmt.query(params![email])?;
    match rows.next()? {
        Some(row) => Ok(Some(user_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn create_session(conn: &Connection, user_id: &str, token: &str, created_at: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (user_id, token, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, token, created_at],
    )?;
    Ok(())
}

pub fn user_by_token(conn: &Connection, token: &str) -> Result<Option<UserRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT u.id, u.email, u.name, u.password_hash, u.settings, u.created_at
        FROM sessions s
        JOIN users u ON s.user_id = u.id
        WHERE s.token = ?1
        ",
    )?;
    let mut rows = stmt.query(params![token])?;
    match rows.next()? {
        Some(row) => Ok(Some(user_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

pub fn prune_sessions(conn: &Connection, user_id: &str, keep: i64) -> Result<()> {
    conn.execute(
        "
        DELETE FROM sessions
        WHERE user_id = ?1
          AND id NOT IN (
            SELECT id
            FROM sessions
            WHERE user_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
          )
        ",
        params![user_id, keep],
    )?;
    Ok(())
}

// --- categories ---

fn category_from_row(row: &rusqlite::Row<'_>) -> Result<CategoryRecord> {
    let kind: String = row.get(3)?;
    Ok(CategoryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        kind: Kind::parse(&kind).unwrap_or(Kind::Expense),
        color: row.get(4)?,
        icon: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn list_categories(conn: &Connection, user_id: &str) -> Result<Vec<CategoryRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, user_id, name, kind, color, icon, created_at
        FROM categories
        WHERE user_id = ?1
        ORDER BY kind, name
        ",
    )?;
    let rows = stmt.query_map(params![user_id], |row| category_from_row(row))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_category(conn: &Connection, category: &CategoryRecord) -> Result<()> {
    conn.execute(
        "
        INSERT INTO categories (id, user_id, name, kind, color, icon, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
        params![
            category.id,
            category.user_id,
            category.name,
            category.kind.as_str(),
            category.color,
            category.icon,
            category.created_at
        ],
    )?;
    Ok(())
}

pub fn category_by_id(
    conn: &Connection,
    user_id: &str,
    category_id: &str,
) -> Result<Option<CategoryRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, user_id, name, kind, color, icon, created_at
        FROM categories
        WHERE id = ?1 AND user_id = ?2
        ",
    )?;
    let mut rows = stmt.query(params![category_id, user_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(category_from_row(row)?)),
        None => Ok(None),
    }
}

/// Deletes a category together with its transactions and budgets.
/// Returns false when the category does not exist or belongs to someone else.
pub fn delete_category_cascade(
    conn: &Connection,
    user_id: &str,
    category_id: &str,
) -> Result<bool> {
    let owned = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1 AND user_id = ?2)",
            params![category_id, user_id],
            |row| row.get::<_, i64>(0),
        )?
        == 1;
    if !owned {
        return Ok(false);
    }
    conn.execute(
        "DELETE FROM transactions WHERE category_id = ?1 AND user_id = ?2",
        params![category_id, user_id],
    )?;
    conn.execute(
        "DELETE FROM budgets WHERE category_id = ?1 AND user_id = ?2",
        params![category_id, user_id],
    )?;
    conn.execute(
        "DELETE FROM categories WHERE id = ?1 AND user_id = ?2",
        params![category_id, user_id],
    )?;
    Ok(true)
}

// --- transactions ---

#[derive(Debug, Default)]
pub struct TransactionFilter {
    pub category_id: Option<String>,
    pub kind: Option<Kind>,
    /// Inclusive lower bound, formatted with `time::fmt_ts`.
    pub start: Option<String>,
    /// Exclusive upper bound, same format.
    pub end: Option<String>,
    pub limit: i64,
    pub skip: i64,
}

fn transaction_from_row(row: &rusqlite::Row<'_>) -> Result<TransactionRecord> {
    Ok(TransactionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        amount_cents: row.get(3)?,
        category_id: row.get(4)?,
        description: row.get(5)?,
        occurred_at: row.get(6)?,
        is_recurring: row.get::<_, i64>(7)? != 0,
        recurring_frequency: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const TRANSACTION_COLUMNS: &str = "id, user_id, kind, amount_cents, category_id, description, \
     occurred_at, is_recurring, recurring_frequency, created_at";

pub fn list_transactions(
    conn: &Connection,
    user_id: &str,
    filter: &TransactionFilter,
) -> Result<Vec<TransactionRecord>> {
    let mut sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = ?1"
    );
    let mut values: Vec<String> = vec![user_id.to_string()];

    if let Some(category_id) = &filter.category_id {
        values.push(category_id.clone());
        sql.push_str(&format!(" AND category_id = ?{}", values.len()));
    }
    if let Some(kind) = filter.kind {
        values.push(kind.as_str().to_string());
        sql.push_str(&format!(" AND kind = ?{}", values.len()));
    }
    if let Some(start) = &filter.start {
        values.push(start.clone());
        sql.push_str(&format!(" AND occurred_at >= ?{}", values.len()));
    }
    if let Some(end) = &filter.end {
        values.push(end.clone());
        sql.push_str(&format!(" AND occurred_at < ?{}", values.len()));
    }

    let limit = filter.limit.clamp(1, 1000);
    let skip = filter.skip.max(0);
    sql.push_str(&format!(
        " ORDER BY occurred_at DESC, id DESC LIMIT {limit} OFFSET {skip}"
    ));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        transaction_from_row(row)
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// All of an owner's transactions in `[start, end)`, for aggregation.
pub fn transactions_in_window(
    conn: &Connection,
    user_id: &str,
    start: &str,
    end: &str,
) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {TRANSACTION_COLUMNS}
        FROM transactions
        WHERE user_id = ?1 AND occurred_at >= ?2 AND occurred_at < ?3
        ORDER BY occurred_at ASC, id ASC
        "
    ))?;
    let rows = stmt.query_map(params![user_id, start, end], |row| {
        transaction_from_row(row)
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Full history oldest first, used by the CSV export.
pub fn all_transactions(conn: &Connection, user_id: &str) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {TRANSACTION_COLUMNS}
        FROM transactions
        WHERE user_id = ?1
        ORDER BY occurred_at ASC, id ASC
        "
    ))?;
    let rows = stmt.query_map(params![user_id], |row| transaction_from_row(row))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn transaction_by_id(
    conn: &Connection,
    user_id: &str,
    id: &str,
) -> Result<Option<TransactionRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1 AND user_id = ?2"
    ))?;
    let mut rows = stmt.query(params![id, user_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(transaction_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn insert_transaction(conn: &Connection, tx: &TransactionRecord) -> Result<()> {
    conn.execute(
        "
        INSERT INTO transactions
            (id, user_id, kind, amount_cents, category_id, description,
             occurred_at, is_recurring, recurring_frequency, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ",
        params![
            tx.id,
            tx.user_id,
            tx.kind,
            tx.amount_cents,
            tx.category_id,
            tx.description,
            tx.occurred_at,
            tx.is_recurring as i64,
            tx.recurring_frequency,
            tx.created_at
        ],
    )?;
    Ok(())
}

pub fn update_transaction(conn: &Connection, tx: &TransactionRecord) -> Result<bool> {
    let changed = conn.execute(
        "
        UPDATE transactions
        SET kind = ?1, amount_cents = ?2, category_id = ?3, description = ?4,
            occurred_at = ?5, is_recurring = ?6, recurring_frequency = ?7
        WHERE id = ?8 AND user_id = ?9
        ",
        params![
            tx.kind,
            tx.amount_cents,
            tx.category_id,
            tx.description,
            tx.occurred_at,
            tx.is_recurring as i64,
            tx.recurring_frequency,
            tx.id,
            tx.user_id
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete_transaction(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(changed > 0)
}

// --- budgets ---

pub fn list_budgets(conn: &Connection, user_id: &str) -> Result<Vec<BudgetRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT b.id, b.user_id, b.category_id, COALESCE(c.name, 'Unknown'),
               b.amount_cents, b.period, b.starts_on, b.ends_on, b.created_at
        FROM budgets b
        LEFT JOIN categories c ON b.category_id = c.id
        WHERE b.user_id = ?1
        ORDER BY b.starts_on DESC, c.name
        ",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(BudgetRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            category_id: row.get(2)?,
            category_name: row.get(3)?,
            amount_cents: row.get(4)?,
            period: row.get(5)?,
            starts_on: row.get(6)?,
            ends_on: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_budget(conn: &Connection, budget: &BudgetRecord) -> Result<()> {
    conn.execute(
        "
        INSERT INTO budgets
            (id, user_id, category_id, amount_cents, period, starts_on, ends_on, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
        params![
            budget.id,
            budget.user_id,
            budget.category_id,
            budget.amount_cents,
            budget.period,
            budget.starts_on,
            budget.ends_on,
            budget.created_at
        ],
    )?;
    Ok(())
}

pub fn delete_budget(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM budgets WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(changed > 0)
}

// --- goals ---

pub fn list_goals(conn: &Connection, user_id: &str) -> Result<Vec<GoalRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, user_id, title, target_cents, current_cents, target_on, description, created_at
        FROM goals
        WHERE user_id = ?1
        ORDER BY target_on ASC, created_at ASC
        ",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(GoalRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            target_cents: row.get(3)?,
            current_cents: row.get(4)?,
            target_on: row.get(5)?,
            description: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_goal(conn: &Connection, goal: &GoalRecord) -> Result<()> {
    conn.execute(
        "
        INSERT INTO goals
            (id, user_id, title, target_cents, current_cents, target_on, description, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
        params![
            goal.id,
            goal.user_id,
            goal.title,
            goal.target_cents,
            goal.current_cents,
            goal.target_on,
            goal.description,
            goal.created_at
        ],
    )?;
    Ok(())
}

pub fn update_goal_progress(
    conn: &Connection,
    user_id: &str,
    id: &str,
    current_cents: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE goals SET current_cents = ?1 WHERE id = ?2 AND user_id = ?3",
        params![current_cents, id, user_id],
    )?;
    Ok(changed > 0)
}

pub fn delete_goal(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM goals WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(changed > 0)
}
