use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use password_hash::SaltString;
use rand_core::OsRng;
use rocket::http::{ContentType, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::{State, catch, catchers, delete, get, post, put, routes};
use uuid::Uuid;

use crate::analytics::{self, DEFAULT_TREND_MONTHS, DashboardSnapshot, Period, TrendPoint};
use crate::db::{self, DbPool, TransactionFilter};
use crate::error::ApiError;
use crate::models::{
    AuthResponse, BudgetCreate, BudgetRecord, BudgetView, CategoryCreate, CategoryRecord,
    GoalCreate, GoalRecord, GoalView, Kind, LoginRequest, RegisterRequest, TransactionCreate,
    TransactionRecord, TransactionView, UserRecord, UserView, budget_view, cents_from_amount,
    cents_from_progress, format_money, goal_view, transaction_view,
};
use crate::time::{fmt_ts, parse_ts_param};

const MAX_SESSIONS: i64 = 5;
const DEFAULT_PAGE_LIMIT: i64 = 100;

pub fn api_routes() -> Vec<rocket::Route> {
    routes![
        register,
        login,
        logout,
        me,
        list_categories,
        add_category,
        remove_category,
        list_transactions,
        add_transaction,
        edit_transaction,
        remove_transaction,
        export_transactions,
        list_budgets,
        add_budget,
        remove_budget,
        list_goals,
        add_goal,
        set_goal_progress,
        remove_goal,
        analytics_dashboard,
        analytics_spending_trend,
    ]
}

pub fn api_catchers() -> Vec<rocket::Catcher> {
    catchers![
        bad_request,
        unauthorized,
        not_found,
        unprocessable,
        internal,
        unavailable
    ]
}

// --- authentication ---

/// Request guard resolving the `Authorization: Bearer <token>` header to the
/// owning user via the sessions table.
pub struct AuthUser {
    pub user: UserRecord,
    pub token: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(pool) = req.rocket().state::<DbPool>() else {
            return Outcome::Error((Status::InternalServerError, ApiError::Internal));
        };
        let token = req
            .headers()
            .get_one("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());
        let Some(token) = token else {
            return Outcome::Error((Status::Unauthorized, ApiError::Unauthorized));
        };
        let conn = match pool.get() {
            Ok(conn) => conn,
            Err(err) => return Outcome::Error((Status::ServiceUnavailable, err.into())),
        };
        match db::user_by_token(&conn, token) {
            Ok(Some(user)) => Outcome::Success(AuthUser {
                user,
                token: token.to_string(),
            }),
            Ok(None) => Outcome::Error((Status::Unauthorized, ApiError::Unauthorized)),
            Err(err) => Outcome::Error((Status::ServiceUnavailable, err.into())),
        }
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| ApiError::Internal)?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn issue_token(conn: &rusqlite::Connection, user_id: &str) -> Result<String, ApiError> {
    let token = Uuid::new_v4().to_string();
    db::create_session(conn, user_id, &token, &fmt_ts(Utc::now()))?;
    db::prune_sessions(conn, user_id, MAX_SESSIONS)?;
    Ok(token)
}

fn default_settings() -> String {
    serde_json::json!({
        "currency": "USD",
        "theme": "light",
        "notifications": true,
    })
    .to_string()
}

#[post("/auth/register", data = "<body>")]
fn register(
    pool: &State<DbPool>,
    body: Json<RegisterRequest>,
) -> Result<(Status, Json<AuthResponse>), ApiError> {
    let body = body.into_inner();
    let email = body.email.trim().to_lowercase();
    let name = body.name.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("a valid email is required".to_string()));
    }
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if body.password.len() < 6 {
        return Err(ApiError::BadRequest(
            "password must be at least 6 characters".to_string(),
        ));
    }

    let conn = pool.get()?;
    if db::email_exists(&conn, &email)? {
        return Err(ApiError::EmailTaken);
    }

    let now = fmt_ts(Utc::now());
    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        email,
        name: name.to_string(),
        password_hash: hash_password(&body.password)?,
        settings: default_settings(),
        created_at: now.clone(),
    };
    db::insert_user(&conn, &user)?;

    for (name, kind, color, icon) in db::DEFAULT_CATEGORIES {
        db::insert_category(
            &conn,
            &CategoryRecord {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                name: (*name).to_string(),
                kind: Kind::parse(kind).unwrap_or(Kind::Expense),
                color: (*color).to_string(),
                icon: (*icon).to_string(),
                created_at: now.clone(),
            },
        )?;
    }

    let token = issue_token(&conn, &user.id)?;
    Ok((
        Status::Created,
        Json(AuthResponse {
            access_token: token,
            token_type: "bearer",
            user: UserView::from_record(&user),
        }),
    ))
}

#[post("/auth/login", data = "<body>")]
fn login(pool: &State<DbPool>, body: Json<LoginRequest>) -> Result<Json<AuthResponse>, ApiError> {
    let body = body.into_inner();
    let conn = pool.get()?;
    let Some(user) = db::user_by_email(&conn, body.email.trim().to_lowercase().as_str())? else {
        return Err(ApiError::InvalidCredentials);
    };
    if !verify_password(&user.password_hash, &body.password) {
        return Err(ApiError::InvalidCredentials);
    }
    let token = issue_token(&conn, &user.id)?;
    Ok(Json(AuthResponse {
        access_token: token,
        token_type: "bearer",
        user: UserView::from_record(&user),
    }))
}

#[post("/auth/logout")]
fn logout(pool: &State<DbPool>, auth: AuthUser) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = pool.get()?;
    db::delete_session(&conn, &auth.token)?;
    Ok(Json(serde_json::json!({ "message": "logged out" })))
}

#[get("/auth/me")]
fn me(auth: AuthUser) -> Json<UserView> {
    Json(UserView::from_record(&auth.user))
}

// --- categories ---

#[get("/categories")]
fn list_categories(
    pool: &State<DbPool>,
    auth: AuthUser,
) -> Result<Json<Vec<CategoryRecord>>, ApiError> {
    let conn = pool.get()?;
    Ok(Json(db::list_categories(&conn, &auth.user.id)?))
}

#[post("/categories", data = "<body>")]
fn add_category(
    pool: &State<DbPool>,
    auth: AuthUser,
    body: Json<CategoryCreate>,
) -> Result<Json<CategoryRecord>, ApiError> {
    let body = body.into_inner();
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let category = CategoryRecord {
        id: Uuid::new_v4().to_string(),
        user_id: auth.user.id.clone(),
        name: body.name.trim().to_string(),
        kind: body.kind,
        color: body.color,
        icon: body.icon,
        created_at: fmt_ts(Utc::now()),
    };
    let conn = pool.get()?;
    db::insert_category(&conn, &category)?;
    Ok(Json(category))
}

#[delete("/categories/<id>")]
fn remove_category(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = pool.get()?;
    if !db::delete_category_cascade(&conn, &auth.user.id, id)? {
        return Err(ApiError::NotFound("category"));
    }
    Ok(Json(serde_json::json!({ "message": "category deleted" })))
}

// --- transactions ---

fn parse_bound(raw: &str, field: &str) -> Result<String, ApiError> {
    parse_ts_param(raw)
        .map(fmt_ts)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {field}")))
}

fn annotate<'a>(
    transactions: &[TransactionRecord],
    categories: &'a [CategoryRecord],
) -> Vec<TransactionView> {
    let by_id: std::collections::HashMap<&str, &CategoryRecord> =
        categories.iter().map(|c| (c.id.as_str(), c)).collect();
    transactions
        .iter()
        .map(|tx| transaction_view(tx, by_id.get(tx.category_id.as_str()).copied()))
        .collect()
}

#[get("/transactions?<limit>&<skip>&<category_id>&<kind>&<start_date>&<end_date>")]
#[allow(clippy::too_many_arguments)]
fn list_transactions(
    pool: &State<DbPool>,
    auth: AuthUser,
    limit: Option<i64>,
    skip: Option<i64>,
    category_id: Option<String>,
    kind: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
) -> Result<Json<Vec<TransactionView>>, ApiError> {
    let kind = match kind.as_deref() {
        None => None,
        Some(raw) => Some(
            Kind::parse(raw)
                .ok_or_else(|| ApiError::BadRequest("unknown transaction kind".to_string()))?,
        ),
    };
    let filter = TransactionFilter {
        category_id,
        kind,
        start: start_date
            .map(|raw| parse_bound(&raw, "start_date"))
            .transpose()?,
        end: end_date
            .map(|raw| parse_bound(&raw, "end_date"))
            .transpose()?,
        limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        skip: skip.unwrap_or(0),
    };

    let conn = pool.get()?;
    let transactions = db::list_transactions(&conn, &auth.user.id, &filter)?;
    let categories = db::list_categories(&conn, &auth.user.id)?;
    Ok(Json(annotate(&transactions, &categories)))
}

fn transaction_from_input(
    conn: &rusqlite::Connection,
    user_id: &str,
    input: TransactionCreate,
    id: String,
    created_at: String,
) -> Result<(TransactionRecord, CategoryRecord), ApiError> {
    let amount_cents = cents_from_amount(input.amount)
        .ok_or_else(|| ApiError::BadRequest("amount must be a positive number".to_string()))?;
    let occurred_at = parse_ts_param(&input.occurred_at)
        .map(fmt_ts)
        .ok_or_else(|| ApiError::BadRequest("invalid occurred_at".to_string()))?;
    let Some(category) = db::category_by_id(conn, user_id, &input.category_id)? else {
        return Err(ApiError::NotFound("category"));
    };
    let record = TransactionRecord {
        id,
        user_id: user_id.to_string(),
        kind: input.kind.as_str().to_string(),
        amount_cents,
        category_id: input.category_id,
        description: input.description,
        occurred_at,
        is_recurring: input.is_recurring,
        recurring_frequency: input.recurring_frequency,
        created_at,
    };
    Ok((record, category))
}

#[post("/transactions", data = "<body>")]
fn add_transaction(
    pool: &State<DbPool>,
    auth: AuthUser,
    body: Json<TransactionCreate>,
) -> Result<Json<TransactionView>, ApiError> {
    let conn = pool.get()?;
    let (record, category) = transaction_from_input(
        &conn,
        &auth.user.id,
        body.into_inner(),
        Uuid::new_v4().to_string(),
        fmt_ts(Utc::now()),
    )?;
    db::insert_transaction(&conn, &record)?;
    Ok(Json(transaction_view(&record, Some(&category))))
}

#[put("/transactions/<id>", data = "<body>")]
fn edit_transaction(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: &str,
    body: Json<TransactionCreate>,
) -> Result<Json<TransactionView>, ApiError> {
    let conn = pool.get()?;
    let Some(existing) = db::transaction_by_id(&conn, &auth.user.id, id)? else {
        return Err(ApiError::NotFound("transaction"));
    };
    let (record, category) = transaction_from_input(
        &conn,
        &auth.user.id,
        body.into_inner(),
        existing.id,
        existing.created_at,
    )?;
    if !db::update_transaction(&conn, &record)? {
        return Err(ApiError::NotFound("transaction"));
    }
    Ok(Json(transaction_view(&record, Some(&category))))
}

#[delete("/transactions/<id>")]
fn remove_transaction(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = pool.get()?;
    if !db::delete_transaction(&conn, &auth.user.id, id)? {
        return Err(ApiError::NotFound("transaction"));
    }
    Ok(Json(serde_json::json!({ "message": "transaction deleted" })))
}

#[get("/transactions/export")]
fn export_transactions(
    pool: &State<DbPool>,
    auth: AuthUser,
) -> Result<(ContentType, String), ApiError> {
    let conn = pool.get()?;
    let transactions = db::all_transactions(&conn, &auth.user.id)?;
    let categories = db::list_categories(&conn, &auth.user.id)?;
    let by_id: std::collections::HashMap<&str, &CategoryRecord> =
        categories.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["date", "kind", "category", "amount", "description"])
        .map_err(|_| ApiError::Internal)?;
    for tx in &transactions {
        let category = by_id
            .get(tx.category_id.as_str())
            .map(|c| c.name.as_str())
            .unwrap_or("Unknown");
        writer
            .write_record([
                tx.occurred_at.as_str(),
                tx.kind.as_str(),
                category,
                format_money(tx.amount_cents).as_str(),
                tx.description.as_str(),
            ])
            .map_err(|_| ApiError::Internal)?;
    }
    let bytes = writer.into_inner().map_err(|_| ApiError::Internal)?;
    let body = String::from_utf8(bytes).map_err(|_| ApiError::Internal)?;
    Ok((ContentType::CSV, body))
}

// --- budgets ---

#[get("/budgets")]
fn list_budgets(pool: &State<DbPool>, auth: AuthUser) -> Result<Json<Vec<BudgetView>>, ApiError> {
    let conn = pool.get()?;
    let budgets = db::list_budgets(&conn, &auth.user.id)?;
    Ok(Json(budgets.into_iter().map(budget_view).collect()))
}

#[post("/budgets", data = "<body>")]
fn add_budget(
    pool: &State<DbPool>,
    auth: AuthUser,
    body: Json<BudgetCreate>,
) -> Result<Json<BudgetView>, ApiError> {
    let body = body.into_inner();
    let amount_cents = cents_from_amount(body.amount)
        .ok_or_else(|| ApiError::BadRequest("amount must be a positive number".to_string()))?;
    if !matches!(body.period.as_str(), "weekly" | "monthly" | "yearly") {
        return Err(ApiError::BadRequest(
            "period must be weekly, monthly or yearly".to_string(),
        ));
    }
    let starts_on = parse_bound(&body.starts_on, "starts_on")?;
    let ends_on = parse_bound(&body.ends_on, "ends_on")?;
    if ends_on <= starts_on {
        return Err(ApiError::BadRequest("ends_on must be after starts_on".to_string()));
    }

    let conn = pool.get()?;
    let Some(category) = db::category_by_id(&conn, &auth.user.id, &body.category_id)? else {
        return Err(ApiError::NotFound("category"));
    };
    let record = BudgetRecord {
        id: Uuid::new_v4().to_string(),
        user_id: auth.user.id.clone(),
        category_id: body.category_id,
        category_name: category.name,
        amount_cents,
        period: body.period,
        starts_on,
        ends_on,
        created_at: fmt_ts(Utc::now()),
    };
    db::insert_budget(&conn, &record)?;
    Ok(Json(budget_view(record)))
}

#[delete("/budgets/<id>")]
fn remove_budget(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = pool.get()?;
    if !db::delete_budget(&conn, &auth.user.id, id)? {
        return Err(ApiError::NotFound("budget"));
    }
    Ok(Json(serde_json::json!({ "message": "budget deleted" })))
}

// --- goals ---

#[get("/goals")]
fn list_goals(pool: &State<DbPool>, auth: AuthUser) -> Result<Json<Vec<GoalView>>, ApiError> {
    let conn = pool.get()?;
    let goals = db::list_goals(&conn, &auth.user.id)?;
    Ok(Json(goals.into_iter().map(goal_view).collect()))
}

#[post("/goals", data = "<body>")]
fn add_goal(
    pool: &State<DbPool>,
    auth: AuthUser,
    body: Json<GoalCreate>,
) -> Result<Json<GoalView>, ApiError> {
    let body = body.into_inner();
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    let target_cents = cents_from_amount(body.target_amount)
        .ok_or_else(|| ApiError::BadRequest("target_amount must be a positive number".to_string()))?;
    let target_on = parse_bound(&body.target_on, "target_on")?;

    let record = GoalRecord {
        id: Uuid::new_v4().to_string(),
        user_id: auth.user.id.clone(),
        title: body.title.trim().to_string(),
        target_cents,
        current_cents: 0,
        target_on,
        description: body.description,
        created_at: fmt_ts(Utc::now()),
    };
    let conn = pool.get()?;
    db::insert_goal(&conn, &record)?;
    Ok(Json(goal_view(record)))
}

#[put("/goals/<id>/progress?<amount>")]
fn set_goal_progress(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: &str,
    amount: f64,
) -> Result<Json<serde_json::Value>, ApiError> {
    let current_cents = cents_from_progress(amount)
        .ok_or_else(|| ApiError::BadRequest("amount must be a non-negative number".to_string()))?;
    let conn = pool.get()?;
    if !db::update_goal_progress(&conn, &auth.user.id, id, current_cents)? {
        return Err(ApiError::NotFound("goal"));
    }
    Ok(Json(serde_json::json!({ "message": "goal progress updated" })))
}

#[delete("/goals/<id>")]
fn remove_goal(
    pool: &State<DbPool>,
    auth: AuthUser,
    id: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = pool.get()?;
    if !db::delete_goal(&conn, &auth.user.id, id)? {
        return Err(ApiError::NotFound("goal"));
    }
    Ok(Json(serde_json::json!({ "message": "goal deleted" })))
}

// --- analytics ---

#[get("/analytics/dashboard?<period>")]
fn analytics_dashboard(
    pool: &State<DbPool>,
    auth: AuthUser,
    period: Option<String>,
) -> Result<Json<DashboardSnapshot>, ApiError> {
    let token = period.as_deref().unwrap_or("month");
    // An unrecognized token is recovered locally by falling back to the
    // current calendar month.
    let period = match Period::parse(token) {
        Ok(period) => period,
        Err(err) => {
            log::warn!("{err}: {token:?}, defaulting to month");
            Period::Month
        }
    };
    let window = period.resolve(Utc::now());

    let conn = pool.get()?;
    let transactions = db::transactions_in_window(
        &conn,
        &auth.user.id,
        &fmt_ts(window.start),
        &fmt_ts(window.end),
    )?;
    let categories = db::list_categories(&conn, &auth.user.id)?;
    Ok(Json(analytics::dashboard(
        period,
        &window,
        &transactions,
        &categories,
    )))
}

#[get("/analytics/spending-trend?<period>&<months>")]
fn analytics_spending_trend(
    pool: &State<DbPool>,
    auth: AuthUser,
    period: Option<String>,
    months: Option<i64>,
) -> Result<Json<Vec<TrendPoint>>, ApiError> {
    let bucket_count = match (months, period.as_deref()) {
        (Some(n), _) => n,
        (None, Some(token)) => match Period::parse(token) {
            Ok(period) => period.trend_months(),
            Err(err) => {
                log::warn!("{err}: {token:?}, defaulting to {DEFAULT_TREND_MONTHS} months");
                DEFAULT_TREND_MONTHS
            }
        },
        (None, None) => DEFAULT_TREND_MONTHS,
    };

    let now = Utc::now();
    let fetch = analytics::trend_window(bucket_count, now)?;
    let conn = pool.get()?;
    let transactions = db::transactions_in_window(
        &conn,
        &auth.user.id,
        &fmt_ts(fetch.start),
        &fmt_ts(fetch.end),
    )?;
    Ok(Json(analytics::spending_trend(
        bucket_count,
        now,
        &transactions,
    )?))
}

// --- catchers ---

#[catch(400)]
fn bad_request() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "bad request" }))
}

#[catch(401)]
fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "missing or invalid access token" }))
}

#[catch(404)]
fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "resource not found" }))
}

#[catch(422)]
fn unprocessable() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "malformed request body" }))
}

#[catch(500)]
fn internal() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "internal error" }))
}

#[catch(503)]
fn unavailable() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "data store unavailable" }))
}
