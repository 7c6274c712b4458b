use chrono::Utc;
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::{Value, json};
use tempfile::TempDir;

use tally::db;
use tally::time::fmt_ts;

fn client() -> (Client, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = db::init_db(&dir.path().join("test.sqlite"));
    let client = Client::tracked(tally::rocket(pool)).expect("rocket client");
    (client, dir)
}

fn body_json(response: rocket::local::blocking::LocalResponse<'_>) -> Value {
    let body = response.into_string().expect("response body");
    serde_json::from_str(&body).expect("json body")
}

fn register(client: &Client, email: &str) -> String {
    let response = client
        .post("/api/auth/register")
        .header(ContentType::JSON)
        .body(
            json!({
                "email": email,
                "name": "Test User",
                "password": "hunter22",
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::Created);
    let body = body_json(response);
    assert_eq!(body["token_type"], "bearer");
    body["access_token"].as_str().expect("token").to_string()
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

fn category_id(client: &Client, token: &str, name: &str) -> String {
    let response = client
        .get("/api/categories")
        .header(bearer(token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body = body_json(response);
    body.as_array()
        .expect("category array")
        .iter()
        .find(|c| c["name"] == name)
        .unwrap_or_else(|| panic!("category {name} missing"))["id"]
        .as_str()
        .expect("id")
        .to_string()
}

fn add_transaction(client: &Client, token: &str, kind: &str, amount: f64, category: &str) -> Value {
    let response = client
        .post("/api/transactions")
        .header(ContentType::JSON)
        .header(bearer(token))
        .body(
            json!({
                "amount": amount,
                "kind": kind,
                "category_id": category,
                "description": "integration test",
                "occurred_at": fmt_ts(Utc::now()),
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    body_json(response)
}

#[test]
fn register_seeds_categories_and_authenticates() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");

    let response = client.get("/api/auth/me").header(bearer(&token)).dispatch();
    assert_eq!(response.status(), Status::Ok);
    let me = body_json(response);
    assert_eq!(me["email"], "alice@example.com");
    assert_eq!(me["settings"]["currency"], "USD");

    let response = client
        .get("/api/categories")
        .header(bearer(&token))
        .dispatch();
    let categories = body_json(response);
    assert_eq!(categories.as_array().unwrap().len(), 18);
}

#[test]
fn duplicate_email_and_bad_credentials_are_rejected() {
    let (client, _dir) = client();
    register(&client, "alice@example.com");

    let response = client
        .post("/api/auth/register")
        .header(ContentType::JSON)
        .body(
            json!({"email": "alice@example.com", "name": "Other", "password": "hunter22"})
                .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(body_json(response)["error"], "email already registered");

    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(json!({"email": "alice@example.com", "password": "wrong-password"}).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
}

#[test]
fn requests_without_token_are_unauthorized() {
    let (client, _dir) = client();
    for path in [
        "/api/categories",
        "/api/transactions",
        "/api/budgets",
        "/api/goals",
        "/api/analytics/dashboard",
    ] {
        let response = client.get(path).dispatch();
        assert_eq!(response.status(), Status::Unauthorized, "path {path}");
        assert!(body_json(response)["error"].is_string());
    }
}

#[test]
fn logout_revokes_the_session() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");

    let response = client
        .post("/api/auth/logout")
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let response = client.get("/api/auth/me").header(bearer(&token)).dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
}

#[test]
fn transaction_crud_round_trip() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");
    let food = category_id(&client, &token, "Food & Dining");
    let salary = category_id(&client, &token, "Salary");

    let created = add_transaction(&client, &token, "expense", 42.5, &food);
    assert_eq!(created["amount"], "42.50");
    assert_eq!(created["category_name"], "Food & Dining");
    let id = created["id"].as_str().unwrap();

    add_transaction(&client, &token, "income", 1000.0, &salary);

    let response = client
        .get("/api/transactions?kind=expense")
        .header(bearer(&token))
        .dispatch();
    let list = body_json(response);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let response = client
        .put(format!("/api/transactions/{id}"))
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "amount": 99.99,
                "kind": "expense",
                "category_id": food,
                "description": "updated",
                "occurred_at": fmt_ts(Utc::now()),
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(body_json(response)["amount"], "99.99");

    let response = client
        .delete(format!("/api/transactions/{id}"))
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .delete(format!("/api/transactions/{id}"))
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn transaction_validation_rejects_bad_input() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");
    let food = category_id(&client, &token, "Food & Dining");

    let response = client
        .post("/api/transactions")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "amount": -5.0,
                "kind": "expense",
                "category_id": food,
                "description": "nope",
                "occurred_at": fmt_ts(Utc::now()),
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .post("/api/transactions")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "amount": 5.0,
                "kind": "expense",
                "category_id": "not-a-category",
                "description": "nope",
                "occurred_at": fmt_ts(Utc::now()),
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn owners_cannot_touch_each_others_records() {
    let (client, _dir) = client();
    let alice = register(&client, "alice@example.com");
    let bob = register(&client, "bob@example.com");
    let food = category_id(&client, &alice, "Food & Dining");

    let created = add_transaction(&client, &alice, "expense", 10.0, &food);
    let id = created["id"].as_str().unwrap();

    let response = client
        .delete(format!("/api/transactions/{id}"))
        .header(bearer(&bob))
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);

    let response = client
        .delete(format!("/api/categories/{food}"))
        .header(bearer(&bob))
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn category_delete_cascades_to_transactions() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");
    let food = category_id(&client, &token, "Food & Dining");
    add_transaction(&client, &token, "expense", 10.0, &food);

    let response = client
        .delete(format!("/api/categories/{food}"))
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .get("/api/transactions")
        .header(bearer(&token))
        .dispatch();
    assert!(body_json(response).as_array().unwrap().is_empty());
}

#[test]
fn dashboard_reports_exact_totals() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");
    let food = category_id(&client, &token, "Food & Dining");
    let salary = category_id(&client, &token, "Salary");

    add_transaction(&client, &token, "income", 1000.0, &salary);
    add_transaction(&client, &token, "expense", 200.0, &food);
    add_transaction(&client, &token, "expense", 50.0, &food);

    let response = client
        .get("/api/analytics/dashboard?period=month")
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let snap = body_json(response);
    assert_eq!(snap["total_income"], "1000.00");
    assert_eq!(snap["total_expenses"], "250.00");
    assert_eq!(snap["balance"], "750.00");
    assert_eq!(snap["skipped_records"], 0);
    assert!((snap["savings_rate"].as_f64().unwrap() - 0.75).abs() < 1e-9);

    let spending = snap["category_spending"].as_array().unwrap();
    assert_eq!(spending.len(), 1);
    assert_eq!(spending[0]["category"], "Food & Dining");
    assert_eq!(spending[0]["amount"], "250.00");

    let recent = snap["recent_transactions"].as_array().unwrap();
    assert_eq!(recent.len(), 3);

    // Identical store state gives an identical snapshot apart from labels
    // derived from the same clock.
    let again = body_json(
        client
            .get("/api/analytics/dashboard?period=month")
            .header(bearer(&token))
            .dispatch(),
    );
    assert_eq!(snap["total_income"], again["total_income"]);
    assert_eq!(snap["balance"], again["balance"]);
}

#[test]
fn dashboard_with_no_income_has_null_savings_rate() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");
    let food = category_id(&client, &token, "Food & Dining");
    add_transaction(&client, &token, "expense", 25.0, &food);

    let snap = body_json(
        client
            .get("/api/analytics/dashboard")
            .header(bearer(&token))
            .dispatch(),
    );
    assert!(snap["savings_rate"].is_null());
    assert_eq!(snap["balance"], "-25.00");
}

#[test]
fn dashboard_defaults_unknown_period_tokens_to_month() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");

    let response = client
        .get("/api/analytics/dashboard?period=fortnight")
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let snap = body_json(response);
    // Month labels look like "March 2026".
    let label = snap["period"].as_str().unwrap();
    assert!(label.contains(&Utc::now().format("%Y").to_string()), "label {label}");
}

#[test]
fn spending_trend_returns_requested_bucket_count() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");
    let salary = category_id(&client, &token, "Salary");
    add_transaction(&client, &token, "income", 500.0, &salary);

    let response = client
        .get("/api/analytics/spending-trend?months=3")
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let points = body_json(response);
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 3);
    // Only the current month has data.
    assert_eq!(points[0]["income"], "0.00");
    assert_eq!(points[1]["income"], "0.00");
    assert_eq!(points[2]["income"], "500.00");
    assert_eq!(points[2]["net"], "500.00");
}

#[test]
fn spending_trend_rejects_bad_bucket_counts() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");

    for query in ["months=0", "months=25", "months=-3"] {
        let response = client
            .get(format!("/api/analytics/spending-trend?{query}"))
            .header(bearer(&token))
            .dispatch();
        assert_eq!(response.status(), Status::BadRequest, "query {query}");
        assert_eq!(body_json(response)["error"], "months must be between 1 and 24");
    }
}

#[test]
fn spending_trend_derives_bucket_count_from_period_token() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");

    let points = body_json(
        client
            .get("/api/analytics/spending-trend?period=year")
            .header(bearer(&token))
            .dispatch(),
    );
    assert_eq!(points.as_array().unwrap().len(), 12);

    let points = body_json(
        client
            .get("/api/analytics/spending-trend")
            .header(bearer(&token))
            .dispatch(),
    );
    assert_eq!(points.as_array().unwrap().len(), 6);
}

#[test]
fn export_produces_csv_with_all_transactions() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");
    let food = category_id(&client, &token, "Food & Dining");
    add_transaction(&client, &token, "expense", 12.34, &food);

    let response = client
        .get("/api/transactions/export")
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::CSV));
    let body = response.into_string().unwrap();
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("date,kind,category,amount,description"));
    let row = lines.next().expect("data row");
    assert!(row.contains("expense"));
    assert!(row.contains("Food & Dining"));
    assert!(row.contains("12.34"));
}

#[test]
fn budget_and_goal_crud() {
    let (client, _dir) = client();
    let token = register(&client, "alice@example.com");
    let food = category_id(&client, &token, "Food & Dining");

    let response = client
        .post("/api/budgets")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "category_id": food,
                "amount": 300.0,
                "period": "monthly",
                "starts_on": "2026-08-01",
                "ends_on": "2026-09-01",
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let budget = body_json(response);
    assert_eq!(budget["amount"], "300.00");
    assert_eq!(budget["category_name"], "Food & Dining");
    let budget_id = budget["id"].as_str().unwrap();

    let response = client
        .post("/api/goals")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "title": "Emergency fund",
                "target_amount": 5000.0,
                "target_on": "2027-01-01",
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let goal = body_json(response);
    assert_eq!(goal["current_amount"], "0.00");
    let goal_id = goal["id"].as_str().unwrap();

    let response = client
        .put(format!("/api/goals/{goal_id}/progress?amount=1250.5"))
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let goals = body_json(client.get("/api/goals").header(bearer(&token)).dispatch());
    assert_eq!(goals[0]["current_amount"], "1250.50");

    for query in ["amount=-1", "amount=1e18"] {
        let response = client
            .put(format!("/api/goals/{goal_id}/progress?{query}"))
            .header(bearer(&token))
            .dispatch();
        assert_eq!(response.status(), Status::BadRequest, "query {query}");
    }
    let goals = body_json(client.get("/api/goals").header(bearer(&token)).dispatch());
    assert_eq!(goals[0]["current_amount"], "1250.50");

    let response = client
        .delete(format!("/api/budgets/{budget_id}"))
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let response = client
        .delete(format!("/api/goals/{goal_id}"))
        .header(bearer(&token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
}
