//! Dashboard widgets over loaded stock, integrated and delivery reports.

mod common;

use axum_test::TestServer;
use chrono::{Days, NaiveDate, Utc};
use common::mocks::MockLLMClient;
use common::{test_state, token};
use foodatlas::analytics::{dashboard, month_key, month_start, previous_month_start};
use foodatlas::api::routes::create_router;
use foodatlas::types::{CreateRestaurantRequest, MonthlyBreakEven};
use foodatlas::AppState;
use serde_json::Value;

const OTHER: &str = "other-restaurant";

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}

struct Months {
    today: NaiveDate,
    this: String,
    last: String,
    older: String,
}

fn months() -> Months {
    let today = Utc::now().date_naive();
    let last = previous_month_start(today);
    Months {
        today,
        this: day(month_start(today)),
        last: day(last.checked_add_days(Days::new(14)).expect("date")),
        older: day(previous_month_start(last)),
    }
}

async fn load(state: &AppState, table: &str, restaurant_id: &str, headers: &[&str], rows: &[&[&str]]) {
    let rows: Vec<Vec<String>> = rows.iter().map(|r| strings(r)).collect();
    state
        .warehouse
        .load_csv(table, restaurant_id, &strings(headers), &rows)
        .await
        .expect("load report");
}

/// Reports for `restaurant_id` and for another tenant sharing the tables.
/// Headers vary in case to match how the reports are exported.
async fn load_reports(state: &AppState, restaurant_id: &str, m: &Months) {
    let tables = state.dashboard_tables();

    let stock = ["data", "qtd_usada_unidades", "custo_unitario_brl"];
    load(state, &tables.stock, restaurant_id, &stock, &[&[m.this.as_str(), "10", "2.5"]]).await;
    load(state, &tables.stock, OTHER, &stock, &[&[m.this.as_str(), "100", "100"]]).await;

    let integrated = [
        "Data",
        "Vendas_Brutas_BRL",
        "custo_alimentos_brl",
        "CUSTO_MAO_OBRA_BRL",
        "despesa_promocional_brl",
        "client_id",
    ];
    load(
        state,
        &tables.integrated,
        restaurant_id,
        &integrated,
        &[
            &[m.this.as_str(), "100", "20", "30", "10", "a"],
            &[m.this.as_str(), "200", "40", "0", "0", "b"],
            &[m.last.as_str(), "150", "30", "20", "0", "a"],
            &[m.older.as_str(), "80", "10", "5", "5", "a"],
        ],
    )
    .await;
    load(
        state,
        &tables.integrated,
        OTHER,
        &integrated,
        &[
            &[m.this.as_str(), "10000", "1", "1", "1", "z"],
            &[m.last.as_str(), "5000", "1", "1", "1", "y"],
        ],
    )
    .await;

    let delivery = ["DATA", "total_brl", "client_id"];
    load(
        state,
        &tables.delivery,
        restaurant_id,
        &delivery,
        &[&[m.this.as_str(), "50", "c"], &[m.last.as_str(), "50", "b"]],
    )
    .await;
    load(state, &tables.delivery, OTHER, &delivery, &[&[m.this.as_str(), "999", "x"]]).await;
}

async fn setup() -> (TestServer, AppState, String, String, Months) {
    let state = test_state(MockLLMClient::new("")).await;
    let owner = token(&state, "owner-1");
    let rid = state
        .turso
        .create_restaurant(
            "owner-1",
            &CreateRestaurantRequest {
                name: "Cantina".into(),
                cnpj: "1".into(),
                address: None,
                phone: None,
            },
        )
        .await
        .expect("restaurant")
        .id;

    let m = months();
    load_reports(&state, &rid, &m).await;
    let server = TestServer::new(create_router(state.clone())).expect("test server");
    (server, state, owner, rid, m)
}

#[tokio::test]
async fn test_monthly_break_even_from_reports() {
    let (server, _state, owner, rid, m) = setup().await;

    let monthly: Vec<MonthlyBreakEven> = server
        .get(&format!("/api/restaurants/{}/break-even/monthly", rid))
        .add_query_param("months", 2)
        .authorization_bearer(&owner)
        .await
        .json();
    assert_eq!(monthly.len(), 2);

    let current = &monthly[0];
    assert_eq!(current.month, month_key(m.today));
    // integrated 100 + 200, delivery 50
    assert!(close(current.total_revenue, 350.0));
    // stock 10 * 2.5, food 20 + 40
    assert!(close(current.variable_costs, 85.0));
    // labour 30, promotions 10
    assert!(close(current.fixed_costs, 40.0));
    assert!(close(current.contribution_margin_ratio.expect("ratio"), 40.0 / 265.0));
    assert!(close(
        current.break_even_revenue.expect("break-even"),
        40.0 / (1.0 - 85.0 / 350.0)
    ));

    let last = &monthly[1];
    assert_eq!(last.month, month_key(previous_month_start(m.today)));
    assert!(close(last.total_revenue, 200.0));
    assert!(close(last.variable_costs, 30.0));
    assert!(close(last.fixed_costs, 20.0));
    assert!(close(last.break_even_revenue.expect("break-even"), 20.0 / 0.85));

    let all: Vec<MonthlyBreakEven> = server
        .get(&format!("/api/restaurants/{}/break-even/monthly", rid))
        .authorization_bearer(&owner)
        .await
        .json();
    assert_eq!(all.len(), 3);
    assert!(close(all[2].total_revenue, 80.0));
    assert!(close(all[2].fixed_costs, 10.0));
}

#[tokio::test]
async fn test_avg_ticket_and_clients_from_reports() {
    let (server, _state, owner, rid, _) = setup().await;

    let ticket: Value = server
        .get(&format!("/api/restaurants/{}/analytics/avg-ticket", rid))
        .authorization_bearer(&owner)
        .await
        .json();
    // this month (100 + 200 + 50) / 3, last month (150 + 50) / 2
    assert_eq!(ticket["avg_ticket"], 116.67);
    assert_eq!(ticket["percentage"], 17);

    let clients: Value = server
        .get(&format!("/api/restaurants/{}/analytics/count-clients", rid))
        .authorization_bearer(&owner)
        .await
        .json();
    // {a, b, c} against {a, b}
    assert_eq!(clients["total"], 3);
    assert_eq!(clients["percentage"], 50);
}

#[tokio::test]
async fn test_transaction_window_is_per_restaurant() {
    let (_server, state, _owner, rid, m) = setup().await;
    let tables = state.dashboard_tables();

    let mine = dashboard::recent_transactions(state.warehouse.as_ref(), &tables, &rid, m.today)
        .await
        .expect("transactions");
    let mut amounts: Vec<f64> = mine.iter().map(|t| t.amount).collect();
    amounts.sort_by(f64::total_cmp);
    assert_eq!(amounts, vec![50.0, 50.0, 100.0, 150.0, 200.0]);

    let theirs = dashboard::recent_transactions(state.warehouse.as_ref(), &tables, OTHER, m.today)
        .await
        .expect("transactions");
    let mut amounts: Vec<f64> = theirs.iter().map(|t| t.amount).collect();
    amounts.sort_by(f64::total_cmp);
    assert_eq!(amounts, vec![999.0, 5000.0, 10000.0]);
}
