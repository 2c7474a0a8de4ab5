//! BigQuery warehouse and index against a mock REST API.

use foodatlas::db::{DocumentIndex, EmbeddedChunk};
use foodatlas::types::AppError;
use foodatlas::warehouse::gcp_auth::ServiceAccountKey;
use foodatlas::warehouse::{
    BigQueryIndex, BigQuerySettings, BigQueryWarehouse, GoogleAuth, QueryParam, SqlDialect,
};
use foodatlas::Warehouse;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUERIES: &str = "/bigquery/v2/projects/proj/queries";

fn settings(server: &MockServer) -> BigQuerySettings {
    BigQuerySettings {
        api_base: server.uri(),
        project_id: "proj".to_string(),
        dataset: "bucket".to_string(),
        location: "US".to_string(),
        query_timeout: Duration::from_secs(5),
    }
}

fn warehouse(server: &MockServer) -> BigQueryWarehouse {
    BigQueryWarehouse::new(
        settings(server),
        Arc::new(GoogleAuth::from_static_token("static-token")),
    )
    .expect("warehouse")
}

fn schema() -> serde_json::Value {
    json!({
        "fields": [
            { "name": "data", "type": "DATE" },
            { "name": "total", "type": "FLOAT" },
            { "name": "pedidos", "type": "INTEGER" }
        ]
    })
}

fn row(date: &str, total: &str, orders: &str) -> serde_json::Value {
    json!({ "f": [{ "v": date }, { "v": total }, { "v": orders }] })
}

#[tokio::test]
async fn test_query_sends_named_parameters_and_decodes_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERIES))
        .and(header("authorization", "Bearer static-token"))
        .and(body_partial_json(json!({
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "location": "US",
            "queryParameters": [{
                "name": "restaurant_id",
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": "r1" }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "jobReference": { "jobId": "job-1", "location": "US" },
            "schema": schema(),
            "rows": [row("2024-05-01", "100.5", "3"), row("2024-05-02", "80", "2")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = warehouse(&server)
        .query(
            "SELECT data, total, pedidos FROM `proj.bucket.vendas` WHERE restaurant_id = @restaurant_id",
            &[QueryParam::restaurant("r1")],
        )
        .await
        .expect("query");

    assert_eq!(result.columns, vec!["data", "total", "pedidos"]);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0]["data"], "2024-05-01");
    assert_eq!(result.rows[0]["total"], 100.5);
    assert_eq!(result.rows[0]["pedidos"], 3);
}

#[tokio::test]
async fn test_incomplete_query_is_polled_and_paged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERIES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": false,
            "jobReference": { "jobId": "job-9", "location": "EU" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/job-9", QUERIES)))
        .and(query_param("location", "EU"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "jobReference": { "jobId": "job-9", "location": "EU" },
            "schema": schema(),
            "rows": [row("2024-05-01", "1", "1")],
            "pageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/job-9", QUERIES)))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "rows": [row("2024-05-02", "2", "2")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = warehouse(&server)
        .query("SELECT 1", &[])
        .await
        .expect("query");

    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[1]["total"], 2.0);
}

#[tokio::test]
async fn test_api_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERIES))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "Unrecognized name: totl at [1:8]" }
        })))
        .mount(&server)
        .await;

    let err = warehouse(&server)
        .query("SELECT totl FROM t", &[])
        .await
        .unwrap_err();

    match err {
        AppError::Warehouse(message) => assert!(message.contains("Unrecognized name: totl")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_table_columns_and_drop() {
    let server = MockServer::start().await;
    let table_path = "/bigquery/v2/projects/proj/datasets/bucket/tables";
    Mock::given(method("GET"))
        .and(path(format!("{}/vendas", table_path)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schema": {
                "fields": [
                    { "name": "restaurant_id", "type": "STRING" },
                    { "name": "data", "type": "DATE" }
                ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/missing", table_path)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/missing", table_path)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let warehouse = warehouse(&server);
    assert_eq!(
        warehouse.table_columns("vendas").await.expect("columns"),
        vec!["restaurant_id", "data"]
    );
    assert!(warehouse.table_columns("missing").await.expect("missing").is_empty());
    warehouse.drop_table("missing").await.expect("idempotent drop");

    assert_eq!(warehouse.qualified_table("vendas"), "`proj.bucket.vendas`");
    assert_eq!(warehouse.dialect(), SqlDialect::BigQuery);
}

#[tokio::test]
async fn test_load_csv_uploads_tagged_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/bigquery/v2/projects/proj/jobs"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains("\"tableId\":\"vendas_ab12\""))
        .and(body_string_contains("restaurant_id,data,total"))
        .and(body_string_contains("r1,2024-05-01,10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": { "jobId": "load-1", "location": "US" },
            "status": { "state": "RUNNING" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/proj/jobs/load-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": { "jobId": "load-1", "location": "US" },
            "status": { "state": "DONE" }
        })))
        .mount(&server)
        .await;

    let headers = vec!["data".to_string(), "total".to_string()];
    let rows = vec![
        vec!["2024-05-01".to_string(), "10".to_string()],
        vec!["2024-05-02".to_string(), "20".to_string()],
    ];
    let loaded = warehouse(&server)
        .load_csv("vendas_ab12", "r1", &headers, &rows)
        .await
        .expect("load");
    assert_eq!(loaded, 2);
}

#[tokio::test]
async fn test_failed_load_job_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/bigquery/v2/projects/proj/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": { "jobId": "load-2" },
            "status": {
                "state": "DONE",
                "errorResult": { "message": "CSV table encountered too many errors" }
            }
        })))
        .mount(&server)
        .await;

    let err = warehouse(&server)
        .load_csv("t", "r1", &["a".to_string()], &[vec!["1".to_string()]])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Warehouse(m) if m.contains("too many errors")));
}

#[tokio::test]
async fn test_service_account_token_is_exchanged_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sa-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERIES))
        .and(header("authorization", "Bearer sa-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "schema": { "fields": [] },
            "rows": []
        })))
        .expect(2)
        .mount(&server)
        .await;

    let key = ServiceAccountKey::from_json(
        &json!({
            "type": "service_account",
            "client_email": "reader@proj.iam.gserviceaccount.com",
            "private_key": include_str!("fixtures/service_account_key.pem"),
            "private_key_id": "key-1",
            "token_uri": format!("{}/token", server.uri()),
        })
        .to_string(),
    )
    .expect("key");
    let auth = GoogleAuth::from_service_account(key, Duration::from_secs(5)).expect("auth");
    let warehouse = BigQueryWarehouse::new(settings(&server), Arc::new(auth)).expect("warehouse");

    for _ in 0..2 {
        assert!(warehouse.query("SELECT 1", &[]).await.expect("query").is_empty());
    }
}

#[tokio::test]
async fn test_token_exchange_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let key = ServiceAccountKey::from_json(
        &json!({
            "client_email": "reader@proj.iam.gserviceaccount.com",
            "private_key": include_str!("fixtures/service_account_key.pem"),
            "token_uri": format!("{}/token", server.uri()),
        })
        .to_string(),
    )
    .expect("key");
    let auth = GoogleAuth::from_service_account(key, Duration::from_secs(5)).expect("auth");

    let err = auth.access_token().await.unwrap_err();
    assert!(matches!(err, AppError::Warehouse(m) if m.contains("invalid_grant")));
}

#[tokio::test]
async fn test_index_search_and_insert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERIES))
        .and(body_string_contains("VECTOR_SEARCH"))
        .and(body_partial_json(json!({
            "queryParameters": [
                { "name": "restaurant_id", "parameterValue": { "value": "r1" } },
                {
                    "name": "query_embedding",
                    "parameterType": { "type": "ARRAY", "arrayType": { "type": "FLOAT64" } }
                }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "schema": { "fields": [
                { "name": "fileId", "type": "STRING" },
                { "name": "text", "type": "STRING" },
                { "name": "summary", "type": "STRING" },
                { "name": "distance", "type": "FLOAT" }
            ]},
            "rows": [{ "f": [
                { "v": "f1" }, { "v": "Lasagna costs 45" }, { "v": "Menu" }, { "v": "0.2" }
            ]}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(
            "/bigquery/v2/projects/proj/datasets/bucket/tables/embeddings_text/insertAll",
        ))
        .and(body_string_contains("\"restaurantId\":\"r1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "bigquery#tableDataInsertAllResponse"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let index = BigQueryIndex::new(
        Arc::new(warehouse(&server)),
        "embeddings_text".to_string(),
        "embeddings_tabular".to_string(),
    );
    assert_eq!(index.provider_name(), "bigquery");

    let stored = index
        .index_text_chunks(
            "r1",
            "f1",
            "Menu",
            &[EmbeddedChunk {
                text: "Lasagna costs 45".to_string(),
                embedding: vec![0.1, 0.2],
            }],
        )
        .await
        .expect("insert");
    assert_eq!(stored, 1);

    let hits = index.search_text("r1", &[0.1, 0.2], 3).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].file_id, "f1");
    assert_eq!(hits[0].summary, "Menu");
    assert!((hits[0].score - 0.8).abs() < 1e-6);
}
