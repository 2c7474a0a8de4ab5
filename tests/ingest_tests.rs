//! Ingestion pipeline tests over in-memory stores.

mod common;

use common::mocks::{MockEmbedder, MockLLMClient};
use common::test_state;
use foodatlas::rag::IngestService;
use foodatlas::types::{AppError, FileKind};
use foodatlas::warehouse::QueryParam;
use foodatlas::{AppState, Embedder};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::Arc;

fn llm() -> MockLLMClient {
    MockLLMClient::new("")
        .on("analysing text files", "  Restaurant opening procedures.  ")
        .on("analysing CSV files", "Stock movements per day.")
}

async fn service(state: &AppState) -> IngestService {
    state.ingest_service().await.expect("ingest service")
}

async fn table_count(state: &AppState) -> serde_json::Value {
    let result = state
        .warehouse
        .query(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table'",
            &[],
        )
        .await
        .expect("sqlite_master");
    result.rows[0]["n"].clone()
}

fn pdf_with_text(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

#[tokio::test]
async fn test_text_upload_is_chunked_and_searchable() {
    let state = test_state(llm()).await;
    let text = "Open the kitchen at seven. Check the fridge temperature. Count the cash drawer.";

    let file = service(&state)
        .await
        .ingest("r1", "procedures.md", text.as_bytes())
        .await
        .expect("ingest");

    assert_eq!(file.kind, FileKind::Text);
    assert!(file.chunk_count >= 1);
    assert_eq!(file.size_bytes, text.len() as i64);
    assert!(file.table_name.is_none());

    let stored = state.turso.get_file("r1", &file.id).await.expect("record");
    assert_eq!(stored.name, "procedures.md");

    let query = MockEmbedder::new()
        .embed("fridge temperature")
        .await
        .expect("embed");
    let hits = state.index.search_text("r1", &query, 5).await.expect("search");
    assert_eq!(hits.len() as i64, file.chunk_count);
    assert!(hits.iter().all(|h| h.file_id == file.id));
    assert!(hits.iter().all(|h| h.summary == "Restaurant opening procedures."));
    assert!(hits.iter().any(|h| h.text.contains("fridge temperature")));
}

#[tokio::test]
async fn test_pdf_upload_extracts_text() {
    let state = test_state(llm()).await;

    let file = service(&state)
        .await
        .ingest("r1", "manual.pdf", &pdf_with_text("Clean the grill every night."))
        .await
        .expect("ingest pdf");

    assert_eq!(file.kind, FileKind::Pdf);
    let query = MockEmbedder::new().embed("grill").await.expect("embed");
    let hits = state.index.search_text("r1", &query, 5).await.expect("search");
    assert!(hits.iter().any(|h| h.text.contains("grill")));
}

#[tokio::test]
async fn test_unreadable_pdf_is_rejected() {
    let state = test_state(llm()).await;

    let err = service(&state)
        .await
        .ingest("r1", "broken.pdf", b"%PDF-1.4 not really")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(state.turso.list_files("r1", None).await.expect("files").is_empty());
}

#[tokio::test]
async fn test_csv_upload_loads_table_and_indexes_description() {
    let state = test_state(llm()).await;
    let csv = "item;quantidade;custo\nTomate;10;2,5\nQueijo;3;12\n";

    let file = service(&state)
        .await
        .ingest("r1", "Estoque Junho.csv", csv.as_bytes())
        .await
        .expect("ingest csv");

    let table = file.table_name.clone().expect("table name");
    assert!(table.starts_with("estoque_junho_"));
    assert_eq!(file.chunk_count, 1);

    let columns = state.warehouse.table_columns(&table).await.expect("columns");
    assert_eq!(columns, vec!["restaurant_id", "item", "quantidade", "custo"]);

    let rows = state
        .warehouse
        .query(
            &format!(
                "SELECT item FROM {} WHERE restaurant_id = @restaurant_id",
                state.warehouse.qualified_table(&table)
            ),
            &[QueryParam::restaurant("r1")],
        )
        .await
        .expect("query");
    assert_eq!(rows.rows.len(), 2);

    let query = MockEmbedder::new().embed("stock").await.expect("embed");
    let hits = state.index.search_tables("r1", &query, 1).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].table_name, table);
    assert!(hits[0]
        .description
        .starts_with("## File description and columns: Stock movements per day."));
    assert!(hits[0].description.contains("## Example row:"));
}

#[tokio::test]
async fn test_failed_csv_ingestion_rolls_back() {
    let state = test_state(MockLLMClient::failing()).await;

    let err = service(&state)
        .await
        .ingest("r1", "vendas.csv", b"data,total\n2024-05-01,10\n")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::LLM(_)));
    assert_eq!(table_count(&state).await, 0);
    assert!(state.turso.list_files("r1", None).await.expect("files").is_empty());
}

#[tokio::test]
async fn test_failed_text_ingestion_writes_nothing() {
    let state = test_state(MockLLMClient::failing()).await;

    assert!(service(&state)
        .await
        .ingest("r1", "notes.txt", b"Some notes about the menu.")
        .await
        .is_err());

    let query = MockEmbedder::new().embed("menu").await.expect("embed");
    assert!(state
        .index
        .search_text("r1", &query, 5)
        .await
        .expect("search")
        .is_empty());
    assert!(state.turso.list_files("r1", None).await.expect("files").is_empty());
}

#[tokio::test]
async fn test_embedding_failure_is_reported() {
    let state = test_state(llm()).await;
    let config = state.config_manager.config();
    let service = IngestService::new(
        state.turso.clone(),
        state.index.clone(),
        Arc::new(MockEmbedder::failing()),
        state.warehouse.clone(),
        state.llm().await.expect("llm"),
        &config.rag,
        config.llm.summary_max_tokens,
    )
    .expect("service");

    let err = service
        .ingest("r1", "vendas.csv", b"data,total\n2024-05-01,10\n")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LLM(_)));
    assert_eq!(table_count(&state).await, 0);
}

#[tokio::test]
async fn test_whitespace_document_is_rejected() {
    let state = test_state(llm()).await;

    let err = service(&state)
        .await
        .ingest("r1", "blank.txt", b"   \n\t  ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_delete_file_removes_everything() {
    let state = test_state(llm()).await;
    let service = service(&state).await;

    let csv = service
        .ingest("r1", "vendas.csv", b"data,total\n2024-05-01,10\n")
        .await
        .expect("csv");
    let doc = service
        .ingest("r1", "notes.txt", b"Delivery closes at midnight.")
        .await
        .expect("txt");

    service.delete_file("r1", &csv.id).await.expect("delete csv");

    let table = csv.table_name.expect("table");
    assert!(state.warehouse.table_columns(&table).await.expect("cols").is_empty());
    let query = MockEmbedder::new().embed("sales").await.expect("embed");
    assert!(state
        .index
        .search_tables("r1", &query, 5)
        .await
        .expect("search")
        .is_empty());

    let remaining = state.turso.list_files("r1", None).await.expect("files");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, doc.id);

    assert!(matches!(
        service.delete_file("r1", &csv.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_restaurant_cleans_all_stores() {
    let state = test_state(llm()).await;
    let tables = state.dashboard_tables();
    let restaurant = state
        .turso
        .create_restaurant(
            "owner",
            &foodatlas::types::CreateRestaurantRequest {
                name: "Cantina".into(),
                cnpj: "1".into(),
                address: None,
                phone: None,
            },
        )
        .await
        .expect("restaurant");
    let rid = restaurant.id.as_str();
    let service = service(&state).await;

    let csv = service
        .ingest(rid, "vendas.csv", b"data,total\n2024-05-01,10\n")
        .await
        .expect("csv");
    service
        .ingest(rid, "notes.txt", b"Delivery closes at midnight.")
        .await
        .expect("txt");

    let headers = vec!["data".to_string(), "vendas_brutas_brl".to_string()];
    let rows = vec![vec!["2024-05-01".to_string(), "100".to_string()]];
    for owner in [rid, "someone-else"] {
        state
            .warehouse
            .load_csv(&tables.integrated, owner, &headers, &rows)
            .await
            .expect("shared rows");
    }

    service
        .delete_restaurant("owner", rid, &tables.all())
        .await
        .expect("delete");

    assert!(state
        .warehouse
        .table_columns(csv.table_name.as_deref().expect("table"))
        .await
        .expect("cols")
        .is_empty());

    let shared = state
        .warehouse
        .query(
            &format!(
                "SELECT restaurant_id FROM {}",
                state.warehouse.qualified_table(&tables.integrated)
            ),
            &[],
        )
        .await
        .expect("shared table");
    assert_eq!(shared.rows.len(), 1);
    assert_eq!(shared.rows[0]["restaurant_id"], "someone-else");

    let query = MockEmbedder::new().embed("midnight").await.expect("embed");
    assert!(state.index.search_text(rid, &query, 5).await.expect("search").is_empty());
    assert!(matches!(
        state.turso.get_restaurant("owner", rid).await,
        Err(AppError::NotFound(_))
    ));
}
