//! Database integration tests
//!
//! These tests verify the TursoClient functionality using in-memory SQLite.

use foodatlas::db::turso::parse_date;
use foodatlas::types::{
    AppError, CostType, CreateRestaurantRequest, FileKind, RestaurantFile, UpdateRestaurantRequest,
};
use foodatlas::TursoClient;
use tempfile::TempDir;

async fn create_test_client() -> TursoClient {
    TursoClient::new_memory()
        .await
        .expect("Failed to create in-memory database")
}

fn request(name: &str, cnpj: &str) -> CreateRestaurantRequest {
    CreateRestaurantRequest {
        name: name.to_string(),
        cnpj: cnpj.to_string(),
        address: Some("  ".to_string()),
        phone: Some("+55 11 99999-0000".to_string()),
    }
}

fn file(restaurant_id: &str, id: &str, table: Option<&str>) -> RestaurantFile {
    RestaurantFile {
        id: id.to_string(),
        restaurant_id: restaurant_id.to_string(),
        name: format!("{}.csv", id),
        kind: FileKind::Csv,
        size_bytes: 42,
        chunk_count: 1,
        table_name: table.map(str::to_string),
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_local_file_database_persists() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("foodatlas.db");
    let path = path.to_str().expect("utf-8 path");

    let id = {
        let client = TursoClient::new_local(path).await.expect("open");
        client
            .create_restaurant("owner", &request("Cantina", "1"))
            .await
            .expect("create")
            .id
    };

    let reopened = TursoClient::new_local(path).await.expect("reopen");
    let restaurant = reopened.get_restaurant("owner", &id).await.expect("get");
    assert_eq!(restaurant.name, "Cantina");
}

#[tokio::test]
async fn test_create_restaurant_normalizes_fields() {
    let client = create_test_client().await;

    let restaurant = client
        .create_restaurant("owner", &request("  Cantina  ", " 12.345 "))
        .await
        .expect("create");

    assert_eq!(restaurant.name, "Cantina");
    assert_eq!(restaurant.cnpj, "12.345");
    assert_eq!(restaurant.address, None);
    assert_eq!(restaurant.phone.as_deref(), Some("+55 11 99999-0000"));
    assert_eq!(restaurant.user_id, "owner");
}

#[tokio::test]
async fn test_duplicate_cnpj_is_per_owner() {
    let client = create_test_client().await;

    client
        .create_restaurant("alice", &request("A", "111"))
        .await
        .expect("first");

    let duplicate = client.create_restaurant("alice", &request("B", "111")).await;
    assert!(matches!(duplicate, Err(AppError::InvalidInput(_))));

    client
        .create_restaurant("bob", &request("C", "111"))
        .await
        .expect("another owner may reuse the CNPJ");
}

#[tokio::test]
async fn test_restaurants_are_scoped_to_owner() {
    let client = create_test_client().await;
    let alice = client
        .create_restaurant("alice", &request("A", "1"))
        .await
        .expect("create");
    client
        .create_restaurant("alice", &request("B", "2"))
        .await
        .expect("create");

    assert_eq!(client.list_restaurants("alice").await.expect("list").len(), 2);
    assert!(client.list_restaurants("bob").await.expect("list").is_empty());

    assert!(matches!(
        client.get_restaurant("bob", &alice.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        client.delete_restaurant("bob", &alice.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_files_newest_first_and_limit() {
    let client = create_test_client().await;

    for id in ["f1", "f2", "f3"] {
        client.insert_file(&file("r1", id, None)).await.expect("insert");
    }
    client
        .insert_file(&file("r2", "other", None))
        .await
        .expect("insert");

    let files = client.list_files("r1", None).await.expect("list");
    let ids: Vec<_> = files.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["f3", "f2", "f1"]);

    assert_eq!(client.list_files("r1", Some(2)).await.expect("list").len(), 2);
}

#[tokio::test]
async fn test_get_and_delete_file() {
    let client = create_test_client().await;
    client
        .insert_file(&file("r1", "f1", Some("vendas_f1")))
        .await
        .expect("insert");

    let stored = client.get_file("r1", "f1").await.expect("get");
    assert_eq!(stored.table_name.as_deref(), Some("vendas_f1"));
    assert_eq!(stored.kind, FileKind::Csv);

    assert!(matches!(
        client.get_file("r2", "f1").await,
        Err(AppError::NotFound(_))
    ));

    client.delete_file("r1", "f1").await.expect("delete");
    assert!(matches!(
        client.delete_file("r1", "f1").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_ledger_range_is_inclusive() {
    let client = create_test_client().await;

    for (amount, date) in [(10.0, "2024-04-30"), (20.0, "2024-05-01"), (30.0, "2024-05-31")] {
        client
            .insert_cost("r1", amount, CostType::Fixed, "Aluguel", date)
            .await
            .expect("insert");
    }
    client
        .insert_revenue("r1", 99.0, "Vendas", "2024-05-10")
        .await
        .expect("insert");

    let costs = client
        .list_costs("r1", "2024-05-01", "2024-05-31")
        .await
        .expect("list");
    let amounts: Vec<f64> = costs.iter().map(|c| c.amount).collect();
    assert_eq!(amounts, vec![20.0, 30.0]);
    assert!(costs.iter().all(|c| c.cost_type == Some(CostType::Fixed)));

    let revenues = client
        .list_revenues("r1", "2024-05-01", "2024-05-31")
        .await
        .expect("list");
    assert_eq!(revenues.len(), 1);
    assert_eq!(revenues[0].cost_type, None);
}

#[tokio::test]
async fn test_ledger_rejects_bad_amounts_and_dates() {
    let client = create_test_client().await;

    for amount in [-1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            client
                .insert_revenue("r1", amount, "x", "2024-05-01")
                .await,
            Err(AppError::InvalidInput(_))
        ));
    }

    assert!(matches!(
        client
            .insert_cost("r1", 5.0, CostType::Variable, "x", "2024-13-01")
            .await,
        Err(AppError::InvalidInput(_))
    ));
    assert!(parse_date(" 2024-02-29 ").is_ok());
    assert!(parse_date("2023-02-29").is_err());
}

#[tokio::test]
async fn test_chat_log_newest_first() {
    let client = create_test_client().await;

    client
        .log_chat("r1", "Primeira?", "text", "Sim")
        .await
        .expect("log");
    client
        .log_chat("r1", "Segunda?", "numeric", "Não")
        .await
        .expect("log");

    let chats = client.recent_chats("r1", 10).await.expect("recent");
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].question, "Segunda?");
    assert_eq!(chats[0].intent, "numeric");

    assert_eq!(client.recent_chats("r1", 1).await.expect("recent").len(), 1);
    assert!(client.recent_chats("r2", 10).await.expect("recent").is_empty());
}

#[tokio::test]
async fn test_delete_restaurant_cascades() {
    let client = create_test_client().await;
    let restaurant = client
        .create_restaurant("owner", &request("A", "1"))
        .await
        .expect("create");
    let id = restaurant.id.as_str();

    client.insert_file(&file(id, "f1", None)).await.expect("file");
    client
        .insert_cost(id, 10.0, CostType::Fixed, "x", "2024-05-01")
        .await
        .expect("cost");
    client.log_chat(id, "q", "text", "a").await.expect("chat");

    client.delete_restaurant("owner", id).await.expect("delete");

    assert!(client.list_files(id, None).await.expect("files").is_empty());
    assert!(client
        .list_costs(id, "2000-01-01", "2100-01-01")
        .await
        .expect("costs")
        .is_empty());
    assert!(client.recent_chats(id, 10).await.expect("chats").is_empty());
}

fn update(name: &str, cnpj: &str) -> UpdateRestaurantRequest {
    UpdateRestaurantRequest {
        name: name.to_string(),
        cnpj: cnpj.to_string(),
        address: Some("Rua B, 2".to_string()),
        phone: None,
    }
}

#[tokio::test]
async fn test_update_restaurant() {
    let client = create_test_client().await;
    let first = client
        .create_restaurant("owner", &request("A", "111"))
        .await
        .expect("create");
    client
        .create_restaurant("owner", &request("B", "222"))
        .await
        .expect("create");
    client
        .create_restaurant("someone-else", &request("C", "333"))
        .await
        .expect("create");

    let same_cnpj = client
        .update_restaurant("owner", &first.id, &update(" A2 ", "111"))
        .await
        .expect("keep own cnpj");
    assert_eq!(same_cnpj.name, "A2");
    assert_eq!(same_cnpj.address.as_deref(), Some("Rua B, 2"));
    assert_eq!(same_cnpj.phone, None);
    assert_eq!(same_cnpj.created_at, first.created_at);
    assert!(same_cnpj.updated_at >= first.updated_at);

    let moved = client
        .update_restaurant("owner", &first.id, &update("A2", "333"))
        .await
        .expect("cnpj used only by another owner");
    assert_eq!(moved.cnpj, "333");

    assert!(matches!(
        client
            .update_restaurant("owner", &first.id, &update("A2", "222"))
            .await,
        Err(AppError::InvalidInput(_))
    ));
    assert!(matches!(
        client
            .update_restaurant("owner", &first.id, &update(" ", "444"))
            .await,
        Err(AppError::InvalidInput(_))
    ));
    assert!(matches!(
        client
            .update_restaurant("someone-else", &first.id, &update("Mine", "555"))
            .await,
        Err(AppError::NotFound(_))
    ));

    let stored = client.get_restaurant("owner", &first.id).await.expect("get");
    assert_eq!(stored.name, "A2");
    assert_eq!(stored.cnpj, "333");
    assert_eq!(stored.phone, None);
}

#[tokio::test]
async fn test_concurrent_writes_on_file_database() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("foodatlas.db");
    let client = TursoClient::new_local(path.to_str().expect("utf-8 path"))
        .await
        .expect("open");

    let doomed = client
        .create_restaurant("owner", &request("A", "1"))
        .await
        .expect("create")
        .id;
    let kept = client
        .create_restaurant("owner", &request("B", "2"))
        .await
        .expect("create")
        .id;
    for i in 0..20 {
        client
            .insert_cost(&doomed, i as f64, CostType::Fixed, "x", "2024-05-01")
            .await
            .expect("cost");
    }

    let writes = async {
        for i in 0..20 {
            client
                .insert_revenue(&kept, i as f64, "venda", "2024-05-02")
                .await
                .expect("revenue");
        }
    };
    let (deleted, ()) = tokio::join!(client.delete_restaurant("owner", &doomed), writes);
    deleted.expect("delete");

    assert!(client
        .list_costs(&doomed, "2000-01-01", "2100-01-01")
        .await
        .expect("costs")
        .is_empty());
    assert_eq!(
        client
            .list_revenues(&kept, "2000-01-01", "2100-01-01")
            .await
            .expect("revenues")
            .len(),
        20
    );
}
