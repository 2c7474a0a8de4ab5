use crate::{
    auth::middleware::AuthUser,
    types::{AppError, ListFilesQuery, RestaurantFile, Result},
    AppState,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

/// Upload a document or spreadsheet
///
/// Text and PDF files are chunked into the restaurant's index; CSV files are
/// loaded into a warehouse table and profiled. The raw bytes are not kept.
#[utoipa::path(
    post,
    path = "/api/restaurants/{id}/files",
    params(("id" = String, Path, description = "Restaurant ID")),
    request_body(content_type = "multipart/form-data", description = "A `file` field"),
    responses(
        (status = 201, description = "File ingested", body = RestaurantFile),
        (status = 400, description = "Missing file or unsupported type"),
        (status = 404, description = "Restaurant not found")
    ),
    tag = "files",
    security(("bearer" = []))
)]
pub async fn upload_file(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<RestaurantFile>)> {
    super::owned_restaurant(&state, &claims, &id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::InvalidInput("The file needs a name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {}", e)))?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload
        .ok_or_else(|| AppError::InvalidInput(format!("Missing '{}' field", FILE_FIELD)))?;
    if bytes.is_empty() {
        return Err(AppError::InvalidInput(format!("'{}' is empty", file_name)));
    }

    let file = state
        .ingest_service()
        .await?
        .ingest(&id, &file_name, &bytes)
        .await?;

    Ok((StatusCode::CREATED, Json(file)))
}

/// List a restaurant's files, newest first
#[utoipa::path(
    get,
    path = "/api/restaurants/{id}/files",
    params(
        ("id" = String, Path, description = "Restaurant ID"),
        ("limit" = Option<u32>, Query, description = "Maximum number of files")
    ),
    responses(
        (status = 200, description = "Files", body = [RestaurantFile]),
        (status = 404, description = "Restaurant not found")
    ),
    tag = "files",
    security(("bearer" = []))
)]
pub async fn list_files(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<Vec<RestaurantFile>>> {
    super::owned_restaurant(&state, &claims, &id).await?;
    Ok(Json(state.turso.list_files(&id, query.limit).await?))
}

/// Delete a file with its index entries and warehouse table
#[utoipa::path(
    delete,
    path = "/api/restaurants/{id}/files/{file_id}",
    params(
        ("id" = String, Path, description = "Restaurant ID"),
        ("file_id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Restaurant or file not found")
    ),
    tag = "files",
    security(("bearer" = []))
)]
pub async fn delete_file(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    super::owned_restaurant(&state, &claims, &id).await?;
    state
        .ingest_service()
        .await?
        .delete_file(&id, &file_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
