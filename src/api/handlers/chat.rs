use crate::{
    auth::middleware::AuthUser,
    types::{AppError, ChatRequest, Result},
    workflows::ChatEvent,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use std::{convert::Infallible, sync::Arc};

fn to_sse(event: ChatEvent) -> Event {
    Event::default().event(event.name()).data(event.data())
}

/// Ask a question about a restaurant's data
///
/// Streams server-sent events: one `route` event with the chosen intent,
/// `token` events carrying the answer text, then `done` (or `error`).
#[utoipa::path(
    post,
    path = "/api/restaurants/{id}/chat",
    params(("id" = String, Path, description = "Restaurant ID")),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Blank question"),
        (status = 404, description = "Restaurant not found")
    ),
    tag = "chat",
    security(("bearer" = []))
)]
pub async fn chat(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let question = payload.question.trim().to_string();
    if question.is_empty() {
        return Err(AppError::InvalidInput(
            "'question' must not be blank".to_string(),
        ));
    }

    super::owned_restaurant(&state, &claims, &id).await?;

    let workflow = Arc::new(state.chat_workflow().await?);
    tracing::info!(restaurant_id = %id, user_id = %claims.sub, "chat question received");

    let stream = workflow
        .answer(id, question)
        .map(|event| Ok::<_, Infallible>(to_sse(event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}
