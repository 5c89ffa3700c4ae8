use anyhow::anyhow;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, extract::State};
use futures::StreamExt;
use nanoid::nanoid;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

use crate::data_models::Answer;
use crate::error::GatewayError;
use crate::gateway::{AnswerGateway, client_ip};

use super::models::{ChatRequest, HealthResponse, MISSING_QUERY, SearchRequest};

pub async fn search_handler(
    State(gateway): State<Arc<AnswerGateway>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Answer>, GatewayError> {
    let span = tracing::info_span!("search", request_id = %nanoid!(8));

    async move {
        let Json(body) = body.map_err(|e| {
            tracing::warn!("rejecting unreadable search body: {}", e.body_text());
            GatewayError::InvalidQuery(MISSING_QUERY)
        })?;
        let request = SearchRequest::from_body(&body).inspect_err(|_| {
            tracing::warn!("rejecting search without a usable query");
        })?;

        tracing::info!(query = %request.query, "search received");
        let answer = gateway.answer(&request.query, client_ip(&headers)).await?;
        Ok::<_, GatewayError>(Json(answer))
    }
    .instrument(span)
    .await
}

pub async fn chat_handler(
    State(gateway): State<Arc<AnswerGateway>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let span = tracing::info_span!("chat", request_id = %nanoid!(8));

    let fragments = async {
        let Json(request) = body.map_err(|e| {
            tracing::warn!("rejecting unreadable chat body: {}", e.body_text());
            GatewayError::stream(anyhow!(e.body_text()))
        })?;
        tracing::info!(messages = request.messages.len(), "chat stream requested");
        Ok::<_, GatewayError>(gateway.stream(&request.messages).await?)
    }
    .instrument(span.clone())
    .await?;

    // A failure after this point can only end the body early.
    let body = fragments.map(move |fragment| {
        fragment.map_err(|e| {
            let _guard = span.enter();
            tracing::error!("completion stream broke off: {:#}", e);
            std::io::Error::other(format!("{:#}", e))
        })
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
