use crate::{GIT_COMMIT_HASH, api::ApiState};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::Connection;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    /// `ok`, `error`, or `disabled` when running without a database.
    database: String,
    active_key_id: Option<String>,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Database and key ring are healthy", body = [Health]),
        (status = 503, description = "Database or key ring is unhealthy", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(method: Method, state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let database = match &state.pool {
        None => Ok("disabled"),
        Some(pool) => {
            let acquire_span = info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            );
            match pool.acquire().instrument(acquire_span).await {
                Ok(mut conn) => {
                    let ping_span =
                        info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
                    match conn.ping().instrument(ping_span).await {
                        Ok(()) => Ok("ok"),
                        Err(error) => {
                            error!("Failed to ping database: {}", error);
                            Err(StatusCode::SERVICE_UNAVAILABLE)
                        }
                    }
                }
                Err(error) => {
                    error!("Failed to acquire database connection: {}", error);
                    Err(StatusCode::SERVICE_UNAVAILABLE)
                }
            }
        }
    };

    let active_key_id = state
        .encryption
        .key_ring()
        .active_key_id()
        .map_err(|err| error!("Key ring unavailable: {}", err))
        .ok();

    let is_healthy = database.is_ok() && active_key_id.is_some();

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.unwrap_or("error").to_string(),
        active_key_id,
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();

            headers.insert("X-App", x_app_header_value);

            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        });

    let headers = headers.unwrap_or_else(|()| HeaderMap::new());

    debug!(database = %health.database, "Health checked");

    if is_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
