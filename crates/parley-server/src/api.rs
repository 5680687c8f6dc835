use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderValue, Method},
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{future, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_shared::UserId;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::{Hub, HubStats};

/// Verified user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Preferred language tag, set by the upstream auth layer.
pub const LANG_HEADER: &str = "x-user-lang";

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(hub_stats))
        .route("/presence", get(online_users))
        .route("/presence/:user_id", get(user_presence))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct OnlineResponse {
    online: Vec<UserId>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct PresenceResponse {
    user_id: UserId,
    online: bool,
}

#[derive(Debug, Default, Deserialize)]
struct WsParams {
    lang: Option<String>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn hub_stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats().await)
}

async fn online_users(State(state): State<AppState>) -> Json<OnlineResponse> {
    Json(OnlineResponse {
        online: state.hub.online_user_ids().await,
    })
}

async fn user_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<PresenceResponse> {
    let user_id = UserId(user_id);
    let online = state.hub.is_online(&user_id).await;
    Json(PresenceResponse { user_id, online })
}

async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let (user_id, lang) = admission(&headers, params)?;
    info!(user = %user_id, "WebSocket upgrade");

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| run_socket(hub, user_id, lang, socket)))
}

/// Identity and language for a new connection. The header language wins
/// over the query parameter; the hub applies the default when neither is
/// set.
fn admission(
    headers: &HeaderMap,
    params: WsParams,
) -> Result<(UserId, Option<String>), ServerError> {
    let user_id = header_str(headers, USER_ID_HEADER).ok_or(ServerError::Unauthenticated)?;
    let lang = header_str(headers, LANG_HEADER).or(params.lang);
    Ok((UserId(user_id), lang))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn run_socket(hub: Arc<Hub>, user_id: UserId, lang: Option<String>, socket: WebSocket) {
    let (sink, stream) = socket.split();

    // Text frames carry envelopes; a close frame ends the session.
    let inbound = stream
        .take_while(|frame| future::ready(!matches!(frame, Ok(WsMessage::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(WsMessage::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });
    let outbound =
        sink.with(|text: String| future::ready(Ok::<_, axum::Error>(WsMessage::Text(text))));

    hub.admit(user_id, lang, Box::pin(inbound), Box::pin(outbound))
        .await;
}

pub async fn serve<F>(state: AppState, addr: std::net::SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parley_store::SqliteStore;
    use tower::ServiceExt;

    use crate::hub::HubStores;
    use crate::translate::TaggingProvider;

    fn state() -> AppState {
        let config = ServerConfig::default();
        let hub = Hub::new(
            config.hub(),
            HubStores::sqlite(SqliteStore::in_memory().unwrap()),
            Arc::new(TaggingProvider),
        );
        AppState {
            hub: Arc::new(hub),
            config: Arc::new(config),
        }
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_admission_requires_identity() {
        let err = admission(&headers(&[]), WsParams::default()).unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated));

        let err = admission(&headers(&[(USER_ID_HEADER, "  ")]), WsParams::default()).unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated));
    }

    #[test]
    fn test_admission_language_precedence() {
        let query = || WsParams {
            lang: Some("de".to_string()),
        };

        let (user, lang) =
            admission(&headers(&[(USER_ID_HEADER, "u1"), (LANG_HEADER, "fr")]), query()).unwrap();
        assert_eq!(user, UserId::from("u1"));
        assert_eq!(lang.as_deref(), Some("fr"));

        let (_, lang) = admission(&headers(&[(USER_ID_HEADER, "u1")]), query()).unwrap();
        assert_eq!(lang.as_deref(), Some("de"));

        let (_, lang) = admission(&headers(&[(USER_ID_HEADER, "u1")]), WsParams::default()).unwrap();
        assert_eq!(lang, None);
    }

    #[tokio::test]
    async fn test_presence_handlers() {
        let state = state();

        let Json(all) = online_users(State(state.clone())).await;
        assert_eq!(all, OnlineResponse { online: Vec::new() });

        let Json(one) = user_presence(State(state), Path("ghost".to_string())).await;
        assert_eq!(
            one,
            PresenceResponse {
                user_id: UserId::from("ghost"),
                online: false,
            }
        );
    }

    #[tokio::test]
    async fn test_stats_handler_serializes_flat() {
        let Json(stats) = hub_stats(State(state())).await;
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["online"], 0);
        assert_eq!(value["groups"], 0);
        assert_eq!(value["dropped"], 0);
    }

    #[test]
    fn test_cors_layer_accepts_origin_lists() {
        let _any = cors_layer(&[]);
        let _listed = cors_layer(&[
            "https://chat.example.com".to_string(),
            "not a header\n".to_string(),
        ]);
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_routes_serve_json() {
        let app = build_router(state());

        let (status, body) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(app.clone(), "/presence").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "online": [] }));

        let (status, body) = get_json(app.clone(), "/presence/alice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "user_id": "alice", "online": false }));

        let (status, body) = get_json(app, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enqueued"], 0);
    }
}
