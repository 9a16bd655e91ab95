//! # flexd-api - Status API Server
//!
//! The HTTP surface the presentation layer polls:
//! - `GET /status` - run flag, phase, session state, recent activity
//! - `GET /auth_status` - whether the driven app is signed in
//! - `GET /metrics` - grabbed-block counts, earnings, history
//! - `POST /start_bot` - validate a [`BotConfig`] and start a run
//! - `POST /stop_bot` - stop the current run (idempotent)
//!
//! Reads come straight from the shared state store and never wait on the
//! bot's polling cadence. Start and stop go through the bot task's command
//! channel, so the one writer stays the one writer.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use flexd_bot::{BotConfig, BotHandle, StateHandle};
use flexd_core::prelude::*;
use flexd_core::AuthStatus;
use flexd_driver::SessionStateHandle;

/// Shared handler state: the bot's command handle plus read handles onto
/// the state store and the session manager.
#[derive(Clone)]
pub struct Api {
    bot: BotHandle,
    store: StateHandle,
    session: SessionStateHandle,
}

impl Api {
    pub fn new(bot: BotHandle, store: StateHandle, session: SessionStateHandle) -> Self {
        Self {
            bot,
            store,
            session,
        }
    }
}

/// Builds the Status API router.
pub fn router(api: Api) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/auth_status", get(get_auth_status))
        .route("/metrics", get(get_metrics))
        .route("/start_bot", post(post_start_bot))
        .route("/stop_bot", post(post_stop_bot))
        .with_state(api)
}

/// Serves the router on `bind` until the shutdown future resolves.
pub async fn serve<S>(bind: &str, api: Api, shutdown: S) -> Result<()>
where
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| Error::api(format!("failed to bind {bind}: {e}")))?;
    info!("Status API listening on http://{bind}");
    axum::serve(listener, router(api))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::api(format!("status API server failed: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// `GET /status` payload.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Whether a run is active.
    pub running: bool,
    /// Control-loop phase label, e.g. `"polling"`.
    pub state: String,
    /// Automation session state label, e.g. `"degraded (2/10)"`.
    pub session: String,
    /// Recent activity lines, oldest first, newline-joined.
    pub logs: String,
}

/// `POST /start_bot` success payload, echoing the accepted config.
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub status: &'static str,
    pub config: BotConfig,
}

/// `POST /stop_bot` payload.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: &'static str,
}

/// Error payload for refused requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_status(State(api): State<Api>) -> Json<StatusResponse> {
    let state = api.store.snapshot();
    let logs: Vec<&str> = state.recent_logs.iter().map(String::as_str).collect();
    Json(StatusResponse {
        running: state.phase.is_running(),
        state: state.phase.label().to_string(),
        session: api.session.current().label(),
        logs: logs.join("\n"),
    })
}

async fn get_auth_status(State(api): State<Api>) -> Json<AuthStatus> {
    Json(api.store.auth())
}

async fn get_metrics(State(api): State<Api>) -> Json<flexd_core::MetricsSnapshot> {
    Json(api.store.metrics())
}

async fn post_start_bot(
    State(api): State<Api>,
    Json(config): Json<BotConfig>,
) -> std::result::Result<Json<StartResponse>, ApiError> {
    api.bot.start(config.clone()).await?;
    info!(warehouse = %config.warehouse, "start request accepted");
    Ok(Json(StartResponse {
        status: "started",
        config,
    }))
}

async fn post_stop_bot(State(api): State<Api>) -> std::result::Result<Json<StopResponse>, ApiError> {
    api.bot.stop().await?;
    info!("stop request handled");
    Ok(Json(StopResponse { status: "stopped" }))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Wrapper giving [`Error`] an HTTP rendering.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

/// HTTP status and stable error code for a refused request.
fn classify(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
        Error::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
        Error::ChannelSend { .. } | Error::ChannelClosed => {
            (StatusCode::SERVICE_UNAVAILABLE, "BOT_UNAVAILABLE")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = classify(&self.0);
        warn!(%status, code, error = %self.0, "request refused");
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            code,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexd_bot::{spawn_bot, HoursWindow, Settings};
    use flexd_core::BotPhase;
    use flexd_driver::test_utils::ScriptedTransport;

    const IDLE_SCREEN: &str = r#"<hierarchy>
  <node resource-id="com.amazon.flex.rabbit:id/empty_state_text" text="No offers available" bounds="[100,800][980,900]" />
</hierarchy>"#;

    fn valid_config() -> BotConfig {
        BotConfig {
            days: ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            hours: HoursWindow {
                start: "00:00".to_string(),
                end: "23:59".to_string(),
            },
            min_rate: 20.0,
            warehouse: "DSD8".to_string(),
        }
    }

    fn api_with_idle_bot() -> (Api, StateHandle) {
        let transport = ScriptedTransport::new();
        transport.push_screen(IDLE_SCREEN);
        let mut settings = Settings::default();
        settings.session.initial_backoff_secs = 0;
        settings.session.max_backoff_secs = 0;
        settings.cadence.poll_min_ms = 0;
        settings.cadence.poll_max_ms = 0;
        settings.cadence.poll_step_ms = 0;
        settings.cadence.settle_ms = 0;
        settings.cadence.refresh_every = 0;
        let store = StateHandle::new();
        let (bot, session) = spawn_bot(transport, &settings, store.clone());
        (Api::new(bot, store.clone(), session), store)
    }

    // ── Reads ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_status_before_any_run_is_defaulted() {
        let (api, _store) = api_with_idle_bot();

        let Json(status) = get_status(State(api)).await;

        assert!(!status.running);
        assert_eq!(status.state, "stopped");
        assert_eq!(status.session, "disconnected");
        assert!(status.logs.is_empty());
    }

    #[tokio::test]
    async fn test_auth_status_defaults_to_unauthenticated() {
        let (api, _store) = api_with_idle_bot();

        let Json(auth) = get_auth_status(State(api)).await;

        assert!(!auth.authenticated);
        assert!(!auth.message.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_before_any_run_are_empty() {
        let (api, _store) = api_with_idle_bot();

        let Json(metrics) = get_metrics(State(api)).await;

        assert_eq!(metrics.blocks_grabbed, 0);
        assert_eq!(metrics.earnings, 0.0);
        assert!(metrics.history.is_empty());
    }

    // ── Start ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_start_flips_run_flag_and_echoes_config() {
        let (api, store) = api_with_idle_bot();

        let Json(reply) = post_start_bot(State(api.clone()), Json(valid_config()))
            .await
            .unwrap();

        assert_eq!(reply.status, "started");
        assert_eq!(reply.config, valid_config());

        let Json(status) = get_status(State(api.clone())).await;
        assert!(status.running);
        assert_eq!(store.snapshot().config, Some(valid_config()));

        let _ = post_stop_bot(State(api)).await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_is_a_conflict() {
        let (api, store) = api_with_idle_bot();

        let _ = post_start_bot(State(api.clone()), Json(valid_config()))
            .await
            .unwrap();
        let err = post_start_bot(State(api.clone()), Json(valid_config()))
            .await
            .unwrap_err();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        // The refused start changed nothing
        assert_eq!(store.snapshot().config, Some(valid_config()));
        assert!(store.phase().is_running());

        let _ = post_stop_bot(State(api)).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_is_unprocessable() {
        let (api, store) = api_with_idle_bot();

        let mut config = valid_config();
        config.min_rate = 0.0;
        let err = post_start_bot(State(api), Json(config)).await.unwrap_err();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(store.phase(), BotPhase::Stopped);
        assert!(store.snapshot().config.is_none());
    }

    // ── Stop ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (api, store) = api_with_idle_bot();

        let Json(first) = post_stop_bot(State(api.clone())).await.unwrap();
        let Json(second) = post_stop_bot(State(api)).await.unwrap();

        assert_eq!(first.status, "stopped");
        assert_eq!(second.status, "stopped");
        assert_eq!(store.phase(), BotPhase::Stopped);
    }

    #[tokio::test]
    async fn test_stop_ends_a_running_bot() {
        let (api, store) = api_with_idle_bot();

        let _ = post_start_bot(State(api.clone()), Json(valid_config()))
            .await
            .unwrap();
        let _ = post_stop_bot(State(api.clone())).await.unwrap();

        assert_eq!(store.phase(), BotPhase::Stopped);
        let Json(status) = get_status(State(api)).await;
        assert!(!status.running);
        assert_eq!(status.session, "closed");
        assert!(status.logs.contains("Bot stopped"));
    }

    // ── Error mapping ───────────────────────────────────────

    #[test]
    fn test_error_classification() {
        assert_eq!(
            classify(&Error::validation("days must not be empty")),
            (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
        );
        assert_eq!(
            classify(&Error::conflict("Bot is already running")),
            (StatusCode::CONFLICT, "CONFLICT")
        );
        assert_eq!(
            classify(&Error::ChannelClosed),
            (StatusCode::SERVICE_UNAVAILABLE, "BOT_UNAVAILABLE")
        );
        assert_eq!(
            classify(&Error::connect("refused")),
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        );
    }

    #[test]
    fn test_error_body_carries_reason() {
        let err = ApiError::from(Error::validation("min_rate must be greater than zero"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_router_builds() {
        let transport = ScriptedTransport::new();
        let store = StateHandle::new();
        let (bot, session) = spawn_bot(transport, &Settings::default(), store.clone());
        let _ = router(Api::new(bot, store, session));
    }
}
