use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error, info};

use crate::catalog_store::Track;
use crate::ranking::{
    AddOutcome, Matchup, MatchupRequest, RankingEngine, RankingError, VoteOutcome, VoteRequest,
};
use crate::user::{AuthTokenValue, UserManager};
use axum_extra::extract::cookie::{Cookie, SameSite};
use tower_http::services::ServeDir;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{response, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::metrics::{self, metrics_handler};
use super::session::{Session, SESSION_COOKIE};
use super::{log_requests, state::*, RequestsLoggingLevel, ServerConfig};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize)]
struct LoginBody {
    pub user_handle: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

#[derive(Serialize)]
struct AddTrackResponse {
    outcome: AddOutcome,
}

#[derive(Serialize)]
struct ResetResponse {
    removed_tracks: usize,
}

#[derive(Serialize)]
struct RecomputeResponse {
    replayed_comparisons: usize,
}

#[derive(Deserialize, Debug)]
struct HistoryQuery {
    limit: Option<usize>,
}

impl IntoResponse for RankingError {
    fn into_response(self) -> Response {
        let status = match &self {
            RankingError::Unauthorized => StatusCode::UNAUTHORIZED,
            RankingError::InvalidTrackId(_) | RankingError::InvalidVote(_) => {
                StatusCode::BAD_REQUEST
            }
            RankingError::TrackNotInPool(_) => StatusCode::NOT_FOUND,
            RankingError::RatingUpdateFailed(_) | RankingError::Storage(_) => {
                error!("{:#}", self);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        (status, self.to_string()).into_response()
    }
}

fn error_label(err: &RankingError) -> &'static str {
    match err {
        RankingError::Unauthorized => "unauthorized",
        RankingError::InvalidTrackId(_) | RankingError::InvalidVote(_) => "invalid",
        RankingError::TrackNotInPool(_) => "not_in_pool",
        RankingError::RatingUpdateFailed(_) => "update_failed",
        RankingError::Storage(_) => "storage",
    }
}

fn record_matchup_outcome(matchup: &Option<Matchup>) {
    let outcome = match matchup {
        Some(m) if m.degraded => "degraded",
        Some(_) => "matched",
        None => "exhausted",
    };
    metrics::record_matchup(outcome);
}

fn caller(session: &Option<Session>) -> Option<usize> {
    session.as_ref().map(|s| s.user_id)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<LoginBody>,
) -> Response {
    debug!("login() called for {}", body.user_handle);
    let start = Instant::now();
    match user_manager.login(&body.user_handle, &body.password) {
        Ok(Some(auth_token)) => {
            metrics::record_login_attempt("success", start.elapsed());
            let response_body = LoginSuccessResponse {
                token: auth_token.value.0.clone(),
            };
            let cookie_value = HeaderValue::from_str(&format!(
                "{}={}; Path=/; HttpOnly",
                SESSION_COOKIE, auth_token.value.0
            ));
            let (response_body, cookie_value) =
                match (serde_json::to_string(&response_body), cookie_value) {
                    (Ok(body), Ok(cookie)) => (body, cookie),
                    _ => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                };
            response::Builder::new()
                .status(StatusCode::CREATED)
                .header(axum::http::header::SET_COOKIE, cookie_value)
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(response_body))
                .map(IntoResponse::into_response)
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Ok(None) => {
            metrics::record_login_attempt("failure", start.elapsed());
            StatusCode::UNAUTHORIZED.into_response()
        }
        Err(err) => {
            error!("Error during login of {}: {}", body.user_handle, err);
            metrics::record_login_attempt("error", start.elapsed());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout(State(user_manager): State<GuardedUserManager>, session: Session) -> Response {
    match user_manager.delete_auth_token(session.user_id, &AuthTokenValue(session.token)) {
        Ok(()) => {
            let cookie_value = Cookie::build(Cookie::new(SESSION_COOKIE, ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1))
                .same_site(SameSite::Lax)
                .build();

            (
                StatusCode::OK,
                [(axum::http::header::SET_COOKIE, cookie_value.to_string())],
            )
                .into_response()
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn get_vault(
    session: Option<Session>,
    State(engine): State<GuardedRankingEngine>,
) -> Response {
    match engine.get_rankings(caller(&session)) {
        Ok(rankings) => Json(rankings).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn add_vault_track(
    session: Option<Session>,
    State(engine): State<GuardedRankingEngine>,
    Json(track): Json<Track>,
) -> Response {
    match engine.add_track_to_vault(caller(&session), &track) {
        Ok(AddOutcome::Added) => (
            StatusCode::CREATED,
            Json(AddTrackResponse {
                outcome: AddOutcome::Added,
            }),
        )
            .into_response(),
        Ok(AddOutcome::AlreadyInVault) => Json(AddTrackResponse {
            outcome: AddOutcome::AlreadyInVault,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete_vault_track(
    session: Option<Session>,
    State(engine): State<GuardedRankingEngine>,
    Path(track_id): Path<String>,
) -> Response {
    match engine.remove_track_from_vault(caller(&session), &track_id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn reset_vault(
    session: Option<Session>,
    State(engine): State<GuardedRankingEngine>,
) -> Response {
    match engine.reset(caller(&session)) {
        Ok(removed_tracks) => Json(ResetResponse { removed_tracks }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn recompute_vault(
    session: Option<Session>,
    State(engine): State<GuardedRankingEngine>,
) -> Response {
    match engine.recompute(caller(&session)) {
        Ok(replayed_comparisons) => Json(RecomputeResponse {
            replayed_comparisons,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn post_matchup(
    session: Option<Session>,
    State(engine): State<GuardedRankingEngine>,
    Json(request): Json<MatchupRequest>,
) -> Response {
    match engine.get_next_matchup(caller(&session), &request) {
        Ok(matchup) => {
            record_matchup_outcome(&matchup);
            Json(matchup).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn post_vote(
    session: Option<Session>,
    State(engine): State<GuardedRankingEngine>,
    Json(vote): Json<VoteRequest>,
) -> Response {
    let outcome: Result<VoteOutcome, RankingError> =
        engine.submit_vote_and_fetch_next(caller(&session), &vote);
    match outcome {
        Ok(outcome) => {
            metrics::record_vote("recorded");
            record_matchup_outcome(&outcome.next);
            Json(outcome).into_response()
        }
        Err(err) => {
            metrics::record_vote(error_label(&err));
            err.into_response()
        }
    }
}

async fn get_history(
    session: Option<Session>,
    State(engine): State<GuardedRankingEngine>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    match engine.history(caller(&session), limit) {
        Ok(history) => Json(history).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn make_app(
    config: ServerConfig,
    user_manager: GuardedUserManager,
    ranking_engine: GuardedRankingEngine,
) -> Result<Router> {
    let state = ServerState::new(config.clone(), user_manager, ranking_engine);

    let auth_routes: Router = Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .with_state(state.clone());

    let vault_routes: Router = Router::new()
        .route("/", get(get_vault))
        .route("/", post(add_vault_track))
        .route("/{track_id}", delete(delete_vault_track))
        .route("/reset", post(reset_vault))
        .route("/recompute", post(recompute_vault))
        .with_state(state.clone());

    let ranking_routes: Router = Router::new()
        .route("/matchup", post(post_matchup))
        .route("/vote", post(post_vote))
        .route("/history", get(get_history))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let app: Router = home_router
        .nest("/v1/auth", auth_routes)
        .nest("/v1/vault", vault_routes)
        .nest("/v1/ranking", ranking_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(
    user_manager: Arc<UserManager>,
    ranking_engine: Arc<RankingEngine>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    metrics_port: u16,
    frontend_dir_path: Option<String>,
) -> Result<()> {
    let config = ServerConfig {
        requests_logging_level,
        port,
        metrics_port,
        frontend_dir_path,
    };
    let app = make_app(config, user_manager, ranking_engine)?;

    let metrics_app = Router::new().route("/metrics", get(metrics_handler));
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port)).await?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, metrics_app).await {
            error!("Metrics server stopped: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::SqliteCatalogStore;
    use crate::ranking::RankingSettings;
    use crate::rating_store::SqliteRatingStore;
    use crate::user::SqliteUserStore;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn make_test_app() -> (Router, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let user_store = SqliteUserStore::new(temp_dir.path().join("user.db")).unwrap();
        let catalog = SqliteCatalogStore::new(temp_dir.path().join("catalog.db")).unwrap();
        let ratings = SqliteRatingStore::new(temp_dir.path().join("ranking.db")).unwrap();
        let engine = RankingEngine::new(
            Arc::new(catalog),
            Arc::new(ratings),
            RankingSettings::default(),
        );
        let app = make_app(
            ServerConfig::default(),
            Arc::new(UserManager::new(Arc::new(user_store))),
            Arc::new(engine),
        )
        .unwrap();
        (app, temp_dir)
    }

    #[tokio::test]
    async fn responds_unauthorized_on_protected_routes() {
        let (app, _temp_dir) = make_test_app();

        let protected_routes = vec![
            ("GET", "/v1/vault"),
            ("DELETE", "/v1/vault/abc"),
            ("POST", "/v1/vault/reset"),
            ("POST", "/v1/vault/recompute"),
            ("GET", "/v1/ranking/history"),
            ("GET", "/v1/auth/logout"),
        ];

        for (method, route) in protected_routes.into_iter() {
            let request = Request::builder()
                .method(method)
                .uri(route)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", route);
        }

        let request = Request::builder()
            .method("POST")
            .uri("/v1/ranking/matchup")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn home_reports_stats_without_session() {
        let (app, _temp_dir) = make_test_app();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3 * 3600 + 4 * 60 + 5)),
            "2d 03:04:05"
        );
    }

    #[test]
    fn maps_ranking_errors_to_status_codes() {
        let cases = vec![
            (RankingError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                RankingError::InvalidTrackId("a:b".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RankingError::InvalidVote("same track".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RankingError::TrackNotInPool("t1".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                RankingError::RatingUpdateFailed(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RankingError::Storage(anyhow::anyhow!("locked")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
