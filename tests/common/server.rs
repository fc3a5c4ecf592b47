//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own databases.

use super::constants::*;
use super::fixtures::create_test_db_with_users;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use vault_ranker::catalog_store::SqliteCatalogStore;
use vault_ranker::ranking::{RankingEngine, RankingSettings};
use vault_ranker::rating_store::SqliteRatingStore;
use vault_ranker::server::{make_app, RequestsLoggingLevel, ServerConfig};
use vault_ranker::user::{SqliteUserStore, UserManager};

/// Test server instance with isolated databases
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// User manager for direct database access in tests
    pub user_manager: Arc<UserManager>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with default ranking settings
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(RankingSettings::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the databases can't be created, the port can't be bound or
    /// the server doesn't become ready within timeout.
    pub async fn spawn_with_settings(settings: RankingSettings) -> Self {
        let (temp_db_dir, user_db_path) =
            create_test_db_with_users().expect("Failed to create test database");

        let user_store =
            Arc::new(SqliteUserStore::new(&user_db_path).expect("Failed to open user store"));
        let user_manager = Arc::new(UserManager::new(user_store));

        let catalog = Arc::new(
            SqliteCatalogStore::new(temp_db_dir.path().join("catalog.db"))
                .expect("Failed to open catalog store"),
        );
        let ratings = Arc::new(
            SqliteRatingStore::new(temp_db_dir.path().join("ranking.db"))
                .expect("Failed to open rating store"),
        );
        let engine = Arc::new(RankingEngine::new(catalog, ratings, settings));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            metrics_port: 0,
            frontend_dir_path: None,
        };

        let app = make_app(config, user_manager.clone(), engine).expect("Failed to build app");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            user_manager,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
