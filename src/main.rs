use std::net::TcpListener;
use std::sync::Arc;

use tokenkeeper::auth::AuthService;
use tokenkeeper::configuration::get_configuration;
use tokenkeeper::startup::run;
use tokenkeeper::store::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use tokenkeeper::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, what: &str) -> std::io::Error {
    std::io::Error::new(kind, what.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(std::io::ErrorKind::InvalidInput, "Configuration error"));
        }
    };

    let store: Arc<dyn CredentialStore> = match &configuration.database {
        Some(database) => {
            tracing::info!(host = %database.host, "Using Postgres credential store");
            let store = PgCredentialStore::connect_lazy(database, configuration.auth.store_timeout())
                .map_err(|e| {
                    tracing::error!("Failed to create connection pool: {}", e);
                    startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
                })?;
            store.migrate().await.map_err(|e| {
                tracing::error!("Failed to migrate the database: {}", e);
                startup_error(std::io::ErrorKind::Other, "Database migration error")
            })?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("No database configured; users are kept in memory");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let service = AuthService::new(store, &configuration.auth).map_err(|e| {
        tracing::error!("Failed to build authentication service: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Authentication settings error")
    })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, service, configuration.application)?;
    server.await
}
