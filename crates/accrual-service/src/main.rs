//! Main entry point for the accrual service.
//!
//! Runs the order accrual pipeline: newly submitted orders are registered
//! with the remote accrual service, their verdicts are polled and recorded,
//! and awarded cashback is credited to the owner's ledger. An optional HTTP
//! API accepts order submissions and exposes balances.

use accrual_config::Config;
use accrual_core::{AccrualBuilder, AccrualEngine, AccrualFactories, BuilderError};
use clap::Parser;
use std::path::PathBuf;

mod apis;
mod server;

use accrual_storage::implementations::file::create_repository as create_file_repository;
use accrual_storage::implementations::memory::create_repository as create_memory_repository;

/// Command-line arguments for the accrual service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "ACCRUAL_CONFIG", default_value = "config/accrual.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the accrual service.
///
/// Exits with an error as soon as the pipeline reports one, so a supervisor
/// can restart the process; unfinished work is picked up again on start.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started accrual service");

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = build_engine(config.clone())?;

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let repository = engine.repository().clone();

			tokio::select! {
				result = engine.run() => {
					let report = result?;
					tracing::info!(uptime = ?report.uptime, "Pipeline finished");
				}
				result = server::start_server(api_config, repository) => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting pipeline only");
			let report = engine.run().await?;
			tracing::info!(uptime = ?report.uptime, "Pipeline finished");
		},
	}

	tracing::info!("Stopped accrual service");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the accrual engine with the repository named in the config and an
/// HTTP client for the accrual service.
fn build_engine(config: Config) -> Result<AccrualEngine, BuilderError> {
	let storage_factories = create_factory_map!(
		accrual_storage::OrderRepository,
		accrual_storage::StorageError,
		"file" => create_file_repository,
		"memory" => create_memory_repository,
	);

	AccrualBuilder::new(config).build(AccrualFactories { storage_factories })
}

#[cfg(test)]
mod tests {
	use super::*;
	use accrual_config::builders::config::ConfigBuilder;
	use accrual_types::OrderStatus;
	use axum::extract::State;
	use axum::http::{HeaderMap, HeaderValue, StatusCode};
	use axum::response::{IntoResponse, Response};
	use axum::routing::get;
	use axum::Router;
	use rust_decimal::Decimal;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;
	use std::time::{Duration, Instant};
	use tempfile::tempdir;
	use tokio_util::sync::CancellationToken;
	use uuid::Uuid;

	#[test]
	fn test_args_default_values() {
		let args = Args::parse_from(["accrual"]);

		assert_eq!(args.config, PathBuf::from("config/accrual.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::parse_from(["accrual", "--config", "custom.toml", "-l", "debug"]);

		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_create_factory_map_macro() {
		let factories = create_factory_map!(
			accrual_storage::OrderRepository,
			accrual_storage::StorageError,
			"memory" => create_memory_repository,
		);

		assert_eq!(factories.len(), 1);
		assert!(factories.contains_key("memory"));
	}

	#[test]
	fn test_build_engine_with_minimal_config() {
		let config = ConfigBuilder::new().worker_count(4).build();

		let engine = build_engine(config).unwrap();

		assert_eq!(engine.config().worker_count, 4);
	}

	#[tokio::test]
	async fn test_build_engine_from_file_config() {
		let dir = tempdir().unwrap();
		let config_path = dir.path().join("accrual.toml");
		let storage_path = dir.path().join("accrual.json");

		let config_content = format!(
			r#"
[service]
id = "accrual-file-test"

[accrual]
base_url = "http://localhost:8081/api/orders"

[pipeline]
poll_interval_seconds = 2
worker_count = 2
max_orders_in_work = 20

[storage]
primary = "file"

[storage.implementations.file]
storage_path = "{}"
"#,
			storage_path.display()
		);
		std::fs::write(&config_path, config_content).unwrap();

		let config = Config::from_file(&config_path).await.unwrap();
		assert_eq!(config.service.id, "accrual-file-test");

		let engine = build_engine(config).unwrap();
		engine
			.repository()
			.create_processing_task(Uuid::new_v4(), "79927398713")
			.await
			.unwrap();
		assert!(storage_path.exists());
	}

	/// Accrual service mock: registers on the first call, rate limits the
	/// second one and awards cashback afterwards.
	async fn rate_limited(State(hits): State<Arc<AtomicUsize>>) -> Response {
		match hits.fetch_add(1, Ordering::SeqCst) {
			0 => axum::Json(serde_json::json!({
				"order": "79927398713",
				"status": "REGISTERED"
			}))
			.into_response(),
			1 => {
				let mut headers = HeaderMap::new();
				headers.insert("Retry-After", HeaderValue::from_static("2"));
				(StatusCode::TOO_MANY_REQUESTS, headers).into_response()
			},
			_ => axum::Json(serde_json::json!({
				"order": "79927398713",
				"status": "PROCESSED",
				"accrual": 729.5
			}))
			.into_response(),
		}
	}

	#[tokio::test]
	async fn test_rate_limited_order_completes_without_error() {
		let hits = Arc::new(AtomicUsize::new(0));
		let app = Router::new()
			.route("/api/orders/{number}", get(rate_limited))
			.with_state(hits.clone());
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let address = listener.local_addr().unwrap();
		tokio::spawn(async move { axum::serve(listener, app).await });

		let config = ConfigBuilder::new()
			.base_url(format!("http://{}/api/orders", address))
			.build();
		let engine = build_engine(config).unwrap();
		let user = Uuid::new_v4();
		engine
			.repository()
			.create_processing_task(user, "79927398713")
			.await
			.unwrap();

		let shutdown = CancellationToken::new();
		let handle = {
			let engine = engine.clone();
			let shutdown = shutdown.clone();
			tokio::spawn(async move { engine.run_until(shutdown).await })
		};

		let started = Instant::now();
		let repository = engine.repository().clone();
		loop {
			let order = repository.get_order("79927398713").await.unwrap();
			if order.status == OrderStatus::Processed {
				break;
			}
			assert!(started.elapsed() < Duration::from_secs(20), "order not processed");
			tokio::time::sleep(Duration::from_millis(50)).await;
		}
		assert!(started.elapsed() >= Duration::from_secs(2));

		shutdown.cancel();
		handle.await.unwrap().unwrap();

		assert_eq!(hits.load(Ordering::SeqCst), 3);
		assert_eq!(
			repository.balance(user).await.unwrap(),
			Decimal::new(7295, 1)
		);
	}
}
