//! Courseforge server.
//!
//! Wires the store, queue, orchestrator, and stage agents together and
//! exposes them over HTTP. Shutdown drains the queue: in-flight stage
//! tasks finish, pending ones are abandoned in place.

mod responses;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use courseforge_agents::{build_registry, GeminiClient, StageContext};
use courseforge_engine::{Orchestrator, Store, TaskQueue, DEFAULT_CONCURRENCY};

use routes::{create_router, AppContext};

/// Environment variable forcing simulation mode for every run.
const SIMULATE_ENV: &str = "COURSEFORGE_SIMULATE";

/// Courseforge orchestration server.
#[derive(Parser, Debug)]
#[command(name = "courseforge-server", about = "Courseforge orchestration server")]
struct Args {
    /// HTTP listen address
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Maximum number of concurrently executing stage tasks
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Serve fixture results for every run, never calling the model
    #[arg(long)]
    simulate: bool,

    /// Seconds to wait for a single stage task before failing its run
    #[arg(long, default_value_t = 600)]
    wait_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("courseforge=info".parse().unwrap()),
        )
        .init();

    let simulate_all = args.simulate
        || std::env::var(SIMULATE_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

    let gemini = if simulate_all {
        None
    } else {
        let client = GeminiClient::from_env();
        if client.is_none() {
            warn!("No Gemini API key configured; runs will use fixture results");
        }
        client
    };

    let store = Arc::new(Store::new());
    let ctx = StageContext::new(Arc::clone(&store), simulate_all, gemini);
    let registry = Arc::new(build_registry(&ctx));
    let queue = TaskQueue::new(Arc::clone(&store), registry, args.concurrency);
    let orchestrator = Arc::new(
        Orchestrator::new(Arc::clone(&store), Arc::clone(&queue))
            .with_wait_timeout(Duration::from_secs(args.wait_timeout_secs)),
    );

    let app = create_router(Arc::new(AppContext {
        store,
        queue: Arc::clone(&queue),
        orchestrator,
    }));

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    info!(addr = %args.addr, concurrency = args.concurrency, simulate = simulate_all, "Courseforge server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining task queue");
    queue.shutdown().await;
    info!("Courseforge server stopped");
    Ok(())
}

/// Resolves when the process receives ctrl-c.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
