use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

use tenantgate::config::Config;
use tenantgate::inbound::App;
use tenantgate::metrics::{self, App as MetricsApp, Metrics};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
	/// Listen port for the MCP endpoint (overrides PORT)
	#[arg(short, long)]
	port: Option<u16>,

	/// Listen port for the admin endpoint serving /metrics
	#[arg(long, default_value_t = 19000)]
	admin_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();

	let args = Args::parse();
	let mut config = Config::from_env()?;
	if let Some(port) = args.port {
		config.port = port;
	}
	let config = Arc::new(config);

	let mut registry = Registry::default();
	let app_metrics = Arc::new(Metrics::new(metrics::sub_registry(&mut registry)));
	let app = App::new(config.clone(), app_metrics).await?;

	let ct = CancellationToken::new();
	{
		let ct = ct.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				info!("shutdown signal received");
				ct.cancel();
			}
		});
	}

	let mut run_set: JoinSet<Result<()>> = JoinSet::new();

	let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("serving mcp on {addr}");
	let router = app.router();
	let child_token = ct.child_token();
	run_set.spawn(async move {
		axum::serve(listener, router)
			.with_graceful_shutdown(async move {
				child_token.cancelled().await;
			})
			.await
			.map_err(|e| anyhow::anyhow!("serving error: {e}"))
	});

	let admin_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.admin_port));
	let admin_listener = tokio::net::TcpListener::bind(admin_addr).await?;
	info!("serving metrics on {admin_addr}");
	let admin_router = MetricsApp::new(Arc::new(registry)).router();
	let child_token = ct.child_token();
	run_set.spawn(async move {
		axum::serve(admin_listener, admin_router)
			.with_graceful_shutdown(async move {
				child_token.cancelled().await;
			})
			.await
			.map_err(|e| anyhow::anyhow!("serving error: {e}"))
	});

	while let Some(result) = run_set.join_next().await {
		result??;
	}
	Ok(())
}
