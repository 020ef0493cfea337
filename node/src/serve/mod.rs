// Copyright (C) 2023 QuerentAI LLC.
// This file is part of Querent.

// The Licensed Work is licensed under the Business Source License 1.1 (BSL 1.1).
// You may use this file in compliance with the BSL 1.1, subject to the following restrictions:
// 1. You may not use the Licensed Work for AI-related services, database services,
//    or any service or product offering that provides database, big data, or analytics
//    services to third parties unless explicitly authorized by QuerentAI LLC.
// 2. For more details, see the LICENSE file or visit https://mariadb.com/bsl11/.

// For inquiries about alternative licensing arrangements, please contact contact@querent.xyz.

// The Licensed Work is provided "AS IS", WITHOUT WARRANTY OF ANY KIND, express or implied,
// including but not limited to the warranties of merchantability, fitness for a particular purpose,
// and non-infringement. See the Business Source License for more details.

// This software includes code developed by QuerentAI LLC (https://querent.xyz).

pub mod build_info;
use std::{convert::Infallible, net::TcpListener, sync::Arc};

use anyhow::Context;
pub use build_info::*;
use collector::Scraper;
use common::ExporterConfig;
pub mod health_check_api;
pub use health_check_api::*;
pub mod reply;
pub mod rest;
pub mod version_api;
pub use version_api::*;
pub mod metrics;
pub use metrics::*;
pub mod metrics_api;
pub use metrics_api::*;
pub mod publish;
pub use publish::*;
use tokio::sync::oneshot;
use tracing::{debug, info};
use warp::Filter;

pub type BoxFutureInfaillible<T> = futures::future::BoxFuture<'static, T>;

/// Shared state of the REST handlers.
pub struct ExporterServices {
	pub config: ExporterConfig,
	pub scraper: Scraper,
	pub readiness: Readiness,
}

impl ExporterServices {
	pub fn new(config: ExporterConfig) -> anyhow::Result<Self> {
		let scraper = Scraper::new(&config.couchdb, config.collector.clone())
			.context("failed to build the CouchDB client")?;
		Ok(Self { config, scraper, readiness: Readiness::default() })
	}
}

fn with_arg<T: Clone + Send>(arg: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
	warp::any().map(move || arg.clone())
}

async fn exporter_readiness(readiness: Readiness, rest_readiness_signal_rx: oneshot::Receiver<()>) {
	if rest_readiness_signal_rx.await.is_err() {
		// the REST server failed.
		return;
	};
	info!("REST server is ready");
	readiness.set_ready(true);
}

/// Binds the listen address and serves the exporter until `shutdown_signal` resolves.
pub async fn serve_exporter(
	config: ExporterConfig,
	shutdown_signal: BoxFutureInfaillible<()>,
) -> anyhow::Result<()> {
	let listener = TcpListener::bind(config.listen_address)
		.with_context(|| format!("failed to bind `{}`", config.listen_address))?;
	let services = Arc::new(ExporterServices::new(config)?);
	serve_exporter_on(listener, services, shutdown_signal).await
}

/// Same as [`serve_exporter`] on an already bound listener.
pub async fn serve_exporter_on(
	listener: TcpListener,
	services: Arc<ExporterServices>,
	shutdown_signal: BoxFutureInfaillible<()>,
) -> anyhow::Result<()> {
	info!(
		couchdb_uri = %services.scraper.client().base_url(),
		metrics_path = %services.config.metrics_path,
		databases = ?services.config.collector.databases,
		"serving CouchDB metrics"
	);
	let (rest_readiness_trigger_tx, rest_readiness_signal_rx) = oneshot::channel::<()>();
	let rest_readiness_trigger = Box::pin(async move {
		if rest_readiness_trigger_tx.send(()).is_err() {
			debug!("REST server readiness signal receiver was dropped");
		}
	});
	tokio::spawn(exporter_readiness(services.readiness.clone(), rest_readiness_signal_rx));
	rest::start_rest_server(listener, services, rest_readiness_trigger, shutdown_signal).await
}
