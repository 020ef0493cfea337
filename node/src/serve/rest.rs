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

use std::{convert::Infallible, net::TcpListener, sync::Arc};

use common::ServiceErrorCode;
use hyper::server::conn::AddrIncoming;
use tower::{make::Shared, ServiceBuilder};
use tower_http::compression::{
	predicate::{DefaultPredicate, Predicate, SizeAbove},
	CompressionLayer,
};
use tracing::{error, info};
use warp::{Filter, Rejection, Reply};

use super::{reply::ApiError, BoxFutureInfaillible};
use crate::{
	health_check_api::health_check_handlers, metrics_handler, version_handler, ExporterServices,
};

/// The minimum size a response body must be in order to
/// be automatically compressed with gzip.
const MINIMUM_RESPONSE_COMPRESSION_SIZE: u16 = 10 << 10;

/// Every route of the exporter, with request counting and error recovery.
pub fn rest_routes(
	services: Arc<ExporterServices>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
	let request_counter = warp::log::custom(|_| {
		crate::SERVE_METRICS.http_requests_total.inc();
	});

	// `/health/*` routes.
	let health_check_routes = health_check_handlers(services.readiness.clone());

	// `/{metrics_path}` route.
	let metrics_routes = metrics_handler(services.clone());

	// `/api/v1/*` routes.
	let api_v1_root_route = warp::path!("api" / "v1" / ..).and(version_handler(services));

	metrics_routes
		.or(health_check_routes)
		.or(api_v1_root_route)
		.with(request_counter)
		.recover(recover_fn)
}

/// Starts REST services on an already bound listener.
pub(crate) async fn start_rest_server(
	listener: TcpListener,
	services: Arc<ExporterServices>,
	readiness_trigger: BoxFutureInfaillible<()>,
	shutdown_signal: BoxFutureInfaillible<()>,
) -> anyhow::Result<()> {
	let rest_listen_addr = listener.local_addr()?;
	let warp_service = warp::service(rest_routes(services));
	let compression_predicate =
		DefaultPredicate::new().and(SizeAbove::new(MINIMUM_RESPONSE_COMPRESSION_SIZE));

	let service = ServiceBuilder::new()
		.layer(CompressionLayer::new().gzip(true).compress_when(compression_predicate))
		.service(warp_service);

	listener.set_nonblocking(true)?;
	let incoming = AddrIncoming::from_listener(tokio::net::TcpListener::from_std(listener)?)?;
	info!(
		rest_listen_addr=?rest_listen_addr,
		"Starting REST server listening on {rest_listen_addr}."
	);

	// Dropping the server future on shutdown closes idle and in flight connections alike.
	let serve_fut = async move {
		tokio::select! {
			 res = hyper::Server::builder(incoming).serve(Shared::new(service)) => { res }
			 _ = shutdown_signal => { Ok(()) }
		}
	};

	let (serve_res, _trigger_res) = tokio::join!(serve_fut, readiness_trigger);
	serve_res?;
	info!("REST server stopped");
	Ok(())
}

/// This function returns a formatted error based on the given rejection reason.
pub async fn recover_fn(rejection: Rejection) -> Result<impl Reply, Infallible> {
	Ok(get_status_with_error(rejection))
}

fn get_status_with_error(rejection: Rejection) -> ApiError {
	if rejection.is_not_found() {
		ApiError::new(ServiceErrorCode::NotFound, "Route not found")
	} else if let Some(error) = rejection.find::<serde_qs::Error>() {
		ApiError::new(ServiceErrorCode::BadRequest, error.to_string())
	} else if let Some(error) = rejection.find::<warp::reject::UnsupportedMediaType>() {
		ApiError::new(ServiceErrorCode::UnsupportedMediaType, error.to_string())
	} else if let Some(error) = rejection.find::<warp::reject::InvalidQuery>() {
		ApiError::new(ServiceErrorCode::BadRequest, error.to_string())
	} else if let Some(error) = rejection.find::<warp::reject::MethodNotAllowed>() {
		ApiError::new(ServiceErrorCode::MethodNotAllowed, error.to_string())
	} else {
		error!("REST server error: {:?}", rejection);
		ApiError::new(ServiceErrorCode::Internal, "internal server error")
	}
}
