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

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use hyper::StatusCode;
use warp::{reply::with_status, Filter, Rejection};

use super::with_arg;

/// Flipped once the REST server is bound.
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
	pub fn set_ready(&self, is_ready: bool) {
		self.0.store(is_ready, Ordering::Release);
	}

	pub fn is_ready(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}
}

/// Health check handlers.
pub fn health_check_handlers(
	readiness: Readiness,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
	liveness_handler().or(readiness_handler(readiness))
}

fn liveness_handler() -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
	warp::path!("health" / "livez").and(warp::get()).then(get_liveness)
}

fn readiness_handler(
	readiness: Readiness,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
	warp::path!("health" / "readyz")
		.and(warp::get())
		.and(with_arg(readiness))
		.then(get_readiness)
}

async fn get_liveness() -> impl warp::Reply {
	with_status(warp::reply::json(&true), StatusCode::OK)
}

async fn get_readiness(readiness: Readiness) -> impl warp::Reply {
	let is_ready = readiness.is_ready();
	let status_code = if is_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
	with_status(warp::reply::json(&is_ready), status_code)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_readiness_follows_the_flag() {
		let readiness = Readiness::default();
		let handlers = health_check_handlers(readiness.clone());

		let response = warp::test::request().path("/health/readyz").reply(&handlers).await;
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(response.body(), "false");

		readiness.set_ready(true);
		let response = warp::test::request().path("/health/readyz").reply(&handlers).await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(response.body(), "true");
	}

	#[tokio::test]
	async fn test_liveness() {
		let handlers = health_check_handlers(Readiness::default());
		let response = warp::test::request().path("/health/livez").reply(&handlers).await;
		assert_eq!(response.status(), StatusCode::OK);
	}
}
