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

use std::sync::Arc;

use hyper::StatusCode;
use serde::Serialize;
use warp::{reply::Response, Filter, Rejection};

use super::{reply::json_reply, with_arg};
use crate::{BuildInfo, ExporterServices};

#[derive(Debug, Serialize)]
struct VersionResponse<'a> {
	build: &'static BuildInfo,
	exporter: ExporterInfo<'a>,
}

/// What the running exporter observes.
#[derive(Debug, Serialize)]
struct ExporterInfo<'a> {
	couchdb_uri: &'a str,
	metrics_path: &'a str,
	databases: &'a [String],
	collect_views: bool,
	collect_scheduler_jobs: bool,
	/// `0` when requests against CouchDB are not limited.
	concurrent_requests: usize,
}

/// `GET version`, mounted under `/api/v1`.
pub fn version_handler(
	services: Arc<ExporterServices>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
	warp::path("version")
		.and(warp::path::end())
		.and(warp::get())
		.and(with_arg(services))
		.map(get_version)
}

fn get_version(services: Arc<ExporterServices>) -> Response {
	let config = &services.config;
	let response = VersionResponse {
		build: BuildInfo::get(),
		exporter: ExporterInfo {
			couchdb_uri: services.scraper.client().base_url(),
			metrics_path: &config.metrics_path,
			databases: &config.collector.databases,
			collect_views: config.collector.collect_views,
			collect_scheduler_jobs: config.collector.collect_scheduler_jobs,
			concurrent_requests: config.collector.concurrent_requests,
		},
	};
	json_reply(&response, StatusCode::OK)
}
