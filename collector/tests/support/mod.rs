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

//! Canned CouchDB servers built from the payloads in `collector/tests/testdata`.

#![allow(dead_code)]

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use common::{CollectorConfig, CouchdbConfig};
use serde_json::Value;
use wiremock::{
	matchers::{method, path},
	Mock, MockServer, ResponseTemplate,
};

pub const CLUSTER_NODES: [&str; 3] =
	["couchdb@172.16.238.11", "couchdb@172.16.238.12", "couchdb@172.16.238.13"];

pub fn testdata_dir() -> PathBuf {
	PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../collector/tests/testdata")
}

pub fn fixture(name: &str) -> Value {
	let path = testdata_dir().join(name);
	let content = std::fs::read_to_string(&path)
		.unwrap_or_else(|error| panic!("failed to read fixture {}: {error}", path.display()));
	serde_json::from_str(&content).unwrap()
}

pub fn json_response(status: u16, fixture_name: &str) -> ResponseTemplate {
	ResponseTemplate::new(status).set_body_json(fixture(fixture_name))
}

pub fn error_response(status: u16, error: &str, reason: &str) -> ResponseTemplate {
	ResponseTemplate::new(status).set_body_json(serde_json::json!({"error": error, "reason": reason}))
}

/// Responds after the client timeout of [`couchdb_config`] expired.
pub fn hanging_response() -> ResponseTemplate {
	ResponseTemplate::new(200).set_delay(Duration::from_secs(5))
}

/// One GET route per path. Routes can be replaced before the server starts.
pub struct FakeCouchdb {
	routes: BTreeMap<String, ResponseTemplate>,
}

impl FakeCouchdb {
	/// CouchDB 1.7 with the `example` and `another-example` databases.
	pub fn legacy() -> Self {
		let routes = [
			("/", "v1/root.json"),
			("/_stats", "v1/stats.json"),
			("/_all_dbs", "v1/all_dbs.json"),
			("/example", "v1/example.json"),
			("/another-example", "v1/another-example.json"),
			("/_active_tasks", "v1/active_tasks.json"),
		];
		Self::from_fixtures(&routes)
	}

	/// Three node CouchDB 2.3 cluster with the `example` and `another-example` databases.
	pub fn clustered() -> Self {
		let mut fake = Self::from_fixtures(&[
			("/", "v2/root.json"),
			("/_membership", "v2/membership.json"),
			("/_all_dbs", "v2/all_dbs.json"),
			("/example", "v2/example.json"),
			("/another-example", "v2/another-example.json"),
			("/example/_all_docs", "v2/example_design_docs.json"),
			("/another-example/_all_docs", "v2/another-example_design_docs.json"),
			("/example/_design/views/_view/by_name", "v2/example_view_by_name.json"),
			("/_active_tasks", "v2/active_tasks.json"),
			("/_scheduler/jobs", "v2/scheduler_jobs.json"),
		]);
		for node in CLUSTER_NODES {
			fake = fake
				.respond(&format!("/_node/{node}/_stats"), json_response(200, "v2/stats.json"))
				.respond(&format!("/_node/{node}/_system"), json_response(200, "v2/system.json"));
		}
		fake
	}

	fn from_fixtures(routes: &[(&str, &str)]) -> Self {
		let routes = routes
			.iter()
			.map(|(route, fixture_name)| (route.to_string(), json_response(200, fixture_name)))
			.collect();
		Self { routes }
	}

	pub fn respond(mut self, route: &str, response: ResponseTemplate) -> Self {
		self.routes.insert(route.to_string(), response);
		self
	}

	pub async fn start(self) -> MockServer {
		let server = MockServer::start().await;
		for (route, response) in self.routes {
			Mock::given(method("GET")).and(path(route)).respond_with(response).mount(&server).await;
		}
		server
	}
}

pub fn couchdb_config(server: &MockServer) -> CouchdbConfig {
	CouchdbConfig {
		uri: server.uri(),
		timeout: Duration::from_millis(500),
		..Default::default()
	}
}

pub fn collector_config(databases: &[&str], collect_views: bool) -> CollectorConfig {
	CollectorConfig {
		databases: databases.iter().map(|database| database.to_string()).collect(),
		collect_views,
		collect_scheduler_jobs: true,
		concurrent_requests: 2,
	}
}

/// Paths of the requests received so far, in arrival order.
pub async fn requested_paths(server: &MockServer) -> Vec<String> {
	server
		.received_requests()
		.await
		.unwrap_or_default()
		.into_iter()
		.map(|request| request.url.path().to_string())
		.collect()
}
