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

use common::metrics::{new_counter, IntCounter};
use once_cell::sync::Lazy;

pub struct RestMetrics {
	pub http_requests_total: IntCounter,
	pub scrapes_total: IntCounter,
	pub scrape_failures_total: IntCounter,
}

impl Default for RestMetrics {
	fn default() -> Self {
		RestMetrics {
			http_requests_total: new_counter(
				"http_requests_total",
				"Total number of HTTP requests received by the exporter",
				"couchdb_exporter",
			),
			scrapes_total: new_counter(
				"scrapes_total",
				"Total number of CouchDB scrapes",
				"couchdb_exporter",
			),
			scrape_failures_total: new_counter(
				"scrape_failures_total",
				"Total number of CouchDB scrapes that found the server down",
				"couchdb_exporter",
			),
		}
	}
}

/// Serve counters, registered in the process-wide registry and appended to every `/metrics`
/// payload.
pub static SERVE_METRICS: Lazy<RestMetrics> = Lazy::new(RestMetrics::default);
