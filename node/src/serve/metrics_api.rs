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

use std::{sync::Arc, time::Instant};

use collector::{ScrapeSnapshot, ScrapeStatus};
use common::metrics::encode_text;
use hyper::{header::CONTENT_TYPE, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, warn};
use warp::{reply::Response, Filter, Rejection, Reply};

use super::with_arg;
use crate::{publish, CollectorGroups, ExporterServices, SERVE_METRICS};

/// Query string of the metrics route: `?collect[]=views&collect[]=databases`.
#[derive(Debug, Default, Deserialize, Eq, PartialEq)]
struct MetricsQueryString {
	#[serde(default)]
	collect: Vec<String>,
}

/// Scrapes CouchDB on every call and answers with the text exposition format.
pub fn metrics_handler(
	services: Arc<ExporterServices>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
	let metrics_path = services.config.metrics_path.trim_matches('/').to_string();
	warp::path(metrics_path)
		.and(warp::path::end())
		.and(warp::get())
		// Non strict mode accepts percent encoded brackets.
		.and(serde_qs::warp::query::<MetricsQueryString>(serde_qs::Config::new(2, false)))
		.and(with_arg(services))
		.then(get_metrics)
}

async fn get_metrics(query: MetricsQueryString, services: Arc<ExporterServices>) -> Response {
	let groups = CollectorGroups::from_requested(&query.collect);
	let started_at = Instant::now();
	let snapshot = services.scraper.scrape(groups.scope()).await;
	SERVE_METRICS.scrapes_total.inc();
	if let ScrapeStatus::Down { reason } = &snapshot.status {
		SERVE_METRICS.scrape_failures_total.inc();
		warn!(reason = %reason, "CouchDB is down");
	}
	debug!(
		groups = %groups,
		requests = snapshot.request_count,
		elapsed_ms = started_at.elapsed().as_millis() as u64,
		"metrics-scraped"
	);

	match render_metrics(&snapshot, &groups) {
		Ok(payload) =>
			warp::reply::with_header(payload, CONTENT_TYPE, prometheus::TEXT_FORMAT).into_response(),
		Err(err) => {
			error!(error = ?err, "failed to render metrics");
			warp::reply::with_status(err.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
				.into_response()
		},
	}
}

/// Metric families of the snapshot followed by the exporter's own process-wide families.
pub fn render_metrics(
	snapshot: &ScrapeSnapshot,
	groups: &CollectorGroups,
) -> anyhow::Result<String> {
	let registry = publish(snapshot, groups)?;
	let mut metric_families = registry.gather();
	metric_families.extend(prometheus::gather());
	encode_text(&metric_families)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_collect_query_parsing() {
		let config = serde_qs::Config::new(2, false);
		let query: MetricsQueryString =
			config.deserialize_str("collect[]=views&collect[]=databases").unwrap();
		assert_eq!(query.collect, vec!["views".to_string(), "databases".to_string()]);

		let query: MetricsQueryString =
			config.deserialize_str("collect%5B%5D=scheduler").unwrap();
		assert_eq!(query.collect, vec!["scheduler".to_string()]);

		let query: MetricsQueryString = config.deserialize_str("").unwrap();
		assert_eq!(query, MetricsQueryString::default());
	}

	#[test]
	fn test_render_down_snapshot() {
		let payload =
			render_metrics(&ScrapeSnapshot::down("refused", 1), &CollectorGroups::all()).unwrap();
		assert!(payload.contains("couchdb_httpd_up 0"));
		assert!(payload.contains("couchdb_exporter_request_count 1"));
	}
}
