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

//! Maps both API generations onto the generation agnostic snapshot model.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::payload::{
	ActiveTaskPayload, ClusteredStats, DatabasePayload, LegacyCounter, LegacyStats,
	SchedulerJobPayload, StatsPayload, SystemPayload,
};
use crate::snapshot::{
	ActiveTask, ApiGeneration, DatabaseStats, HttpdCounters, MemoryStats, NodeStats, SchedulerJob,
	LEGACY_NODE_NAME,
};

/// Counter groups flattened into [`NodeStats::subsystems`].
pub const SUBSYSTEM_GROUPS: [&str; 4] = ["couch_log", "fabric", "couch_replicator", "mango"];

pub(crate) fn node_stats(payload: StatsPayload) -> NodeStats {
	match payload {
		StatsPayload::Legacy(stats) => legacy_node_stats(stats),
		StatsPayload::Clustered(stats) => clustered_node_stats(stats),
	}
}

fn current(counter: &LegacyCounter) -> f64 {
	counter.current.unwrap_or_default()
}

fn legacy_node_stats(stats: LegacyStats) -> NodeStats {
	let couchdb = &stats.couchdb;
	let httpd = &stats.httpd;
	NodeStats {
		reachable: true,
		auth_cache_hits: current(&couchdb.auth_cache_hits),
		auth_cache_misses: current(&couchdb.auth_cache_misses),
		database_reads: current(&couchdb.database_reads),
		database_writes: current(&couchdb.database_writes),
		open_databases: current(&couchdb.open_databases),
		open_os_files: current(&couchdb.open_os_files),
		request_time: current(&couchdb.request_time),
		status_codes: stats
			.httpd_status_codes
			.iter()
			.map(|(code, counter)| (code.clone(), current(counter)))
			.collect(),
		request_methods: stats
			.httpd_request_methods
			.iter()
			.map(|(method, counter)| (method.clone(), current(counter)))
			.collect(),
		httpd: HttpdCounters {
			bulk_requests: current(&httpd.bulk_requests),
			clients_requesting_changes: current(&httpd.clients_requesting_changes),
			requests: current(&httpd.requests),
			temporary_view_reads: current(&httpd.temporary_view_reads),
			view_reads: current(&httpd.view_reads),
		},
		subsystems: subsystems(&stats.groups),
		memory: None,
	}
}

fn clustered_node_stats(stats: ClusteredStats) -> NodeStats {
	let couchdb = &stats.couchdb;
	let httpd = &couchdb.httpd;
	NodeStats {
		reachable: true,
		auth_cache_hits: couchdb.auth_cache_hits.value,
		auth_cache_misses: couchdb.auth_cache_misses.value,
		database_reads: couchdb.database_reads.value,
		database_writes: couchdb.database_writes.value,
		open_databases: couchdb.open_databases.value,
		open_os_files: couchdb.open_os_files.value,
		request_time: couchdb.request_time.value.median,
		status_codes: couchdb
			.httpd_status_codes
			.iter()
			.map(|(code, counter)| (code.clone(), counter.value))
			.collect(),
		request_methods: couchdb
			.httpd_request_methods
			.iter()
			.map(|(method, counter)| (method.clone(), counter.value))
			.collect(),
		httpd: HttpdCounters {
			bulk_requests: httpd.bulk_requests.value,
			clients_requesting_changes: httpd.clients_requesting_changes.value,
			requests: httpd.requests.value,
			temporary_view_reads: httpd.temporary_view_reads.value,
			view_reads: httpd.view_reads.value,
		},
		subsystems: subsystems(&stats.groups),
		memory: None,
	}
}

fn subsystems(groups: &BTreeMap<String, Value>) -> BTreeMap<String, BTreeMap<String, f64>> {
	SUBSYSTEM_GROUPS
		.iter()
		.filter_map(|group| {
			let value = groups.get(*group)?;
			let mut counters = BTreeMap::new();
			flatten_counters("", value, &mut counters);
			Some((group.to_string(), counters))
		})
		.collect()
}

/// Flattens nested stat objects into dotted paths.
///
/// A counter is an object with a numeric `value` (clustered) or a `current` (legacy). Histograms
/// carry an object `value`, each numeric statistic of it becomes its own path.
pub(crate) fn flatten_counters(prefix: &str, value: &Value, counters: &mut BTreeMap<String, f64>) {
	match value {
		Value::Number(number) =>
			if let Some(number) = number.as_f64() {
				counters.insert(prefix.to_string(), number);
			},
		Value::Object(object) => flatten_object(prefix, object, counters),
		_ => {},
	}
}

fn flatten_object(prefix: &str, object: &Map<String, Value>, counters: &mut BTreeMap<String, f64>) {
	match (object.get("value"), object.get("current")) {
		(Some(Value::Number(value)), _) => {
			if let Some(value) = value.as_f64() {
				counters.insert(prefix.to_string(), value);
			}
		},
		(Some(Value::Object(histogram)), _) =>
			for (statistic, value) in histogram {
				if let Some(value) = value.as_f64() {
					counters.insert(join(prefix, statistic), value);
				}
			},
		(_, Some(current)) => {
			counters.insert(prefix.to_string(), current.as_f64().unwrap_or_default());
		},
		_ =>
			for (key, value) in object {
				if key == "desc" || key == "description" || key == "type" {
					continue;
				}
				flatten_counters(&join(prefix, key), value, counters);
			},
	}
}

fn join(prefix: &str, key: &str) -> String {
	if prefix.is_empty() {
		key.to_string()
	} else {
		format!("{prefix}.{key}")
	}
}

pub(crate) fn memory_stats(payload: SystemPayload) -> MemoryStats {
	let memory = payload.memory;
	MemoryStats {
		other: memory.other,
		atom: memory.atom,
		atom_used: memory.atom_used,
		processes: memory.processes,
		processes_used: memory.processes_used,
		binary: memory.binary,
		code: memory.code,
		ets: memory.ets,
	}
}

pub(crate) fn database_stats(payload: DatabasePayload) -> DatabaseStats {
	let sizes = &payload.sizes;
	let reported_disk_size = payload.disk_size.unwrap_or_default();
	// Newer servers dropped `disk_size` and `data_size` in favour of `sizes`.
	let disk_size_overhead = if reported_disk_size == 0.0 && sizes.file > 0.0 {
		sizes.file - sizes.active
	} else {
		reported_disk_size - payload.data_size.unwrap_or_default()
	};
	DatabaseStats {
		disk_size: payload.disk_size.unwrap_or(sizes.file),
		data_size: payload.data_size.unwrap_or(sizes.active),
		disk_size_overhead,
		doc_count: payload.doc_count,
		doc_del_count: payload.doc_del_count,
		compact_running: payload.compact_running,
		disk_format_version: payload.disk_format_version,
		partitioned: payload.props.partitioned,
		update_seq: payload.update_seq,
		views: BTreeMap::new(),
		skipped_views: Vec::new(),
	}
}

pub(crate) fn active_task(payload: ActiveTaskPayload, generation: ApiGeneration) -> ActiveTask {
	let node = match (payload.node, generation) {
		(None, ApiGeneration::Legacy) => Some(LEGACY_NODE_NAME.to_string()),
		(node, _) => node,
	};
	ActiveTask {
		task_type: payload.task_type,
		node,
		database: payload.database,
		doc_id: payload.doc_id,
		continuous: payload.continuous,
		source: payload.source,
		target: payload.target,
		updated_on: payload.updated_on,
		changes_pending: payload.changes_pending,
	}
}

pub(crate) fn scheduler_job(payload: SchedulerJobPayload) -> SchedulerJob {
	let latest = payload.history.iter().max_by_key(|event| event.timestamp);
	SchedulerJob {
		id: payload.id,
		node: payload.node,
		database: payload.database,
		doc_id: payload.doc_id,
		source: payload.source.unwrap_or_default(),
		target: payload.target.unwrap_or_default(),
		state: latest.map(|event| event.event_type.clone()).unwrap_or_default(),
		updated_at: latest.map(|event| event.timestamp),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_flatten_clustered_groups() {
		let mut counters = BTreeMap::new();
		flatten_counters(
			"",
			&json!({
				"level": {
					"error": {"value": 3, "type": "counter", "desc": "errors"},
					"info": {"value": 10, "type": "counter", "desc": "infos"}
				},
				"read_timeouts": {"value": {"min": 1.0, "median": 2.5, "percentile": [[50, 2]]}}
			}),
			&mut counters,
		);
		assert_eq!(
			counters,
			BTreeMap::from([
				("level.error".to_string(), 3.0),
				("level.info".to_string(), 10.0),
				("read_timeouts.median".to_string(), 2.5),
				("read_timeouts.min".to_string(), 1.0),
			])
		);
	}

	#[test]
	fn test_flatten_legacy_counters() {
		let mut counters = BTreeMap::new();
		flatten_counters(
			"",
			&json!({"hits": {"description": "cache hits", "current": 4.0, "sum": 4.0}, "misses": {"current": null}}),
			&mut counters,
		);
		assert_eq!(
			counters,
			BTreeMap::from([("hits".to_string(), 4.0), ("misses".to_string(), 0.0)])
		);
	}

	#[test]
	fn test_database_overhead() {
		let legacy: DatabasePayload =
			serde_json::from_value(json!({"disk_size": 1000, "data_size": 400})).unwrap();
		let stats = database_stats(legacy);
		assert_eq!(stats.disk_size_overhead, 600.0);
		assert_eq!(stats.disk_size, 1000.0);

		let sizes_only: DatabasePayload =
			serde_json::from_value(json!({"sizes": {"file": 900, "active": 300, "external": 100}}))
				.unwrap();
		let stats = database_stats(sizes_only);
		assert_eq!(stats.disk_size_overhead, 600.0);
		assert_eq!(stats.disk_size, 900.0);
		assert_eq!(stats.data_size, 300.0);
	}

	#[test]
	fn test_legacy_active_task_defaults_node() {
		let payload = || -> ActiveTaskPayload {
			serde_json::from_value(json!({"type": "indexer", "database": "example"})).unwrap()
		};
		assert_eq!(
			active_task(payload(), ApiGeneration::Legacy).node.as_deref(),
			Some(LEGACY_NODE_NAME)
		);
		assert_eq!(active_task(payload(), ApiGeneration::Clustered).node, None);
	}

	#[test]
	fn test_scheduler_job_uses_latest_event() {
		let payload: SchedulerJobPayload = serde_json::from_value(json!({
			"id": "a1+continuous",
			"node": "couchdb@n1",
			"database": "_replicator",
			"doc_id": "rep",
			"source": "http://a/db/",
			"target": "http://b/db/",
			"history": [
				{"timestamp": "2024-03-01T10:00:00Z", "type": "added"},
				{"timestamp": "2024-03-01T10:05:00Z", "type": "crashed"},
				{"timestamp": "2024-03-01T10:01:00Z", "type": "started"}
			]
		}))
		.unwrap();
		let job = scheduler_job(payload);
		assert_eq!(job.state, "crashed");
		assert_eq!(job.updated_at.map(|at| at.timestamp()), Some(1_709_287_500));
	}
}
