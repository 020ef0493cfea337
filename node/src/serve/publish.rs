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

//! Translates a [`ScrapeSnapshot`] into prometheus metric families.
//!
//! Every scrape gets a fresh [`Registry`], so nothing has to be reset between scrapes and a
//! failed scrape publishes only `couchdb_httpd_up 0` and the request count.

use std::{collections::BTreeSet, fmt, str::FromStr};

use collector::{
	ActivitySummary, DatabaseStats, NodeStats, SchedulerSummary, ScrapeScope, ScrapeSnapshot,
	ServerInfo, ViewStaleness,
};
use common::metrics::{gauge, gauge_vec, Registry};
use num_traits::ToPrimitive;
use tracing::warn;

/// Status codes published by `couchdb_httpd_status_codes`, when the server reports them.
pub const EXPOSED_STATUS_CODES: [&str; 13] =
	["200", "201", "202", "301", "304", "400", "401", "403", "404", "405", "409", "412", "500"];

pub const REQUEST_METHODS: [&str; 6] = ["COPY", "DELETE", "GET", "HEAD", "POST", "PUT"];

const TASK_TYPES: [&str; 4] = ["database_compaction", "view_compaction", "indexer", "replication"];

/// Node stats counter groups published as their own subsystem.
const COUNTER_GROUPS: [(&str, &str); 3] =
	[("fabric", "fabric"), ("couch_replicator", "replicator"), ("mango", "mango")];

const DESIGN_DOC_PREFIX: &str = "_design/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectorGroup {
	Standard,
	Databases,
	Views,
	Scheduler,
}

impl CollectorGroup {
	pub const ALL: [CollectorGroup; 4] = [
		CollectorGroup::Standard,
		CollectorGroup::Databases,
		CollectorGroup::Views,
		CollectorGroup::Scheduler,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			CollectorGroup::Standard => "standard",
			CollectorGroup::Databases => "databases",
			CollectorGroup::Views => "views",
			CollectorGroup::Scheduler => "scheduler",
		}
	}
}

impl fmt::Display for CollectorGroup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CollectorGroup {
	type Err = String;

	fn from_str(group: &str) -> Result<Self, Self::Err> {
		let group = group.trim().to_ascii_lowercase();
		CollectorGroup::ALL
			.into_iter()
			.find(|candidate| candidate.as_str() == group)
			.ok_or_else(|| format!("unknown collector group `{group}`"))
	}
}

/// Metric groups requested by one `/metrics` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorGroups(BTreeSet<CollectorGroup>);

impl CollectorGroups {
	pub fn all() -> Self {
		Self(CollectorGroup::ALL.into_iter().collect())
	}

	/// Parses the `collect[]` query values. No value at all selects every group, unknown
	/// values are logged and ignored.
	pub fn from_requested<S: AsRef<str>>(requested: &[S]) -> Self {
		if requested.is_empty() {
			return Self::all();
		}
		let mut groups = BTreeSet::new();
		for group in requested {
			match group.as_ref().parse::<CollectorGroup>() {
				Ok(group) => {
					groups.insert(group);
				},
				Err(error) => warn!(error = %error, "ignoring requested collector group"),
			}
		}
		Self(groups)
	}

	pub fn contains(&self, group: CollectorGroup) -> bool {
		self.0.contains(&group)
	}

	pub fn iter(&self) -> impl Iterator<Item = CollectorGroup> + '_ {
		self.0.iter().copied()
	}

	/// Narrows the scrape to what the groups publish.
	pub fn scope(&self) -> ScrapeScope {
		ScrapeScope {
			databases: self.contains(CollectorGroup::Databases),
			views: self.contains(CollectorGroup::Views),
			scheduler: self.contains(CollectorGroup::Scheduler),
		}
	}
}

impl Default for CollectorGroups {
	fn default() -> Self {
		Self::all()
	}
}

impl fmt::Display for CollectorGroups {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let groups: Vec<&str> = self.iter().map(|group| group.as_str()).collect();
		write!(f, "[{}]", groups.join(","))
	}
}

/// Builds the registry of one scrape.
pub fn publish(snapshot: &ScrapeSnapshot, groups: &CollectorGroups) -> prometheus::Result<Registry> {
	let registry = Registry::new();
	gauge(&registry, "request_count", "Number of CouchDB requests for this scrape.", "exporter")?
		.set(snapshot.request_count as f64);
	gauge(&registry, "up", "Was the last query of CouchDB stats successful.", "httpd")?
		.set(flag(snapshot.is_up()));
	if !snapshot.is_up() {
		return Ok(registry);
	}

	if groups.contains(CollectorGroup::Standard) {
		publish_standard(&registry, snapshot)?;
	}
	if groups.contains(CollectorGroup::Databases) {
		publish_databases(&registry, snapshot.databases.iter())?;
	}
	if groups.contains(CollectorGroup::Views) {
		publish_view_staleness(&registry, &snapshot.staleness)?;
	}
	if groups.contains(CollectorGroup::Scheduler) {
		if let Some(scheduler) = &snapshot.scheduler {
			publish_scheduler(&registry, scheduler)?;
		}
	}
	Ok(registry)
}

fn flag(value: bool) -> f64 {
	if value {
		1.0
	} else {
		0.0
	}
}

type NodeGauge = (&'static str, &'static str, fn(&NodeStats) -> f64);

const NODE_GAUGES: [NodeGauge; 12] = [
	("auth_cache_hits", "number of authentication cache hits", |stats| stats.auth_cache_hits),
	("auth_cache_misses", "number of authentication cache misses", |stats| {
		stats.auth_cache_misses
	}),
	("database_reads", "number of times a document was read from a database", |stats| {
		stats.database_reads
	}),
	("database_writes", "number of times a database was changed", |stats| stats.database_writes),
	("open_databases", "number of open databases", |stats| stats.open_databases),
	("open_os_files", "number of file descriptors CouchDB has open", |stats| stats.open_os_files),
	("request_time", "length of a request inside CouchDB without MochiWeb", |stats| {
		stats.request_time
	}),
	("bulk_requests", "number of bulk requests", |stats| stats.httpd.bulk_requests),
	("clients_requesting_changes", "number of clients for continuous _changes", |stats| {
		stats.httpd.clients_requesting_changes
	}),
	("requests", "number of HTTP requests", |stats| stats.httpd.requests),
	("temporary_view_reads", "number of temporary view reads", |stats| {
		stats.httpd.temporary_view_reads
	}),
	("view_reads", "number of view reads", |stats| stats.httpd.view_reads),
];

fn publish_standard(registry: &Registry, snapshot: &ScrapeSnapshot) -> prometheus::Result<()> {
	gauge(registry, "databases_total", "Total number of databases in the cluster", "httpd")?
		.set(snapshot.databases_total as f64);

	let node_up = gauge_vec(registry, "node_up", "Is the node available.", "httpd", ["node_name"])?;
	for (node_name, stats) in &snapshot.nodes {
		node_up.set([node_name.as_str()], flag(stats.reachable));
	}
	let reachable: Vec<(&str, &NodeStats)> = snapshot
		.nodes
		.iter()
		.filter(|(_, stats)| stats.reachable)
		.map(|(node_name, stats)| (node_name.as_str(), stats))
		.collect();

	if let Some(server) = &snapshot.server {
		publish_node_info(registry, server, &reachable)?;
	}
	publish_node_stats(registry, &reachable)?;
	publish_memory(registry, &reachable)?;
	publish_couch_log(registry, &reachable)?;
	for (group, subsystem) in COUNTER_GROUPS {
		publish_counter_group(registry, group, subsystem, &reachable)?;
	}
	if let Some(activity) = &snapshot.activity {
		publish_active_tasks(registry, activity)?;
	}
	Ok(())
}

fn publish_node_info(
	registry: &Registry,
	server: &ServerInfo,
	nodes: &[(&str, &NodeStats)],
) -> prometheus::Result<()> {
	let node_info = gauge_vec(
		registry,
		"node_info",
		"General info about a node.",
		"server",
		["node_name", "version", "vendor_name"],
	)?;
	for &(node_name, _) in nodes {
		node_info.set([node_name, &server.version, &server.vendor_name], 1.0);
	}
	Ok(())
}

fn publish_node_stats(registry: &Registry, nodes: &[(&str, &NodeStats)]) -> prometheus::Result<()> {
	for (name, help, value) in NODE_GAUGES {
		let node_gauge = gauge_vec(registry, name, help, "httpd", ["node_name"])?;
		for &(node_name, stats) in nodes {
			node_gauge.set([node_name], value(stats));
		}
	}

	let status_codes = gauge_vec(
		registry,
		"status_codes",
		"number of HTTP responses by status code",
		"httpd",
		["code", "node_name"],
	)?;
	let request_methods = gauge_vec(
		registry,
		"request_methods",
		"number of HTTP requests by method",
		"httpd",
		["method", "node_name"],
	)?;
	for &(node_name, stats) in nodes {
		for code in EXPOSED_STATUS_CODES {
			if let Some(count) = stats.status_codes.get(code) {
				status_codes.set([code, node_name], *count);
			}
		}
		for method in REQUEST_METHODS {
			let count = stats.request_methods.get(method).copied().unwrap_or_default();
			request_methods.set([method, node_name], count);
		}
	}
	Ok(())
}

fn publish_memory(registry: &Registry, nodes: &[(&str, &NodeStats)]) -> prometheus::Result<()> {
	let with_memory: Vec<_> = nodes
		.iter()
		.filter_map(|(node_name, stats)| stats.memory.as_ref().map(|memory| (*node_name, memory)))
		.collect();
	if with_memory.is_empty() {
		return Ok(());
	}
	for (index, (field, _)) in with_memory[0].1.fields().into_iter().enumerate() {
		let memory_gauge = gauge_vec(
			registry,
			&format!("memory_{field}"),
			&format!("erlang memory counters - {field}"),
			"erlang",
			["node_name"],
		)?;
		for &(node_name, memory) in &with_memory {
			memory_gauge.set([node_name], memory.fields()[index].1);
		}
	}
	Ok(())
}

fn publish_couch_log(registry: &Registry, nodes: &[(&str, &NodeStats)]) -> prometheus::Result<()> {
	let couch_log = gauge_vec(
		registry,
		"couch_log",
		"number of messages logged by log level",
		"server",
		["level", "node_name"],
	)?;
	for &(node_name, stats) in nodes {
		let Some(counters) = stats.subsystems.get("couch_log") else {
			continue;
		};
		for (path, count) in counters {
			if let Some(level) = path.strip_prefix("level.") {
				couch_log.set([level, node_name], *count);
			}
		}
	}
	Ok(())
}

/// One family per top level counter of the group. Nested counters get a `metric` label
/// holding the rest of their dotted path.
fn publish_counter_group(
	registry: &Registry,
	group: &str,
	subsystem: &str,
	nodes: &[(&str, &NodeStats)],
) -> prometheus::Result<()> {
	let mut families: std::collections::BTreeMap<String, Vec<(Option<&str>, &str, f64)>> =
		Default::default();
	for &(node_name, stats) in nodes {
		let Some(counters) = stats.subsystems.get(group) else {
			continue;
		};
		for (path, value) in counters {
			let (family, metric) = match path.split_once('.') {
				Some((family, metric)) => (family, Some(metric)),
				None => (path.as_str(), None),
			};
			families.entry(metric_name(family)).or_default().push((metric, node_name, *value));
		}
	}

	for (family, samples) in families {
		let help = format!("{group} {} metrics", family.replace('_', " "));
		if samples.iter().any(|(metric, ..)| metric.is_some()) {
			let family_gauge =
				gauge_vec(registry, &family, &help, subsystem, ["metric", "node_name"])?;
			for (metric, node_name, value) in samples {
				family_gauge.set([metric.unwrap_or(family.as_str()), node_name], value);
			}
		} else {
			let family_gauge = gauge_vec(registry, &family, &help, subsystem, ["node_name"])?;
			for (_, node_name, value) in samples {
				family_gauge.set([node_name], value);
			}
		}
	}
	Ok(())
}

fn metric_name(raw: &str) -> String {
	raw.chars()
		.map(|character| if character.is_ascii_alphanumeric() { character } else { '_' })
		.collect()
}

fn publish_active_tasks(registry: &Registry, activity: &ActivitySummary) -> prometheus::Result<()> {
	let active_tasks = gauge_vec(registry, "active_tasks", "active tasks", "server", ["node_name"])?;
	for node_name in activity.counts.keys() {
		active_tasks.set([node_name.as_str()], activity.total(node_name) as f64);
	}
	for task_type in TASK_TYPES {
		let per_type = gauge_vec(
			registry,
			&format!("active_tasks_{task_type}"),
			&format!("active tasks {}", task_type.replace('_', " ")),
			"server",
			["node_name"],
		)?;
		for node_name in activity.counts.keys() {
			per_type.set([node_name.as_str()], activity.count(node_name, task_type) as f64);
		}
	}

	let replication_labels = ["node_name", "doc_id", "continuous", "source", "target"];
	let updated_on = gauge_vec(
		registry,
		"active_tasks_replication_updated_on",
		"active tasks replication updated on",
		"server",
		replication_labels,
	)?;
	let changes_pending = gauge_vec(
		registry,
		"active_tasks_replication_changes_pending",
		"active tasks replication changes pending",
		"server",
		replication_labels,
	)?;
	for task in activity.tasks.iter().filter(|task| task.is_replication()) {
		let continuous = task.continuous.to_string();
		let labels = [
			task.node.as_deref().unwrap_or_default(),
			task.doc_id.as_deref().unwrap_or_default(),
			continuous.as_str(),
			task.source.as_deref().unwrap_or_default(),
			task.target.as_deref().unwrap_or_default(),
		];
		updated_on.set(labels, task.updated_on.unwrap_or_default());
		changes_pending.set(labels, task.changes_pending.unwrap_or_default());
	}
	Ok(())
}

fn publish_databases<'a>(
	registry: &Registry,
	databases: impl Iterator<Item = (&'a String, &'a DatabaseStats)>,
) -> prometheus::Result<()> {
	let info = gauge_vec(
		registry,
		"info",
		"General info about a database.",
		"database",
		["db_name", "disk_format_version", "partitioned"],
	)?;
	let disk_size = gauge_vec(registry, "disk_size", "disk size", "database", ["db_name"])?;
	let data_size = gauge_vec(registry, "data_size", "data size", "database", ["db_name"])?;
	let doc_count = gauge_vec(registry, "doc_count", "document count", "database", ["db_name"])?;
	let doc_del_count =
		gauge_vec(registry, "doc_del_count", "deleted document count", "database", ["db_name"])?;
	let compact_running = gauge_vec(
		registry,
		"compact_running",
		"database compaction running",
		"database",
		["db_name"],
	)?;
	let overhead = gauge_vec(registry, "overhead", "disk size overhead", "database", ["db_name"])?;

	for (db_name, stats) in databases {
		let disk_format_version = stats.disk_format_version.to_string();
		let partitioned = stats.partitioned.to_string();
		info.set([db_name, &disk_format_version, &partitioned], 1.0);
		disk_size.set([db_name], stats.disk_size);
		data_size.set([db_name], stats.data_size);
		doc_count.set([db_name], stats.doc_count);
		doc_del_count.set([db_name], stats.doc_del_count);
		compact_running.set([db_name], flag(stats.compact_running));
		overhead.set([db_name], stats.disk_size_overhead);
	}
	Ok(())
}

fn publish_view_staleness(
	registry: &Registry,
	staleness: &[ViewStaleness],
) -> prometheus::Result<()> {
	let view_staleness = gauge_vec(
		registry,
		"staleness",
		"the view's staleness (the view's update_seq compared to the database's update_seq)",
		"view",
		["db_name", "design_doc_name", "view_name", "shard_begin", "shard_end"],
	)?;
	for entry in staleness {
		let design_doc_name =
			entry.design_doc.strip_prefix(DESIGN_DOC_PREFIX).unwrap_or(&entry.design_doc);
		let shard_begin = format!("{:08x}", entry.range.low);
		let shard_end = format!("{:08x}", entry.range.high);
		view_staleness.set(
			[&entry.database, design_doc_name, &entry.view, &shard_begin, &shard_end],
			entry.age.to_f64().unwrap_or(f64::NAN),
		);
	}
	Ok(())
}

fn publish_scheduler(registry: &Registry, scheduler: &SchedulerSummary) -> prometheus::Result<()> {
	let jobs = gauge_vec(
		registry,
		"jobs",
		"Replication scheduler jobs, by the unix time of their last state change.",
		"scheduler",
		["node_name", "job_id", "db_name", "doc_id", "source", "target"],
	)?;
	for job in &scheduler.jobs {
		let updated_at = job.updated_at.map(|updated_at| updated_at.timestamp() as f64);
		jobs.set(
			[
				&job.node,
				&job.id,
				job.database.as_deref().unwrap_or_default(),
				job.doc_id.as_deref().unwrap_or_default(),
				&job.source,
				&job.target,
			],
			updated_at.unwrap_or_default(),
		);
	}

	let jobs_by_state = gauge_vec(
		registry,
		"jobs_by_state",
		"Replication scheduler jobs per node and state.",
		"scheduler",
		["node_name", "state"],
	)?;
	for (node_name, states) in &scheduler.counts {
		for (state, count) in states {
			jobs_by_state.set([node_name, state], *count as f64);
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use collector::{
		ActiveTask, ApiGeneration, ClusterTopology, MemoryStats, SchedulerJob, ShardRange,
	};
	use common::metrics::encode_text;
	use num_bigint::BigInt;

	use super::*;

	fn render(snapshot: &ScrapeSnapshot, groups: &CollectorGroups) -> String {
		encode_text(&publish(snapshot, groups).unwrap().gather()).unwrap()
	}

	fn node_stats() -> NodeStats {
		let mut stats = NodeStats {
			reachable: true,
			auth_cache_hits: 2.0,
			request_time: 4.8,
			memory: Some(MemoryStats { atom: 512625.0, ..Default::default() }),
			..Default::default()
		};
		stats.request_methods.insert("GET".to_string(), 4712.0);
		stats.status_codes.insert("200".to_string(), 4700.0);
		stats.status_codes.insert("418".to_string(), 1.0);
		stats.subsystems.insert(
			"couch_log".to_string(),
			BTreeMap::from([("level.error".to_string(), 3.0), ("level.info".to_string(), 10.0)]),
		);
		stats.subsystems.insert(
			"couch_replicator".to_string(),
			BTreeMap::from([
				("cluster_is_stable".to_string(), 1.0),
				("jobs.running".to_string(), 1.0),
				("jobs.pending".to_string(), 0.0),
			]),
		);
		stats
	}

	fn snapshot() -> ScrapeSnapshot {
		let mut snapshot = ScrapeSnapshot::down("", 0);
		snapshot.status = collector::ScrapeStatus::Up;
		snapshot.request_count = 16;
		snapshot.generation = Some(ApiGeneration::Clustered);
		snapshot.server = Some(ServerInfo {
			version: "2.3.1".to_string(),
			vendor_name: "The Apache Software Foundation".to_string(),
			features: Vec::new(),
		});
		snapshot.topology = ClusterTopology::from_members(["couchdb@n1", "couchdb@n2"]).unwrap();
		snapshot.databases_total = 5;
		snapshot.nodes.insert("couchdb@n1".to_string(), node_stats());
		snapshot.nodes.insert("couchdb@n2".to_string(), NodeStats::unreachable());
		snapshot.databases.insert(
			"example".to_string(),
			DatabaseStats {
				disk_size: 58570.0,
				data_size: 8170.0,
				disk_size_overhead: 50400.0,
				disk_format_version: 7,
				..Default::default()
			},
		);
		snapshot.staleness.push(ViewStaleness {
			database: "example".to_string(),
			design_doc: "_design/views".to_string(),
			view: "by_name".to_string(),
			range: ShardRange::new(0x2000_0000, 0x3fff_ffff),
			age: BigInt::from(-1),
		});
		snapshot.activity = Some(ActivitySummary::from_tasks(vec![ActiveTask {
			task_type: "replication".to_string(),
			node: Some("couchdb@n1".to_string()),
			doc_id: Some("rep1".to_string()),
			continuous: true,
			source: Some("http://n1/a/".to_string()),
			target: Some("http://n1/b/".to_string()),
			updated_on: Some(1560160425.0),
			changes_pending: Some(3.0),
			..Default::default()
		}]));
		snapshot.scheduler = Some(SchedulerSummary::from_jobs(vec![SchedulerJob {
			id: "job1".to_string(),
			node: "couchdb@n1".to_string(),
			database: Some("_replicator".to_string()),
			doc_id: Some("rep1".to_string()),
			source: "http://n1/a/".to_string(),
			target: "http://n1/b/".to_string(),
			state: "crashed".to_string(),
			updated_at: None,
		}]));
		snapshot
	}

	#[test]
	fn test_collector_groups_parsing() {
		assert_eq!(CollectorGroups::from_requested::<&str>(&[]), CollectorGroups::all());
		let groups = CollectorGroups::from_requested(&["Views", " databases", "bogus"]);
		assert_eq!(groups.to_string(), "[databases,views]");
		assert_eq!(
			groups.scope(),
			ScrapeScope { databases: true, views: true, scheduler: false }
		);
		let groups = CollectorGroups::from_requested(&["bogus"]);
		assert_eq!(groups.iter().count(), 0);
		assert_eq!(groups.scope(), ScrapeScope::standard());
		assert_eq!(CollectorGroups::all().scope(), ScrapeScope::all());
	}

	#[test]
	fn test_down_snapshot_publishes_only_up_and_request_count() {
		let payload = render(&ScrapeSnapshot::down("boom", 3), &CollectorGroups::all());
		assert!(payload.contains("couchdb_httpd_up 0"));
		assert!(payload.contains("couchdb_exporter_request_count 3"));
		let samples = payload.lines().filter(|line| !line.starts_with('#')).count();
		assert_eq!(samples, 2);
	}

	#[test]
	fn test_publish_all_groups() {
		let payload = render(&snapshot(), &CollectorGroups::all());
		for expected in [
			"couchdb_httpd_up 1",
			"couchdb_exporter_request_count 16",
			"couchdb_httpd_databases_total 5",
			"couchdb_httpd_node_up{node_name=\"couchdb@n1\"} 1",
			"couchdb_httpd_node_up{node_name=\"couchdb@n2\"} 0",
			"couchdb_httpd_auth_cache_hits{node_name=\"couchdb@n1\"} 2",
			"couchdb_httpd_request_time{node_name=\"couchdb@n1\"} 4.8",
			"couchdb_httpd_request_methods{method=\"GET\",node_name=\"couchdb@n1\"} 4712",
			"couchdb_httpd_request_methods{method=\"COPY\",node_name=\"couchdb@n1\"} 0",
			"couchdb_httpd_status_codes{code=\"200\",node_name=\"couchdb@n1\"} 4700",
			"couchdb_erlang_memory_atom{node_name=\"couchdb@n1\"} 512625",
			"couchdb_server_couch_log{level=\"error\",node_name=\"couchdb@n1\"} 3",
			"couchdb_replicator_cluster_is_stable{node_name=\"couchdb@n1\"} 1",
			"couchdb_replicator_jobs{metric=\"running\",node_name=\"couchdb@n1\"} 1",
			"couchdb_server_active_tasks{node_name=\"couchdb@n1\"} 1",
			"couchdb_server_active_tasks_replication{node_name=\"couchdb@n1\"} 1",
			"couchdb_server_active_tasks_indexer{node_name=\"couchdb@n1\"} 0",
			"couchdb_server_active_tasks_replication_changes_pending{continuous=\"true\",doc_id=\"rep1\",node_name=\"couchdb@n1\",source=\"http://n1/a/\",target=\"http://n1/b/\"} 3",
			"couchdb_database_disk_size{db_name=\"example\"} 58570",
			"couchdb_database_overhead{db_name=\"example\"} 50400",
			"couchdb_database_info{db_name=\"example\",disk_format_version=\"7\",partitioned=\"false\"} 1",
			"couchdb_database_compact_running{db_name=\"example\"} 0",
			"couchdb_view_staleness{db_name=\"example\",design_doc_name=\"views\",shard_begin=\"20000000\",shard_end=\"3fffffff\",view_name=\"by_name\"} -1",
			"couchdb_scheduler_jobs_by_state{node_name=\"couchdb@n1\",state=\"crashed\"} 1",
			"couchdb_scheduler_jobs{db_name=\"_replicator\",doc_id=\"rep1\",job_id=\"job1\",node_name=\"couchdb@n1\",source=\"http://n1/a/\",target=\"http://n1/b/\"} 0",
		] {
			assert!(payload.contains(expected), "missing `{expected}` in\n{payload}");
		}
		assert!(payload.contains(
			"couchdb_server_node_info{node_name=\"couchdb@n1\",vendor_name=\"The Apache Software Foundation\",version=\"2.3.1\"} 1"
		));
		// Unexposed status codes and unreachable nodes publish nothing but `node_up`.
		assert!(!payload.contains("code=\"418\""));
		assert!(!payload.contains("couchdb_httpd_auth_cache_hits{node_name=\"couchdb@n2\"}"));
		assert!(!payload.contains("couchdb_server_node_info{node_name=\"couchdb@n2\""));
	}

	#[test]
	fn test_publish_selected_groups() {
		let snapshot = snapshot();
		let payload = render(&snapshot, &CollectorGroups::from_requested(&["databases"]));
		assert!(payload.contains("couchdb_database_disk_size"));
		assert!(!payload.contains("couchdb_httpd_node_up"));
		assert!(!payload.contains("couchdb_view_staleness"));
		assert!(!payload.contains("couchdb_scheduler_jobs"));

		let payload = render(&snapshot, &CollectorGroups::from_requested(&["standard"]));
		assert!(payload.contains("couchdb_httpd_node_up"));
		assert!(!payload.contains("couchdb_database_"));
	}

	#[test]
	fn test_metric_name_sanitizing() {
		assert_eq!(metric_name("doc-update.x"), "doc_update_x");
		assert_eq!(metric_name("open_shard"), "open_shard");
	}
}
