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

//! Generation agnostic view of one scrape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;

use crate::{staleness::ViewStaleness, CollectorError, Result};

/// Node name used for single node legacy servers, which have no notion of cluster membership.
pub const LEGACY_NODE_NAME: &str = "master";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiGeneration {
	/// CouchDB 1.x, a single server.
	Legacy,
	/// CouchDB 2.x and later.
	Clustered,
}

impl ApiGeneration {
	pub fn from_version(version: &Version) -> Self {
		if version.major >= 2 {
			ApiGeneration::Clustered
		} else {
			ApiGeneration::Legacy
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			ApiGeneration::Legacy => "1",
			ApiGeneration::Clustered => "2",
		}
	}
}

/// Parses a server version leniently: `3.2` and `v2.3.1` are accepted.
pub fn parse_server_version(raw: &str) -> Result<Version> {
	let trimmed = raw.trim().trim_start_matches('v');
	let core_end = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
	let (core, suffix) = trimmed.split_at(core_end);
	let mut normalized = core.to_string();
	for _ in core.split('.').count()..3 {
		normalized.push_str(".0");
	}
	normalized.push_str(suffix);
	Version::parse(&normalized)
		.map_err(|source| CollectorError::Version { version: raw.to_string(), source })
}

/// Identity of the server answering the root document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
	pub version: String,
	pub vendor_name: String,
	pub features: Vec<String>,
}

impl ServerInfo {
	pub fn generation(&self) -> Result<ApiGeneration> {
		parse_server_version(&self.version).map(|version| ApiGeneration::from_version(&version))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterNode {
	pub name: String,
	/// Path of the node resources relative to the server uri, empty for legacy servers.
	pub base_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterTopology {
	nodes: Vec<ClusterNode>,
}

impl ClusterTopology {
	pub fn legacy() -> Self {
		Self {
			nodes: vec![ClusterNode { name: LEGACY_NODE_NAME.to_string(), base_path: String::new() }],
		}
	}

	/// Builds the topology from `/_membership`, deduplicating and sorting node names.
	pub fn from_members<I, S>(members: I) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut names: Vec<String> = members.into_iter().map(Into::into).collect();
		names.sort();
		names.dedup();
		if names.is_empty() {
			return Err(CollectorError::Topology("membership lists no cluster node".to_string()));
		}
		let nodes = names
			.into_iter()
			.map(|name| {
				let base_path = format!("_node/{name}");
				ClusterNode { name, base_path }
			})
			.collect();
		Ok(Self { nodes })
	}

	pub fn nodes(&self) -> &[ClusterNode] {
		&self.nodes
	}

	pub fn node_names(&self) -> impl Iterator<Item = &str> {
		self.nodes.iter().map(|node| node.name.as_str())
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpdCounters {
	pub bulk_requests: f64,
	pub clients_requesting_changes: f64,
	pub requests: f64,
	pub temporary_view_reads: f64,
	pub view_reads: f64,
}

/// Erlang VM memory usage in bytes, from `/_node/{node}/_system`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
	pub other: f64,
	pub atom: f64,
	pub atom_used: f64,
	pub processes: f64,
	pub processes_used: f64,
	pub binary: f64,
	pub code: f64,
	pub ets: f64,
}

impl MemoryStats {
	pub fn fields(&self) -> [(&'static str, f64); 8] {
		[
			("other", self.other),
			("atom", self.atom),
			("atom_used", self.atom_used),
			("processes", self.processes),
			("processes_used", self.processes_used),
			("binary", self.binary),
			("code", self.code),
			("ets", self.ets),
		]
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeStats {
	pub reachable: bool,
	pub auth_cache_hits: f64,
	pub auth_cache_misses: f64,
	pub database_reads: f64,
	pub database_writes: f64,
	pub open_databases: f64,
	pub open_os_files: f64,
	/// Legacy servers report the current value, clustered ones the histogram median.
	pub request_time: f64,
	pub status_codes: BTreeMap<String, f64>,
	pub request_methods: BTreeMap<String, f64>,
	pub httpd: HttpdCounters,
	/// Flattened counter groups (`couch_log`, `fabric`, `couch_replicator`, `mango`), keyed by
	/// group then by dotted counter path.
	pub subsystems: BTreeMap<String, BTreeMap<String, f64>>,
	pub memory: Option<MemoryStats>,
}

impl NodeStats {
	pub fn unreachable() -> Self {
		Self::default()
	}
}

/// Design document id to view name to raw update sequence token.
pub type ViewStatsByDesignDoc = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseStats {
	pub disk_size: f64,
	pub data_size: f64,
	pub disk_size_overhead: f64,
	pub doc_count: f64,
	pub doc_del_count: f64,
	pub compact_running: bool,
	pub disk_format_version: u64,
	pub partitioned: bool,
	pub update_seq: String,
	pub views: ViewStatsByDesignDoc,
	/// Views whose metadata query failed during this scrape.
	pub skipped_views: Vec<SkippedView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedView {
	pub design_doc: String,
	pub view: String,
	pub reason: String,
}

/// Design document with the names of the views it defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignDoc {
	pub id: String,
	pub views: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActiveTask {
	pub task_type: String,
	pub node: Option<String>,
	pub database: Option<String>,
	pub doc_id: Option<String>,
	pub continuous: bool,
	pub source: Option<String>,
	pub target: Option<String>,
	pub updated_on: Option<f64>,
	pub changes_pending: Option<f64>,
}

impl ActiveTask {
	pub fn is_replication(&self) -> bool {
		self.task_type == "replication"
	}
}

/// Active tasks of a scrape, counted per node and task type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivitySummary {
	pub tasks: Vec<ActiveTask>,
	pub counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl ActivitySummary {
	pub fn from_tasks(tasks: Vec<ActiveTask>) -> Self {
		let mut counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
		for task in &tasks {
			let node = task.node.clone().unwrap_or_default();
			*counts.entry(node).or_default().entry(task.task_type.clone()).or_default() += 1;
		}
		Self { tasks, counts }
	}

	pub fn count(&self, node: &str, task_type: &str) -> usize {
		self.counts.get(node).and_then(|types| types.get(task_type)).copied().unwrap_or(0)
	}

	pub fn total(&self, node: &str) -> usize {
		self.counts.get(node).map(|types| types.values().sum()).unwrap_or(0)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerJob {
	pub id: String,
	pub node: String,
	pub database: Option<String>,
	pub doc_id: Option<String>,
	pub source: String,
	pub target: String,
	/// Type of the most recent history event (`started`, `crashed`, ...).
	pub state: String,
	pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerSummary {
	pub jobs: Vec<SchedulerJob>,
	pub counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl SchedulerSummary {
	pub fn from_jobs(jobs: Vec<SchedulerJob>) -> Self {
		let mut counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
		for job in &jobs {
			*counts.entry(job.node.clone()).or_default().entry(job.state.clone()).or_default() += 1;
		}
		Self { jobs, counts }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScrapeStatus {
	Up,
	Down { reason: String },
}

/// Everything collected during one scrape. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeSnapshot {
	pub status: ScrapeStatus,
	pub request_count: usize,
	pub generation: Option<ApiGeneration>,
	pub server: Option<ServerInfo>,
	pub topology: ClusterTopology,
	pub databases_total: usize,
	pub nodes: BTreeMap<String, NodeStats>,
	pub databases: BTreeMap<String, DatabaseStats>,
	pub staleness: Vec<ViewStaleness>,
	pub activity: Option<ActivitySummary>,
	pub scheduler: Option<SchedulerSummary>,
}

impl ScrapeSnapshot {
	/// Snapshot of a failed scrape: only the failure and the request count survive.
	pub fn down(reason: impl Into<String>, request_count: usize) -> Self {
		Self {
			status: ScrapeStatus::Down { reason: reason.into() },
			request_count,
			generation: None,
			server: None,
			topology: ClusterTopology::default(),
			databases_total: 0,
			nodes: BTreeMap::new(),
			databases: BTreeMap::new(),
			staleness: Vec::new(),
			activity: None,
			scheduler: None,
		}
	}

	pub fn is_up(&self) -> bool {
		self.status == ScrapeStatus::Up
	}
}
