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

//! Wire shapes of the CouchDB HTTP API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct RootPayload {
	pub version: String,
	#[serde(default)]
	pub vendor: VendorPayload,
	#[serde(default)]
	pub features: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VendorPayload {
	#[serde(default)]
	pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MembershipPayload {
	pub cluster_nodes: Vec<String>,
}

/// `/_stats` of a node, resolved once from the API generation of the server.
#[derive(Debug)]
pub(crate) enum StatsPayload {
	Legacy(LegacyStats),
	Clustered(ClusteredStats),
}

/// CouchDB 1.x: `{"couchdb": {..}, "httpd": {..}, "httpd_request_methods": {..}, ..}` where every
/// counter carries `current`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LegacyStats {
	pub couchdb: LegacyCouchdbGroup,
	pub httpd: LegacyHttpdGroup,
	pub httpd_request_methods: BTreeMap<String, LegacyCounter>,
	pub httpd_status_codes: BTreeMap<String, LegacyCounter>,
	#[serde(flatten)]
	pub groups: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LegacyCouchdbGroup {
	pub auth_cache_hits: LegacyCounter,
	pub auth_cache_misses: LegacyCounter,
	pub database_reads: LegacyCounter,
	pub database_writes: LegacyCounter,
	pub open_databases: LegacyCounter,
	pub open_os_files: LegacyCounter,
	pub request_time: LegacyCounter,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LegacyHttpdGroup {
	pub bulk_requests: LegacyCounter,
	pub clients_requesting_changes: LegacyCounter,
	pub requests: LegacyCounter,
	pub temporary_view_reads: LegacyCounter,
	pub view_reads: LegacyCounter,
}

/// `current` is `null` until the first sample.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LegacyCounter {
	pub current: Option<f64>,
}

/// CouchDB 2.x and later: everything hangs below `couchdb`, counters carry `value`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ClusteredStats {
	pub couchdb: ClusteredCouchdbGroup,
	#[serde(flatten)]
	pub groups: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ClusteredCouchdbGroup {
	pub auth_cache_hits: ClusteredCounter,
	pub auth_cache_misses: ClusteredCounter,
	pub database_reads: ClusteredCounter,
	pub database_writes: ClusteredCounter,
	pub open_databases: ClusteredCounter,
	pub open_os_files: ClusteredCounter,
	pub request_time: ClusteredHistogram,
	pub httpd: ClusteredHttpdGroup,
	pub httpd_request_methods: BTreeMap<String, ClusteredCounter>,
	pub httpd_status_codes: BTreeMap<String, ClusteredCounter>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ClusteredHttpdGroup {
	pub bulk_requests: ClusteredCounter,
	pub clients_requesting_changes: ClusteredCounter,
	pub requests: ClusteredCounter,
	pub temporary_view_reads: ClusteredCounter,
	pub view_reads: ClusteredCounter,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ClusteredCounter {
	pub value: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ClusteredHistogram {
	pub value: HistogramValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct HistogramValue {
	pub median: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SystemPayload {
	pub memory: MemoryPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MemoryPayload {
	pub other: f64,
	pub atom: f64,
	pub atom_used: f64,
	pub processes: f64,
	pub processes_used: f64,
	pub binary: f64,
	pub code: f64,
	pub ets: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DatabasePayload {
	pub disk_size: Option<f64>,
	pub data_size: Option<f64>,
	pub sizes: SizesPayload,
	pub doc_count: f64,
	pub doc_del_count: f64,
	pub compact_running: bool,
	pub disk_format_version: u64,
	pub props: PropsPayload,
	#[serde(deserialize_with = "seq_token")]
	pub update_seq: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SizesPayload {
	pub file: f64,
	pub active: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PropsPayload {
	pub partitioned: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AllDocsPayload {
	pub rows: Vec<DesignDocRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DesignDocRow {
	pub id: String,
	#[serde(default)]
	pub doc: Option<DesignDocPayload>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DesignDocPayload {
	#[serde(default)]
	pub views: BTreeMap<String, Value>,
}

/// View query answered with `limit=0`: only the sequence matters, errors may come back with a
/// success status.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ViewPayload {
	#[serde(deserialize_with = "seq_token")]
	pub update_seq: String,
	pub error: Option<String>,
	pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActiveTaskPayload {
	#[serde(rename = "type")]
	pub task_type: String,
	#[serde(default)]
	pub node: Option<String>,
	#[serde(default)]
	pub database: Option<String>,
	#[serde(default)]
	pub doc_id: Option<String>,
	#[serde(default)]
	pub continuous: bool,
	#[serde(default, deserialize_with = "lenient_string")]
	pub source: Option<String>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub target: Option<String>,
	#[serde(default)]
	pub updated_on: Option<f64>,
	#[serde(default)]
	pub changes_pending: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SchedulerJobsPayload {
	#[serde(default)]
	pub jobs: Vec<SchedulerJobPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SchedulerJobPayload {
	pub id: String,
	#[serde(default)]
	pub node: String,
	#[serde(default)]
	pub database: Option<String>,
	#[serde(default)]
	pub doc_id: Option<String>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub source: Option<String>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub target: Option<String>,
	#[serde(default)]
	pub history: Vec<HistoryEventPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryEventPayload {
	pub timestamp: DateTime<Utc>,
	#[serde(rename = "type")]
	pub event_type: String,
}

/// Sequences are opaque strings on clustered servers and plain numbers on legacy ones.
fn seq_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	Ok(match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => String::new(),
		Some(Value::String(token)) => token,
		Some(other) => other.to_string(),
	})
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
	Ok(match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => None,
		Some(Value::String(value)) => Some(value),
		Some(other) => Some(other.to_string()),
	})
}
