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

//! HTTP client for the read-only CouchDB endpoints the exporter scrapes.

mod normalize;
mod payload;

use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};

use common::{BasicAuth, CouchdbConfig};
use serde::de::DeserializeOwned;
use tracing::debug;

pub use self::normalize::SUBSYSTEM_GROUPS;
use self::payload::{
	ActiveTaskPayload, AllDocsPayload, DatabasePayload, MembershipPayload, RootPayload,
	SchedulerJobsPayload, StatsPayload, SystemPayload, ViewPayload,
};
use crate::{
	snapshot::{
		ActiveTask, ApiGeneration, ClusterNode, ClusterTopology, DatabaseStats, DesignDoc,
		MemoryStats, NodeStats, SchedulerJob, ServerInfo,
	},
	CollectorError, CouchErrorBody, Result,
};

const DESIGN_DOCS_QUERY: &str = r#"startkey="_design/"&endkey="_design0"&include_docs=true"#;
const VIEW_METADATA_QUERY: &str =
	"stale=ok&update=false&stable=true&update_seq=true&include_docs=false&limit=0";

/// Cheap to clone: clones share the connection pool and the request counter.
#[derive(Clone)]
pub struct CouchdbClient {
	base_url: String,
	http: reqwest::Client,
	basic_auth: Option<BasicAuth>,
	request_count: Arc<AtomicUsize>,
}

impl CouchdbClient {
	pub fn new(config: &CouchdbConfig) -> Result<Self> {
		let http = reqwest::Client::builder()
			.danger_accept_invalid_certs(config.insecure)
			.timeout(config.timeout)
			.build()
			.map_err(CollectorError::Setup)?;
		Ok(Self {
			base_url: config.uri.trim_end_matches('/').to_string(),
			http,
			basic_auth: config.basic_auth(),
			request_count: Arc::new(AtomicUsize::new(0)),
		})
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	/// Number of requests issued since the last reset.
	pub fn request_count(&self) -> usize {
		self.request_count.load(Ordering::Relaxed)
	}

	pub fn reset_request_count(&self) {
		self.request_count.store(0, Ordering::Relaxed);
	}

	async fn get(&self, path: &str) -> Result<(String, Vec<u8>)> {
		let url = format!("{}/{}", self.base_url, path);
		self.request_count.fetch_add(1, Ordering::Relaxed);
		debug!(url = %url, "couchdb-request");
		let mut request = self.http.get(&url);
		if let Some(auth) = &self.basic_auth {
			request = request.basic_auth(&auth.username, Some(&auth.password));
		}
		let response = match request.send().await {
			Ok(response) => response,
			Err(source) => return Err(CollectorError::Transport { url, source }),
		};
		let status = response.status();
		let body = match response.bytes().await {
			Ok(body) => body,
			Err(source) => return Err(CollectorError::Transport { url, source }),
		};
		if !status.is_success() {
			let body = String::from_utf8_lossy(&body).into_owned();
			return Err(CollectorError::protocol(url, status.as_u16(), body));
		}
		Ok((url, body.to_vec()))
	}

	async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
		let (url, body) = self.get(path).await?;
		serde_json::from_slice(&body).map_err(|source| CollectorError::Json { url, source })
	}

	pub async fn server_info(&self) -> Result<ServerInfo> {
		let root: RootPayload = self.get_json("").await?;
		Ok(ServerInfo { version: root.version, vendor_name: root.vendor.name, features: root.features })
	}

	/// Nodes to scrape. Legacy servers are a single node named `master`.
	pub async fn topology(&self, generation: ApiGeneration) -> Result<ClusterTopology> {
		match generation {
			ApiGeneration::Legacy => Ok(ClusterTopology::legacy()),
			ApiGeneration::Clustered => {
				let membership: MembershipPayload = self.get_json("_membership").await?;
				ClusterTopology::from_members(membership.cluster_nodes)
			},
		}
	}

	pub async fn node_stats(
		&self,
		node: &ClusterNode,
		generation: ApiGeneration,
	) -> Result<NodeStats> {
		let path = node_path(node, "_stats");
		let payload = match generation {
			ApiGeneration::Legacy => StatsPayload::Legacy(self.get_json(&path).await?),
			ApiGeneration::Clustered => StatsPayload::Clustered(self.get_json(&path).await?),
		};
		Ok(normalize::node_stats(payload))
	}

	/// Clustered servers only.
	pub async fn node_memory(&self, node: &ClusterNode) -> Result<MemoryStats> {
		let system: SystemPayload = self.get_json(&node_path(node, "_system")).await?;
		Ok(normalize::memory_stats(system))
	}

	pub async fn all_dbs(&self) -> Result<Vec<String>> {
		self.get_json(common::ALL_DBS).await
	}

	pub async fn database_stats(&self, database: &str) -> Result<DatabaseStats> {
		let payload: DatabasePayload = self.get_json(&urlencoding::encode(database)).await?;
		Ok(normalize::database_stats(payload))
	}

	pub async fn design_docs(&self, database: &str) -> Result<Vec<DesignDoc>> {
		let path = format!("{}/_all_docs?{}", urlencoding::encode(database), DESIGN_DOCS_QUERY);
		let all_docs: AllDocsPayload = self.get_json(&path).await?;
		Ok(all_docs
			.rows
			.into_iter()
			.map(|row| DesignDoc {
				id: row.id,
				views: row.doc.map(|doc| doc.views.into_keys().collect()).unwrap_or_default(),
			})
			.collect())
	}

	/// Current update sequence of a view, read without triggering an index update.
	pub async fn view_update_seq(
		&self,
		database: &str,
		design_doc: &str,
		view: &str,
	) -> Result<String> {
		let path = format!(
			"{}/{}/_view/{}?{}",
			urlencoding::encode(database),
			design_doc_path(design_doc),
			urlencoding::encode(view),
			VIEW_METADATA_QUERY
		);
		let (url, body) = self.get(&path).await?;
		let view: ViewPayload = serde_json::from_slice(&body)
			.map_err(|source| CollectorError::Json { url: url.clone(), source })?;
		if let Some(error) = view.error {
			let details = CouchErrorBody { error, reason: view.reason.unwrap_or_default() };
			return Err(CollectorError::Couch { url, details });
		}
		Ok(view.update_seq)
	}

	pub async fn active_tasks(&self, generation: ApiGeneration) -> Result<Vec<ActiveTask>> {
		let tasks: Vec<ActiveTaskPayload> = self.get_json("_active_tasks").await?;
		Ok(tasks.into_iter().map(|task| normalize::active_task(task, generation)).collect())
	}

	/// Clustered servers only.
	pub async fn scheduler_jobs(&self) -> Result<Vec<SchedulerJob>> {
		let jobs: SchedulerJobsPayload = self.get_json("_scheduler/jobs").await?;
		Ok(jobs.jobs.into_iter().map(normalize::scheduler_job).collect())
	}
}

fn node_path(node: &ClusterNode, resource: &str) -> String {
	if node.base_path.is_empty() {
		resource.to_string()
	} else {
		format!("{}/{}", node.base_path, resource)
	}
}

/// Keeps the `_design/` prefix literal, escapes the name.
fn design_doc_path(design_doc: &str) -> String {
	match design_doc.strip_prefix("_design/") {
		Some(name) => format!("_design/{}", urlencoding::encode(name)),
		None => urlencoding::encode(design_doc).into_owned(),
	}
}
