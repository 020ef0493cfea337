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

//! Scrape orchestration.
//!
//! A scrape walks `Idle -> Discovering -> Scraping -> Aggregating -> Done`, or ends in `Failed`
//! as soon as a fatal error shows up. Node stats, database stats (with their nested view
//! queries) and the activity listings are fetched concurrently; every HTTP call of the scrape
//! goes through one shared [`ConcurrencyLimiter`], held only for the duration of the call.

use std::{collections::BTreeMap, future::Future, time::Instant};

use common::{CollectorConfig, ConcurrencyLimiter, CouchdbConfig};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use crate::{
	client::CouchdbClient,
	snapshot::{
		ActivitySummary, ApiGeneration, ClusterNode, ClusterTopology, DatabaseStats, NodeStats,
		SchedulerSummary, ScrapeSnapshot, ScrapeStatus, ServerInfo, SkippedView,
		ViewStatsByDesignDoc,
	},
	staleness::compute_staleness,
	CollectorError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
	Idle,
	Discovering,
	Scraping,
	Aggregating,
	Done,
	Failed,
}

impl ScrapeState {
	pub fn is_terminal(&self) -> bool {
		matches!(self, ScrapeState::Done | ScrapeState::Failed)
	}

	pub fn can_transition_to(&self, next: ScrapeState) -> bool {
		use ScrapeState::*;
		matches!(
			(self, next),
			(Idle, Discovering) |
				(Discovering, Scraping) |
				(Scraping, Aggregating) |
				(Aggregating, Done) |
				(Discovering | Scraping | Aggregating, Failed)
		)
	}
}

/// Parts of the cluster a scrape looks at, on top of the always collected node stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeScope {
	pub databases: bool,
	pub views: bool,
	pub scheduler: bool,
}

impl ScrapeScope {
	pub fn all() -> Self {
		Self { databases: true, views: true, scheduler: true }
	}

	pub fn standard() -> Self {
		Self { databases: false, views: false, scheduler: false }
	}
}

impl Default for ScrapeScope {
	fn default() -> Self {
		Self::all()
	}
}

/// Runs scrapes one at a time: a trigger arriving during a scrape waits for it to finish.
pub struct Scraper {
	client: CouchdbClient,
	config: CollectorConfig,
	serialize: Mutex<()>,
}

impl Scraper {
	pub fn new(couchdb: &CouchdbConfig, config: CollectorConfig) -> Result<Self> {
		Ok(Self::with_client(CouchdbClient::new(couchdb)?, config))
	}

	pub fn with_client(client: CouchdbClient, config: CollectorConfig) -> Self {
		Self { client, config, serialize: Mutex::new(()) }
	}

	pub fn config(&self) -> &CollectorConfig {
		&self.config
	}

	pub fn client(&self) -> &CouchdbClient {
		&self.client
	}

	pub async fn scrape(&self, scope: ScrapeScope) -> ScrapeSnapshot {
		let _serialized = self.serialize.lock().await;
		ScrapeRun::new(self.client.clone(), &self.config, scope).execute().await
	}
}

#[derive(Debug, Clone, Copy)]
struct ScrapePlan {
	databases: bool,
	views: bool,
	scheduler: bool,
}

impl ScrapePlan {
	fn new(config: &CollectorConfig, scope: ScrapeScope) -> Self {
		let views = scope.views && config.collect_views;
		Self {
			databases: scope.databases || views,
			views,
			scheduler: scope.scheduler && config.collect_scheduler_jobs,
		}
	}
}

struct Discovery {
	server: ServerInfo,
	generation: ApiGeneration,
	topology: ClusterTopology,
	databases_total: usize,
	databases: Vec<String>,
}

struct ScrapeRun {
	state: ScrapeState,
	client: CouchdbClient,
	limiter: ConcurrencyLimiter,
	plan: ScrapePlan,
	observe_all_databases: bool,
	configured_databases: Vec<String>,
}

impl ScrapeRun {
	fn new(client: CouchdbClient, config: &CollectorConfig, scope: ScrapeScope) -> Self {
		Self {
			state: ScrapeState::Idle,
			client,
			limiter: ConcurrencyLimiter::new(config.concurrent_requests),
			plan: ScrapePlan::new(config, scope),
			observe_all_databases: config.observes_all_databases(),
			configured_databases: config.databases.clone(),
		}
	}

	fn transition(&mut self, next: ScrapeState) {
		debug_assert!(
			self.state.can_transition_to(next),
			"invalid scrape transition {:?} -> {:?}",
			self.state,
			next
		);
		debug!(from = ?self.state, to = ?next, "scrape-state");
		self.state = next;
	}

	async fn execute(mut self) -> ScrapeSnapshot {
		let started_at = Instant::now();
		self.client.reset_request_count();
		match self.collect().await {
			Ok(snapshot) => {
				self.transition(ScrapeState::Done);
				debug!(
					requests = snapshot.request_count,
					nodes = snapshot.nodes.len(),
					databases = snapshot.databases.len(),
					elapsed_ms = started_at.elapsed().as_millis() as u64,
					"scrape-done"
				);
				snapshot
			},
			Err(error) => {
				self.limiter.abort();
				self.transition(ScrapeState::Failed);
				error!(error = %error, "scrape-failed");
				ScrapeSnapshot::down(error.to_string(), self.client.request_count())
			},
		}
	}

	async fn collect(&mut self) -> Result<ScrapeSnapshot> {
		self.transition(ScrapeState::Discovering);
		let discovery = self.discover().await?;

		self.transition(ScrapeState::Scraping);
		let (nodes, databases, (activity, scheduler)) = tokio::try_join!(
			scrape_nodes(&self.client, &self.limiter, &discovery),
			scrape_databases(&self.client, &self.limiter, &discovery.databases, self.plan.views),
			scrape_activity(
				&self.client,
				&self.limiter,
				discovery.generation,
				self.plan.scheduler
			),
		)?;

		self.transition(ScrapeState::Aggregating);
		// Legacy servers report plain integer sequences, there are no shards to compare.
		let staleness = if self.plan.views && discovery.generation == ApiGeneration::Clustered {
			compute_staleness(&databases)
		} else {
			Vec::new()
		};
		Ok(ScrapeSnapshot {
			status: ScrapeStatus::Up,
			request_count: self.client.request_count(),
			generation: Some(discovery.generation),
			server: Some(discovery.server),
			topology: discovery.topology,
			databases_total: discovery.databases_total,
			nodes,
			databases,
			staleness,
			activity,
			scheduler,
		})
	}

	async fn discover(&self) -> Result<Discovery> {
		let server = gated(&self.limiter, self.client.server_info()).await?;
		let generation = server.generation()?;
		let (topology, all_dbs) = tokio::try_join!(
			gated(&self.limiter, self.client.topology(generation)),
			gated(&self.limiter, self.client.all_dbs()),
		)?;
		let databases = if !self.plan.databases {
			Vec::new()
		} else if self.observe_all_databases {
			all_dbs.clone()
		} else {
			self.configured_databases.clone()
		};
		debug!(
			version = %server.version,
			generation = generation.as_str(),
			nodes = topology.len(),
			databases = databases.len(),
			"scrape-discovered"
		);
		Ok(Discovery { server, generation, topology, databases_total: all_dbs.len(), databases })
	}
}

/// Runs one HTTP call under a limiter permit.
async fn gated<T>(
	limiter: &ConcurrencyLimiter,
	request: impl Future<Output = Result<T>>,
) -> Result<T> {
	let permit = limiter.acquire().await?;
	let result = request.await;
	permit.release();
	result
}

/// Spawns one task per item. Every task owns its result and hands it over the channel once.
fn scatter<I, F, Fut>(items: Vec<I>, task: F) -> Gather<Fut::Output>
where
	F: Fn(I) -> Fut,
	Fut: Future + Send + 'static,
	Fut::Output: Send + 'static,
{
	let (results_tx, results_rx) = mpsc::channel(items.len().max(1));
	for item in items {
		let results_tx = results_tx.clone();
		let unit_of_work = task(item);
		tokio::spawn(async move {
			// The gather side is gone once it bailed out on a fatal error.
			let _ = results_tx.send(unit_of_work.await).await;
		});
	}
	Gather { results_rx }
}

struct Gather<T> {
	results_rx: mpsc::Receiver<T>,
}

impl<T> Gather<T> {
	async fn all(mut self) -> Vec<T> {
		let mut results = Vec::new();
		while let Some(result) = self.results_rx.recv().await {
			results.push(result);
		}
		results
	}
}

impl<T> Gather<Result<T>> {
	/// Stops at the first error and aborts the limiter so that sibling tasks stop waiting for
	/// permits. Calls already in flight run to completion, their results are dropped.
	async fn all_or_abort(mut self, limiter: &ConcurrencyLimiter) -> Result<Vec<T>> {
		let mut results = Vec::new();
		while let Some(result) = self.results_rx.recv().await {
			match result {
				Ok(result) => results.push(result),
				Err(error) => {
					limiter.abort();
					return Err(error);
				},
			}
		}
		Ok(results)
	}
}

async fn scrape_nodes(
	client: &CouchdbClient,
	limiter: &ConcurrencyLimiter,
	discovery: &Discovery,
) -> Result<BTreeMap<String, NodeStats>> {
	let generation = discovery.generation;
	let nodes = scatter(discovery.topology.nodes().to_vec(), |node| {
		let client = client.clone();
		let limiter = limiter.clone();
		async move {
			let stats = scrape_node(&client, &limiter, &node, generation).await?;
			Ok::<_, CollectorError>((node.name, stats))
		}
	})
	.all_or_abort(limiter)
	.await?;
	Ok(nodes.into_iter().collect())
}

async fn scrape_node(
	client: &CouchdbClient,
	limiter: &ConcurrencyLimiter,
	node: &ClusterNode,
	generation: ApiGeneration,
) -> Result<NodeStats> {
	let mut stats = match gated(limiter, client.node_stats(node, generation)).await {
		Ok(stats) => stats,
		Err(error) if error.is_node_down() => {
			warn!(node = %node.name, error = %error, "node is down, continuing without its stats");
			return Ok(NodeStats::unreachable());
		},
		Err(error) => return Err(error),
	};
	if generation == ApiGeneration::Clustered {
		match gated(limiter, client.node_memory(node)).await {
			Ok(memory) => stats.memory = Some(memory),
			Err(error) if error.is_node_down() => {
				warn!(node = %node.name, error = %error, "continuing without node system stats");
			},
			Err(error) => return Err(error),
		}
	}
	Ok(stats)
}

async fn scrape_databases(
	client: &CouchdbClient,
	limiter: &ConcurrencyLimiter,
	databases: &[String],
	collect_views: bool,
) -> Result<BTreeMap<String, DatabaseStats>> {
	let databases = scatter(databases.to_vec(), |database| {
		let client = client.clone();
		let limiter = limiter.clone();
		async move {
			let stats = scrape_database(&client, &limiter, &database, collect_views)
				.await
				.map_err(|error| error.in_database(&database))?;
			Ok::<_, CollectorError>((database, stats))
		}
	})
	.all_or_abort(limiter)
	.await?;
	Ok(databases.into_iter().collect())
}

async fn scrape_database(
	client: &CouchdbClient,
	limiter: &ConcurrencyLimiter,
	database: &str,
	collect_views: bool,
) -> Result<DatabaseStats> {
	let mut stats = gated(limiter, client.database_stats(database)).await?;
	if collect_views {
		let (views, skipped_views) = scrape_views(client, limiter, database).await?;
		stats.views = views;
		stats.skipped_views = skipped_views;
	}
	Ok(stats)
}

/// Per view failures are logged and skipped, only an aborted limiter stops the fan-out.
async fn scrape_views(
	client: &CouchdbClient,
	limiter: &ConcurrencyLimiter,
	database: &str,
) -> Result<(ViewStatsByDesignDoc, Vec<SkippedView>)> {
	let design_docs = gated(limiter, client.design_docs(database)).await?;
	let mut views = ViewStatsByDesignDoc::new();
	let mut queries = Vec::new();
	for design_doc in design_docs {
		views.entry(design_doc.id.clone()).or_default();
		for view in design_doc.views {
			queries.push((design_doc.id.clone(), view));
		}
	}

	let results = scatter(queries, |(design_doc, view)| {
		let client = client.clone();
		let limiter = limiter.clone();
		let database = database.to_string();
		async move {
			let update_seq =
				gated(&limiter, client.view_update_seq(&database, &design_doc, &view)).await;
			(design_doc, view, update_seq)
		}
	})
	.all()
	.await;

	let mut skipped_views = Vec::new();
	for (design_doc, view, update_seq) in results {
		match update_seq {
			Ok(update_seq) => {
				views.entry(design_doc).or_default().insert(view, update_seq);
			},
			Err(error) if error.is_aborted() => return Err(error),
			Err(error) => {
				let reason = match error.couch_details() {
					Some(details) => details.to_string(),
					None => error.to_string(),
				};
				warn!(
					database = %database,
					design_doc = %design_doc,
					view = %view,
					reason = %reason,
					"error reading view, skipping it"
				);
				skipped_views.push(SkippedView { design_doc, view, reason });
			},
		}
	}
	skipped_views.sort_by(|left, right| {
		(&left.design_doc, &left.view).cmp(&(&right.design_doc, &right.view))
	});
	Ok((views, skipped_views))
}

async fn scrape_activity(
	client: &CouchdbClient,
	limiter: &ConcurrencyLimiter,
	generation: ApiGeneration,
	collect_scheduler: bool,
) -> Result<(Option<ActivitySummary>, Option<SchedulerSummary>)> {
	tokio::try_join!(
		scrape_active_tasks(client, limiter, generation),
		scrape_scheduler_jobs(client, limiter, generation, collect_scheduler),
	)
}

async fn scrape_active_tasks(
	client: &CouchdbClient,
	limiter: &ConcurrencyLimiter,
	generation: ApiGeneration,
) -> Result<Option<ActivitySummary>> {
	match gated(limiter, client.active_tasks(generation)).await {
		Ok(tasks) => Ok(Some(ActivitySummary::from_tasks(tasks))),
		Err(error) => non_fatal(error, "active tasks"),
	}
}

async fn scrape_scheduler_jobs(
	client: &CouchdbClient,
	limiter: &ConcurrencyLimiter,
	generation: ApiGeneration,
	collect_scheduler: bool,
) -> Result<Option<SchedulerSummary>> {
	if !collect_scheduler || generation == ApiGeneration::Legacy {
		return Ok(None);
	}
	match gated(limiter, client.scheduler_jobs()).await {
		Ok(jobs) => Ok(Some(SchedulerSummary::from_jobs(jobs))),
		Err(error) => non_fatal(error, "scheduler jobs"),
	}
}

fn non_fatal<T>(error: CollectorError, listing: &str) -> Result<Option<T>> {
	if error.is_aborted() {
		return Err(error);
	}
	warn!(listing, error = %error, "continuing without cluster activity listing");
	Ok(None)
}
