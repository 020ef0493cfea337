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

//! Per shard lag of a view behind its database.

use std::collections::BTreeMap;

use num_bigint::BigInt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
	snapshot::DatabaseStats,
	update_seq::{decode_update_seq, serialize_integer, ShardRange, UpdateSequence},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardAge {
	pub range: ShardRange,
	#[serde(serialize_with = "serialize_integer")]
	pub age: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewStaleness {
	pub database: String,
	pub design_doc: String,
	pub view: String,
	pub range: ShardRange,
	/// Database seq minus view seq. Zero or negative once the view caught up.
	#[serde(serialize_with = "serialize_integer")]
	pub age: BigInt,
}

/// Joins both sequences on `range.low`. View shards without a database counterpart are
/// skipped, which happens while a cluster is being resharded.
pub fn shard_ages(database: &UpdateSequence, view: &UpdateSequence) -> Vec<ShardAge> {
	view.iter()
		.filter_map(|view_shard| {
			let database_shard = database.find_by_low(&view_shard.range.low)?;
			Some(ShardAge {
				range: view_shard.range.clone(),
				age: &database_shard.seq - &view_shard.seq,
			})
		})
		.collect()
}

/// Decodes the update sequences of every database and view and computes their staleness.
/// Undecodable tokens are logged and contribute nothing.
pub fn compute_staleness(databases: &BTreeMap<String, DatabaseStats>) -> Vec<ViewStaleness> {
	let mut staleness = Vec::new();
	for (database, stats) in databases {
		if stats.views.is_empty() {
			continue;
		}
		let database_seq = match decode_update_seq(&stats.update_seq) {
			Ok(sequence) => sequence,
			Err(error) => {
				warn!(database = %database, error = %error, "skipping staleness of database views");
				continue;
			},
		};
		for (design_doc, views) in &stats.views {
			for (view, token) in views {
				let view_seq = match decode_update_seq(token) {
					Ok(sequence) => sequence,
					Err(error) => {
						warn!(
							database = %database,
							design_doc = %design_doc,
							view = %view,
							error = %error,
							"skipping staleness of view"
						);
						continue;
					},
				};
				let ages = shard_ages(&database_seq, &view_seq);
				if ages.len() < view_seq.len() {
					debug!(
						database = %database,
						design_doc = %design_doc,
						view = %view,
						unmatched = view_seq.len() - ages.len(),
						"view shards without database counterpart"
					);
				}
				staleness.extend(ages.into_iter().map(|shard| ViewStaleness {
					database: database.clone(),
					design_doc: design_doc.clone(),
					view: view.clone(),
					range: shard.range,
					age: shard.age,
				}));
			}
		}
	}
	staleness
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::update_seq::{tests::CLUSTER_TOKEN, ShardSequence};

	/// Four shards on `couchdb@n1` with seqs 12, 30, 5 and 0.
	const DATABASE_TOKEN: &str = "g1AAAADjeJzLYWBgYMlgTmHgSs4vTc5ISXLIM8wBijElMiTJ____PyuDOZEnFyjAnJiUjKIKm6YkBSCZZA_VJ0e8PgeQvnioPlbi9SWA9NVD9TFg1ZcFAKQ4QcU";
	/// The first three shards of the database above, with seqs 10, 30 and 7.
	const VIEW_TOKEN: &str = "g1AAAACreJzLYWBgYM5gTmHgSs4vTc5ISXLIM8wBijElMiTJ____PyuDOZErF6QoMSkZRRU2TUkKQDLJHqpPjnh9DiB98VB97Fj1ZQEAGZExNQ";

	fn sequence(entries: &[(u64, u64, i64)]) -> UpdateSequence {
		entries
			.iter()
			.map(|(low, high, seq)| ShardSequence::new("node", ShardRange::new(*low, *high), *seq))
			.collect()
	}

	#[test]
	fn test_matching_range_yields_age() {
		let ages = shard_ages(&sequence(&[(0, 100, 50)]), &sequence(&[(0, 100, 30)]));
		assert_eq!(ages, vec![ShardAge { range: ShardRange::new(0, 100), age: BigInt::from(20) }]);
	}

	#[test]
	fn test_unmatched_view_range_is_skipped() {
		let ages = shard_ages(&sequence(&[(0, 100, 50)]), &sequence(&[(101, 200, 30)]));
		assert!(ages.is_empty());
	}

	#[test]
	fn test_caught_up_view_has_non_positive_age() {
		let ages = shard_ages(
			&sequence(&[(0, 99, 5), (100, 199, 7)]),
			&sequence(&[(100, 199, 9), (0, 99, 5)]),
		);
		let ages: Vec<i64> = ages.iter().map(|shard| i64::try_from(&shard.age).unwrap()).collect();
		assert_eq!(ages, vec![0, -2]);
	}

	fn database(update_seq: &str, views: &[(&str, &str, &str)]) -> DatabaseStats {
		let mut stats = DatabaseStats { update_seq: update_seq.to_string(), ..Default::default() };
		for (design_doc, view, token) in views {
			stats
				.views
				.entry(design_doc.to_string())
				.or_default()
				.insert(view.to_string(), token.to_string());
		}
		stats
	}

	#[test]
	fn test_compute_staleness_from_tokens() {
		let databases = BTreeMap::from([(
			"example".to_string(),
			database(DATABASE_TOKEN, &[("_design/docs", "by_name", VIEW_TOKEN)]),
		)]);
		let staleness = compute_staleness(&databases);
		let ages: Vec<(String, i64)> = staleness
			.iter()
			.map(|entry| (entry.range.low.to_string(), i64::try_from(&entry.age).unwrap()))
			.collect();
		assert_eq!(
			ages,
			vec![
				("0".to_string(), 2),
				("536870912".to_string(), 0),
				("1073741824".to_string(), -2),
			]
		);
		assert!(staleness
			.iter()
			.all(|entry| entry.database == "example" && entry.view == "by_name"));
	}

	#[test]
	fn test_compute_staleness_skips_undecodable_tokens() {
		let databases = BTreeMap::from([
			(
				"broken-db".to_string(),
				database("not-base64!", &[("_design/docs", "by_name", CLUSTER_TOKEN)]),
			),
			(
				"example".to_string(),
				database(
					CLUSTER_TOKEN,
					&[("_design/docs", "broken", "!!!!"), ("_design/docs", "by_name", CLUSTER_TOKEN)],
				),
			),
		]);
		let staleness = compute_staleness(&databases);
		assert_eq!(staleness.len(), 8);
		assert!(staleness.iter().all(|entry| entry.database == "example" && entry.age == BigInt::from(0)));
	}
}
