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

use once_cell::sync::OnceCell;
use serde::Serialize;

const UNKNOWN: &str = "unknown";

/// Properties of the binary, filled in by the build script.
#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct BuildInfo {
	pub version: String,
	pub commit_hash: &'static str,
	pub commit_short_hash: &'static str,
	pub build_date: &'static str,
	pub build_target: &'static str,
}

impl BuildInfo {
	pub fn get() -> &'static Self {
		static INSTANCE: OnceCell<BuildInfo> = OnceCell::new();

		INSTANCE.get_or_init(|| {
			let commit_hash =
				option_env!("COUCHDB_EXPORTER_COMMIT_HASH").filter(|hash| !hash.is_empty());
			Self {
				version: release_version(option_env!("COUCHDB_EXPORTER_COMMIT_TAGS")),
				commit_hash: commit_hash.unwrap_or(UNKNOWN),
				commit_short_hash: commit_hash
					.and_then(|hash| hash.get(..7))
					.unwrap_or(UNKNOWN),
				build_date: env!("BUILD_DATE"),
				build_target: env!("BUILD_TARGET"),
			}
		})
	}
}

/// First `v` tag pointing at the build commit, else a nightly version.
fn release_version(commit_tags: Option<&str>) -> String {
	let mut tags: Vec<&str> = commit_tags
		.unwrap_or_default()
		.split(',')
		.map(str::trim)
		.filter(|tag| tag.starts_with('v'))
		.collect();
	tags.sort_unstable();
	match tags.first() {
		Some(tag) => tag.to_string(),
		None => concat!(env!("CARGO_PKG_VERSION"), "-nightly").to_string(),
	}
}
