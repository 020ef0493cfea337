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

pub mod cli_main;
pub use cli_main::*;
pub mod decode_seq;
pub use decode_seq::*;
pub mod logger;
pub use logger::*;
pub mod service;
use std::{io::ErrorKind, path::Path};

use anyhow::Context;
use common::{ExporterConfig, DEFAULT_CONFIG_PATH};
pub use service::*;
use tokio::fs;
use tracing::{info, warn};

/// Loads the exporter config located at `config_uri`.
///
/// A missing file at the default location yields the default config, any other missing file is
/// an error.
pub async fn load_exporter_config(config_uri: &str) -> anyhow::Result<ExporterConfig> {
	let config_content = match fs::read(config_uri).await {
		Ok(config_content) => config_content,
		Err(error) if error.kind() == ErrorKind::NotFound && is_default_path(config_uri) => {
			warn!(config_uri = %config_uri, "no config file found, using the default config");
			return Ok(ExporterConfig::default());
		},
		Err(error) => {
			return Err(error)
				.with_context(|| format!("failed to read exporter config file at `{config_uri}`"))
		},
	};
	let config = ExporterConfig::from_yaml(&config_content)
		.with_context(|| format!("failed to load exporter config at `{config_uri}`"))?;
	info!(config_uri = %config_uri, "loaded exporter config");
	Ok(config)
}

fn is_default_path(config_uri: &str) -> bool {
	Path::new(config_uri) == Path::new(DEFAULT_CONFIG_PATH)
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[tokio::test]
	async fn test_load_exporter_config() {
		let mut config_file = tempfile::NamedTempFile::new().unwrap();
		writeln!(config_file, "couchdb:\n  uri: http://couch:5984\ncollector:\n  collect_views: true")
			.unwrap();
		let config =
			load_exporter_config(config_file.path().to_str().unwrap()).await.unwrap();
		assert_eq!(config.couchdb.uri, "http://couch:5984");
		assert!(config.collector.collect_views);
	}

	#[tokio::test]
	async fn test_missing_config_file() {
		assert!(load_exporter_config("/does/not/exist.yaml").await.is_err());
	}

	#[tokio::test]
	async fn test_invalid_config_file() {
		let mut config_file = tempfile::NamedTempFile::new().unwrap();
		writeln!(config_file, "couchdb: [").unwrap();
		assert!(load_exporter_config(config_file.path().to_str().unwrap()).await.is_err());
	}
}
