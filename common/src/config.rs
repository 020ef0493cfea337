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

use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config/couchdb-exporter.yaml";

/// Special database name standing for "every database of the cluster".
pub const ALL_DBS: &str = "_all_dbs";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
	#[serde(default = "ExporterConfig::default_listen_address")]
	pub listen_address: SocketAddr,
	#[serde(default = "ExporterConfig::default_metrics_path")]
	pub metrics_path: String,
	#[serde(default)]
	pub couchdb: CouchdbConfig,
	#[serde(default)]
	pub collector: CollectorConfig,
}

impl ExporterConfig {
	fn default_listen_address() -> SocketAddr {
		SocketAddr::from(([0, 0, 0, 0], 9984))
	}

	fn default_metrics_path() -> String {
		"metrics".to_string()
	}

	pub fn from_yaml(content: &[u8]) -> anyhow::Result<Self> {
		let config: ExporterConfig =
			serde_yaml::from_slice(content).context("failed to parse exporter config YAML")?;
		Ok(config)
	}

	pub fn validate(&self) -> anyhow::Result<()> {
		self.couchdb.validate()?;
		ensure!(
			!self.metrics_path.trim_matches('/').is_empty(),
			"metrics path (`metrics_path`) must not be empty"
		);
		ensure!(
			!self.metrics_path.trim_matches('/').contains('/'),
			"metrics path (`metrics_path`) must be a single path segment, got `{}`",
			self.metrics_path
		);
		if self.collector.collect_views && self.collector.databases.is_empty() {
			warn!("`collector.collect_views` is enabled but no database is observed");
		}
		Ok(())
	}
}

impl Default for ExporterConfig {
	fn default() -> Self {
		Self {
			listen_address: Self::default_listen_address(),
			metrics_path: Self::default_metrics_path(),
			couchdb: CouchdbConfig::default(),
			collector: CollectorConfig::default(),
		}
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CouchdbConfig {
	#[serde(default = "CouchdbConfig::default_uri")]
	pub uri: String,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub password: Option<String>,
	/// Ignore the server certificate when talking https.
	#[serde(default = "CouchdbConfig::default_insecure")]
	pub insecure: bool,
	#[serde(default = "CouchdbConfig::default_timeout", with = "humantime_duration")]
	pub timeout: Duration,
}

impl CouchdbConfig {
	fn default_uri() -> String {
		"http://localhost:5984".to_string()
	}

	fn default_insecure() -> bool {
		true
	}

	fn default_timeout() -> Duration {
		Duration::from_secs(30)
	}

	pub fn validate(&self) -> anyhow::Result<()> {
		let uri = Url::parse(&self.uri)
			.with_context(|| format!("invalid CouchDB uri (`couchdb.uri`): `{}`", self.uri))?;
		if !matches!(uri.scheme(), "http" | "https") {
			bail!("CouchDB uri must use http or https, got `{}`", uri.scheme());
		}
		ensure!(
			self.username.is_some() == self.password.is_some(),
			"`couchdb.username` and `couchdb.password` must be set together"
		);
		ensure!(!self.timeout.is_zero(), "`couchdb.timeout` must be greater than zero");
		Ok(())
	}

	/// Returns the basic auth pair, if any.
	pub fn basic_auth(&self) -> Option<BasicAuth> {
		match (&self.username, &self.password) {
			(Some(username), Some(password)) =>
				Some(BasicAuth { username: username.clone(), password: password.clone() }),
			_ => None,
		}
	}
}

impl Default for CouchdbConfig {
	fn default() -> Self {
		Self {
			uri: Self::default_uri(),
			username: None,
			password: None,
			insecure: Self::default_insecure(),
			timeout: Self::default_timeout(),
		}
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BasicAuth {
	pub username: String,
	pub password: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
	/// Databases to observe. `["_all_dbs"]` observes every database.
	#[serde(default)]
	pub databases: Vec<String>,
	#[serde(default)]
	pub collect_views: bool,
	#[serde(default)]
	pub collect_scheduler_jobs: bool,
	/// Maximum number of simultaneous requests against CouchDB, `0` means unlimited.
	#[serde(default)]
	pub concurrent_requests: usize,
}

impl CollectorConfig {
	pub fn observes_all_databases(&self) -> bool {
		self.databases.iter().any(|database| database == ALL_DBS)
	}
}

mod humantime_duration {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&humantime::format_duration(*duration).to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		let value = String::deserialize(deserializer)?;
		humantime::parse_duration(&value).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_empty_config_uses_defaults() {
		let config = ExporterConfig::from_yaml(b"{}").unwrap();
		assert_eq!(config, ExporterConfig::default());
		assert_eq!(config.listen_address.port(), 9984);
		assert_eq!(config.couchdb.uri, "http://localhost:5984");
		assert!(config.couchdb.insecure);
		assert_eq!(config.couchdb.timeout, Duration::from_secs(30));
		assert_eq!(config.collector.concurrent_requests, 0);
		config.validate().unwrap();
	}

	#[test]
	fn test_full_config() {
		let yaml = r#"
listen_address: 127.0.0.1:9985
metrics_path: couch-metrics
couchdb:
  uri: https://couch.example.org:6984
  username: admin
  password: secret
  insecure: false
  timeout: 2s 500ms
collector:
  databases: [_all_dbs]
  collect_views: true
  collect_scheduler_jobs: true
  concurrent_requests: 8
"#;
		let config = ExporterConfig::from_yaml(yaml.as_bytes()).unwrap();
		config.validate().unwrap();
		assert_eq!(config.metrics_path, "couch-metrics");
		assert_eq!(config.couchdb.timeout, Duration::from_millis(2_500));
		assert!(!config.couchdb.insecure);
		assert!(config.collector.observes_all_databases());
		assert_eq!(
			config.couchdb.basic_auth(),
			Some(BasicAuth { username: "admin".to_string(), password: "secret".to_string() })
		);
	}

	#[test]
	fn test_unknown_fields_are_rejected() {
		assert!(ExporterConfig::from_yaml(b"couchdb:\n  url: http://localhost\n").is_err());
	}

	#[test]
	fn test_validate_rejects_half_credentials() {
		let mut config = ExporterConfig::default();
		config.couchdb.username = Some("admin".to_string());
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_validate_rejects_non_http_uri() {
		let mut config = ExporterConfig::default();
		config.couchdb.uri = "ftp://localhost:5984".to_string();
		assert!(config.validate().is_err());
		config.couchdb.uri = "not a uri".to_string();
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_validate_rejects_nested_metrics_path() {
		let mut config = ExporterConfig::default();
		config.metrics_path = "a/b".to_string();
		assert!(config.validate().is_err());
	}
}
