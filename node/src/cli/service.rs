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

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use common::ExporterConfig;
use tokio::signal;
use tracing::{debug, info};

use crate::{cli::load_exporter_config, serve_exporter};

pub fn build_serve_command() -> Command {
	Command::new("serve")
		.about("Starts the CouchDB exporter.")
		.long_about(
			"Starts the CouchDB exporter: every request on the metrics endpoint scrapes the \
			 configured CouchDB server and publishes the result.",
		)
}

/// Declared on the root command, which serves when no subcommand is given.
pub fn config_override_args() -> [Arg; 4] {
	[
		Arg::new("couchdb-uri")
			.long("couchdb-uri")
			.help("CouchDB uri, overrides `couchdb.uri`")
			.env("COUCHDB_URI")
			.global(true)
			.required(false),
		Arg::new("couchdb-username")
			.long("couchdb-username")
			.help("CouchDB basic auth user, overrides `couchdb.username`")
			.env("COUCHDB_USERNAME")
			.global(true)
			.required(false),
		Arg::new("couchdb-password")
			.long("couchdb-password")
			.help("CouchDB basic auth password, overrides `couchdb.password`")
			.env("COUCHDB_PASSWORD")
			.hide_env_values(true)
			.global(true)
			.required(false),
		Arg::new("listen-address")
			.long("listen-address")
			.help("Address of the metrics server, overrides `listen_address`")
			.env("COUCHDB_EXPORTER_LISTEN_ADDRESS")
			.value_parser(clap::value_parser!(SocketAddr))
			.global(true)
			.required(false),
	]
}

/// Command line values taking precedence over the config file.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ConfigOverrides {
	pub couchdb_uri: Option<String>,
	pub couchdb_username: Option<String>,
	pub couchdb_password: Option<String>,
	pub listen_address: Option<SocketAddr>,
}

impl ConfigOverrides {
	fn parse_cli_args(matches: &mut ArgMatches) -> anyhow::Result<Self> {
		Ok(Self {
			couchdb_uri: remove_optional(matches, "couchdb-uri")?,
			couchdb_username: remove_optional(matches, "couchdb-username")?,
			couchdb_password: remove_optional(matches, "couchdb-password")?,
			listen_address: remove_optional(matches, "listen-address")?,
		})
	}

	pub fn apply(self, config: &mut ExporterConfig) {
		if let Some(uri) = self.couchdb_uri {
			config.couchdb.uri = uri;
		}
		if let Some(username) = self.couchdb_username {
			config.couchdb.username = Some(username);
		}
		if let Some(password) = self.couchdb_password {
			config.couchdb.password = Some(password);
		}
		if let Some(listen_address) = self.listen_address {
			config.listen_address = listen_address;
		}
	}
}

fn remove_optional<T: Clone + Send + Sync + 'static>(
	matches: &mut ArgMatches,
	id: &str,
) -> anyhow::Result<Option<T>> {
	matches.try_remove_one::<T>(id).with_context(|| format!("failed to read argument `{id}`"))
}

#[derive(Debug, Eq, PartialEq)]
pub struct Serve {
	pub config_uri: String,
	pub overrides: ConfigOverrides,
}

impl Serve {
	pub fn parse_cli_args(mut matches: ArgMatches) -> anyhow::Result<Self> {
		let config_uri = matches
			.try_remove_one::<String>("config")?
			.context("`config` has a default value")?;
		let overrides = ConfigOverrides::parse_cli_args(&mut matches)?;
		Ok(Serve { config_uri, overrides })
	}

	pub async fn execute(self) -> anyhow::Result<()> {
		debug!(config_uri = %self.config_uri, "run-couchdb-exporter");
		let mut config = load_exporter_config(&self.config_uri).await?;
		self.overrides.apply(&mut config);
		config.validate()?;
		let shutdown_signal = Box::pin(async move {
			if let Err(error) = signal::ctrl_c().await {
				tracing::error!(error = %error, "failed to listen for the interrupt signal");
				std::future::pending::<()>().await;
			}
		});
		serve_exporter(config, shutdown_signal).await?;
		info!("CouchDB exporter has shut down");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[cfg(debug_assertions)]
	#[test]
	fn test_undeclared_override_fails_loudly() {
		let mut matches = Command::new("serve").try_get_matches_from(["serve"]).unwrap();
		assert!(ConfigOverrides::parse_cli_args(&mut matches).is_err());
	}

	#[test]
	fn test_overrides_take_precedence() {
		let mut config = ExporterConfig::default();
		config.couchdb.username = Some("from-file".to_string());
		ConfigOverrides {
			couchdb_uri: Some("http://couch:5984".to_string()),
			couchdb_username: Some("admin".to_string()),
			couchdb_password: Some("secret".to_string()),
			listen_address: None,
		}
		.apply(&mut config);
		assert_eq!(config.couchdb.uri, "http://couch:5984");
		assert_eq!(config.couchdb.username.as_deref(), Some("admin"));
		assert_eq!(config.couchdb.password.as_deref(), Some("secret"));
		assert_eq!(config.listen_address, ExporterConfig::default().listen_address);
		config.validate().unwrap();
	}

	#[test]
	fn test_empty_overrides_keep_the_config() {
		let mut config = ExporterConfig::default();
		ConfigOverrides::default().apply(&mut config);
		assert_eq!(config, ExporterConfig::default());
	}
}
