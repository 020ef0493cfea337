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

use std::fmt;

use common::Aborted;
use serde::Deserialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectorError>;

/// Structured error document returned by CouchDB, e.g.
/// `{"error": "nodedown", "reason": "progress not possible"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CouchErrorBody {
	pub error: String,
	#[serde(default)]
	pub reason: String,
}

impl CouchErrorBody {
	pub fn is_node_down(&self) -> bool {
		self.error == "nodedown"
	}
}

impl fmt::Display for CouchErrorBody {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}, reason: {}", self.error, self.reason)
	}
}

#[derive(Debug, Error)]
pub enum CollectorError {
	#[error("failed to build the http client: {0}")]
	Setup(#[source] reqwest::Error),
	#[error("request to `{url}` failed: {source}")]
	Transport {
		url: String,
		#[source]
		source: reqwest::Error,
	},
	#[error("request to `{url}` returned status {status}: {}", protocol_reason(.details, .body))]
	Protocol { url: String, status: u16, body: String, details: Option<CouchErrorBody> },
	#[error("`{url}` answered with an error document: {details}")]
	Couch { url: String, details: CouchErrorBody },
	#[error("failed to parse the response of `{url}`: {source}")]
	Json {
		url: String,
		#[source]
		source: serde_json::Error,
	},
	#[error("unsupported server version `{version}`: {source}")]
	Version {
		version: String,
		#[source]
		source: semver::Error,
	},
	#[error("cluster topology error: {0}")]
	Topology(String),
	#[error("error reading database `{database}`: {source}")]
	Database {
		database: String,
		#[source]
		source: Box<CollectorError>,
	},
	#[error(transparent)]
	Aborted(#[from] Aborted),
}

fn protocol_reason(details: &Option<CouchErrorBody>, body: &str) -> String {
	match details {
		Some(details) => details.to_string(),
		None => body.to_string(),
	}
}

impl CollectorError {
	pub(crate) fn protocol(url: String, status: u16, body: String) -> Self {
		let details = serde_json::from_str::<CouchErrorBody>(&body).ok();
		CollectorError::Protocol { url, status, body, details }
	}

	pub(crate) fn in_database(self, database: &str) -> Self {
		match self {
			CollectorError::Aborted(aborted) => CollectorError::Aborted(aborted),
			source => CollectorError::Database { database: database.to_string(), source: Box::new(source) },
		}
	}

	/// True for failures that mark a single node as down instead of failing the scrape.
	pub fn is_node_down(&self) -> bool {
		match self {
			CollectorError::Transport { .. } => true,
			CollectorError::Protocol { details: Some(details), .. } => details.is_node_down(),
			CollectorError::Protocol { body, .. } => body.contains(r#""error":"nodedown""#),
			CollectorError::Couch { details, .. } => details.is_node_down(),
			_ => false,
		}
	}

	pub fn is_aborted(&self) -> bool {
		matches!(self, CollectorError::Aborted(_))
	}

	/// Structured CouchDB error attached to this error, if any.
	pub fn couch_details(&self) -> Option<&CouchErrorBody> {
		match self {
			CollectorError::Protocol { details, .. } => details.as_ref(),
			CollectorError::Couch { details, .. } => Some(details),
			CollectorError::Database { source, .. } => source.couch_details(),
			_ => None,
		}
	}
}
