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

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::{fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` takes precedence over `default_level`.
pub fn setup_logging_and_tracing(default_level: Level, ansi_colors: bool) -> anyhow::Result<()> {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("{default_level},tower_http=warn,hyper=warn")));
	tracing_subscriber::registry()
		.with(env_filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_ansi(ansi_colors)
				.with_timer(UtcTime::rfc_3339())
				.with_thread_ids(true),
		)
		.try_init()
		.context("failed to set up the tracing subscriber")
}
