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

pub mod client;
pub mod error;
pub mod scrape;
pub mod snapshot;
pub mod staleness;
pub mod update_seq;

pub use client::CouchdbClient;
pub use error::{CollectorError, CouchErrorBody, Result};
pub use scrape::{ScrapeScope, ScrapeState, Scraper};
pub use snapshot::*;
pub use staleness::{compute_staleness, shard_ages, ShardAge, ViewStaleness};
pub use update_seq::{decode_update_seq, DecodeError, ShardRange, ShardSequence, UpdateSequence};
