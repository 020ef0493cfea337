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
use clap::{Arg, ArgMatches, Command};
use collector::{decode_update_seq, UpdateSequence};

pub fn build_decode_seq_command() -> Command {
	Command::new("decode-seq")
		.about("Decodes a CouchDB update sequence.")
		.long_about(
			"Decodes a CouchDB update sequence (as found in `update_seq` of a database or view) \
			 and prints its shard ranges and sequence numbers as JSON.",
		)
		.arg(Arg::new("token").help("Update sequence to decode").required(true))
}

#[derive(Debug, Eq, PartialEq)]
pub struct DecodeSeq {
	pub(crate) token: String,
}

impl DecodeSeq {
	pub fn parse_cli_args(mut matches: ArgMatches) -> anyhow::Result<Self> {
		let token = matches.try_remove_one::<String>("token")?.context("`token` is required")?;
		Ok(DecodeSeq { token })
	}

	pub fn execute(self) -> anyhow::Result<()> {
		println!("{}", render_update_seq(&decode_update_seq(&self.token)?)?);
		Ok(())
	}
}

fn render_update_seq(update_seq: &UpdateSequence) -> anyhow::Result<String> {
	serde_json::to_string_pretty(update_seq).context("failed to render the update sequence")
}
