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

//! Update sequence tokens.
//!
//! A clustered CouchDB reports `update_seq` as `[<shard count>-]<url safe base64>`, the base64
//! part being a `term_to_binary` encoded list of `{Node, [RangeLow, RangeHigh], Seq}` tuples, one
//! per shard range.

use std::fmt;

use base64::{
	alphabet,
	engine::{GeneralPurpose, GeneralPurposeConfig},
	Engine as _,
};
use eetf::Term;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ser::SerializeSeq, Serialize, Serializer};
use thiserror::Error;

static SHARD_COUNT_PREFIX: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\d+-").expect("shard count prefix regex must compile"));

const BASE64: GeneralPurpose = GeneralPurpose::new(
	&alphabet::STANDARD,
	GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Error)]
#[error("failed to decode update sequence `{token}`: {kind}")]
pub struct DecodeError {
	pub token: String,
	#[source]
	pub kind: DecodeErrorKind,
}

#[derive(Debug, Error)]
pub enum DecodeErrorKind {
	#[error("invalid base64: {0}")]
	Base64(#[from] base64::DecodeError),
	#[error("invalid binary term: {0}")]
	Term(#[from] eetf::DecodeError),
	#[error("unexpected term shape: {0}")]
	Shape(String),
}

fn shape(message: impl Into<String>) -> DecodeErrorKind {
	DecodeErrorKind::Shape(message.into())
}

/// Slice of the hash key space owned by a shard. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardRange {
	pub low: BigInt,
	pub high: BigInt,
}

impl ShardRange {
	pub fn new(low: impl Into<BigInt>, high: impl Into<BigInt>) -> Self {
		Self { low: low.into(), high: high.into() }
	}
}

impl fmt::Display for ShardRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}, {}]", self.low, self.high)
	}
}

impl Serialize for ShardRange {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut bounds = serializer.serialize_seq(Some(2))?;
		bounds.serialize_element(&JsonInteger(&self.low))?;
		bounds.serialize_element(&JsonInteger(&self.high))?;
		bounds.end()
	}
}

/// Serializes as a JSON number while it fits 64 bits, as a decimal string beyond.
struct JsonInteger<'a>(&'a BigInt);

impl Serialize for JsonInteger<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		if let Some(value) = self.0.to_u64() {
			serializer.serialize_u64(value)
		} else if let Some(value) = self.0.to_i64() {
			serializer.serialize_i64(value)
		} else {
			serializer.serialize_str(&self.0.to_string())
		}
	}
}

pub(crate) fn serialize_integer<S: Serializer>(
	value: &BigInt,
	serializer: S,
) -> Result<S::Ok, S::Error> {
	JsonInteger(value).serialize(serializer)
}

/// Position of one shard range in the update sequence of a database or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardSequence {
	pub node: String,
	pub range: ShardRange,
	#[serde(serialize_with = "serialize_integer")]
	pub seq: BigInt,
}

impl ShardSequence {
	pub fn new(node: impl Into<String>, range: ShardRange, seq: impl Into<BigInt>) -> Self {
		Self { node: node.into(), range, seq: seq.into() }
	}
}

/// Decoded update sequence, sorted by ascending `range.low`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UpdateSequence {
	entries: Vec<ShardSequence>,
}

impl UpdateSequence {
	pub fn from_entries(mut entries: Vec<ShardSequence>) -> Self {
		entries.sort_by(|left, right| left.range.low.cmp(&right.range.low));
		Self { entries }
	}

	pub fn entries(&self) -> &[ShardSequence] {
		&self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, ShardSequence> {
		self.entries.iter()
	}

	/// Entry whose range starts exactly at `low`.
	pub fn find_by_low(&self, low: &BigInt) -> Option<&ShardSequence> {
		self.entries
			.binary_search_by(|entry| entry.range.low.cmp(low))
			.ok()
			.map(|index| &self.entries[index])
	}
}

impl<'a> IntoIterator for &'a UpdateSequence {
	type Item = &'a ShardSequence;
	type IntoIter = std::slice::Iter<'a, ShardSequence>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.iter()
	}
}

impl FromIterator<ShardSequence> for UpdateSequence {
	fn from_iter<I: IntoIterator<Item = ShardSequence>>(iter: I) -> Self {
		Self::from_entries(iter.into_iter().collect())
	}
}

/// Decodes an update sequence token. The empty token, reported by single shard deployments,
/// decodes to an empty sequence.
pub fn decode_update_seq(token: &str) -> Result<UpdateSequence, DecodeError> {
	if token.is_empty() {
		return Ok(UpdateSequence::default());
	}
	decode_entries(token).map_err(|kind| DecodeError { token: token.to_string(), kind })
}

fn decode_entries(token: &str) -> Result<UpdateSequence, DecodeErrorKind> {
	let encoded = SHARD_COUNT_PREFIX.replace(token, "");
	let mut standard: String = encoded
		.chars()
		.map(|c| match c {
			'-' => '+',
			'_' => '/',
			c => c,
		})
		.collect();
	while standard.len() % 4 != 0 {
		standard.push('=');
	}
	let bytes = BASE64.decode(standard)?;
	let Some(terms) = list_elements(Term::decode(bytes.as_slice())?) else {
		return Err(shape("top level term is not a list"));
	};
	terms
		.into_iter()
		.map(shard_sequence)
		.collect::<Result<Vec<_>, _>>()
		.map(UpdateSequence::from_entries)
}

/// `[]` decodes as an empty list and small integer lists as byte lists.
fn list_elements(term: Term) -> Option<Vec<Term>> {
	match term {
		Term::List(list) => Some(list.elements),
		Term::ByteList(list) => Some(
			list.bytes
				.into_iter()
				.map(|byte| Term::FixInteger(eetf::FixInteger { value: i32::from(byte) }))
				.collect(),
		),
		_ => None,
	}
}

fn shard_sequence(term: Term) -> Result<ShardSequence, DecodeErrorKind> {
	let Term::Tuple(tuple) = term else {
		return Err(shape("shard entry is not a tuple"));
	};
	let [node, range, seq]: [Term; 3] = tuple.elements.try_into().map_err(|elements: Vec<Term>| {
		shape(format!("shard entry has {} elements, expected 3", elements.len()))
	})?;
	let node = match node {
		Term::Atom(atom) => atom.name,
		Term::Binary(binary) =>
			String::from_utf8(binary.bytes).map_err(|_| shape("shard node is not valid utf-8"))?,
		_ => return Err(shape("shard node is neither an atom nor a binary")),
	};
	let Some(bounds) = list_elements(range) else {
		return Err(shape("shard range is not a list"));
	};
	let [low, high]: [Term; 2] = bounds
		.try_into()
		.map_err(|bounds: Vec<Term>| shape(format!("shard range has {} bounds", bounds.len())))?;
	let range = ShardRange { low: integer(low, "range low")?, high: integer(high, "range high")? };
	// Newer clusters wrap the sequence in a tuple next to the shard uuid and epoch node.
	let seq = match seq {
		Term::Tuple(wrapped) => match wrapped.elements.into_iter().next() {
			Some(seq) => integer(seq, "seq")?,
			None => return Err(shape("seq tuple is empty")),
		},
		seq => integer(seq, "seq")?,
	};
	Ok(ShardSequence { node, range, seq })
}

fn integer(term: Term, what: &str) -> Result<BigInt, DecodeErrorKind> {
	match term {
		Term::FixInteger(integer) => Ok(BigInt::from(integer.value)),
		Term::BigInteger(integer) => Ok(integer.value),
		_ => Err(shape(format!("{what} is not an integer"))),
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use proptest::prelude::*;

	use super::*;

	pub(crate) const CLUSTER_TOKEN: &str = "g1AAAAI-eJyd0EsOgjAQBuAGiI-dN9C9LmrBwqzkJtrSNkgQV6z1JnoTvYneBEvbhA0aMU1mkj6-_NMSITTJfYFm2anOcsFT10mpTzyG-LxpmiL32eqoN8aEAcWE9dz_jPCFrnzrHGQchiFM4kSgaV0JqQ6VFF-AtAV2DggMgCEGxrNhQfatc3bOyDiKUalg2EBVoCu66KapazcUh41e69-GssjNIvcWWRokk2oNofwj0MNazy4QFURhGQ0J9LKI-SHPIBHEgiak51nxBhxnrRk";
	pub(crate) const IDLE_CLUSTER_TOKEN: &str = "g1AAAAFzeJzLYWBg4MhgTmEQTc4vTc5ISXIwNDfSMzTTMzK20DM0zAFKMyUyJMn___8_K5GBgMIkBSCZZA9Wy0hIrQNIbTxx5iaA1NYTpTaPBUgyNAApoPL5xKpfAFG_n1j1ByDq7xOr_gFEPcj9WQAWgmVX";
	/// Two shards listed out of order, the second one wrapping its seq in a tuple.
	const WRAPPED_SEQ_TOKEN: &str = "g2wAAAACaANkAApub2RlMkBob3N0bAAAAAJuCQABAAAAAAAAAEBuCwAAAAAAAAAAAAAAAWpiAAABLGgDdwpub2RlMUBob3N0bAAAAAJhAG4JAAAAAAAAAAAAQGpoAWEHag";

	const SHARD_SIZE: u64 = 1 << 29;

	fn seqs(sequence: &UpdateSequence) -> Vec<i64> {
		sequence.iter().map(|entry| entry.seq.to_i64().unwrap()).collect()
	}

	#[test]
	fn test_decode_cluster_token() {
		let sequence = decode_update_seq(CLUSTER_TOKEN).unwrap();
		assert_eq!(sequence.len(), 8);
		assert_eq!(seqs(&sequence), vec![44, 0, 4, 6, 0, 43, 0, 2]);
		for (index, entry) in sequence.iter().enumerate() {
			let index = index as u64;
			assert_eq!(entry.node, "couchdb@couchdb2");
			assert_eq!(entry.range, ShardRange::new(index * SHARD_SIZE, (index + 1) * SHARD_SIZE - 1));
		}
		assert_eq!(sequence.entries()[7].range.high, BigInt::from(u32::MAX));
	}

	#[test]
	fn test_decode_idle_cluster_token() {
		let sequence = decode_update_seq(IDLE_CLUSTER_TOKEN).unwrap();
		assert_eq!(sequence.len(), 8);
		assert_eq!(seqs(&sequence), vec![0, 1, 0, 0, 0, 0, 0, 0]);
		assert!(sequence.iter().all(|entry| entry.node == "couchdb@172.16.238.11"));
	}

	#[test]
	fn test_shard_count_prefix_is_ignored() {
		let prefixed = format!("8-{CLUSTER_TOKEN}");
		assert_eq!(
			decode_update_seq(&prefixed).unwrap(),
			decode_update_seq(CLUSTER_TOKEN).unwrap()
		);
	}

	#[test]
	fn test_empty_token_decodes_to_empty_sequence() {
		let sequence = decode_update_seq("").unwrap();
		assert!(sequence.is_empty());
	}

	#[test]
	fn test_small_range_encoded_as_string() {
		let sequence = decode_update_seq("g2wAAAABaANkAAFuawACAAVhA2o").unwrap();
		assert_eq!(sequence.entries(), &[ShardSequence::new("n", ShardRange::new(0, 5), 3)]);
	}

	#[test]
	fn test_wrapped_seq_and_big_ranges() {
		let sequence = decode_update_seq(WRAPPED_SEQ_TOKEN).unwrap();
		let two_pow_70 = BigInt::from(1u8) << 70usize;
		assert_eq!(
			sequence.entries(),
			&[
				ShardSequence::new("node1@host", ShardRange::new(0, two_pow_70.clone()), 7),
				ShardSequence::new(
					"node2@host",
					ShardRange::new(two_pow_70 + 1, BigInt::from(1u8) << 80usize),
					300
				),
			]
		);
		assert!(sequence.find_by_low(&BigInt::from(0)).is_some());
		assert!(sequence.find_by_low(&BigInt::from(1)).is_none());
	}

	#[test]
	fn test_json_rendering() {
		let sequence = decode_update_seq(WRAPPED_SEQ_TOKEN).unwrap();
		let json = serde_json::to_value(&sequence).unwrap();
		assert_eq!(
			json[0],
			serde_json::json!({"node": "node1@host", "range": [0, "1180591620717411303424"], "seq": 7})
		);
		assert_eq!(json[1]["seq"], serde_json::json!(300));
	}

	#[test]
	fn test_malformed_tokens_carry_the_token() {
		for token in ["!!!!", "g2wAAAAByGo", "g1AAAAI-eJyd0EsOgjAQBuAGiI", "g2EB"] {
			let error = decode_update_seq(token).unwrap_err();
			assert_eq!(error.token, token);
			assert!(error.to_string().contains(token));
		}
		let error = decode_update_seq("g2wAAAAByGo").unwrap_err();
		assert!(matches!(error.kind, DecodeErrorKind::Term(_)));
		let error = decode_update_seq("g2EB").unwrap_err();
		assert!(matches!(error.kind, DecodeErrorKind::Shape(_)));
	}

	proptest! {
		#[test]
		fn proptest_garbage_tokens_never_panic(token in "[-_A-Za-z0-9=!]{0,96}") {
			let _ = decode_update_seq(&token);
		}

		#[test]
		fn proptest_truncated_tokens_never_panic(len in 0usize..CLUSTER_TOKEN.len()) {
			let _ = decode_update_seq(&CLUSTER_TOKEN[..len]);
		}
	}
}
