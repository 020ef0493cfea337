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

use prometheus::{proto::MetricFamily, Encoder, Opts, TextEncoder};
pub use prometheus::{Gauge, GaugeVec as PrometheusGaugeVec, IntCounter, Registry};

pub const NAMESPACE: &str = "couchdb";

#[derive(Clone)]
pub struct GaugeVec<const N: usize> {
	underlying: PrometheusGaugeVec,
}

impl<const N: usize> GaugeVec<N> {
	pub fn with_label_values(&self, label_values: [&str; N]) -> Gauge {
		self.underlying.with_label_values(&label_values)
	}

	pub fn set(&self, label_values: [&str; N], value: f64) {
		self.with_label_values(label_values).set(value);
	}
}

/// Registers a counter in the process-wide registry.
pub fn new_counter(name: &str, description: &str, namespace: &str) -> IntCounter {
	let counter_opts = Opts::new(name, description).namespace(namespace);
	let counter = IntCounter::with_opts(counter_opts).expect("Failed to create counter");
	prometheus::register(Box::new(counter.clone())).expect("Failed to register counter");
	counter
}

pub fn gauge(
	registry: &Registry,
	name: &str,
	help: &str,
	subsystem: &str,
) -> prometheus::Result<Gauge> {
	let gauge_opts = Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem);
	let gauge = Gauge::with_opts(gauge_opts)?;
	registry.register(Box::new(gauge.clone()))?;
	Ok(gauge)
}

pub fn gauge_vec<const N: usize>(
	registry: &Registry,
	name: &str,
	help: &str,
	subsystem: &str,
	label_names: [&str; N],
) -> prometheus::Result<GaugeVec<N>> {
	let gauge_opts = Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem);
	let underlying = PrometheusGaugeVec::new(gauge_opts, &label_names)?;
	registry.register(Box::new(underlying.clone()))?;
	Ok(GaugeVec { underlying })
}

/// Encodes metric families in the prometheus text exposition format.
pub fn encode_text(metric_families: &[MetricFamily]) -> anyhow::Result<String> {
	let mut buffer = Vec::new();
	TextEncoder::new().encode(metric_families, &mut buffer)?;
	Ok(String::from_utf8(buffer)?)
}
