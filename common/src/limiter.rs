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

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Returned by [`ConcurrencyLimiter::acquire`] once the limiter has been aborted.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("concurrency limiter aborted")]
pub struct Aborted;

/// Counting admission gate shared by every outbound request of a scrape.
///
/// A limiter built with `0` permits never blocks. Calling [`ConcurrencyLimiter::abort`] makes
/// every pending and future `acquire` fail immediately, which lets a large fan-out unwind as soon
/// as one branch hits a fatal error.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
	inner: Arc<Inner>,
}

struct Inner {
	max_permits: usize,
	semaphore: Option<Arc<Semaphore>>,
	aborted: AtomicBool,
}

impl ConcurrencyLimiter {
	pub fn new(max_permits: usize) -> Self {
		let semaphore =
			if max_permits == 0 { None } else { Some(Arc::new(Semaphore::new(max_permits))) };
		Self { inner: Arc::new(Inner { max_permits, semaphore, aborted: AtomicBool::new(false) }) }
	}

	pub fn unlimited() -> Self {
		Self::new(0)
	}

	pub fn is_unlimited(&self) -> bool {
		self.inner.semaphore.is_none()
	}

	pub fn max_permits(&self) -> usize {
		self.inner.max_permits
	}

	/// Number of permits currently free. Always `usize::MAX` in unlimited mode.
	pub fn available_permits(&self) -> usize {
		match &self.inner.semaphore {
			Some(semaphore) => semaphore.available_permits(),
			None => usize::MAX,
		}
	}

	pub fn is_aborted(&self) -> bool {
		self.inner.aborted.load(Ordering::Acquire)
	}

	/// Waits for a permit. The permit goes back to the pool when the returned guard is
	/// dropped or explicitly released.
	pub async fn acquire(&self) -> Result<LimiterPermit, Aborted> {
		if self.is_aborted() {
			return Err(Aborted);
		}
		let Some(semaphore) = &self.inner.semaphore else {
			return Ok(LimiterPermit { permit: None });
		};
		let permit = semaphore.clone().acquire_owned().await.map_err(|_| Aborted)?;
		// A permit granted concurrently with `abort` is handed back right away.
		if self.is_aborted() {
			return Err(Aborted);
		}
		Ok(LimiterPermit { permit: Some(permit) })
	}

	/// Idempotent.
	pub fn abort(&self) {
		if self.inner.aborted.swap(true, Ordering::AcqRel) {
			return;
		}
		debug!(max_permits = self.inner.max_permits, "concurrency-limiter-aborted");
		if let Some(semaphore) = &self.inner.semaphore {
			semaphore.close();
		}
	}
}

impl Default for ConcurrencyLimiter {
	fn default() -> Self {
		Self::unlimited()
	}
}

/// Admission ticket handed out by [`ConcurrencyLimiter::acquire`].
#[must_use = "the permit is released as soon as it is dropped"]
pub struct LimiterPermit {
	permit: Option<OwnedSemaphorePermit>,
}

impl LimiterPermit {
	/// Returns the permit to the pool. No-op for unlimited limiters.
	pub fn release(self) {
		drop(self.permit);
	}
}
