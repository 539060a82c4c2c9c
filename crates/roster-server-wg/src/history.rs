// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Rolling window of interface traffic samples.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::types::StatsHistoryItem;

/// Default number of samples kept (100 minutes at the default interval).
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Thread-safe, fixed-capacity buffer of samples.
///
/// Pushing into a full buffer evicts the oldest sample. Readers always get
/// a copy, oldest first.
#[derive(Clone)]
pub struct StatsHistory {
	inner: Arc<HistoryInner>,
}

struct HistoryInner {
	items: RwLock<VecDeque<StatsHistoryItem>>,
	capacity: usize,
}

impl StatsHistory {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			inner: Arc::new(HistoryInner {
				items: RwLock::new(VecDeque::with_capacity(capacity)),
				capacity,
			}),
		}
	}

	pub fn push(&self, item: StatsHistoryItem) {
		let mut items = self.inner.items.write();
		while items.len() >= self.inner.capacity {
			items.pop_front();
		}
		items.push_back(item);
	}

	pub fn snapshot(&self) -> Vec<StatsHistoryItem> {
		self.inner.items.read().iter().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.inner.items.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}
}

/// Spawns the periodic sampler.
///
/// Every `period` (first tick one period after spawning) `sample` is awaited
/// for the interface (rx, tx) totals and the result appended to `history`.
/// Failed samples are logged and skipped. The task exits once `shutdown`
/// flips to `true` or its sender is dropped.
pub fn spawn_sampler<F, Fut, E>(
	history: StatsHistory,
	period: Duration,
	mut shutdown: watch::Receiver<bool>,
	mut sample: F,
) -> JoinHandle<()>
where
	F: FnMut() -> Fut + Send + 'static,
	Fut: Future<Output = Result<(u64, u64), E>> + Send + 'static,
	E: Display + Send + 'static,
{
	tokio::spawn(async move {
		if *shutdown.borrow_and_update() {
			debug!("stats sampler shut down before first tick");
			return;
		}
		let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				biased;

				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						debug!("stats sampler stopping");
						break;
					}
				}

				_ = ticker.tick() => {
					match sample().await {
						Ok((rx, tx)) => history.push(StatsHistoryItem::now(rx, tx)),
						Err(e) => warn!(error = %e, "failed to sample interface stats, skipping"),
					}
				}
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::sync::atomic::{AtomicU64, Ordering};

	fn item(n: u64) -> StatsHistoryItem {
		StatsHistoryItem {
			timestamp: n as i64,
			total_rx: n,
			total_tx: n * 2,
		}
	}

	#[test]
	fn evicts_oldest_at_capacity() {
		let history = StatsHistory::new(3);
		for n in 0..5 {
			history.push(item(n));
		}
		let totals: Vec<u64> = history.snapshot().iter().map(|i| i.total_rx).collect();
		assert_eq!(totals, vec![2, 3, 4]);
	}

	#[test]
	fn snapshot_is_a_copy() {
		let history = StatsHistory::new(10);
		history.push(item(1));
		let snapshot = history.snapshot();
		history.push(item(2));
		assert_eq!(snapshot.len(), 1);
		assert_eq!(history.len(), 2);
	}

	#[test]
	fn zero_capacity_keeps_latest_sample() {
		let history = StatsHistory::new(0);
		history.push(item(1));
		history.push(item(2));
		assert_eq!(history.capacity(), 1);
		assert_eq!(history.snapshot()[0].total_rx, 2);
	}

	proptest! {
		#[test]
		fn never_exceeds_capacity(capacity in 1usize..64, pushes in 0u64..256) {
			let history = StatsHistory::new(capacity);
			for n in 0..pushes {
				history.push(item(n));
			}
			let snapshot = history.snapshot();
			prop_assert_eq!(snapshot.len(), (pushes as usize).min(capacity));
			let expected: Vec<u64> = (pushes.saturating_sub(capacity as u64)..pushes).collect();
			let got: Vec<u64> = snapshot.iter().map(|i| i.total_rx).collect();
			prop_assert_eq!(got, expected);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn sampler_appends_on_each_tick_and_stops() {
		let history = StatsHistory::new(3);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let counter = Arc::new(AtomicU64::new(0));

		let c = counter.clone();
		let handle = spawn_sampler(history.clone(), Duration::from_secs(60), shutdown_rx, move || {
			let n = c.fetch_add(1, Ordering::SeqCst) + 1;
			async move { Ok::<_, String>((n, n)) }
		});

		tokio::time::sleep(Duration::from_secs(30)).await;
		assert!(history.is_empty());

		tokio::time::sleep(Duration::from_secs(5 * 60)).await;
		let totals: Vec<u64> = history.snapshot().iter().map(|i| i.total_rx).collect();
		assert_eq!(totals, vec![3, 4, 5]);

		shutdown_tx.send(true).unwrap();
		handle.await.unwrap();
		let sampled = counter.load(Ordering::SeqCst);
		tokio::time::sleep(Duration::from_secs(10 * 60)).await;
		assert_eq!(counter.load(Ordering::SeqCst), sampled);
	}

	#[tokio::test(start_paused = true)]
	async fn sampler_skips_failed_ticks() {
		let history = StatsHistory::new(10);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let counter = Arc::new(AtomicU64::new(0));

		let c = counter.clone();
		let handle = spawn_sampler(history.clone(), Duration::from_secs(60), shutdown_rx, move || {
			let n = c.fetch_add(1, Ordering::SeqCst) + 1;
			async move {
				if n % 2 == 0 {
					Err("device unreadable".to_string())
				} else {
					Ok((n, n))
				}
			}
		});

		tokio::time::sleep(Duration::from_secs(4 * 60 + 1)).await;
		let totals: Vec<u64> = history.snapshot().iter().map(|i| i.total_rx).collect();
		assert_eq!(totals, vec![1, 3]);

		drop(shutdown_tx);
		handle.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn sampler_exits_when_shutdown_already_signalled() {
		let history = StatsHistory::new(10);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		shutdown_tx.send(true).unwrap();
		let late_rx = shutdown_tx.subscribe();
		drop(shutdown_rx);
		let counter = Arc::new(AtomicU64::new(0));

		let c = counter.clone();
		let handle = spawn_sampler(history.clone(), Duration::from_secs(60), late_rx, move || {
			let n = c.fetch_add(1, Ordering::SeqCst) + 1;
			async move { Ok::<_, String>((n, n)) }
		});

		handle.await.unwrap();
		tokio::time::sleep(Duration::from_secs(10 * 60)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 0);
		assert!(history.is_empty());
		drop(shutdown_tx);
	}
}
