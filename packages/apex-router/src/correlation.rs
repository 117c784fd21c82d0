//! Short-lived map from query id to what the router chose for it, so feedback
//! arriving later can be attributed to the right arms and context. Entries are
//! inserted in time order, which makes both sweeps front-first.

use std::{
	collections::{HashMap, VecDeque},
	sync::Mutex,
	time::{Duration, Instant},
};

use uuid::Uuid;

pub(crate) struct CorrelationEntry {
	pub(crate) embedding: Vec<f32>,
	pub(crate) arms: Vec<String>,
	created_at: Instant,
}

struct Inner {
	entries: HashMap<Uuid, CorrelationEntry>,
	order: VecDeque<Uuid>,
}

pub(crate) struct CorrelationTable {
	ttl: Duration,
	max_entries: usize,
	inner: Mutex<Inner>,
}

impl CorrelationTable {
	pub(crate) fn new(ttl: Duration, max_entries: usize) -> Self {
		Self {
			ttl,
			max_entries: max_entries.max(1),
			inner: Mutex::new(Inner { entries: HashMap::new(), order: VecDeque::new() }),
		}
	}

	pub(crate) fn insert(&self, query_id: Uuid, embedding: Vec<f32>, arms: Vec<String>) {
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		while inner.entries.len() >= self.max_entries {
			let Some(oldest) = inner.order.pop_front() else {
				break;
			};

			inner.entries.remove(&oldest);
		}

		inner
			.entries
			.insert(query_id, CorrelationEntry { embedding, arms, created_at: Instant::now() });
		inner.order.push_back(query_id);
	}

	/// Removes and returns the entry. Expired entries count as absent.
	pub(crate) fn take(&self, query_id: &Uuid) -> Option<CorrelationEntry> {
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let entry = inner.entries.remove(query_id)?;

		if entry.created_at.elapsed() >= self.ttl {
			return None;
		}

		Some(entry)
	}

	pub(crate) fn sweep(&self) -> usize {
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let mut removed = 0;

		while let Some(oldest) = inner.order.front().copied() {
			match inner.entries.get(&oldest) {
				// Already taken by feedback; drop the stale order slot.
				None => {
					inner.order.pop_front();
				},
				Some(entry) if entry.created_at.elapsed() >= self.ttl => {
					inner.entries.remove(&oldest);
					inner.order.pop_front();

					removed += 1;
				},
				Some(_) => break,
			}
		}

		removed
	}

	pub(crate) fn len(&self) -> usize {
		self.inner.lock().unwrap_or_else(|err| err.into_inner()).entries.len()
	}
}
