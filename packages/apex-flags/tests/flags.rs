use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
};

use apex_flags::{
	BoxFuture, Error, Evaluation, FailMode, FeatureFlag, FeatureFlagManager, FlagStore, ListKind,
	Reason, Result,
};

#[derive(Default)]
struct MemoryStore {
	flags: Mutex<HashMap<String, FeatureFlag>>,
	fail_reads: AtomicBool,
	fetch_count: AtomicU64,
}
impl MemoryStore {
	fn unavailable<T>() -> Result<T> {
		Err(Error::Unavailable { message: "store offline".to_string() })
	}
}
impl FlagStore for MemoryStore {
	fn create<'a>(&'a self, flag: &'a FeatureFlag) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.flags.lock().unwrap().insert(flag.name.clone(), flag.clone());

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<FeatureFlag>>> {
		Box::pin(async move {
			self.fetch_count.fetch_add(1, Ordering::Relaxed);

			if self.fail_reads.load(Ordering::Relaxed) {
				return Self::unavailable();
			}

			Ok(self.flags.lock().unwrap().get(name).cloned())
		})
	}

	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<FeatureFlag>>> {
		Box::pin(async move { Ok(self.flags.lock().unwrap().values().cloned().collect()) })
	}

	fn set_rollout_percentage<'a>(
		&'a self,
		name: &'a str,
		percentage: u8,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.flags
				.lock()
				.unwrap()
				.get_mut(name)
				.map(|flag| flag.rollout_percentage = percentage)
				.ok_or_else(|| Error::Validation { message: format!("no flag {name}") })
		})
	}

	fn add_to_list<'a>(
		&'a self,
		name: &'a str,
		list: ListKind,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut flags = self.flags.lock().unwrap();
			let flag = flags
				.get_mut(name)
				.ok_or_else(|| Error::Validation { message: format!("no flag {name}") })?;
			let target = match list {
				ListKind::Whitelist => &mut flag.whitelist,
				ListKind::Blacklist => &mut flag.blacklist,
			};

			if !target.iter().any(|u| u == user_id) {
				target.push(user_id.to_string());
			}

			Ok(())
		})
	}

	fn remove_from_list<'a>(
		&'a self,
		name: &'a str,
		list: ListKind,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut flags = self.flags.lock().unwrap();
			let flag = flags
				.get_mut(name)
				.ok_or_else(|| Error::Validation { message: format!("no flag {name}") })?;

			match list {
				ListKind::Whitelist => flag.whitelist.retain(|u| u != user_id),
				ListKind::Blacklist => flag.blacklist.retain(|u| u != user_id),
			}

			Ok(())
		})
	}

	fn delete<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.flags.lock().unwrap().remove(name);

			Ok(())
		})
	}
}

fn manager(snapshot_ttl_seconds: u64) -> (FeatureFlagManager, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let cfg = apex_config::Flags { snapshot_ttl_seconds, refresh_timeout_ms: 200 };

	(FeatureFlagManager::new(store.clone(), &cfg), store)
}

#[tokio::test]
async fn zero_rollout_enables_whitelisted_users_only() {
	let (manager, _) = manager(30);

	manager
		.create_flag(FeatureFlag::new("new_ranker", "ranker v2", 0, FailMode::Closed))
		.await
		.unwrap();
	manager.add_to_whitelist("new_ranker", "admin-1").await.unwrap();

	assert_eq!(
		manager.is_enabled("new_ranker", "admin-1").await,
		Evaluation { enabled: true, reason: Reason::Whitelist }
	);
	assert_eq!(
		manager.is_enabled("new_ranker", "user-7").await,
		Evaluation { enabled: false, reason: Reason::BucketRollout }
	);
}

#[tokio::test]
async fn unknown_flag_evaluates_disabled_without_erroring() {
	let (manager, _) = manager(30);

	assert_eq!(
		manager.is_enabled("never_created", "user-1").await,
		Evaluation { enabled: false, reason: Reason::UnknownFlag }
	);
}

#[tokio::test]
async fn snapshot_absorbs_repeat_reads_within_the_ttl() {
	let (manager, store) = manager(30);

	manager.create_flag(FeatureFlag::new("new_ranker", "", 100, FailMode::Closed)).await.unwrap();

	for _ in 0..10 {
		assert!(manager.is_enabled("new_ranker", "user-1").await.enabled);
	}

	assert_eq!(store.fetch_count.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn admin_writes_invalidate_the_snapshot() {
	let (manager, _) = manager(30);

	manager.create_flag(FeatureFlag::new("new_ranker", "", 0, FailMode::Closed)).await.unwrap();

	assert!(!manager.is_enabled("new_ranker", "user-1").await.enabled);

	manager.set_rollout_percentage("new_ranker", 100).await.unwrap();

	assert!(manager.is_enabled("new_ranker", "user-1").await.enabled);
}

#[tokio::test]
async fn fail_open_serves_the_last_known_snapshot() {
	let (manager, store) = manager(0);

	manager.create_flag(FeatureFlag::new("new_ranker", "", 100, FailMode::Open)).await.unwrap();

	assert!(manager.is_enabled("new_ranker", "user-1").await.enabled);

	store.fail_reads.store(true, Ordering::Relaxed);

	assert_eq!(
		manager.is_enabled("new_ranker", "user-1").await,
		Evaluation { enabled: true, reason: Reason::BucketRollout }
	);
}

#[tokio::test]
async fn fail_closed_disables_while_the_store_is_down() {
	let (manager, store) = manager(0);

	manager.create_flag(FeatureFlag::new("new_ranker", "", 100, FailMode::Closed)).await.unwrap();

	assert!(manager.is_enabled("new_ranker", "user-1").await.enabled);

	store.fail_reads.store(true, Ordering::Relaxed);

	assert_eq!(
		manager.is_enabled("new_ranker", "user-1").await,
		Evaluation { enabled: false, reason: Reason::StoreUnavailable }
	);
}

#[tokio::test]
async fn store_failure_with_no_snapshot_reads_as_unavailable() {
	let (manager, store) = manager(30);

	store.fail_reads.store(true, Ordering::Relaxed);

	assert_eq!(
		manager.is_enabled("new_ranker", "user-1").await,
		Evaluation { enabled: false, reason: Reason::StoreUnavailable }
	);
}

#[tokio::test]
async fn rollout_percentage_is_validated() {
	let (manager, _) = manager(30);

	manager.create_flag(FeatureFlag::new("new_ranker", "", 10, FailMode::Closed)).await.unwrap();

	assert!(matches!(
		manager.set_rollout_percentage("new_ranker", 101).await,
		Err(Error::Validation { .. })
	));
	assert!(matches!(
		manager.create_flag(FeatureFlag::new("other", "", 200, FailMode::Closed)).await,
		Err(Error::Validation { .. })
	));
	assert!(matches!(
		manager.create_flag(FeatureFlag::new("", "", 10, FailMode::Closed)).await,
		Err(Error::Validation { .. })
	));
}

#[tokio::test]
async fn blacklist_removal_restores_bucket_evaluation() {
	let (manager, _) = manager(0);

	manager.create_flag(FeatureFlag::new("new_ranker", "", 100, FailMode::Closed)).await.unwrap();
	manager.add_to_blacklist("new_ranker", "user-1").await.unwrap();

	assert_eq!(
		manager.is_enabled("new_ranker", "user-1").await,
		Evaluation { enabled: false, reason: Reason::Blacklist }
	);

	manager.remove_from_blacklist("new_ranker", "user-1").await.unwrap();

	assert!(manager.is_enabled("new_ranker", "user-1").await.enabled);
}

#[tokio::test]
async fn stats_count_rollout_stages() {
	let (manager, _) = manager(30);

	manager.create_flag(FeatureFlag::new("a", "", 0, FailMode::Closed)).await.unwrap();
	manager.create_flag(FeatureFlag::new("b", "", 50, FailMode::Closed)).await.unwrap();
	manager.create_flag(FeatureFlag::new("c", "", 100, FailMode::Closed)).await.unwrap();

	let stats = manager.stats().await.unwrap();

	assert_eq!(stats.total, 3);
	assert_eq!(stats.rolling_out, 1);
	assert_eq!(stats.fully_rolled_out, 1);
}
