use std::collections::BTreeMap;

use apex_bandit::{ArmSnapshot, BanditSnapshot};
use apex_storage::{db::Db, models::BanditArmRow, queries};
use time::OffsetDateTime;

use crate::{ArmStore, BoxFuture, Result};

pub struct PgArmStore {
	db: Db,
}
impl PgArmStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl ArmStore for PgArmStore {
	fn load<'a>(&'a self) -> BoxFuture<'a, Result<BanditSnapshot>> {
		Box::pin(async move {
			let rows = queries::fetch_all_arms(&self.db).await?;
			let mut dim = 0;
			let mut arms = BTreeMap::new();

			for row in rows {
				dim = dim.max(row.dim.max(0) as usize);
				arms.insert(
					row.arm,
					ArmSnapshot {
						a: row.a,
						a_inv: row.a_inv,
						b: row.b,
						pull_count: row.pull_count.max(0) as u64,
						cumulative_reward: row.cumulative_reward,
					},
				);
			}

			Ok(BanditSnapshot { dim, arms })
		})
	}

	fn persist<'a>(
		&'a self,
		dim: usize,
		arms: &'a BTreeMap<String, ArmSnapshot>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			for (name, arm) in arms {
				let row = BanditArmRow {
					arm: name.clone(),
					dim: dim as i32,
					a: arm.a.clone(),
					a_inv: arm.a_inv.clone(),
					b: arm.b.clone(),
					pull_count: arm.pull_count as i64,
					cumulative_reward: arm.cumulative_reward,
					updated_at: now,
				};

				queries::upsert_arm(&self.db, &row).await?;
			}

			Ok(())
		})
	}
}
