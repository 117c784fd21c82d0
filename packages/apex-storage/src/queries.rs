use time::OffsetDateTime;

use crate::{
	Error, Result,
	db::Db,
	models::{BanditArmRow, FeatureFlagRow},
};

const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
	matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

pub async fn insert_flag(db: &Db, flag: &FeatureFlagRow) -> Result<()> {
	let result = sqlx::query(
		"\
INSERT INTO feature_flags (
	name,
	description,
	default_enabled,
	rollout_percentage,
	whitelist,
	blacklist,
	fail_mode,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
	)
	.bind(flag.name.as_str())
	.bind(flag.description.as_str())
	.bind(flag.default_enabled)
	.bind(flag.rollout_percentage)
	.bind(&flag.whitelist)
	.bind(&flag.blacklist)
	.bind(flag.fail_mode.as_str())
	.bind(flag.created_at)
	.bind(flag.updated_at)
	.execute(&db.pool)
	.await;

	match result {
		Ok(_) => Ok(()),
		Err(err) if is_unique_violation(&err) =>
			Err(Error::Conflict(format!("Flag {} already exists.", flag.name))),
		Err(err) => Err(err.into()),
	}
}

pub async fn fetch_flag(db: &Db, name: &str) -> Result<Option<FeatureFlagRow>> {
	let row = sqlx::query_as::<_, FeatureFlagRow>("SELECT * FROM feature_flags WHERE name = $1")
		.bind(name)
		.fetch_optional(&db.pool)
		.await?;

	Ok(row)
}

pub async fn list_flags(db: &Db) -> Result<Vec<FeatureFlagRow>> {
	let rows = sqlx::query_as::<_, FeatureFlagRow>("SELECT * FROM feature_flags ORDER BY name")
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

pub async fn update_rollout_percentage(db: &Db, name: &str, percentage: i32) -> Result<()> {
	let result = sqlx::query(
		"UPDATE feature_flags SET rollout_percentage = $1, updated_at = $2 WHERE name = $3",
	)
	.bind(percentage)
	.bind(OffsetDateTime::now_utc())
	.bind(name)
	.execute(&db.pool)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("Flag {name} does not exist.")));
	}

	Ok(())
}

pub async fn add_to_list(db: &Db, name: &str, list: FlagList, user_id: &str) -> Result<()> {
	let sql = match list {
		FlagList::Whitelist =>
			"\
UPDATE feature_flags
SET whitelist = array_append(whitelist, $1), updated_at = $2
WHERE name = $3 AND NOT ($1 = ANY(whitelist))",
		FlagList::Blacklist =>
			"\
UPDATE feature_flags
SET blacklist = array_append(blacklist, $1), updated_at = $2
WHERE name = $3 AND NOT ($1 = ANY(blacklist))",
	};
	let result = sqlx::query(sql)
		.bind(user_id)
		.bind(OffsetDateTime::now_utc())
		.bind(name)
		.execute(&db.pool)
		.await?;

	if result.rows_affected() == 0 && fetch_flag(db, name).await?.is_none() {
		return Err(Error::NotFound(format!("Flag {name} does not exist.")));
	}

	Ok(())
}

pub async fn remove_from_list(db: &Db, name: &str, list: FlagList, user_id: &str) -> Result<()> {
	let sql = match list {
		FlagList::Whitelist =>
			"\
UPDATE feature_flags
SET whitelist = array_remove(whitelist, $1), updated_at = $2
WHERE name = $3",
		FlagList::Blacklist =>
			"\
UPDATE feature_flags
SET blacklist = array_remove(blacklist, $1), updated_at = $2
WHERE name = $3",
	};
	let result = sqlx::query(sql)
		.bind(user_id)
		.bind(OffsetDateTime::now_utc())
		.bind(name)
		.execute(&db.pool)
		.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("Flag {name} does not exist.")));
	}

	Ok(())
}

pub async fn delete_flag(db: &Db, name: &str) -> Result<()> {
	let result =
		sqlx::query("DELETE FROM feature_flags WHERE name = $1").bind(name).execute(&db.pool).await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("Flag {name} does not exist.")));
	}

	Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum FlagList {
	Whitelist,
	Blacklist,
}

pub async fn fetch_all_arms(db: &Db) -> Result<Vec<BanditArmRow>> {
	let rows = sqlx::query_as::<_, BanditArmRow>("SELECT * FROM bandit_arms ORDER BY arm")
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

pub async fn upsert_arm(db: &Db, row: &BanditArmRow) -> Result<()> {
	if row.dim <= 0 {
		return Err(Error::InvalidArgument(format!(
			"Arm {} dimension must be greater than zero.",
			row.arm
		)));
	}

	sqlx::query(
		"\
INSERT INTO bandit_arms (
	arm,
	dim,
	a,
	a_inv,
	b,
	pull_count,
	cumulative_reward,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (arm) DO UPDATE
SET
	dim = EXCLUDED.dim,
	a = EXCLUDED.a,
	a_inv = EXCLUDED.a_inv,
	b = EXCLUDED.b,
	pull_count = EXCLUDED.pull_count,
	cumulative_reward = EXCLUDED.cumulative_reward,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(row.arm.as_str())
	.bind(row.dim)
	.bind(&row.a)
	.bind(&row.a_inv)
	.bind(&row.b)
	.bind(row.pull_count)
	.bind(row.cumulative_reward)
	.bind(row.updated_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}
