use apex_storage::{
	db::Db,
	models::FeatureFlagRow,
	queries::{self, FlagList},
};

use crate::{BoxFuture, FailMode, FeatureFlag, Result};

#[derive(Debug, Clone, Copy)]
pub enum ListKind {
	Whitelist,
	Blacklist,
}

pub trait FlagStore
where
	Self: Send + Sync,
{
	fn create<'a>(&'a self, flag: &'a FeatureFlag) -> BoxFuture<'a, Result<()>>;
	fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<FeatureFlag>>>;
	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<FeatureFlag>>>;
	fn set_rollout_percentage<'a>(&'a self, name: &'a str, percentage: u8)
	-> BoxFuture<'a, Result<()>>;
	fn add_to_list<'a>(
		&'a self,
		name: &'a str,
		list: ListKind,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<()>>;
	fn remove_from_list<'a>(
		&'a self,
		name: &'a str,
		list: ListKind,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<()>>;
	fn delete<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;
}

pub struct PgFlagStore {
	db: Db,
}
impl PgFlagStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl FlagStore for PgFlagStore {
	fn create<'a>(&'a self, flag: &'a FeatureFlag) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::insert_flag(&self.db, &to_row(flag)).await?;

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<FeatureFlag>>> {
		Box::pin(async move { Ok(queries::fetch_flag(&self.db, name).await?.map(from_row)) })
	}

	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<FeatureFlag>>> {
		Box::pin(async move {
			Ok(queries::list_flags(&self.db).await?.into_iter().map(from_row).collect())
		})
	}

	fn set_rollout_percentage<'a>(
		&'a self,
		name: &'a str,
		percentage: u8,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::update_rollout_percentage(&self.db, name, percentage as _).await?;

			Ok(())
		})
	}

	fn add_to_list<'a>(
		&'a self,
		name: &'a str,
		list: ListKind,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::add_to_list(&self.db, name, flag_list(list), user_id).await?;

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
			queries::remove_from_list(&self.db, name, flag_list(list), user_id).await?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::delete_flag(&self.db, name).await?;

			Ok(())
		})
	}
}

fn flag_list(list: ListKind) -> FlagList {
	match list {
		ListKind::Whitelist => FlagList::Whitelist,
		ListKind::Blacklist => FlagList::Blacklist,
	}
}

fn to_row(flag: &FeatureFlag) -> FeatureFlagRow {
	FeatureFlagRow {
		name: flag.name.clone(),
		description: flag.description.clone(),
		default_enabled: flag.default_enabled,
		rollout_percentage: flag.rollout_percentage as _,
		whitelist: flag.whitelist.clone(),
		blacklist: flag.blacklist.clone(),
		fail_mode: flag.fail_mode.as_str().to_string(),
		created_at: flag.created_at,
		updated_at: flag.updated_at,
	}
}

fn from_row(row: FeatureFlagRow) -> FeatureFlag {
	FeatureFlag {
		name: row.name,
		description: row.description,
		default_enabled: row.default_enabled,
		rollout_percentage: row.rollout_percentage.clamp(0, 100) as _,
		whitelist: row.whitelist,
		blacklist: row.blacklist,
		fail_mode: FailMode::parse(&row.fail_mode),
		created_at: row.created_at,
		updated_at: row.updated_at,
	}
}
