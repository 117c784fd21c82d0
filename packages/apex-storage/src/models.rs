use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeatureFlagRow {
	pub name: String,
	pub description: String,
	pub default_enabled: bool,
	pub rollout_percentage: i32,
	pub whitelist: Vec<String>,
	pub blacklist: Vec<String>,
	pub fail_mode: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BanditArmRow {
	pub arm: String,
	pub dim: i32,
	pub a: Vec<f64>,
	pub a_inv: Vec<f64>,
	pub b: Vec<f64>,
	pub pull_count: i64,
	pub cumulative_reward: f64,
	pub updated_at: OffsetDateTime,
}
