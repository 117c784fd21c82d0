pub fn render_schema() -> String {
	"\
CREATE TABLE IF NOT EXISTS feature_flags (
	name TEXT PRIMARY KEY,
	description TEXT NOT NULL DEFAULT '',
	default_enabled BOOLEAN NOT NULL DEFAULT FALSE,
	rollout_percentage INT NOT NULL DEFAULT 0,
	whitelist TEXT[] NOT NULL DEFAULT '{}',
	blacklist TEXT[] NOT NULL DEFAULT '{}',
	fail_mode TEXT NOT NULL DEFAULT 'closed',
	created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS bandit_arms (
	arm TEXT PRIMARY KEY,
	dim INT NOT NULL,
	a DOUBLE PRECISION[] NOT NULL,
	a_inv DOUBLE PRECISION[] NOT NULL,
	b DOUBLE PRECISION[] NOT NULL,
	pull_count BIGINT NOT NULL DEFAULT 0,
	cumulative_reward DOUBLE PRECISION NOT NULL DEFAULT 0,
	updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"
	.to_string()
}
