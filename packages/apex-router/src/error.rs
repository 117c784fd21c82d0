use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Every dispatched backend failed or timed out for query {query_id}.")]
	AllBackendsFailed { query_id: Uuid },
	#[error("Backend error: {message}")]
	Backend { message: String },
	#[error("Startup error: {message}")]
	Startup { message: String },
	#[error(transparent)]
	Storage(#[from] apex_storage::Error),
	#[error(transparent)]
	Flags(#[from] apex_flags::Error),
}
