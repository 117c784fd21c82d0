pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Storage(#[from] apex_storage::Error),
	#[error("Validation error: {message}")]
	Validation { message: String },
	#[error("Flag store unavailable: {message}")]
	Unavailable { message: String },
}
