pub mod db;
pub mod models;
pub mod queries;
pub mod schema;

mod error;

pub use error::{Error, Result};
