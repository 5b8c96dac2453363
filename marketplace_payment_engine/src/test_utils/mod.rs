pub mod fixtures;
#[cfg(feature = "sqlite")]
mod prepare_env;

#[cfg(feature = "sqlite")]
pub use prepare_env::{prepare_test_db, random_db_url};
