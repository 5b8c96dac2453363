//! The SQLite backend for the order store.

pub(crate) mod db;
mod sqlite_impl;

pub use sqlite_impl::SqliteDatabase;
