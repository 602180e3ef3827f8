//! SQLite connection setup for the index store
//!
//! # Example
//! ```no_run
//! use api_lookup::db::SqliteDatabase;
//!
//! let db = SqliteDatabase::open(".api-lookup/index.db")?;
//! db.connection().execute_batch("SELECT 1")?;
//! # Ok::<(), rusqlite::Error>(())
//! ```

pub mod sqlite;

pub use sqlite::SqliteDatabase;
