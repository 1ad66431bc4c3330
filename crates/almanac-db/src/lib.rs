//! `PostgreSQL` cold archive for the Almanac journal.
//!
//! The authoritative journal lives in the engine's sink. This crate mirrors
//! it into `PostgreSQL` for history queries and analytics, and can hand the
//! whole archive back in the persisted layout for disaster recovery.
//!
//! # Architecture
//!
//! ```text
//! Turn completes
//!     |
//!     +-- Journal sink (authoritative, synchronous)
//!     |
//!     +-- Archive flush (async, best effort) --> PostgreSQL (JournalArchive)
//!         |-- branches          (fork tree)
//!         +-- journal_entries   (append-only entries)
//! ```
//!
//! # Modules
//!
//! - [`archive`] -- Connecting, batch archiving and archive queries
//! - [`error`] -- Shared error types

pub mod archive;
pub mod error;

pub use archive::{BranchRow, JournalArchive, JournalEntryRow};
pub use error::DbError;
