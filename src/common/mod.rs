//! Common types and utilities shared across extentdb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants
//! - Error types
//! - Identifiers (PageId, FrameId) and row locations (RowId)

pub mod config;
pub mod error;
mod frame_id;
mod page_id;
mod row_id;

pub use error::{Error, Result};
pub use frame_id::FrameId;
pub use page_id::PageId;
pub use row_id::RowId;
