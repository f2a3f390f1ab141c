//! Object storage data plane
//!
//! A light wrapper around the `object_store` crate that exposes the handful
//! of object operations a bucket migration needs: recursive listing, head,
//! get, put, and a cross-store copy. One [`Storage`] handle addresses exactly
//! one bucket's key space.
//!
//! # Example
//!
//! ```rust,no_run
//! use rebucket_object_store::{ObjectStoreConfig, Storage};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), rebucket_object_store::StoreError> {
//! let source = Storage::new(ObjectStoreConfig::Local {
//!     path: PathBuf::from("/srv/buckets/my.logs"),
//! })
//! .await?;
//! let target = Storage::new(ObjectStoreConfig::Local {
//!     path: PathBuf::from("/srv/buckets/my-logs"),
//! })
//! .await?;
//!
//! for entry in source.list().await? {
//!     source.copy_to(&entry.key, &target).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod storage;

pub use error::{Result, StoreError};
pub use storage::{ObjectEntry, ObjectStoreConfig, Storage};
