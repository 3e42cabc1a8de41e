//! obstor-core: one path abstraction over local and object storage
//!
//! This crate provides the core of obstor:
//! - Path dispatch and algebra across backend families
//! - Retry with backoff and condition-gated retry
//! - The bounded-concurrency transfer engine with partial-failure reporting
//! - The manifest consistency protocol
//! - The `BackendAdapter` contract every backend implements
//!
//! This crate is independent of any specific storage SDK: adapters live in
//! sibling crates (or downstream), and the in-memory adapter here covers
//! testing and embedding.

pub mod client;
pub mod condition;
pub mod config;
pub mod creds;
pub mod error;
pub mod manifest;
pub mod memory;
pub mod path;
pub mod retry;
pub mod traits;
pub mod transfer;
pub mod walk;

pub use client::{Client, ListOptions};
pub use condition::{Condition, ConditionNotMet, GateError, run_until};
pub use config::{ManifestConfig, RetryConfig, Settings, TransferConfig};
pub use creds::{CredentialCache, Credentials, with_auth_retry};
pub use error::{Error, Result};
pub use path::{Backend, Decomposed, ObjectPath, is_platform_id};
pub use retry::{DelayGrowth, RetryBuilder, double_delay, retry_with_backoff, retry_with_backoff_using};
pub use traits::{BackendAdapter, Entry, IdResolver, ObjectMeta, PutOptions};
pub use transfer::{
    Completed, DownloadOptions, Failed, TransferEngine, TransferItem, TransferOutcome,
    TransferRequest, UploadOptions,
};
pub use walk::{WalkedEntry, file_name_to_object_name, walk_files_and_dirs};
