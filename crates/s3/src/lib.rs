//! obstor-s3: S3-compatible backend adapter for obstor
//!
//! Wraps `aws-sdk-s3` behind the `BackendAdapter` trait from `obstor-core`.
//! The adapter owns pagination and translates every SDK failure into the
//! obstor error taxonomy before it reaches the core.

pub mod client;

pub use client::{Account, S3Adapter};
