//! Manifest consistency protocol
//!
//! A manifest is a write-ahead record of the object names a transfer is
//! expected to produce, stored at a well-known name inside the transferred
//! namespace. Downstream verification reads it back and gates on membership:
//! a transfer (or a listing, for eventual consistency) only counts once every
//! manifested name shows up. The manifest is rewritten whole, never edited.

use std::collections::BTreeSet;

use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::traits::{BackendAdapter, Entry, PutOptions};
use crate::transfer::TransferOutcome;

/// Default relative object name of the manifest within a namespace
pub const MANIFEST_NAME: &str = ".data_manifest.csv";

/// The manifest's full object name under a resource prefix
pub fn object_name(resource_base: &str, file_name: &str) -> String {
    format!("{resource_base}{file_name}")
}

/// Persist the expected object names, one per line with a trailing newline,
/// at `resource_base`/`file_name` inside `container`.
pub async fn write(
    adapter: &dyn BackendAdapter,
    container: &str,
    resource_base: &str,
    names: &[String],
    file_name: &str,
) -> Result<()> {
    let mut contents = names.join("\n");
    contents.push('\n');
    adapter
        .put(
            container,
            &object_name(resource_base, file_name),
            contents.into_bytes(),
            PutOptions::default(),
        )
        .await
}

/// Read the manifest back as a set of names.
///
/// A missing manifest surfaces as the adapter's `NotFound` — deliberately
/// distinct from `ConditionNotMet`, so callers can tell "transfer
/// incomplete" from "manifest never existed".
pub async fn read(
    adapter: &dyn BackendAdapter,
    container: &str,
    resource_base: &str,
    file_name: &str,
) -> Result<BTreeSet<String>> {
    let name = object_name(resource_base, file_name);
    let raw = adapter.get(container, &name).await?;
    let text = String::from_utf8(raw)
        .map_err(|_| Error::Remote(format!("manifest {container}/{name} is not valid UTF-8")))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Condition for gated listings: every expected name appears in the listing
pub fn verify_listing(expected: Vec<String>) -> Condition<Vec<Entry>> {
    Condition::named("manifest-listing", move |entries: &Vec<Entry>| {
        let listed: BTreeSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        expected.iter().all(|name| listed.contains(name.as_str()))
    })
}

/// Condition for gated uploads: every expected name was transferred
pub fn verify_upload(expected: Vec<String>) -> Condition<TransferOutcome> {
    Condition::named("manifest-upload", move |outcome: &TransferOutcome| {
        let done: BTreeSet<&str> =
            outcome.completed.iter().map(|c| c.destination.as_str()).collect();
        expected.iter().all(|name| done.contains(name.as_str()))
    })
}

/// Condition for gated downloads: every expected object was fetched
pub fn verify_download(expected: Vec<String>) -> Condition<TransferOutcome> {
    Condition::named("manifest-download", move |outcome: &TransferOutcome| {
        let done: BTreeSet<&str> = outcome.completed.iter().map(|c| c.source.as_str()).collect();
        expected.iter().all(|name| done.contains(name.as_str()))
    })
}
