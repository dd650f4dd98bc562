//! Append-only, line-delimited JSON results files.
//!
//! Both the benchmark driver and the server metrics report through
//! [`append_json`]: every call adds exactly one JSON object on its own line and
//! never touches lines written by earlier runs.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::Result;

/// Serialize `record` as a single-line JSON object and append it, followed by
/// a newline, to the file at `path` (created if absent).
///
/// The record is marshalled before the file is opened, so a serialization
/// failure leaves the file untouched. The line is emitted with one
/// `write_all` on a file opened in append mode.
pub fn append_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, record: &T) -> Result<()> {
    let path = path.as_ref();

    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)?;

    debug!(path = %path.display(), bytes = line.len(), "appended results record");
    Ok(())
}
