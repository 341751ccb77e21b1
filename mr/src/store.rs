//! Append-only output artifact shared by all reducers.
//!
//! Each reducer contributes one section:
//!
//! ```text
//! Reducer r1:
//! 0
//! 2
//! 5
//! ```
//!
//! Sections land in completion order and are never rewritten.

use fs4::fs_std::FileExt;
use futures::lock::Mutex;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

const HEADER_PREFIX: &str = "Reducer ";
const HEADER_SUFFIX: &str = ":";

/// One reducer's block in the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub reducer: String,
    pub values: Vec<i32>,
}

/// Handle on the output artifact. Appends through one handle queue on an
/// in-process lock; every append also holds an exclusive advisory lock on the
/// file from open to close, so handles in other processes never interleave.
pub struct OutputStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutputStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        OutputStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, reducer: &str, values: &[i32]) -> Result<()> {
        let section = render_section(reducer, values);

        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_locked(&path, section.as_bytes()))
            .await
            .map_err(|e| self.write_error(std::io::Error::other(e)))?
            .map_err(|e| self.write_error(e))?;

        debug!(
            "appended {} values for reducer {} to {}",
            values.len(),
            reducer,
            self.path.display()
        );
        Ok(())
    }

    /// Re-reads the artifact. A missing file holds no sections yet.
    pub async fn read_sections(&self) -> Result<Vec<Section>> {
        read_sections(&self.path).await
    }

    fn write_error(&self, source: std::io::Error) -> Error {
        Error::StorageWrite {
            path: self.path.clone(),
            source,
        }
    }
}

impl std::fmt::Debug for OutputStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStore").field("path", &self.path).finish()
    }
}

fn append_locked(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.lock_exclusive()?;
    // the lock is released when the file is closed
    file.write_all(bytes)?;
    file.flush()
}

fn render_section(reducer: &str, values: &[i32]) -> String {
    let header_len = HEADER_PREFIX.len() + reducer.len() + HEADER_SUFFIX.len() + 1;
    let mut out = String::with_capacity(header_len + values.len() * 8);
    let _ = writeln!(out, "{HEADER_PREFIX}{reducer}{HEADER_SUFFIX}");
    for v in values {
        let _ = writeln!(out, "{v}");
    }
    out
}

pub async fn read_sections(path: impl AsRef<Path>) -> Result<Vec<Section>> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => parse_sections(&contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
        Err(source) => Err(Error::StorageRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Splits artifact text back into sections.
pub fn parse_sections(contents: &str) -> Result<Vec<Section>> {
    let mut sections: Vec<Section> = vec![];
    for (i, line) in contents.lines().enumerate() {
        let header = line
            .strip_prefix(HEADER_PREFIX)
            .and_then(|rest| rest.strip_suffix(HEADER_SUFFIX));
        if let Some(reducer) = header {
            sections.push(Section {
                reducer: reducer.to_string(),
                values: vec![],
            });
            continue;
        }

        let malformed = || Error::OutputParse {
            line: i + 1,
            content: line.to_string(),
        };
        let value = line.trim().parse::<i32>().map_err(|_| malformed())?;
        sections.last_mut().ok_or_else(malformed)?.values.push(value);
    }
    Ok(sections)
}
