//! Parsing for `buf.lock`, the YAML document inside a snapshot enumerating a
//! module's direct dependencies.
//!
//! ```yaml
//! version: v1
//! deps:
//!   - remote: <registry-host>
//!     owner:  <string>
//!     repository: <string>
//!     commit: <32-hex>
//!     digest: shake256:<128-hex>
//! ```
//!
//! Parsing is deliberately loose: an unrecognized `version:` header (e.g.
//! `v2`) does not prevent a best-effort parse of the `deps:` block — we never
//! validate the schema beyond "each entry has the five fields we care
//! about".

use anyhow::{Context, Error};
use serde::Deserialize;
use serde_yaml::Value;

pub const LOCK_FILE_NAME: &str = "buf.lock";
const DIGEST_PREFIX: &str = "shake256:";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockEntry {
    pub remote: String,
    pub owner: String,
    pub repository: String,
    /// 32-hex registry commit id.
    pub commit: String,
    /// `shake256:<hex>` — see [`LockEntry::digest_hex`].
    pub digest: String,
}

impl LockEntry {
    /// The manifest digest hex, with the `shake256:` prefix stripped.
    pub fn digest_hex(&self) -> &str {
        self.digest.strip_prefix(DIGEST_PREFIX).unwrap_or(&self.digest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockFile {
    pub deps: Vec<LockEntry>,
}

/// Parses the contents of a `buf.lock` file. `version:` headers other than
/// `v1` are tolerated and do not change parsing behavior; any entry under
/// `deps:` that is missing one of the five required fields is skipped
/// rather than failing the whole parse, since partner registries are free
/// to add fields we don't know about.
pub fn parse(contents: &str) -> Result<LockFile, Error> {
    let doc: Value = serde_yaml::from_str(contents).context("buf.lock is not valid YAML")?;

    let deps_value = match doc.get("deps") {
        Some(v) => v,
        None => return Ok(LockFile::default()),
    };

    let items = match deps_value.as_sequence() {
        Some(items) => items,
        None => return Ok(LockFile::default()),
    };

    let mut deps = Vec::with_capacity(items.len());
    for item in items {
        match LockEntry::deserialize(item.clone()) {
            Ok(entry) => deps.push(entry),
            Err(_) => continue,
        }
    }

    Ok(LockFile { deps })
}
