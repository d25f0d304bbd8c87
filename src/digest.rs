//! Content and manifest digesting.
//!
//! The wire protocol's `Digest` type carries the raw bytes of a SHAKE-256
//! digest (64 bytes / 512 bits); the hex-encoded form is used inside lock
//! files and wherever a digest needs to round-trip through text.

use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;

/// Number of output bytes taken from the SHAKE-256 extendable output
/// function. This matches the CLI's own module-registry digest size.
pub const SHAKE256_LEN: usize = 64;

/// Raw SHAKE-256 digest bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shake256Digest(pub [u8; SHAKE256_LEN]);

impl Shake256Digest {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Shake256::default();
        hasher.update(data);
        let mut reader = hasher.finalize_xof();
        let mut out = [0u8; SHAKE256_LEN];
        reader.read(&mut out);
        Self(out)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Shake256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Shake256Digest").field(&self.to_hex()).finish()
    }
}

/// One entry in a [`crate::module_view::Snapshot`]'s file list, paired with
/// its content digest, in the shape the canonical manifest line needs.
pub struct ManifestEntry<'a> {
    pub name: &'a str,
    pub content_digest_hex: &'a str,
}

/// Builds the canonical manifest text: one line per file, in listing order,
/// `shake256:<hex>  <name>\n`. Two spaces between digest and name; every
/// line (including the last) ends with a newline; no trailing blank line.
pub fn canonical_manifest_text<'a>(entries: impl IntoIterator<Item = ManifestEntry<'a>>) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str("shake256:");
        out.push_str(entry.content_digest_hex);
        out.push_str("  ");
        out.push_str(entry.name);
        out.push('\n');
    }
    out
}

/// Digests raw file content, returning the hex form stored in the content
/// digest cache and used in manifest lines.
pub fn content_digest_hex(content: &[u8]) -> String {
    Shake256Digest::of(content).to_hex()
}

/// Digests the canonical manifest text itself.
pub fn manifest_digest(canonical_text: &str) -> Shake256Digest {
    Shake256Digest::of(canonical_text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_text_is_sensitive_to_order_name_and_content() {
        let a = canonical_manifest_text([
            ManifestEntry { name: "a.proto", content_digest_hex: "aa" },
            ManifestEntry { name: "b.proto", content_digest_hex: "bb" },
        ]);
        let swapped = canonical_manifest_text([
            ManifestEntry { name: "b.proto", content_digest_hex: "bb" },
            ManifestEntry { name: "a.proto", content_digest_hex: "aa" },
        ]);
        assert_ne!(a, swapped);
        assert_ne!(manifest_digest(&a).to_hex(), manifest_digest(&swapped).to_hex());

        let renamed = canonical_manifest_text([
            ManifestEntry { name: "a2.proto", content_digest_hex: "aa" },
            ManifestEntry { name: "b.proto", content_digest_hex: "bb" },
        ]);
        assert_ne!(a, renamed);
    }

    #[test]
    fn manifest_line_format() {
        let text = canonical_manifest_text([ManifestEntry {
            name: "basic/basic.proto",
            content_digest_hex: "deadbeef",
        }]);
        assert_eq!(text, "shake256:deadbeef  basic/basic.proto\n");
    }

    #[test]
    fn digest_is_deterministic() {
        let d1 = Shake256Digest::of(b"hello world");
        let d2 = Shake256Digest::of(b"hello world");
        assert_eq!(d1.to_hex(), d2.to_hex());
        assert_eq!(d1.to_hex().len(), SHAKE256_LEN * 2);
    }
}
