//! Canonical image references.
//!
//! Capture components hand out references in whatever shape the platform
//! produces: `file:///var/.../photo.jpg`, bare paths, paths carrying a cache
//! busting query string or a fragment. The cache needs one comparable string
//! per image, so every reference is normalized before a key is derived.
//!
//! # Rules
//!
//! 1. A missing or empty reference normalizes to `None`.
//! 2. One leading `file://` prefix is stripped. The built-in policies also
//!    drop any nested `file://` left behind.
//! 3. The string is cut at the first `?`, then at the first `#`.
//! 4. An empty remainder normalizes to `None`.
//! 5. The [`SchemePolicy`] decides how the local path is written back out.
//!
//! Normalization is pure and idempotent for the built-in policies. Paths the
//! cache produces itself go through [`UriNormalizer::reference_for_path`],
//! which applies the policy but never cuts at `?` or `#`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scheme prefix used for local files.
pub const FILE_SCHEME: &str = "file://";

// =============================================================================
// Image Reference
// =============================================================================

/// A normalized reference to image bytes.
///
/// Only [`UriNormalizer`] produces these, so two equal references always
/// name the same image for caching purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageReference(Arc<str>);

impl ImageReference {
    fn new(value: String) -> Self {
        Self(value.into())
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the reference to a local filesystem path.
    ///
    /// Returns `None` for references using a non-file scheme
    /// (`content://`, `ph://`, `https://`, ...).
    pub fn local_path(&self) -> Option<PathBuf> {
        let path = self.0.strip_prefix(FILE_SCHEME).unwrap_or(&self.0);
        if path.is_empty() || has_foreign_scheme(path) {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImageReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns true if `value` starts with a URI scheme such as `content://`.
fn has_foreign_scheme(value: &str) -> bool {
    match value.split_once("://") {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Remove every leading `file://`, so nested prefixes collapse to one path.
fn strip_file_schemes(mut path: &str) -> &str {
    while let Some(rest) = path.strip_prefix(FILE_SCHEME) {
        path = rest;
    }
    path
}

// =============================================================================
// Scheme Policy
// =============================================================================

/// Decides how a stripped local path is written back out.
///
/// Some platforms want local files addressed as `file://` URIs, others want
/// bare paths. The policy is chosen once at startup and injected into the
/// normalizer instead of branching on the platform inside it.
#[derive(Clone)]
pub struct SchemePolicy(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl SchemePolicy {
    /// Reinstate `file://` on plain paths.
    pub fn file_scheme() -> Self {
        Self::custom(|path| {
            let path = strip_file_schemes(path);
            if has_foreign_scheme(path) {
                path.to_string()
            } else {
                format!("{FILE_SCHEME}{path}")
            }
        })
    }

    /// Keep plain paths without a scheme.
    pub fn bare() -> Self {
        Self::custom(|path| strip_file_schemes(path).to_string())
    }

    /// Use a custom mapping.
    ///
    /// The closure receives the reference with one `file://` prefix, query and
    /// fragment removed. It must be idempotent when composed with stripping a
    /// single `file://` prefix, or normalization stops being idempotent.
    pub fn custom(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn apply(&self, path: &str) -> String {
        (self.0)(path)
    }
}

impl Default for SchemePolicy {
    fn default() -> Self {
        Self::file_scheme()
    }
}

impl fmt::Debug for SchemePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemePolicy(..)")
    }
}

// =============================================================================
// Normalizer
// =============================================================================

/// Turns raw platform references into [`ImageReference`]s.
#[derive(Debug, Clone, Default)]
pub struct UriNormalizer {
    policy: SchemePolicy,
}

impl UriNormalizer {
    /// Create a normalizer with the given scheme policy.
    pub fn new(policy: SchemePolicy) -> Self {
        Self { policy }
    }

    /// Normalizer that writes local files as `file://` URIs.
    pub fn with_file_scheme() -> Self {
        Self::new(SchemePolicy::file_scheme())
    }

    /// Normalizer that writes local files as bare paths.
    pub fn bare_paths() -> Self {
        Self::new(SchemePolicy::bare())
    }

    /// Normalize a raw reference.
    ///
    /// Accepts either `&str` or `Option<&str>`; `None` and empty input return
    /// `None` rather than an error.
    pub fn normalize<'a>(&self, raw: impl Into<Option<&'a str>>) -> Option<ImageReference> {
        let raw = raw.into()?;
        let stripped = strip_noise(raw);
        if stripped.is_empty() {
            return None;
        }
        Some(ImageReference::new(self.policy.apply(stripped)))
    }

    /// Reference for a path on the local filesystem, such as a cache entry.
    ///
    /// The path is taken literally: `?` and `#` are legal in file names.
    pub fn reference_for_path(&self, path: &Path) -> ImageReference {
        ImageReference::new(self.policy.apply(&path.to_string_lossy()))
    }
}

/// Remove one `file://` prefix, then the query, then the fragment.
fn strip_noise(raw: &str) -> &str {
    let path = raw.strip_prefix(FILE_SCHEME).unwrap_or(raw);
    let path = path.split('?').next().unwrap_or(path);
    path.split('#').next().unwrap_or(path)
}
