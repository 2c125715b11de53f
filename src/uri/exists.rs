//! Advisory existence checks.
//!
//! A file the user picked can disappear between selection and upload. The
//! verifier answers "is it still there?" without ever failing: every error is
//! reported as `false`.

use std::sync::Arc;

use tracing::trace;

use crate::io::Filesystem;

use super::normalize::UriNormalizer;

/// Checks that a reference still points at a readable file.
#[derive(Clone)]
pub struct ExistenceVerifier {
    normalizer: UriNormalizer,
    fs: Arc<dyn Filesystem>,
}

impl ExistenceVerifier {
    pub fn new(normalizer: UriNormalizer, fs: Arc<dyn Filesystem>) -> Self {
        Self { normalizer, fs }
    }

    /// Returns `true` only if the reference normalizes to a local path that
    /// names a regular file.
    pub async fn exists<'a>(&self, raw: impl Into<Option<&'a str>>) -> bool {
        let Some(reference) = self.normalizer.normalize(raw) else {
            return false;
        };
        let Some(path) = reference.local_path() else {
            trace!(reference = %reference, "No local path for reference");
            return false;
        };

        match self.fs.metadata(&path).await {
            Ok(meta) => meta.is_file,
            Err(e) => {
                trace!(reference = %reference, error = %e, "Existence check failed");
                false
            }
        }
    }
}
