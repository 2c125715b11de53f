//! Image reference handling.
//!
//! - [`UriNormalizer`]: canonicalizes raw platform references
//! - [`SchemePolicy`]: injected rule for writing local paths back out
//! - [`ExistenceVerifier`]: advisory "does the file still exist" check

mod exists;
mod normalize;

pub use exists::ExistenceVerifier;
pub use normalize::{ImageReference, SchemePolicy, UriNormalizer, FILE_SCHEME};
