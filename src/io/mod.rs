mod filesystem;

pub use filesystem::{FileMetadata, Filesystem, LocalFilesystem};
