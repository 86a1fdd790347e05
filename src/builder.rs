// bwa-image: Create single-file alignment index images
//
// Copyright 2024 The bwa-image contributors.

// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.

// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! The index builder capability and its error type.
//!
//! An [IndexBuilder] hides the native index construction library behind
//! two operations: build an image from a reference fasta file, or build an
//! image from a set of index files that the library wrote earlier. The
//! files making up such a set are identified by the fixed suffixes
//! returned by [IndexBuilder::index_file_extensions].
//!
use thiserror::Error;

/// Errors raised while building an index image.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The reference file does not exist or can't be opened.
    #[error("Couldn't read reference file {path}")]
    ReferenceNotReadable {
        /// Path to the reference.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The reference file exists but does not contain fasta or fastq records.
    #[error("Reference file {path} is not a valid fasta or fastq file: {reason}")]
    MalformedReference {
        /// Path to the reference.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// A file from the index file set is not present.
    #[error("Index file {path} does not exist")]
    IndexFileMissing {
        /// Path to the missing file.
        path: String,
    },

    /// The index construction executable could not be located.
    #[error("Couldn't find the `{name}` executable")]
    ExecutableNotFound {
        /// Name or path that was looked up.
        name: String,
        /// Lookup error.
        source: which::Error,
    },

    /// The index construction executable exited unsuccessfully.
    #[error("`{command}` failed with {status}: {stderr}")]
    ToolFailed {
        /// Command line that was run.
        command: String,
        /// Exit status of the process.
        status: std::process::ExitStatus,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The index construction library reported an error.
    #[error("Index construction failed: {0}")]
    Index(String),

    /// An index image could not be decoded.
    #[error("Malformed index image {path}: {reason}")]
    MalformedImage {
        /// Path to the image.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The output image could not be created or moved into place.
    #[error("Couldn't write index image {path}")]
    OutputNotWritable {
        /// Path to the output image.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Any other IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Native index construction behind the two entry points used by
/// [create_image](crate::create_image).
///
/// Implementations own the image format; callers only ever pass paths.
pub trait IndexBuilder {
    /// Suffixes of the files that make up a complete index next to a
    /// reference, in the order the builder writes them.
    fn index_file_extensions(&self) -> &'static [&'static str];

    /// Builds an index from the fasta file at `reference` and writes its
    /// image to `output`.
    fn build_image_from_fasta(&self, reference: &str, output: &str) -> Result<(), BuildError>;

    /// Writes the image of the index stored in the files `prefix` +
    /// [suffix](IndexBuilder::index_file_extensions) to `output`.
    fn build_image_from_index_files(&self, prefix: &str, output: &str) -> Result<(), BuildError>;
}

/// Returns the paths of the index files for `prefix`, one per suffix in
/// `extensions`.
///
/// Paths are formed by plain string concatenation, so `ref.fasta` with
/// `.bwt` gives `ref.fasta.bwt`.
///
/// # Examples
/// ```rust
/// use bwa_image::builder::index_file_paths;
///
/// let paths = index_file_paths("ref.fasta", &[".amb", ".sa"]);
/// assert_eq!(paths, vec!["ref.fasta.amb".to_string(), "ref.fasta.sa".to_string()]);
/// ```
///
pub fn index_file_paths(
    prefix: &str,
    extensions: &[&str],
) -> Vec<String> {
    extensions.iter().map(|ext| format!("{}{}", prefix, ext)).collect()
}

/// Checks that `path` is a readable fasta or fastq file.
///
/// Opens the file once and parses its first record with
/// [needletail](https://docs.rs/needletail). Gzip-compressed input is
/// accepted.
///
/// Returns [BuildError::ReferenceNotReadable] if the file can't be opened
/// and [BuildError::MalformedReference] if it contains no valid records.
pub fn check_reference(path: &str) -> Result<(), BuildError> {
    let not_readable = |source: std::io::Error| BuildError::ReferenceNotReadable { path: path.to_string(), source };

    let metadata = std::fs::metadata(path).map_err(not_readable)?;
    if !metadata.is_file() {
	return Err(not_readable(std::io::Error::other("not a regular file")));
    }
    let file = std::fs::File::open(path).map_err(not_readable)?;

    let malformed = |reason: String| BuildError::MalformedReference { path: path.to_string(), reason };
    let mut reader = needletail::parse_fastx_reader(file).map_err(|e| malformed(e.to_string()))?;
    match reader.next() {
	Some(Ok(_)) => Ok(()),
	Some(Err(e)) => Err(malformed(e.to_string())),
	None => Err(malformed("no sequence records".to_string())),
    }
}
