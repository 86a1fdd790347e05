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

//! bwa-image creates the index image file that an aligner loads at
//! startup. An image is a single file holding every part of a prebuilt
//! alignment index for a reference genome.
//!
//! The image is built in one of two ways:
//!
//! - From the reference fasta file, running the full index construction.
//! - From a set of index files that were built earlier and live next to
//! the reference (`ref.fasta.amb`, `ref.fasta.bwt`, ...). This skips the
//! expensive construction step and only repacks the files.
//!
//! Index construction itself is delegated to an
//! [IndexBuilder](builder::IndexBuilder). Two are provided:
//! [bwa::BwaImageBuilder] runs `bwa index`, and
//! [index::SbwtImageBuilder] builds a [Spectral Burrows-Wheeler
//! Transform](https://docs.rs/sbwt/latest/sbwt/) index in-process.
//!
//! # Usage
//!
//! Build the image `ref.fasta.img` from the reference:
//! ```text
//! bwa-image --input ref.fasta
//! ```
//!
//! Reuse the index files from an earlier `bwa index ref.fasta` run if all
//! of them are present:
//! ```text
//! bwa-image -I ref.fasta -O ref.img --useExistingIndexFilesIfAvailable
//! ```
//! If some are missing, a warning is logged and the image is built from
//! the reference instead.
//!

#![warn(missing_docs,
        missing_debug_implementations, missing_copy_implementations,
        trivial_casts, trivial_numeric_casts,
        unsafe_code,
        unstable_features,
        unused_import_braces, unused_qualifications)]

use std::path::Path;

use log::info;
use log::warn;

pub mod builder;
pub mod bwa;
pub mod image;
pub mod index;

use builder::BuildError;
use builder::IndexBuilder;

/// Suffix appended to the reference path when no output path is given.
pub const IMAGE_EXTENSION: &str = ".img";

/// Inputs for [create_image].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageOpts {
    /// Path to the reference fasta file. Also the prefix of its index files.
    pub reference: String,
    /// Path to the output image, see [ImageOpts::output_path].
    pub output: Option<String>,
    /// Build the image from existing index files if a complete set is
    /// present.
    pub use_existing_index_files: bool,
}

impl ImageOpts {
    /// Options for building the image of `reference` at the default
    /// output path, ignoring existing index files.
    pub fn new(reference: &str) -> ImageOpts {
	ImageOpts {
	    reference: reference.to_string(),
	    output: None,
	    use_existing_index_files: false,
	}
    }

    /// Returns the output path, or [default_output_path] if none was set.
    pub fn output_path(&self) -> String {
	self.output.clone().unwrap_or_else(|| default_output_path(&self.reference))
    }
}

/// Why an image is built from the reference fasta file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// Existing index files were not requested.
    NotRequested {
	/// A complete set of index files was present anyway.
	complete_set_found: bool,
    },
    /// Existing index files were requested but these were missing.
    IncompleteIndex {
	/// The paths that do not exist.
	missing: Vec<String>,
    },
}

/// How an image is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildPath {
    /// Repacking existing index files.
    FromIndexFiles,
    /// Running index construction on the reference.
    FromFasta(FallbackReason),
}

/// Returns `reference` with [IMAGE_EXTENSION] appended.
///
/// # Examples
/// ```rust
/// assert_eq!(bwa_image::default_output_path("ref.fasta"), "ref.fasta.img");
/// ```
///
pub fn default_output_path(reference: &str) -> String {
    format!("{}{}", reference, IMAGE_EXTENSION)
}

/// Returns the index files for `prefix` that do not exist.
///
/// Checks `prefix` + each suffix in `extensions`. The set is complete if
/// the result is empty.
pub fn missing_index_files(
    prefix: &str,
    extensions: &[&str],
) -> Vec<String> {
    builder::index_file_paths(prefix, extensions)
	.into_iter()
	.filter(|path| !Path::new(path).exists())
	.collect()
}

/// Decides how the image for `opts` is built.
///
/// Index files are only used if `opts.use_existing_index_files` is set and
/// all files with a suffix in `extensions` exist next to the reference.
pub fn choose_build_path(
    opts: &ImageOpts,
    extensions: &[&str],
) -> BuildPath {
    let missing = missing_index_files(&opts.reference, extensions);
    if !opts.use_existing_index_files {
	BuildPath::FromFasta(FallbackReason::NotRequested { complete_set_found: missing.is_empty() })
    } else if missing.is_empty() {
	BuildPath::FromIndexFiles
    } else {
	BuildPath::FromFasta(FallbackReason::IncompleteIndex { missing })
    }
}

fn warn_fallback(
    reference: &str,
    reason: &FallbackReason,
) {
    match reason {
	FallbackReason::NotRequested { complete_set_found: true } => {
	    warn!("A complete set of index files ({}.*) exists but will not be used because --useExistingIndexFilesIfAvailable is not set; creating the image from the reference file", reference);
	},
	FallbackReason::NotRequested { complete_set_found: false } => {
	    warn!("--useExistingIndexFilesIfAvailable is not set; existing index files ({}.*), if any, will not be used and the image is created from the reference file", reference);
	},
	FallbackReason::IncompleteIndex { missing } => {
	    warn!("User requested to use existing index files, however no complete set of index files ({}.*) was found (missing {}); creating the image from the reference file directly", reference, missing.join(", "));
	},
    }
}

/// Creates the index image described by `opts` with `builder`.
///
/// Picks the build path with [choose_build_path], logs a warning if the
/// image is built from the reference fasta, and calls the corresponding
/// [IndexBuilder] operation with the reference path and
/// [output path](ImageOpts::output_path).
///
/// Returns the build path that was taken. Errors from `builder` are
/// returned as is.
///
/// # Examples
/// ```rust,no_run
/// use bwa_image::bwa::BwaImageBuilder;
/// use bwa_image::{create_image, BuildPath, ImageOpts};
///
/// let mut opts = ImageOpts::new("ref.fasta");
/// opts.use_existing_index_files = true;
///
/// let path = create_image(&BwaImageBuilder::default(), &opts).unwrap();
/// if path == BuildPath::FromIndexFiles {
///     println!("reused ref.fasta.* index files");
/// }
/// ```
///
pub fn create_image<B: IndexBuilder + ?Sized>(
    builder: &B,
    opts: &ImageOpts,
) -> Result<BuildPath, BuildError> {
    let output = opts.output_path();
    let build_path = choose_build_path(opts, builder.index_file_extensions());

    match &build_path {
	BuildPath::FromIndexFiles => {
	    info!("Creating index image {} from index files {}.*", output, opts.reference);
	    builder.build_image_from_index_files(&opts.reference, &output)?;
	},
	BuildPath::FromFasta(reason) => {
	    warn_fallback(&opts.reference, reason);
	    info!("Creating index image {} from {}", output, opts.reference);
	    builder.build_image_from_fasta(&opts.reference, &output)?;
	},
    }

    Ok(build_path)
}
