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
use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use bwa_image::bwa::BwaAlgorithm;

// Single-dash long flag kept for compatibility with older command lines
const LEGACY_USE_INDEX_FILES: &str = "-useIndexFiles";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    // Run `bwa index`
    Bwa,
    // Build an SBWT index in-process
    Sbwt,
}

/// Creates the index image file for use by the aligner
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    // Input reference fasta file
    #[arg(short = 'I', long = "input", required = true, help_heading = "Input")]
    pub input: String,

    // Output image file, defaults to <input>.img
    #[arg(short = 'O', long = "output", required = false, help_heading = "Output")]
    pub output: Option<String>,

    // Build the image out of <input>.* index files if all are present
    #[arg(long = "useExistingIndexFilesIfAvailable", visible_alias = "useIndexFiles",
          action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true",
          help_heading = "Input")]
    pub use_existing_index_files: bool,

    // Index builder
    #[arg(long = "backend", value_enum, default_value_t = Backend::Bwa)]
    pub backend: Backend,

    // BWA
    // // Executable
    #[arg(long = "bwa", env = "BWA_PATH", default_value = "bwa", help_heading = "BWA")]
    pub bwa: PathBuf,
    // // BWT construction algorithm
    #[arg(long = "bwa-algorithm", value_enum, help_heading = "BWA")]
    pub bwa_algorithm: Option<BwaAlgorithm>,

    // SBWT
    // // k-mer size
    #[arg(short = 'k', long = "kmer-size", default_value_t = 31, help_heading = "SBWT")]
    pub kmer_size: usize,
    // // Threads
    #[arg(short = 't', long = "threads", default_value_t = 1, help_heading = "SBWT")]
    pub num_threads: usize,
    // // Memory in GB
    #[arg(short = 'm', long = "memory", default_value_t = 4, help_heading = "SBWT")]
    pub mem_gb: usize,

    // Resources
    // // Temporary directory
    #[arg(long = "tmp-dir", required = false)]
    pub temp_dir: Option<PathBuf>,

    // Verbosity
    #[arg(long = "verbose", default_value_t = false)]
    pub verbose: bool,
}

/// Rewrites `-useIndexFiles[=value]` to `--useIndexFiles[=value]`.
///
/// Arguments that are not valid UTF-8 are passed through for clap to
/// report.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
	.map(|arg| {
	    let legacy = matches!(arg.to_str().and_then(|x| x.strip_prefix(LEGACY_USE_INDEX_FILES)),
				  Some(rest) if rest.is_empty() || rest.starts_with('='));
	    if legacy {
		let mut long = OsString::from("-");
		long.push(&arg);
		long
	    } else {
		arg
	    }
	})
	.collect()
}

////////////////////////////////////////////////////////////////////////////////
// Tests
//
#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::Backend;
    use super::Cli;

    fn os_args(args: &[&str]) -> Vec<OsString> {
	args.iter().map(OsString::from).collect()
    }

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
	Cli::try_parse_from(super::normalize_args(os_args(args)))
    }

    #[test]
    fn normalize_legacy_flag() {
	let input = os_args(&["bwa-image", "-useIndexFiles", "-useIndexFiles=false", "-useIndexFilesX", "-I"]);
	let expected = os_args(&["bwa-image", "--useIndexFiles", "--useIndexFiles=false", "-useIndexFilesX", "-I"]);
	let got = super::normalize_args(input);
	assert_eq!(got, expected);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_input_path() {
	use std::os::unix::ffi::OsStringExt;

	let reference = OsString::from_vec(b"ref\xff.fasta".to_vec());
	let mut input = os_args(&["bwa-image", "-useIndexFiles", "-I"]);
	input.push(reference.clone());

	let got = super::normalize_args(input);
	assert_eq!(got[1], OsString::from("--useIndexFiles"));
	assert_eq!(got[3], reference);

	// clap rejects the non UTF-8 value instead of panicking
	assert!(Cli::try_parse_from(got).is_err());
    }

    #[test]
    fn input_is_required() {
	let got = parse(&["bwa-image", "--output", "out.img"]);
	assert!(got.is_err());
    }

    #[test]
    fn defaults() {
	let got = parse(&["bwa-image", "--input", "ref.fasta"]).unwrap();
	assert_eq!(got.input, "ref.fasta");
	assert_eq!(got.output, None);
	assert!(!got.use_existing_index_files);
	assert_eq!(got.backend, Backend::Bwa);
	assert_eq!(got.kmer_size, 31);
    }

    #[test]
    fn short_names() {
	let got = parse(&["bwa-image", "-I", "ref.fasta", "-O", "custom.img", "-useIndexFiles"]).unwrap();
	assert_eq!(got.input, "ref.fasta");
	assert_eq!(got.output, Some("custom.img".to_string()));
	assert!(got.use_existing_index_files);
    }

    #[test]
    fn use_existing_index_files_with_value() {
	let got = parse(&["bwa-image", "--useExistingIndexFilesIfAvailable", "false", "-I", "ref.fasta"]).unwrap();
	assert!(!got.use_existing_index_files);

	let got = parse(&["bwa-image", "--useExistingIndexFilesIfAvailable", "-I", "ref.fasta"]).unwrap();
	assert!(got.use_existing_index_files);
    }

    #[test]
    fn sbwt_backend() {
	let got = parse(&["bwa-image", "-I", "ref.fasta", "--backend", "sbwt", "-k", "21", "-t", "4"]).unwrap();
	assert_eq!(got.backend, Backend::Sbwt);
	assert_eq!(got.kmer_size, 21);
	assert_eq!(got.num_threads, 4);
    }
}
