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

//! BWA index images.
//!
//! Index construction is delegated to the `bwa index` command. The five
//! files it writes are packed into a single image with
//! [pack_index_files](crate::image::pack_index_files).
//!
use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use log::debug;
use log::info;

use crate::builder::check_reference;
use crate::builder::BuildError;
use crate::builder::IndexBuilder;
use crate::image::pack_index_files;

/// Suffixes of the files `bwa index` writes next to a reference.
pub const BWA_INDEX_FILE_EXTENSIONS: [&str; 5] = [".amb", ".ann", ".bwt", ".pac", ".sa"];

/// BWT construction algorithm passed to `bwa index -a`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BwaAlgorithm {
    /// Induced sorting, for references up to 2GB.
    Is,
    /// Ropebwt2 based construction.
    Rb2,
    /// BWT-SW, for large references.
    Bwtsw,
}

impl BwaAlgorithm {
    fn as_str(&self) -> &'static str {
	match self {
	    BwaAlgorithm::Is => "is",
	    BwaAlgorithm::Rb2 => "rb2",
	    BwaAlgorithm::Bwtsw => "bwtsw",
	}
    }
}

/// Options for running `bwa index`.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BwaOpts {
    /// Name or path of the bwa executable.
    pub executable: PathBuf,
    /// Algorithm for `bwa index -a`, bwa picks one if unset.
    pub algorithm: Option<BwaAlgorithm>,
    /// Directory for the intermediate index files.
    pub temp_dir: Option<PathBuf>,
}

impl Default for BwaOpts {
    /// Default to these values:
    /// ```rust
    /// let mut opts = bwa_image::bwa::BwaOpts::default();
    /// opts.executable = std::path::PathBuf::from("bwa");
    /// opts.algorithm = None;
    /// opts.temp_dir = None;
    /// # let expected = bwa_image::bwa::BwaOpts::default();
    /// # assert_eq!(opts, expected);
    /// ```
    ///
    fn default() -> BwaOpts {
	BwaOpts {
	    executable: PathBuf::from("bwa"),
	    algorithm: None,
	    temp_dir: None,
	}
    }
}

/// Builds BWA index images with the `bwa` executable.
#[derive(Clone, Debug, Default)]
pub struct BwaImageBuilder {
    opts: BwaOpts,
}

impl BwaImageBuilder {
    /// Creates a builder that runs bwa as configured in `opts`.
    pub fn new(opts: BwaOpts) -> BwaImageBuilder {
	BwaImageBuilder { opts }
    }

    /// Returns the `bwa index` command writing the index of `reference`
    /// to files starting with `prefix`.
    pub fn index_command(
	&self,
	executable: &Path,
	prefix: &Path,
	reference: &str,
    ) -> Command {
	let mut cmd = Command::new(executable);
	cmd.arg("index");
	if let Some(algorithm) = self.opts.algorithm {
	    cmd.arg("-a").arg(algorithm.as_str());
	}
	cmd.arg("-p").arg(prefix).arg(reference);
	cmd
    }

    fn find_executable(&self) -> Result<PathBuf, BuildError> {
	which::which(&self.opts.executable).map_err(|source| BuildError::ExecutableNotFound {
	    name: self.opts.executable.display().to_string(),
	    source,
	})
    }
}

fn command_line(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
	.chain(cmd.get_args())
	.map(OsStr::to_string_lossy)
	.collect::<Vec<_>>()
	.join(" ")
}

impl IndexBuilder for BwaImageBuilder {
    fn index_file_extensions(&self) -> &'static [&'static str] {
	&BWA_INDEX_FILE_EXTENSIONS
    }

    /// Runs `bwa index` on `reference` in a temporary directory and packs
    /// the resulting files into the image at `output`.
    ///
    /// The temporary directory is removed whether or not bwa succeeds.
    fn build_image_from_fasta(
	&self,
	reference: &str,
	output: &str,
    ) -> Result<(), BuildError> {
	check_reference(reference)?;
	let executable = self.find_executable()?;

	let temp_dir = self.opts.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
	let work_dir = tempfile::Builder::new().prefix("bwa-image-").tempdir_in(&temp_dir)?;
	let name = Path::new(reference).file_name().unwrap_or(OsStr::new("reference"));
	let prefix = work_dir.path().join(name);

	let mut cmd = self.index_command(&executable, &prefix, reference);
	let command = command_line(&cmd);
	info!("Building BWA index of {}...", reference);
	debug!("Running `{}`", command);

	let result = cmd.output()?;
	let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
	if !result.status.success() {
	    return Err(BuildError::ToolFailed { command, status: result.status, stderr });
	}
	debug!("{}", stderr);

	let prefix = prefix.to_str().ok_or_else(|| {
	    BuildError::Io(std::io::Error::other(format!("temporary path {} is not UTF-8", prefix.display())))
	})?;
	info!("Packing BWA index into {}...", output);
	pack_index_files(prefix, &BWA_INDEX_FILE_EXTENSIONS, output)?;

	work_dir.close()?;
	Ok(())
    }

    fn build_image_from_index_files(
	&self,
	prefix: &str,
	output: &str,
    ) -> Result<(), BuildError> {
	info!("Packing BWA index files {}.* into {}...", prefix, output);
	pack_index_files(prefix, &BWA_INDEX_FILE_EXTENSIONS, output)
    }
}
