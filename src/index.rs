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

//! SBWT index images.
//!
//! Builds a [Spectral Burrows-Wheeler
//! Transform](https://docs.rs/sbwt/latest/sbwt/) index and its longest
//! common suffix array. Prebuilt indexes are stored in two files,
//! `<prefix>.sbwt` and `<prefix>.lcs`.
//!
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use log::info;
use needletail::Sequence;
use sbwt::BitPackedKmerSorting;
use sbwt::SbwtIndexBuilder;
use sbwt::SbwtIndexVariant;

use crate::builder::check_reference;
use crate::builder::index_file_paths;
use crate::builder::BuildError;
use crate::builder::IndexBuilder;
use crate::image::ImageWriter;

// Variant header written in front of the serialized index
const SUBSET_MATRIX_NAME: &[u8; 12] = b"SubsetMatrix";

/// Suffixes of the SBWT index and LCS array files.
pub const SBWT_INDEX_FILE_EXTENSIONS: [&str; 2] = [".sbwt", ".lcs"];

/// Parameters for SBWT construction
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SbwtOpts {
    /// _k_-mer size.
    pub k: usize,
    /// Also index the reverse complement of each sequence.
    pub add_revcomp: bool,
    /// Number of threads used by the builder.
    pub num_threads: usize,
    /// Memory budget in gigabytes.
    pub mem_gb: usize,
    /// Length of the precalculated _k_-mer prefixes.
    pub prefix_precalc: usize,
    /// Directory for temporary files, defaults to $TMPDIR on Unix.
    pub temp_dir: Option<PathBuf>,
}

impl Default for SbwtOpts {
    /// Default to these values:
    /// ```rust
    /// let mut opts = bwa_image::index::SbwtOpts::default();
    /// opts.k = 31;
    /// opts.add_revcomp = false;
    /// opts.num_threads = 1;
    /// opts.mem_gb = 4;
    /// opts.prefix_precalc = 8;
    /// opts.temp_dir = None;
    /// # let expected = bwa_image::index::SbwtOpts::default();
    /// # assert_eq!(opts, expected);
    /// ```
    ///
    fn default() -> SbwtOpts {
	SbwtOpts {
	    k: 31,
	    add_revcomp: false,
	    num_threads: 1,
	    mem_gb: 4,
	    prefix_precalc: 8,
	    temp_dir: None,
	}
    }
}

struct FastxStreamer {
    inner: Box<dyn needletail::parser::FastxReader>,
    record: Vec<u8>,
    error: Arc<Mutex<Option<String>>>,
}

impl sbwt::SeqStream for FastxStreamer {
    fn stream_next(&mut self) -> Option<&[u8]> {
	let rec = self.inner.next();
	match rec {
	    Some(Ok(seqrec)) => {
		// Remove newlines and non IUPAC characters
		let normalized = seqrec.normalize(true);
		self.record = normalized.as_ref().to_vec();
		Some(&self.record)
	    },
	    Some(Err(e)) => {
		if let Ok(mut slot) = self.error.lock() {
		    *slot = Some(e.to_string());
		}
		None
	    },
	    None => None,
	}
    }
}

/// Builds an SBWT index and its LCS array from a fasta or fastq file.
///
/// Streams all valid DNA sequences from `infile` to the SBWT API
/// calls to build the SBWT index and LCS array. Use the [SbwtOpts]
/// argument `opts` to control the options and resources passed to the
/// index builder.
///
/// Returns a tuple containing the SBWT index and the LCS array.
///
/// Requires write access to some temporary directory. Path can be set
/// using temp_dir in SbwtOpts; defaults to $TMPDIR on Unix if not set.
///
/// Returns [BuildError::MalformedReference] if `infile` stops parsing
/// partway through.
///
pub fn build_sbwt_from_file(
    infile: &str,
    opts: &SbwtOpts,
) -> Result<(sbwt::SbwtIndex<sbwt::SubsetMatrix>, sbwt::LcsArray), BuildError> {
    check_reference(infile)?;

    let temp_dir = opts.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
    let algorithm = BitPackedKmerSorting::new()
	.mem_gb(opts.mem_gb)
	.dedup_batches(false)
	.temp_dir(temp_dir.as_path());

    let error = Arc::new(Mutex::new(None));
    let inner = needletail::parse_fastx_file(infile).map_err(|e| BuildError::MalformedReference { path: infile.to_string(), reason: e.to_string() })?;
    let reader = FastxStreamer { inner, record: Vec::new(), error: Arc::clone(&error) };

    let (sbwt, lcs) = SbwtIndexBuilder::new()
	.k(opts.k)
	.n_threads(opts.num_threads)
	.add_rev_comp(opts.add_revcomp)
	.algorithm(algorithm)
	.build_lcs(true)
	.precalc_length(opts.prefix_precalc)
	.run(reader);

    if let Some(reason) = error.lock().ok().and_then(|mut slot| slot.take()) {
	return Err(BuildError::MalformedReference { path: infile.to_string(), reason });
    }
    let lcs = lcs.ok_or_else(|| BuildError::Index("LCS array was not built".to_string()))?;
    Ok((sbwt, lcs))
}

/// Serializes an SBWT index variant and an LCS array to bytes.
fn serialize_to_vecs(
    sbwt: &SbwtIndexVariant,
    lcs: &sbwt::LcsArray,
) -> Result<(Vec<u8>, Vec<u8>), BuildError> {
    let mut sbwt_bytes: Vec<u8> = Vec::new();
    sbwt::write_sbwt_index_variant(sbwt, &mut sbwt_bytes).map_err(|e| BuildError::Index(e.to_string()))?;

    let mut lcs_bytes: Vec<u8> = Vec::new();
    lcs.serialize(&mut lcs_bytes).map_err(|e| BuildError::Index(e.to_string()))?;

    Ok((sbwt_bytes, lcs_bytes))
}

/// Writes an SBWT index to `outfile_prefix`.sbwt and its LCS array to
/// `outfile_prefix`.lcs.
///
/// The files can be packed into an image with
/// [SbwtImageBuilder::build_image_from_index_files].
pub fn serialize_index_files(
    outfile_prefix: &str,
    sbwt: &SbwtIndexVariant,
    lcs: &sbwt::LcsArray,
) -> Result<(), BuildError> {
    let (sbwt_bytes, lcs_bytes) = serialize_to_vecs(sbwt, lcs)?;
    let paths = index_file_paths(outfile_prefix, &SBWT_INDEX_FILE_EXTENSIONS);
    std::fs::write(&paths[0], sbwt_bytes)?;
    std::fs::write(&paths[1], lcs_bytes)?;
    Ok(())
}

/// Reads an SBWT index written by [sbwt::write_sbwt_index_variant].
///
/// The variant header (a u64 length and the type name) is checked here
/// before handing the rest of the stream to the sbwt loader.
fn read_sbwt_variant<R: Read>(
    reader: &mut R,
    path: &str,
) -> Result<SbwtIndexVariant, BuildError> {
    let invalid = |reason: String| BuildError::Index(format!("{}: {}", path, reason));

    let mut name_len = [0_u8; 8];
    reader.read_exact(&mut name_len).map_err(|e| invalid(format!("can't read index type: {}", e)))?;
    let name_len = u64::from_le_bytes(name_len);
    if name_len != SUBSET_MATRIX_NAME.len() as u64 {
	return Err(invalid(format!("unexpected index type name length {}", name_len)));
    }

    let mut name = [0_u8; 12];
    reader.read_exact(&mut name).map_err(|e| invalid(format!("can't read index type: {}", e)))?;
    if &name != SUBSET_MATRIX_NAME {
	return Err(invalid(format!("unsupported index type {}", String::from_utf8_lossy(&name))));
    }

    let sbwt = sbwt::SbwtIndex::<sbwt::SubsetMatrix>::load(reader).map_err(|e| invalid(e.to_string()))?;
    Ok(SbwtIndexVariant::SubsetMatrix(sbwt))
}

/// Loads a prebuilt SBWT index and its LCS array from disk.
///
/// Reads the SBWT index stored at `index_prefix` + ".sbwt" and the
/// LCS array at `index_prefix` + ".lcs".
///
/// Returns a tuple containing the SBWT index variant and the LCS
/// array.
///
/// Returns [BuildError::IndexFileMissing] if either file does not exist,
/// or [BuildError::Index] if it can't be decoded.
pub fn load_sbwt(
    index_prefix: &str,
) -> Result<(SbwtIndexVariant, sbwt::LcsArray), BuildError> {
    let paths = index_file_paths(index_prefix, &SBWT_INDEX_FILE_EXTENSIONS);
    if let Some(missing) = paths.iter().find(|path| !Path::new(path).is_file()) {
	return Err(BuildError::IndexFileMissing { path: missing.clone() });
    }

    // Load sbwt
    let sbwt_conn = std::fs::File::open(&paths[0])?;
    let mut index_reader = std::io::BufReader::new(sbwt_conn);
    let sbwt = read_sbwt_variant(&mut index_reader, &paths[0])?;

    // Load the lcs array
    let lcs_conn = std::fs::File::open(&paths[1])?;
    let mut lcs_reader = std::io::BufReader::new(lcs_conn);
    let lcs = sbwt::LcsArray::load(&mut lcs_reader).map_err(|e| BuildError::Index(format!("{}: {}", paths[1], e)))?;

    Ok((sbwt, lcs))
}

fn write_image(
    output: &str,
    sbwt: &SbwtIndexVariant,
    lcs: &sbwt::LcsArray,
) -> Result<(), BuildError> {
    let (sbwt_bytes, lcs_bytes) = serialize_to_vecs(sbwt, lcs)?;
    let mut image = ImageWriter::create(output, SBWT_INDEX_FILE_EXTENSIONS.len())?;
    image.add_bytes(SBWT_INDEX_FILE_EXTENSIONS[0], &sbwt_bytes)?;
    image.add_bytes(SBWT_INDEX_FILE_EXTENSIONS[1], &lcs_bytes)?;
    image.finish()
}

/// Builds SBWT index images with the [sbwt] crate.
#[derive(Clone, Debug, Default)]
pub struct SbwtImageBuilder {
    opts: SbwtOpts,
}

impl SbwtImageBuilder {
    /// Creates a builder using the construction parameters in `opts`.
    pub fn new(opts: SbwtOpts) -> SbwtImageBuilder {
	SbwtImageBuilder { opts }
    }
}

impl IndexBuilder for SbwtImageBuilder {
    fn index_file_extensions(&self) -> &'static [&'static str] {
	&SBWT_INDEX_FILE_EXTENSIONS
    }

    fn build_image_from_fasta(
	&self,
	reference: &str,
	output: &str,
    ) -> Result<(), BuildError> {
	info!("Building SBWT index of {} with k={}...", reference, self.opts.k);
	let (sbwt, lcs) = build_sbwt_from_file(reference, &self.opts)?;

	info!("Serializing SBWT index to {}...", output);
	write_image(output, &SbwtIndexVariant::SubsetMatrix(sbwt), &lcs)
    }

    fn build_image_from_index_files(
	&self,
	prefix: &str,
	output: &str,
    ) -> Result<(), BuildError> {
	info!("Loading SBWT index {}.sbwt...", prefix);
	let (sbwt, lcs) = load_sbwt(prefix)?;

	info!("Serializing SBWT index to {}...", output);
	write_image(output, &sbwt, &lcs)
    }
}
