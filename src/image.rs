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

//! Single-file container for the parts of an index.
//!
//! An image starts with the 8 byte magic [IMAGE_MAGIC] and the number of
//! sections. Each section is a name (the suffix of the index file it came
//! from) followed by its data. Lengths are little-endian u64 values.
//!
//! Images are written to a temporary file next to the output and renamed
//! into place by [ImageWriter::finish], so a failed build does not leave a
//! partial image at the output path.
//!
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use log::debug;
use tempfile::NamedTempFile;

use crate::builder::BuildError;

/// Leading bytes of every image.
pub const IMAGE_MAGIC: &[u8; 8] = b"IDXIMAGE";

// Section names are index file suffixes.
const MAX_NAME_LEN: u64 = 4096;

/// Writes an image section by section.
#[derive(Debug)]
pub struct ImageWriter {
    out: BufWriter<NamedTempFile>,
    output: PathBuf,
    n_sections: u64,
    written: u64,
}

impl ImageWriter {
    /// Starts an image that will be moved to `output` when finished.
    ///
    /// `n_sections` is the number of sections that will be added.
    pub fn create(
	output: &str,
	n_sections: usize,
    ) -> Result<ImageWriter, BuildError> {
	let output_path = PathBuf::from(output);
	let dir = match output_path.parent() {
	    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
	    _ => PathBuf::from("."),
	};

	let tmp = tempfile::Builder::new()
	    .prefix(".bwa-image-")
	    .suffix(".tmp")
	    .tempfile_in(&dir)
	    .map_err(|source| BuildError::OutputNotWritable { path: output.to_string(), source })?;

	let mut out = BufWriter::new(tmp);
	out.write_all(IMAGE_MAGIC)?;
	out.write_all(&(n_sections as u64).to_le_bytes())?;

	Ok(ImageWriter {
	    out,
	    output: output_path,
	    n_sections: n_sections as u64,
	    written: 0,
	})
    }

    fn write_header(
	&mut self,
	name: &str,
	len: u64,
    ) -> Result<(), BuildError> {
	self.out.write_all(&(name.len() as u64).to_le_bytes())?;
	self.out.write_all(name.as_bytes())?;
	self.out.write_all(&len.to_le_bytes())?;
	self.written += 1;
	Ok(())
    }

    /// Adds a section holding `data`.
    pub fn add_bytes(
	&mut self,
	name: &str,
	data: &[u8],
    ) -> Result<(), BuildError> {
	self.write_header(name, data.len() as u64)?;
	self.out.write_all(data)?;
	Ok(())
    }

    /// Adds a section holding the contents of the file at `path`.
    ///
    /// Returns [BuildError::IndexFileMissing] if `path` does not exist.
    pub fn add_file(
	&mut self,
	name: &str,
	path: &str,
    ) -> Result<(), BuildError> {
	let file = File::open(path).map_err(|e| match e.kind() {
	    std::io::ErrorKind::NotFound => BuildError::IndexFileMissing { path: path.to_string() },
	    _ => BuildError::Io(e),
	})?;
	let len = file.metadata()?.len();
	debug!("Packing {} ({} bytes) as section {}", path, len, name);

	self.write_header(name, len)?;
	let copied = std::io::copy(&mut file.take(len), &mut self.out)?;
	if copied != len {
	    return Err(BuildError::Io(std::io::Error::new(
		std::io::ErrorKind::UnexpectedEof,
		format!("{} shrank while it was being read", path),
	    )));
	}
	Ok(())
    }

    /// Flushes the image and moves it to the output path.
    pub fn finish(self) -> Result<(), BuildError> {
	let output = self.output.display().to_string();
	if self.written != self.n_sections {
	    return Err(BuildError::MalformedImage {
		path: output,
		reason: format!("expected {} sections, wrote {}", self.n_sections, self.written),
	    });
	}

	let tmp = self.out.into_inner().map_err(|e| e.into_error())?;
	tmp.as_file().sync_all()?;
	// Temporary files are created owner-only
	#[cfg(unix)]
	{
	    use std::os::unix::fs::PermissionsExt;
	    tmp.as_file().set_permissions(std::fs::Permissions::from_mode(0o644))?;
	}
	tmp.persist(&self.output).map_err(|e| BuildError::OutputNotWritable { path: output, source: e.error })?;
	Ok(())
    }
}

/// Packs the index files `prefix` + `extensions` into an image at `output`.
///
/// All files are checked before the image is started. Sections are named
/// after the suffixes and appear in the order of `extensions`.
pub fn pack_index_files(
    prefix: &str,
    extensions: &[&str],
    output: &str,
) -> Result<(), BuildError> {
    let paths = crate::builder::index_file_paths(prefix, extensions);
    if let Some(missing) = paths.iter().find(|path| !Path::new(path).is_file()) {
	return Err(BuildError::IndexFileMissing { path: missing.clone() });
    }

    let mut image = ImageWriter::create(output, extensions.len())?;
    for (ext, path) in extensions.iter().zip(paths.iter()) {
	image.add_file(ext, path)?;
    }
    image.finish()
}

fn read_u64<R: Read>(
    reader: &mut R,
    path: &str,
) -> Result<u64, BuildError> {
    let mut buf = [0_u8; 8];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, path))?;
    Ok(u64::from_le_bytes(buf))
}

fn truncated(
    err: std::io::Error,
    path: &str,
) -> BuildError {
    match err.kind() {
	std::io::ErrorKind::UnexpectedEof => BuildError::MalformedImage { path: path.to_string(), reason: "file is truncated".to_string() },
	_ => BuildError::Io(err),
    }
}

/// Reads the sections of the image at `path`.
///
/// Returns a vector of (section name, section data) pairs in the order
/// they were written.
///
/// Returns [BuildError::MalformedImage] if the magic bytes are wrong or the
/// file ends early.
pub fn read_image(path: &str) -> Result<Vec<(String, Vec<u8>)>, BuildError> {
    let mut reader = BufReader::new(File::open(path)?);
    let malformed = |reason: &str| BuildError::MalformedImage { path: path.to_string(), reason: reason.to_string() };

    let mut magic = [0_u8; 8];
    reader.read_exact(&mut magic).map_err(|e| truncated(e, path))?;
    if &magic != IMAGE_MAGIC {
	return Err(malformed("not an index image"));
    }

    let n_sections = read_u64(&mut reader, path)?;
    let mut sections = Vec::new();
    for _ in 0..n_sections {
	let name_len = read_u64(&mut reader, path)?;
	if name_len > MAX_NAME_LEN {
	    return Err(malformed("section name is too long"));
	}
	let mut name = vec![0_u8; name_len as usize];
	reader.read_exact(&mut name).map_err(|e| truncated(e, path))?;
	let name = String::from_utf8(name).map_err(|_| malformed("section name is not UTF-8"))?;

	let data_len = read_u64(&mut reader, path)?;
	let mut data = Vec::new();
	(&mut reader).take(data_len).read_to_end(&mut data)?;
	if data.len() as u64 != data_len {
	    return Err(malformed("file is truncated"));
	}
	sections.push((name, data));
    }
    Ok(sections)
}
