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
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use bwa_image::builder::BuildError;
use bwa_image::bwa::BwaImageBuilder;
use bwa_image::bwa::BwaOpts;
use bwa_image::bwa::BWA_INDEX_FILE_EXTENSIONS;
use bwa_image::create_image;
use bwa_image::image::read_image;
use bwa_image::BuildPath;
use bwa_image::ImageOpts;

// Writing an executable while another test forks can fail with ETXTBSY
static SERIAL: Mutex<()> = Mutex::new(());

// Stands in for `bwa index [-a algo] -p <prefix> <fasta>`
const FAKE_BWA: &str = r#"#!/bin/sh
[ "$1" = "index" ] || exit 1
shift
while [ $# -gt 1 ]; do
    case "$1" in
        -p) prefix="$2"; shift 2 ;;
        -a) shift 2 ;;
        *) shift ;;
    esac
done
for ext in amb ann bwt pac sa; do
    printf 'bwa %s' "$ext" > "$prefix.$ext"
done
echo "[main] Real time: 0.001 sec" >&2
"#;

const FAILING_BWA: &str = r#"#!/bin/sh
echo "[bwa_index] fail to open file" >&2
exit 1
"#;

fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_reference(dir: &Path) -> String {
    let reference = dir.join("ref.fasta");
    std::fs::write(&reference, b">chr20\nACGTTGCAACGTAGGCTTAGCATCGA\n>chr21\nTTAGGCATCGATCGA\n").unwrap();
    reference.to_str().unwrap().to_string()
}

fn builder_with(executable: PathBuf, temp_dir: &Path) -> BwaImageBuilder {
    let mut opts = BwaOpts::default();
    opts.executable = executable;
    opts.temp_dir = Some(temp_dir.to_path_buf());
    BwaImageBuilder::new(opts)
}

#[test]
fn image_from_fasta_runs_bwa_index() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let bwa = write_script(dir.path(), "bwa", FAKE_BWA);
    let reference = write_reference(dir.path());

    let builder = builder_with(bwa, scratch.path());
    let got = create_image(&builder, &ImageOpts::new(&reference)).unwrap();
    assert!(matches!(got, BuildPath::FromFasta(_)));

    let expected: Vec<(String, Vec<u8>)> = BWA_INDEX_FILE_EXTENSIONS
	.iter()
	.map(|ext| (ext.to_string(), format!("bwa {}", &ext[1..]).into_bytes()))
	.collect();
    let image = read_image(&format!("{}.img", reference)).unwrap();
    assert_eq!(image, expected);

    // intermediate index files are cleaned up
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    assert!(!Path::new(&format!("{}.bwt", reference)).exists());
}

#[test]
fn bwa_failure_is_reported() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let bwa = write_script(dir.path(), "bwa", FAILING_BWA);
    let reference = write_reference(dir.path());
    let output = dir.path().join("custom.img");

    let mut opts = ImageOpts::new(&reference);
    opts.output = Some(output.to_str().unwrap().to_string());
    let got = create_image(&builder_with(bwa, scratch.path()), &opts);

    match got {
	Err(BuildError::ToolFailed { command, stderr, .. }) => {
	    assert!(command.contains(" index -p "));
	    assert!(command.ends_with(&reference));
	    assert_eq!(stderr, "[bwa_index] fail to open file");
	},
	other => panic!("unexpected result {:?}", other),
    }
    assert!(!output.exists());
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn existing_index_files_skip_bwa() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let bwa = write_script(dir.path(), "bwa", FAILING_BWA);
    let reference = write_reference(dir.path());
    for ext in BWA_INDEX_FILE_EXTENSIONS {
	std::fs::write(format!("{}{}", reference, ext), format!("prebuilt {}", ext)).unwrap();
    }
    let output = dir.path().join("custom.img").to_str().unwrap().to_string();

    let mut opts = ImageOpts::new(&reference);
    opts.output = Some(output.clone());
    opts.use_existing_index_files = true;
    let got = create_image(&builder_with(bwa, scratch.path()), &opts).unwrap();

    assert_eq!(got, BuildPath::FromIndexFiles);
    let image = read_image(&output).unwrap();
    let names: Vec<&str> = image.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, BWA_INDEX_FILE_EXTENSIONS.to_vec());
    assert_eq!(image[2].1, b"prebuilt .bwt".to_vec());
}

#[test]
fn incomplete_index_files_run_bwa() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let bwa = write_script(dir.path(), "bwa", FAKE_BWA);
    let reference = write_reference(dir.path());
    for ext in &BWA_INDEX_FILE_EXTENSIONS[..4] {
	std::fs::write(format!("{}{}", reference, ext), b"prebuilt").unwrap();
    }

    let mut opts = ImageOpts::new(&reference);
    opts.use_existing_index_files = true;
    let got = create_image(&builder_with(bwa, scratch.path()), &opts).unwrap();

    assert!(matches!(got, BuildPath::FromFasta(_)));
    let image = read_image(&format!("{}.img", reference)).unwrap();
    assert_eq!(image[0].1, b"bwa amb".to_vec());
}
