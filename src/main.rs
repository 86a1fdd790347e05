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
use anyhow::Context;
use clap::Parser;
use log::error;
use log::info;

use bwa_image::bwa::BwaImageBuilder;
use bwa_image::bwa::BwaOpts;
use bwa_image::index::SbwtImageBuilder;
use bwa_image::index::SbwtOpts;
use bwa_image::BuildPath;
use bwa_image::ImageOpts;

// Command-line interface
mod cli;

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) -> Result<(), log::SetLoggerError> {
    stderrlog::new()
	.module(module_path!())
	.quiet(false)
	.verbosity(log_max_level)
	.timestamp(stderrlog::Timestamp::Off)
	.init()
}

fn run(cli: &cli::Cli) -> anyhow::Result<()> {
    let opts = ImageOpts {
	reference: cli.input.clone(),
	output: cli.output.clone(),
	use_existing_index_files: cli.use_existing_index_files,
    };
    let output = opts.output_path();

    let build_path = match cli.backend {
	cli::Backend::Bwa => {
	    let mut bwa_opts = BwaOpts::default();
	    bwa_opts.executable = cli.bwa.clone();
	    bwa_opts.algorithm = cli.bwa_algorithm;
	    bwa_opts.temp_dir = cli.temp_dir.clone();
	    bwa_image::create_image(&BwaImageBuilder::new(bwa_opts), &opts)
	},
	cli::Backend::Sbwt => {
	    let mut sbwt_opts = SbwtOpts::default();
	    sbwt_opts.k = cli.kmer_size;
	    sbwt_opts.num_threads = cli.num_threads;
	    sbwt_opts.mem_gb = cli.mem_gb;
	    sbwt_opts.temp_dir = cli.temp_dir.clone();
	    bwa_image::create_image(&SbwtImageBuilder::new(sbwt_opts), &opts)
	},
    }.with_context(|| format!("Failed to create index image {}", output))?;

    match build_path {
	BuildPath::FromIndexFiles => info!("Wrote {} from existing index files", output),
	BuildPath::FromFasta(_) => info!("Wrote {} from {}", output, opts.reference),
    }
    Ok(())
}

/// Use `bwa-image --input <reference>` to create `<reference>.img`.
///
/// Exits with 0 on success, 2 on invalid arguments and 1 if the image
/// could not be created.
fn main() {
    let cli = cli::Cli::parse_from(cli::normalize_args(std::env::args_os()));

    if let Err(e) = init_log(if cli.verbose { 3 } else { 2 }) {
	eprintln!("Couldn't initialize logging: {}", e);
	std::process::exit(1);
    }

    if let Err(e) = run(&cli) {
	error!("{:#}", e);
	std::process::exit(1);
    }
}
