//! `cmb2sphere` command-line tool.
//!
//! ```text
//! cmb2sphere [--fwhm=<degrees>] [--nside=<n>] [--input=<file>] <outfilename>
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use cmb2sphere::{Cmb2SphereError, Nside, Pipeline, PipelineOptions, Result};
use cmb2sphere_core::options::DEFAULT_INPUT;

/// Turn a CMB temperature map into a 3D-printable sphere
#[derive(Parser, Debug)]
#[command(name = "cmb2sphere", version, about)]
struct Cli {
    /// Output mesh file (.stl for binary STL, .ply for ASCII PLY)
    outfilename: PathBuf,

    /// Smoothing FWHM in degrees [default: 2]
    #[arg(long, value_name = "DEGREES")]
    fwhm: Option<f64>,

    /// Output HEALPix resolution, 1 to 8192 [default: 128]
    #[arg(long, value_name = "N")]
    nside: Option<u32>,

    /// HEALPix FITS map to read
    #[arg(long, value_name = "FILE", default_value = DEFAULT_INPUT)]
    input: PathBuf,

    /// Scale displacement so the peak is a fixed fraction of the radius
    #[arg(long)]
    auto_scale: bool,

    /// Directory for cached coefficients, fields and triangulations
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Do not read or write the cache
    #[arg(long)]
    no_cache: bool,

    /// JSON file with pipeline options; flags given here take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> Result<PipelineOptions> {
        let mut options = match &self.config {
            Some(path) => PipelineOptions::from_json_file(path)?,
            None => PipelineOptions::default(),
        };
        if let Some(n) = self.nside {
            options = options.with_resolution(Nside::new(n)?);
        }
        if let Some(degrees) = self.fwhm {
            options = options.with_fwhm_degrees(degrees);
        }
        if self.auto_scale {
            options.auto_scale = true;
        }
        if let Some(dir) = &self.cache_dir {
            options.cache.directory.clone_from(dir);
        }
        if self.no_cache {
            options = options.without_cache();
        }
        Ok(options)
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    // Nothing is created on disk for a missing map.
    if !cli.input.exists() {
        report_missing(&cli.input);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Cmb2SphereError::MissingInput { path }) => {
            report_missing(&path);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let options = cli.options()?;
    let mut pipeline = Pipeline::new(options)?;
    let summary = pipeline.run(&cli.input, &cli.outfilename)?;
    println!(
        "Wrote {} triangles ({} vertices, nside={}) to {}",
        summary.triangles,
        summary.vertices,
        summary.nside,
        cli.outfilename.display()
    );
    Ok(())
}

fn report_missing(path: &Path) {
    eprintln!("Error: Required data file not found: {}", path.display());
    eprintln!("Please download the file as described in README.md");
}
