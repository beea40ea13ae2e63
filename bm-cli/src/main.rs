//! `bmc`: compiles an AST-JSON format description to a binary module
//! (`spec.md` §6's CLI contract).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;

/// Compiles a format-description AST to the binary module IR.
#[derive(Debug, Parser)]
#[command(name = "bmc", version, about)]
struct Cli {
    /// AST-JSON input file.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Binary module output file.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Control-flow-graph side-data output file.
    #[arg(short = 'c', long = "cfg-output")]
    cfg_output: Option<PathBuf>,

    /// Print the disassembled IR to stdout.
    #[arg(short = 'p', long = "print-instructions")]
    print_instructions: bool,

    /// Increase log verbosity; repeatable (`-v`, `-vv`, `-vvv`).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("reading {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("writing {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("parsing {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error(transparent)]
    Compile(#[from] bm_core::Error),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let json = fs::read_to_string(&cli.input).map_err(|source| CliError::Read {
        path: cli.input.clone(),
        source,
    })?;

    let program = bm_ast::parse(&json).map_err(|source| CliError::Parse {
        path: cli.input.clone(),
        source,
    })?;

    let module = bm_core::compile(&program)?;

    if cli.print_instructions {
        print!("{}", bm_core::print_module(&module));
    }

    if let Some(cfg_path) = &cli.cfg_output {
        let blocks: Vec<bm_core::serialize::WireRange> =
            module.basic_blocks.iter().copied().map(bm_core::serialize::WireRange::from).collect();
        let bytes = bm_types::write(&blocks).map_err(bm_core::Error::Wire)?;
        fs::write(cfg_path, bytes).map_err(|source| CliError::Write {
            path: cfg_path.clone(),
            source,
        })?;
    }

    if let Some(out_path) = &cli.output {
        let bm = bm_core::BinaryModule::from_module(&module)?;
        let bytes = bm.to_bytes()?;
        fs::write(out_path, bytes).map_err(|source| CliError::Write {
            path: out_path.clone(),
            source,
        })?;
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
