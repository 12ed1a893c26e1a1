use anyhow::Context;
use bsondump_cli::{
    check_docsize, dump_file, init_logging, CliError, DumpConfig, DumpOptions, ExitStatus,
};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "bsondump")]
#[command(version)]
#[command(about = "Read a BSON file and dump its contents, or check and repair its document size")]
#[command(subcommand_negates_reqs = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// BSON file to dump
    #[arg(required = true)]
    file: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "BSONDUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Output format: text | json
    #[arg(long, global = true)]
    format: Option<String>,

    #[arg(long, global = true)]
    no_color: bool,

    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Maximum nesting depth accepted by the decoder
    #[arg(long, global = true)]
    max_depth: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare the decoded size with the header, writing it back when the header is 0
    Docsize {
        file: PathBuf,
    },
}

fn load_config(args: &Args) -> anyhow::Result<DumpConfig> {
    let mut config = match &args.config {
        Some(path) => DumpConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DumpConfig::default(),
    };

    if let Some(format) = &args.format {
        config.format = format.clone();
    }
    if args.no_color {
        config.color = false;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if let Some(depth) = args.max_depth {
        config.decoder.max_depth = depth;
    }

    Ok(config)
}

fn parse_error_status(err: &clap::Error) -> ExitStatus {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::Success,
        _ => ExitStatus::Error,
    }
}

fn run_dump(path: &Path, options: &DumpOptions) -> ExitStatus {
    let result = dump_file(path, options, io::stdout().lock());
    if let Err(e) = &result {
        eprintln!("bsondump: {}", e);
    }
    ExitStatus::for_dump(&result)
}

fn run_docsize(path: &Path, options: &DumpOptions) -> ExitStatus {
    let result = check_docsize(path, options);
    match &result {
        Ok(report) => println!("{}", report),
        Err(e) => eprintln!("bsondump: {}", e),
    }
    ExitStatus::for_docsize(&result)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_error_status(&e).code());
        }
    };

    let options = match load_config(&args).and_then(|config| {
        init_logging(&config.log_level);
        Ok(config.dump_options()?)
    }) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("bsondump: {:#}", e);
            return ExitCode::from(ExitStatus::Error.code());
        }
    };

    let status = match (&args.command, &args.file) {
        (Some(Command::Docsize { file }), _) => run_docsize(file, &options),
        (None, Some(file)) => run_dump(file, &options),
        (None, None) => {
            eprintln!("bsondump: {}", CliError::Argument("missing input file".to_string()));
            ExitStatus::Error
        }
    };

    ExitCode::from(status.code())
}
