//! shmerge: bundle a bash project into one script.
//!
//! Usage: `shmerge [OPTIONS] <ENTRYPOINT> <OUTPUT>`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};

use shmerge::{Config, logging};

#[derive(Parser, Debug)]
#[command(name = "shmerge", version, about = "Bundle a multi-file bash project into one script")]
struct Cli {
    /// Script the project is started with
    #[arg(required_unless_present = "dump_config")]
    entrypoint: Option<PathBuf>,

    /// Where to write the merged script
    #[arg(required_unless_present_any = ["dump_config", "deps"])]
    output: Option<PathBuf>,

    /// Configuration file to merge over the defaults
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print the resolved file order instead of compiling
    #[arg(long)]
    deps: bool,

    /// With --deps, print a JSON report including recorded declarations
    #[arg(long, requires = "deps")]
    json: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("shmerge: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    logging::init(logging::level(cli.verbose, cli.quiet), config.settings.log_file);

    if cli.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let entry = cli.entrypoint.ok_or("missing entry point")?;
    if cli.deps {
        let resolution = shmerge::resolve_dependencies(&entry, &config.settings)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&resolution.report())?);
        } else {
            for file in &resolution.order {
                println!("{}", file.display());
            }
        }
        return Ok(());
    }

    let output = cli.output.ok_or("missing output path")?;
    shmerge::compile(&entry, &output, &config)?;
    Ok(())
}
