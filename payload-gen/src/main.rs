// Licensed under the Apache-2.0 license

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, ArgGroup, Parser};
use log::LevelFilter;
use payload_builder::{CompileOptions, TokenMatch};
use simple_logger::SimpleLogger;

#[derive(Parser, Debug)]
#[command(version, about = "Boot image payload generator", long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["compile", "dump"])))]
struct Args {
    /// Compile a YAML configuration into a boot image.
    #[arg(short = 'c', long = "config", num_args = 2, value_names = ["CONFIG", "OUTPUT"])]
    compile: Option<Vec<PathBuf>>,

    /// Dump the contents of an existing boot image.
    #[arg(short = 'd', long = "dump", value_name = "IMAGE")]
    dump: Option<PathBuf>,

    /// Increase verbosity (repeat for more).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Wide output: one line per program header and chunk.
    #[arg(short, long, default_value_t = false)]
    wide: bool,

    /// Match configuration keys by prefix instead of exactly.
    #[arg(long, default_value_t = false)]
    prefix_tokens: bool,
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn run(args: Args) -> Result<()> {
    let options = CompileOptions {
        token_match: if args.prefix_tokens {
            TokenMatch::Prefix
        } else {
            TokenMatch::Exact
        },
        wide_output: args.wide,
    };

    match (args.compile.as_deref(), args.dump.as_deref()) {
        (Some([config, output]), _) => {
            payload_builder::compile(config, output, &options)?;
        }
        (_, Some(image)) => payload_builder::dump_payload(image, options.wide_output)?,
        _ => anyhow::bail!("Expected either -c <config> <output> or -d <image>"),
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let _ = SimpleLogger::new().with_level(log_level(args.verbose)).init();
    println!("Boot image payload generator v{}", env!("CARGO_PKG_VERSION"));

    let result = run(args);
    result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
}
