use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::error;

use classfile_transpiler::{transpile, Config, TranspileError};

#[derive(Parser)]
#[command(name = "classfile-transpiler")]
#[command(about = "Transpile JVM class files to C++ sources for the jrt runtime")]
#[command(version)]
struct Cli {
    /// Directory of .class files, or a .jar/.zip archive
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory for generated sources
    #[arg(short, long, value_name = "DIR", default_value = "out")]
    output: PathBuf,

    /// Entry class (internal name, e.g. com/example/Main); repeatable
    #[arg(short, long, value_name = "CLASS")]
    entry: Vec<String>,

    /// Keep classes the reachability pass would elide
    #[arg(long)]
    keep_unreachable: bool,

    /// Disable dead-code elision in the emitter
    #[arg(long)]
    no_elide: bool,

    /// Emit runtime checks into generated code
    #[arg(long)]
    assertions: bool,

    /// Runtime ABI revision to target
    #[arg(long, value_name = "N", default_value_t = 2)]
    abi_version: u32,

    /// Class provided by the runtime's core library; repeatable
    #[arg(long, value_name = "CLASS")]
    provided: Vec<String>,

    /// File listing runtime-provided classes, one internal name per line
    #[arg(long, value_name = "FILE")]
    provided_list: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version are not user errors.
            if e.use_stderr() {
                eprintln!("{e}");
                return ExitCode::from(1);
            }
            print!("{e}");
            return ExitCode::SUCCESS;
        }
    };

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    match transpile(&config) {
        Ok(summary) => {
            println!(
                "transpiled {} classes into {}",
                summary.classes.len(),
                config.output_root.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            match &e {
                TranspileError::Link(errors) => {
                    for link_error in errors {
                        error!("{link_error}");
                    }
                }
                other => error!("{other}"),
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    if !cli.input.exists() {
        anyhow::bail!("input {} does not exist", cli.input.display());
    }

    let mut runtime_provided: BTreeSet<String> = cli.provided.iter().cloned().collect();
    if let Some(list) = &cli.provided_list {
        let text = std::fs::read_to_string(list)?;
        runtime_provided.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }

    Ok(Config {
        input_root: cli.input.clone(),
        output_root: cli.output.clone(),
        entry_classes: cli.entry.clone(),
        keep_unreachable: cli.keep_unreachable,
        elide_dead_code: !cli.no_elide && !cli.keep_unreachable,
        emit_assertions: cli.assertions,
        abi_version: cli.abi_version,
        runtime_provided,
        temp_dir: std::env::var_os("TRANSPILER_TMP").map(PathBuf::from),
    })
}
