mod classfile;
mod code;
mod constant_pool;
mod context;
mod insn;
mod ir;
mod opcodes;
mod operand;
mod scan;
mod transforms;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use jclassfile::class_file;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::classfile::write_class;
use crate::context::DeobfuscationContext;
use crate::scan::{scan_input, write_output};
use crate::transforms::{default_transformers, run_transformers};

/// CLI arguments for a deobfuscation run.
#[derive(Parser, Debug)]
#[command(
    name = "deobfuscator",
    about = "Removes string encryption, opaque predicates and other obfuscator idioms from JVM class and JAR files.",
    version
)]
struct Cli {
    /// Obfuscated `.jar` or `.class` file.
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// Defaults to `<input stem>-deob.<ext>` next to the input.
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,
    /// Entry point class, overriding the name-length heuristic.
    #[arg(long, value_name = "NAME")]
    main_class: Option<String>,
    #[arg(long, short)]
    quiet: bool,
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    run(cli)
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    let output = match cli.output {
        Some(output) => output,
        None => default_output(&cli.input)?,
    };

    let started_at = Instant::now();
    let scan = scan_input(&cli.input)?;
    let mut context = DeobfuscationContext::new(scan.classes, cli.main_class)?;
    info!("main class is {}", context.main_class);

    let changed = run_transformers(&mut context, &default_transformers())
        .context("deobfuscation pass failed")?;

    let mut classes = Vec::with_capacity(context.classes.len());
    for class in &context.classes {
        let data =
            write_class(class).with_context(|| format!("failed to encode {}", class.name))?;
        class_file::parse(&data)
            .with_context(|| format!("encoded {} is not a valid class file", class.name))?;
        classes.push((class.name.clone(), data));
    }
    info!("writing {} classes to {}", classes.len(), output.display());
    write_output(&output, &classes, &scan.resources)?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={} changes={}",
            started_at.elapsed().as_millis(),
            classes.len(),
            changed
        );
    }

    Ok(())
}

/// `<stem>-deob.<ext>` next to `input`.
fn default_output(input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("cannot derive an output name from {}", input.display()))?;
    let name = match input.extension().and_then(|ext| ext.to_str()) {
        Some(extension) => format!("{stem}-deob.{extension}"),
        None => format!("{stem}-deob"),
    };
    Ok(input.with_file_name(name))
}
