use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crnexport::{load_model_file, CodeGenerator};

/// exports a reaction-network model (.json) as a standalone Rust simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input model file
    input: PathBuf,

    /// Output filename (defaults to stdout)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Header docstring, overriding the model file's `doc`
    #[arg(short, long)]
    docstring: Option<String>,

    /// Do not emit a `main` function
    #[arg(long)]
    no_main: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Args::parse();

    let (model, doc) = load_model_file(&cli.input)
        .with_context(|| format!("cannot load {}", cli.input.display()))?;
    let mut generator = CodeGenerator::new(&model).with_entry_point(!cli.no_main);
    if let Some(doc) = cli.docstring.or(doc) {
        generator = generator.with_docstring(doc);
    }
    let program = generator
        .generate()
        .with_context(|| format!("cannot export model '{}'", model.name))?;

    match cli.out {
        Some(path) => program.write_to(&path)?,
        None => print!("{}", program.code),
    }
    Ok(())
}
