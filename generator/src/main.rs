pub mod target;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use protodoc_parser::hl::ProtoFile;
use protodoc_parser::{parse_source, program_to_proto_file};

use crate::target::Format;

#[derive(Parser, Debug)]
#[command(version, about = "Documentation generator for protobuf service definitions")]
struct Args {
  #[command(subcommand)]
  command: Actions,
}

#[derive(Subcommand, Debug)]
enum Actions {
  /// Renders documentation for a .proto file or every .proto file under a directory.
  Generate {
    input: PathBuf,

    /// Directory to write documents into; standard output when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Format::Markdown)]
    format: Format,
  },
  /// Prints the assembled documentation model.
  Inspect {
    input: PathBuf,
  },
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let args = Args::parse();
  let result = match &args.command {
    Actions::Generate { input, output, format } => generate(input, output.as_deref(), *format),
    Actions::Inspect { input } => inspect(input),
  };

  if let Err(error) = result {
    error!("{:#}", error);
    std::process::exit(1);
  }
}

fn generate(input_root: &Path, output_root: Option<&Path>, format: Format) -> Result<()> {
  let mut failed = 0;
  for (path, relative_path) in collect_sources(input_root)? {
    info!("Generating {:?} documentation for {:?}...", format, path);
    let result = load_proto_file(&path).and_then(|file| {
      let document = format.render(&file);
      match output_root {
        Some(output_root) => write_document(&output_root.join(relative_path.with_extension(format.extension())), &document),
        None => io::stdout().write_all(document.as_bytes()).context("failed to write to stdout"),
      }
    });

    if let Err(error) = result {
      error!("{:#}", error);
      failed += 1;
    }
  }

  if failed > 0 {
    bail!("{} file(s) failed", failed);
  }
  Ok(())
}

fn inspect(input_root: &Path) -> Result<()> {
  for (path, _) in collect_sources(input_root)? {
    let file = load_proto_file(&path)?;
    println!("{:?}: {:#?}", path, file);
  }
  Ok(())
}

fn load_proto_file(path: &Path) -> Result<ProtoFile> {
  let content = fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
  let program = parse_source(&content).with_context(|| format!("failed to parse {:?}", path))?;
  debug!("parsed {} top-level items from {:?}", program.body.len(), path);
  program_to_proto_file(&program).with_context(|| format!("failed to build documentation model for {:?}", path))
}

fn write_document(output_path: &Path, document: &str) -> Result<()> {
  if let Some(parent) = output_path.parent() {
    fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
  }
  fs::write(output_path, document).with_context(|| format!("failed to write {:?}", output_path))?;
  info!("Wrote {:?}", output_path);
  Ok(())
}

/// `.proto` files under `input_root` paired with their path relative to it. A file
/// given directly is relative to its own directory.
fn collect_sources(input_root: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
  if input_root.is_file() {
    let file_name = input_root.file_name().with_context(|| format!("{:?} has no file name", input_root))?;
    return Ok(vec![(input_root.to_path_buf(), PathBuf::from(file_name))]);
  }

  let mut sources = Vec::new();
  for entry in WalkDir::new(input_root).sort_by_file_name() {
    let entry = entry.with_context(|| format!("failed to walk {:?}", input_root))?;
    let path = entry.path();
    let relative_path = path.strip_prefix(input_root)?;
    if is_path_hidden(relative_path) {
      continue;
    }

    if !entry.file_type().is_file() || !is_proto_file(path) {
      continue;
    }

    sources.push((path.to_path_buf(), relative_path.to_path_buf()));
  }
  debug!("found {} .proto files under {:?}", sources.len(), input_root);
  Ok(sources)
}

fn is_proto_file(path: &Path) -> bool {
  path.extension().is_some_and(|it| it == "proto")
}

fn is_path_hidden<P: AsRef<Path>>(path: P) -> bool {
  path.as_ref().components().any(|component| {
    if let Some(name) = component.as_os_str().to_str() {
      name.starts_with('.')
    } else {
      false
    }
  })
}
