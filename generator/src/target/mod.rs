pub mod doc;
pub mod markdown;
pub mod text;

use clap::ValueEnum;
use protodoc_parser::hl::ProtoFile;

use crate::target::markdown::generate_markdown;
use crate::target::text::generate_text;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
  Markdown,
  Text,
}

impl Format {
  pub fn render(&self, file: &ProtoFile) -> String {
    match self {
      Format::Markdown => generate_markdown(file),
      Format::Text => generate_text(file),
    }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      Format::Markdown => "md",
      Format::Text => "txt",
    }
  }
}
