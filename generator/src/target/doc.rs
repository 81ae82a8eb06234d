//! Doc comment text to Markdown.
//!
//! Blank lines separate paragraphs. A run of indented lines is preformatted text,
//! unless its first line starts with a list marker (`-`, `*`, `+`, `1.`, `1)`).
//! List items are recognized with or without indentation. A lone `# Title` line
//! between blank lines is a heading.

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
  static ref LIST_MARKER: Regex = Regex::new(r"^(?:[-*+•]|(\d+)[.)])\s+(.*)$").unwrap();
}

#[derive(Debug, PartialEq)]
enum Block {
  Paragraph(Vec<String>),
  Heading(String),
  Code(Vec<String>),
  List(Vec<ListItem>),
}

#[derive(Debug, PartialEq)]
struct ListItem {
  number: Option<String>,
  lines: Vec<String>,
}

pub fn doc_to_markdown(text: &str) -> String {
  parse_blocks(text).iter().map(render_block).join("\n\n")
}

fn render_block(block: &Block) -> String {
  match block {
    Block::Paragraph(lines) => lines.join("\n"),
    Block::Heading(title) => format!("#### {}", title),
    Block::Code(lines) => format!("```\n{}\n```", lines.join("\n")),
    Block::List(items) => items.iter()
      .map(|item| match &item.number {
        Some(number) => format!("{}. {}", number, item.lines.join("\n   ")),
        None => format!("- {}", item.lines.join("\n  ")),
      })
      .join("\n"),
  }
}

fn parse_blocks(text: &str) -> Vec<Block> {
  let lines = text.lines().collect_vec();
  let mut blocks = Vec::new();
  let mut index = 0;
  while index < lines.len() {
    let line = lines[index];
    if is_blank(line) {
      index += 1;
      continue;
    }

    let (block, next) = if list_item(line).is_some() {
      parse_list(&lines, index)
    } else if is_indented(line) {
      parse_code(&lines, index)
    } else if is_heading(&lines, index) {
      (Block::Heading(line[2..].trim().to_owned()), index + 1)
    } else {
      parse_paragraph(&lines, index)
    };
    blocks.push(block);
    index = next;
  }
  blocks
}

fn parse_paragraph(lines: &[&str], start: usize) -> (Block, usize) {
  let end = (start..lines.len())
    .find(|&index| {
      let line = lines[index];
      is_blank(line) || is_indented(line) || list_item(line).is_some()
    })
    .unwrap_or(lines.len());

  let paragraph = lines[start..end].iter().map(|line| line.trim_end().to_owned()).collect_vec();
  (Block::Paragraph(paragraph), end)
}

/// Indented lines, with blank lines kept only between two indented ones.
fn parse_code(lines: &[&str], start: usize) -> (Block, usize) {
  let mut end = start;
  let mut index = start;
  while index < lines.len() {
    let line = lines[index];
    if is_indented(line) {
      end = index + 1;
    } else if !is_blank(line) {
      break;
    }
    index += 1;
  }

  let block = &lines[start..end];
  let indent = block.iter()
    .filter(|line| !is_blank(line))
    .map(|line| line.len() - line.trim_start_matches(is_indent).len())
    .min()
    .unwrap_or(0);
  let code = block.iter()
    .map(|line| if is_blank(line) { String::new() } else { line[indent..].trim_end().to_owned() })
    .collect_vec();
  (Block::Code(code), end)
}

/// Items of one kind (bulleted or numbered); a blank line ends the list unless
/// another item of the same kind follows it.
fn parse_list(lines: &[&str], start: usize) -> (Block, usize) {
  let mut items: Vec<ListItem> = Vec::new();
  let mut index = start;
  while index < lines.len() {
    let line = lines[index];
    if let Some(item) = list_item(line) {
      if items.last().is_some_and(|last| last.number.is_some() != item.number.is_some()) {
        break;
      }
      items.push(item);
      index += 1;
    } else if is_blank(line) {
      let next = (index..lines.len()).find(|&it| !is_blank(lines[it]));
      let continues = next
        .and_then(|it| list_item(lines[it]))
        .zip(items.last())
        .is_some_and(|(item, last)| item.number.is_some() == last.number.is_some());
      match next {
        Some(next) if continues => index = next,
        _ => break,
      }
    } else if is_indented(line) {
      match items.last_mut() {
        Some(last) => last.lines.push(line.trim().to_owned()),
        None => break,
      }
      index += 1;
    } else {
      break;
    }
  }
  (Block::List(items), index)
}

fn list_item(line: &str) -> Option<ListItem> {
  let captures = LIST_MARKER.captures(line.trim())?;
  let text = captures.get(2)?.as_str();
  Some(ListItem {
    number: captures.get(1).map(|it| it.as_str().to_owned()),
    lines: vec![text.to_owned()],
  })
}

fn is_heading(lines: &[&str], index: usize) -> bool {
  let line = lines[index];
  let separated_before = index == 0 || is_blank(lines[index - 1]);
  let separated_after = lines.get(index + 1).map_or(true, |next| is_blank(next));
  line.starts_with("# ") && line.len() > 2 && separated_before && separated_after
}

fn is_indented(line: &str) -> bool {
  line.starts_with(is_indent) && !is_blank(line)
}

fn is_indent(ch: char) -> bool {
  ch == ' ' || ch == '\t'
}

fn is_blank(line: &str) -> bool {
  line.trim().is_empty()
}
