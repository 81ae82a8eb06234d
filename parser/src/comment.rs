//! Turns raw comment nodes into documentation text plus extension directives.
//!
//! A comment node that carries a directive line (`Domain: ...`, `Category: ...`,
//! `x-domain: ...`, `x-category: ...`) only feeds the extension map and never
//! shows up in the composed text.

use itertools::Itertools;
use tracing::trace;

use crate::config::EXTENSION_DIRECTIVES;
use crate::hl::Extensions;
use crate::CommentLit;

pub fn compose_head(comments: &[CommentLit], parent_extensions: &Extensions) -> (String, Extensions) {
  let mut extensions = parent_extensions.clone();
  let mut texts = Vec::with_capacity(comments.len());
  for comment in comments {
    if let Some(found) = extract_extensions(comment) {
      trace!("comment carries extensions {:?}", found);
      extensions.extend(found);
      continue;
    }
    texts.push(extract_comment(Some(comment)));
  }

  (texts.join("\n"), extensions)
}

pub fn compose_head_and_inline(
  comments: &[CommentLit],
  inline_comment: Option<&CommentLit>,
  separator: &str,
  parent_extensions: &Extensions,
) -> (String, Extensions) {
  let (head, extensions) = compose_head(comments, parent_extensions);
  let inline = extract_comment(inline_comment);
  let text = match (head.is_empty(), inline.is_empty()) {
    (true, _) => inline,
    (_, true) => head,
    _ => format!("{}{}{}", head, separator, inline),
  };

  (text, extensions)
}

fn extract_comment(comment: Option<&CommentLit>) -> String {
  let Some(comment) = comment else {
    return String::new();
  };
  strip_decoration(&comment.lines()).join("\n").trim().to_owned()
}

fn extract_extensions(comment: &CommentLit) -> Option<Extensions> {
  let mut extensions = Extensions::new();
  for line in strip_decoration(&comment.lines()) {
    let line = line.trim();
    for (prefix, key) in EXTENSION_DIRECTIVES {
      if let Some(value) = line.strip_prefix(prefix) {
        extensions.insert(key.to_owned(), value.trim().to_owned());
      }
    }
  }

  if extensions.is_empty() {
    None
  } else {
    Some(extensions)
  }
}

/// Drops blank and asterisk-only lines until the first line with content, then
/// keeps every line with one leading asterisk marker removed.
fn strip_decoration<'a>(lines: &[&'a str]) -> Vec<&'a str> {
  lines
    .iter()
    .copied()
    .skip_while(|line| {
      let trimmed = line.trim();
      trimmed.is_empty() || trimmed == "*" || line.starts_with("* ") || line.starts_with("*\t")
    })
    .map(remove_initial_asterisk)
    .collect_vec()
}

fn remove_initial_asterisk(line: &str) -> &str {
  let line = line.trim();
  if line == "*" {
    return "";
  }
  line.strip_prefix("* ").or_else(|| line.strip_prefix("*\t")).unwrap_or(line)
}
