pub mod span;
pub mod config;
pub mod hl;
pub mod comment;
pub mod walk;
pub mod resolve;
pub mod assemble;

use std::slice::Iter;
use std::str::CharIndices;

use itertools::{Itertools, MultiPeek};
use span::{Positioned, Span};
use thiserror::Error;
use tracing::trace;

pub use assemble::{assemble, program_to_proto_file};
pub use walk::ModelError;

#[derive(Debug, Error)]
#[error("{message} ({span})")]
pub struct SyntaxError {
  message: String,
  span: Span,
  at_end: bool,
}

impl SyntaxError {
  fn new(message: String, span: Span) -> Self {
    SyntaxError {
      message,
      span,
      at_end: false,
    }
  }

  /// The stream cannot tell where it ended; [`SyntaxError::located_at_end`] fills the span in.
  fn eof(expected: &str) -> Self {
    SyntaxError {
      message: format!("unexpected end of input, expected {}", expected),
      span: Span::identity(),
      at_end: true,
    }
  }

  /// Points an end-of-input error at the last token of the stream it was raised on.
  pub fn located_at_end(mut self, tokens: &[Positioned<Token>]) -> Self {
    if self.at_end {
      if let Some(last) = tokens.last() {
        self.span = last.span;
      }
    }
    self
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn span(&self) -> Span {
    self.span
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delimiter {
  BraceOpen,
  BraceClose,
  ParenOpen,
  ParenClose,
  BracketOpen,
  BracketClose,
}

/// Raw comment text, markers included.
#[derive(Debug, Clone, PartialEq)]
pub enum Comment {
  Line(String),
  Block(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
  Ident(String),
  Number(String),
  String(String),
  Delimiter(Delimiter),
  Eq,
  Colon,
  Semi,
  Comma,
  Gt,
  Lt,
  Dot,
  Minus,

  Comment(Comment),
}

struct Cursor<'a> {
  chars: MultiPeek<CharIndices<'a>>,
  offset: usize,
  line: usize,
  column: usize,
}

impl<'a> Cursor<'a> {
  fn new(input: &'a str) -> Self {
    Cursor {
      chars: itertools::multipeek(input.char_indices()),
      offset: 0,
      line: 1,
      column: 1,
    }
  }

  fn bump(&mut self) -> Option<(usize, char)> {
    let next = self.chars.next();
    if let Some((pos, ch)) = next {
      self.offset = pos + ch.len_utf8();
      if ch == '\n' {
        self.line += 1;
        self.column = 1;
      } else {
        self.column += 1;
      }
    }
    next
  }

  fn peek_num(&mut self, n: usize) -> String {
    let mut buffer = String::new();
    for _ in 0..n {
      if let Some(&(_, c)) = self.chars.peek() {
        buffer.push(c);
      } else {
        break;
      }
    }
    self.chars.reset_peek();

    buffer
  }

  fn bump_while<F: Fn(char) -> bool>(&mut self, buffer: &mut String, predicate: F) {
    while let Some(&(_, ch)) = self.chars.peek() {
      if !predicate(ch) {
        break;
      }
      buffer.push(ch);
      self.bump();
    }
    self.chars.reset_peek();
  }
}

pub fn tokenizer(input: &str) -> Result<Vec<Positioned<Token>>, SyntaxError> {
  let mut tokens: Vec<Positioned<Token>> = Vec::new();
  let mut cursor = Cursor::new(input);

  loop {
    let (line, column) = (cursor.line, cursor.column);
    let Some((pos, ch)) = cursor.bump() else {
      break;
    };
    let span_to = |end: usize| Span { start: pos, end, line, column };

    let token = match ch {
      ch if ch.is_whitespace() => continue,
      '/' if cursor.peek_num(1) == "/" => {
        let mut raw = String::from("/");
        cursor.bump_while(&mut raw, |ch| ch != '\n');
        Token::Comment(Comment::Line(raw.trim_end().to_owned()))
      }
      '/' if cursor.peek_num(1) == "*" => {
        let mut raw = String::from("/");
        loop {
          match cursor.bump() {
            Some((_, ch)) => {
              raw.push(ch);
              if raw.len() >= 4 && raw.ends_with("*/") {
                break;
              }
            }
            None => return Err(SyntaxError::new("unterminated block comment".to_owned(), span_to(cursor.offset))),
          }
        }
        Token::Comment(Comment::Block(raw))
      }
      '"' | '\'' => {
        let quote = ch;
        let mut value = String::new();
        loop {
          match cursor.bump() {
            Some((_, '\\')) => match cursor.bump() {
              Some((_, 'n')) => value.push('\n'),
              Some((_, 't')) => value.push('\t'),
              Some((_, escaped)) => value.push(escaped),
              None => return Err(SyntaxError::new("unterminated string".to_owned(), span_to(cursor.offset))),
            },
            Some((_, ch)) if ch == quote => break,
            Some((_, '\n')) | None => return Err(SyntaxError::new("unterminated string".to_owned(), span_to(cursor.offset))),
            Some((_, ch)) => value.push(ch),
          }
        }
        Token::String(value)
      }
      '-' | '+' | '0'..='9' if ch.is_ascii_digit() || cursor.peek_num(1).starts_with(|it: char| it.is_ascii_digit()) => {
        let mut raw = String::from(ch);
        cursor.bump_while(&mut raw, |ch| ch.is_ascii_alphanumeric() || ch == '.');
        Token::Number(raw)
      }
      ch if ch.is_ascii_alphabetic() || ch == '_' => {
        let mut raw = String::from(ch);
        cursor.bump_while(&mut raw, |ch| ch.is_ascii_alphanumeric() || ch == '_');
        Token::Ident(raw)
      }
      '=' => Token::Eq,
      '{' => Token::Delimiter(Delimiter::BraceOpen),
      '}' => Token::Delimiter(Delimiter::BraceClose),
      '(' => Token::Delimiter(Delimiter::ParenOpen),
      ')' => Token::Delimiter(Delimiter::ParenClose),
      '[' => Token::Delimiter(Delimiter::BracketOpen),
      ']' => Token::Delimiter(Delimiter::BracketClose),
      ':' => Token::Colon,
      ';' => Token::Semi,
      ',' => Token::Comma,
      '>' => Token::Gt,
      '<' => Token::Lt,
      '.' => Token::Dot,
      '-' => Token::Minus,
      _ => return Err(SyntaxError::new(format!("unrecognized character {:?}", ch), span_to(cursor.offset))),
    };

    trace!("token {:?} at {}:{}", token, line, column);
    tokens.push(Positioned::new(token, span_to(cursor.offset)));
  }

  Ok(tokens)
}

#[derive(Debug)]
pub struct Program {
  pub body: Vec<ProgramItem>,
}

#[derive(Debug)]
pub enum ProgramItem {
  /// A comment not attached to any declaration.
  Comment(CommentLit),
  Syntax(SyntaxDeclaration),
  Package(PackageDeclaration),
  Import(ImportDeclaration),
  Service(ServiceDeclaration),
  Message(MessageDeclaration),
  Enum(EnumDeclaration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentLit {
  pub comment: Comment,
  pub span: Span,
}

impl CommentLit {
  /// Builds a `//` comment from its text.
  pub fn line(text: &str) -> Self {
    CommentLit {
      comment: Comment::Line(format!("//{}", text)),
      span: Span::identity(),
    }
  }

  /// Builds a `/* */` comment from its inner text.
  pub fn block(text: &str) -> Self {
    CommentLit {
      comment: Comment::Block(format!("/*{}*/", text)),
      span: Span::identity(),
    }
  }

  /// The comment body split into lines, markers removed.
  pub fn lines(&self) -> Vec<&str> {
    match &self.comment {
      Comment::Line(raw) => {
        let body = raw.strip_prefix("//").unwrap_or(raw);
        vec![body.trim_start_matches('/')]
      }
      Comment::Block(raw) => {
        let body = raw.strip_prefix("/*").unwrap_or(raw);
        let body = body.strip_suffix("*/").unwrap_or(body);
        body.split('\n').collect_vec()
      }
    }
  }

  pub fn end_line(&self) -> usize {
    match &self.comment {
      Comment::Line(_) => self.span.line,
      Comment::Block(raw) => self.span.line + raw.matches('\n').count(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Identifier(pub String);

#[derive(Debug, Clone)]
pub struct StringLit(pub String);

/// Numeric literal as written, sign included.
#[derive(Debug, Clone)]
pub struct NumberLit(pub String);

#[derive(Debug)]
pub struct SyntaxDeclaration {
  pub value: Positioned<StringLit>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub struct PackageDeclaration {
  pub name: Positioned<Identifier>,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub struct ImportDeclaration {
  pub path: Positioned<StringLit>,
  pub modifier: Option<Positioned<Identifier>>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub struct ServiceDeclaration {
  pub name: Positioned<Identifier>,
  pub rpcs: Vec<RpcDeclaration>,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub struct RpcDeclaration {
  pub name: Positioned<Identifier>,
  pub request: RpcMessage,
  pub response: RpcMessage,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub struct RpcMessage {
  pub name: Positioned<Identifier>,
  pub stream: bool,
}

#[derive(Debug)]
pub struct MessageDeclaration {
  pub name: Positioned<Identifier>,
  pub body: Vec<MessageItem>,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub enum MessageItem {
  Field(FieldDeclaration),
  MapField(MapFieldDeclaration),
  Oneof(OneofDeclaration),
  Message(MessageDeclaration),
  Enum(EnumDeclaration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLabel {
  Optional,
  Required,
  Repeated,
}

impl FieldLabel {
  fn from_keyword(keyword: &str) -> Option<Self> {
    match keyword {
      "optional" => Some(FieldLabel::Optional),
      "required" => Some(FieldLabel::Required),
      "repeated" => Some(FieldLabel::Repeated),
      _ => None,
    }
  }
}

#[derive(Debug)]
pub struct FieldDeclaration {
  pub label: Option<Positioned<FieldLabel>>,
  pub kind: Positioned<Identifier>,
  pub name: Positioned<Identifier>,
  pub number: Positioned<NumberLit>,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

impl FieldDeclaration {
  pub fn is_repeated(&self) -> bool {
    self.label.as_ref().is_some_and(|it| it.value == FieldLabel::Repeated)
  }
}

#[derive(Debug)]
pub struct MapFieldDeclaration {
  pub key_kind: Positioned<Identifier>,
  pub value_kind: Positioned<Identifier>,
  pub name: Positioned<Identifier>,
  pub number: Positioned<NumberLit>,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub struct OneofDeclaration {
  pub name: Positioned<Identifier>,
  pub fields: Vec<FieldDeclaration>,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub struct EnumDeclaration {
  pub name: Positioned<Identifier>,
  pub constants: Vec<EnumConstantDeclaration>,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

#[derive(Debug)]
pub struct EnumConstantDeclaration {
  pub name: Positioned<Identifier>,
  pub value: Positioned<NumberLit>,
  pub comments: Vec<CommentLit>,
  pub inline_comment: Option<CommentLit>,
}

pub type TokenStream<'a> = MultiPeek<Iter<'a, Positioned<Token>>>;

/// Tokenizes and parses a whole source file.
pub fn parse_source(input: &str) -> Result<Program, SyntaxError> {
  let tokens = tokenizer(input)?;
  let mut iter = itertools::multipeek(&tokens);
  parse_program(&mut iter).map_err(|error| error.located_at_end(&tokens))
}

fn unexpected(token: &Positioned<Token>, expected: &str) -> SyntaxError {
  SyntaxError::new(format!("unrecognized token {:?}, expected {}", token.value, expected), token.span)
}

fn comment_lit(token: &Positioned<Token>) -> Option<CommentLit> {
  match &token.value {
    Token::Comment(comment) => Some(CommentLit { comment: comment.clone(), span: token.span }),
    _ => None,
  }
}

fn peek_nth_significant<'a>(input: &mut TokenStream<'a>, n: usize) -> Option<&'a Positioned<Token>> {
  let mut seen = 0;
  let mut found = None;
  while let Some(token) = input.peek().copied() {
    if matches!(token.value, Token::Comment(_)) {
      continue;
    }
    if seen == n {
      found = Some(token);
      break;
    }
    seen += 1;
  }
  input.reset_peek();
  found
}

fn peek_significant<'a>(input: &mut TokenStream<'a>) -> Option<&'a Positioned<Token>> {
  peek_nth_significant(input, 0)
}

fn next_significant<'a>(input: &mut TokenStream<'a>) -> Option<&'a Positioned<Token>> {
  for token in input.by_ref() {
    if let Token::Comment(comment) = &token.value {
      trace!("dropping comment inside a statement {:?}", comment);
      continue;
    }
    return Some(token);
  }
  None
}

fn is_next(input: &mut TokenStream, expected: &Token) -> bool {
  peek_significant(input).is_some_and(|token| &token.value == expected)
}

fn is_keyword(token: &Positioned<Token>, keyword: &str) -> bool {
  matches!(&token.value, Token::Ident(value) if value == keyword)
}

fn expect_next<'a>(input: &mut TokenStream<'a>, expected: &str) -> Result<&'a Positioned<Token>, SyntaxError> {
  next_significant(input).ok_or_else(|| SyntaxError::eof(expected))
}

fn expect_token<'a>(input: &mut TokenStream<'a>, expected: Token) -> Result<&'a Positioned<Token>, SyntaxError> {
  let description = format!("{:?}", expected);
  let token = expect_next(input, &description)?;
  if token.value == expected {
    Ok(token)
  } else {
    Err(unexpected(token, &description))
  }
}

fn expect_keyword<'a>(input: &mut TokenStream<'a>, keyword: &str) -> Result<&'a Positioned<Token>, SyntaxError> {
  let token = expect_next(input, keyword)?;
  if is_keyword(token, keyword) {
    Ok(token)
  } else {
    Err(unexpected(token, keyword))
  }
}

fn expect_ident(input: &mut TokenStream) -> Result<Positioned<Identifier>, SyntaxError> {
  let token = expect_next(input, "Ident")?;
  match &token.value {
    Token::Ident(value) => Ok(token.span.wrap(Identifier(value.to_owned()))),
    _ => Err(unexpected(token, "Ident")),
  }
}

fn expect_string(input: &mut TokenStream) -> Result<Positioned<StringLit>, SyntaxError> {
  let token = expect_next(input, "String")?;
  match &token.value {
    Token::String(value) => Ok(token.span.wrap(StringLit(value.to_owned()))),
    _ => Err(unexpected(token, "String")),
  }
}

fn expect_number(input: &mut TokenStream) -> Result<Positioned<NumberLit>, SyntaxError> {
  let token = expect_next(input, "Number")?;
  match &token.value {
    Token::Number(value) => Ok(token.span.wrap(NumberLit(value.to_owned()))),
    _ => Err(unexpected(token, "Number")),
  }
}

/// `[.]ident{.ident}`, kept as written.
fn parse_full_ident(input: &mut TokenStream) -> Result<Positioned<Identifier>, SyntaxError> {
  let mut name = String::new();
  let mut start = None;
  if let Some(token) = peek_significant(input).filter(|token| token.value == Token::Dot) {
    next_significant(input);
    name.push('.');
    start = Some(token.span);
  }

  let first = expect_ident(input)?;
  let mut span = start.unwrap_or(first.span).between(first.span);
  name.push_str(&first.value.0);
  while is_next(input, &Token::Dot) {
    next_significant(input);
    let part = expect_ident(input)?;
    name.push('.');
    name.push_str(&part.value.0);
    span = span.between(part.span);
  }

  Ok(span.wrap(Identifier(name)))
}

fn take_comments(input: &mut TokenStream) -> Vec<CommentLit> {
  let mut comments = Vec::new();
  while let Some(token) = input.peek().copied() {
    match comment_lit(token) {
      Some(comment) => {
        comments.push(comment);
        input.next();
      }
      None => break,
    }
  }
  input.reset_peek();
  comments
}

/// Consumes a comment that starts on `line`, i.e. trails the token that ended there.
fn take_inline_comment(input: &mut TokenStream, line: usize) -> Option<CommentLit> {
  let next = input.peek().copied();
  input.reset_peek();
  match next {
    Some(token) if token.span.line == line => {
      let comment = comment_lit(token)?;
      input.next();
      Some(comment)
    }
    _ => None,
  }
}

/// Splits comments gathered before a declaration starting on `line` into the groups
/// separated from it by a blank line and the group directly above it.
fn split_detached(mut comments: Vec<CommentLit>, line: usize) -> (Vec<CommentLit>, Vec<CommentLit>) {
  let mut boundary = comments.len();
  let mut next_line = line;
  for (index, comment) in comments.iter().enumerate().rev() {
    if comment.end_line() + 1 < next_line {
      break;
    }
    boundary = index;
    next_line = comment.span.line;
  }

  let leading = comments.split_off(boundary);
  (comments, leading)
}

fn end_statement(input: &mut TokenStream) -> Result<Option<CommentLit>, SyntaxError> {
  let semi = expect_token(input, Token::Semi)?;
  Ok(take_inline_comment(input, semi.span.line))
}

/// Skips everything up to and including the `;` that closes the current statement.
fn skip_statement(input: &mut TokenStream) -> Result<Option<CommentLit>, SyntaxError> {
  let mut depth = 0usize;
  loop {
    let token = expect_next(input, "Semi")?;
    match &token.value {
      Token::Delimiter(Delimiter::BraceOpen | Delimiter::BracketOpen | Delimiter::ParenOpen) => depth += 1,
      Token::Delimiter(Delimiter::BraceClose | Delimiter::BracketClose | Delimiter::ParenClose) => depth = depth.saturating_sub(1),
      Token::Semi if depth == 0 => return Ok(take_inline_comment(input, token.span.line)),
      _ => {}
    }
  }
}

/// Skips the rest of a block whose opening brace was already consumed, returning the closing brace.
fn skip_block_body<'a>(input: &mut TokenStream<'a>) -> Result<&'a Positioned<Token>, SyntaxError> {
  let mut depth = 1usize;
  loop {
    let token = expect_next(input, "BraceClose")?;
    match &token.value {
      Token::Delimiter(Delimiter::BraceOpen) => depth += 1,
      Token::Delimiter(Delimiter::BraceClose) => {
        depth -= 1;
        if depth == 0 {
          return Ok(token);
        }
      }
      _ => {}
    }
  }
}

fn skip_block(input: &mut TokenStream) -> Result<(), SyntaxError> {
  loop {
    let token = expect_next(input, "BraceOpen")?;
    if token.value == Token::Delimiter(Delimiter::BraceOpen) {
      break;
    }
  }
  skip_block_body(input)?;
  Ok(())
}

fn skip_field_options(input: &mut TokenStream) -> Result<(), SyntaxError> {
  if !is_next(input, &Token::Delimiter(Delimiter::BracketOpen)) {
    return Ok(());
  }

  let mut depth = 0usize;
  loop {
    let token = expect_next(input, "BracketClose")?;
    match &token.value {
      Token::Delimiter(Delimiter::BracketOpen) => depth += 1,
      Token::Delimiter(Delimiter::BracketClose) => {
        depth -= 1;
        if depth == 0 {
          return Ok(());
        }
      }
      _ => {}
    }
  }
}

pub fn parse_program(input: &mut TokenStream) -> Result<Program, SyntaxError> {
  let mut body = Vec::new();
  loop {
    let comments = take_comments(input);
    let Some(token) = peek_significant(input) else {
      body.extend(comments.into_iter().map(ProgramItem::Comment));
      break;
    };

    let (detached, comments) = split_detached(comments, token.span.line);
    body.extend(detached.into_iter().map(ProgramItem::Comment));

    match &token.value {
      Token::Semi => {
        next_significant(input);
        body.extend(comments.into_iter().map(ProgramItem::Comment));
      }
      Token::Ident(keyword) => match keyword.as_str() {
        "syntax" | "edition" => {
          body.extend(comments.into_iter().map(ProgramItem::Comment));
          body.push(ProgramItem::Syntax(parse_syntax(input)?));
        }
        "package" => body.push(ProgramItem::Package(parse_package(input, comments)?)),
        "import" => {
          body.extend(comments.into_iter().map(ProgramItem::Comment));
          body.push(ProgramItem::Import(parse_import(input)?));
        }
        "option" => {
          body.extend(comments.into_iter().map(ProgramItem::Comment));
          trace!("skipping file option");
          if let Some(inline) = skip_statement(input)? {
            body.push(ProgramItem::Comment(inline));
          }
        }
        "service" => body.push(ProgramItem::Service(parse_service(input, comments)?)),
        "message" => body.push(ProgramItem::Message(parse_message(input, comments)?)),
        "enum" => body.push(ProgramItem::Enum(parse_enum(input, comments)?)),
        "extend" => {
          trace!("skipping extend block");
          skip_block(input)?;
        }
        _ => return Err(unexpected(token, "syntax, package, import, option, service, message or enum")),
      },
      _ => return Err(unexpected(token, "top-level declaration")),
    }
  }

  Ok(Program {
    body
  })
}

pub fn parse_syntax(input: &mut TokenStream) -> Result<SyntaxDeclaration, SyntaxError> {
  let token = expect_next(input, "syntax")?;
  if !is_keyword(token, "syntax") && !is_keyword(token, "edition") {
    return Err(unexpected(token, "syntax"));
  }
  expect_token(input, Token::Eq)?;
  let value = expect_string(input)?;
  let inline_comment = end_statement(input)?;

  Ok(SyntaxDeclaration {
    value,
    inline_comment,
  })
}

pub fn parse_package(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<PackageDeclaration, SyntaxError> {
  expect_keyword(input, "package")?;
  let name = parse_full_ident(input)?;
  let inline_comment = end_statement(input)?;

  Ok(PackageDeclaration {
    name,
    comments,
    inline_comment,
  })
}

pub fn parse_import(input: &mut TokenStream) -> Result<ImportDeclaration, SyntaxError> {
  expect_keyword(input, "import")?;
  let modifier = match peek_significant(input) {
    Some(token) if is_keyword(token, "public") || is_keyword(token, "weak") => Some(expect_ident(input)?),
    _ => None,
  };
  let path = expect_string(input)?;
  let inline_comment = end_statement(input)?;

  Ok(ImportDeclaration {
    path,
    modifier,
    inline_comment,
  })
}

pub fn parse_service(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<ServiceDeclaration, SyntaxError> {
  expect_keyword(input, "service")?;
  let name = expect_ident(input)?;
  let open = expect_token(input, Token::Delimiter(Delimiter::BraceOpen))?;
  let mut inline_comment = take_inline_comment(input, open.span.line);

  let mut rpcs = Vec::new();
  loop {
    let rpc_comments = take_comments(input);
    let token = peek_significant(input).ok_or_else(|| SyntaxError::eof("rpc or BraceClose"))?;
    let (detached, rpc_comments) = split_detached(rpc_comments, token.span.line);
    if !detached.is_empty() {
      trace!("dropping {} detached comments in service {}", detached.len(), name.value.0);
    }

    match &token.value {
      Token::Delimiter(Delimiter::BraceClose) => {
        next_significant(input);
        if inline_comment.is_none() {
          inline_comment = take_inline_comment(input, token.span.line);
        }
        break;
      }
      Token::Semi => {
        next_significant(input);
      }
      Token::Ident(keyword) if keyword == "rpc" => rpcs.push(parse_rpc(input, rpc_comments)?),
      Token::Ident(keyword) if keyword == "option" => {
        skip_statement(input)?;
      }
      _ => return Err(unexpected(token, "rpc, option or BraceClose")),
    }
  }

  Ok(ServiceDeclaration {
    name,
    rpcs,
    comments,
    inline_comment,
  })
}

pub fn parse_rpc(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<RpcDeclaration, SyntaxError> {
  expect_keyword(input, "rpc")?;
  let name = expect_ident(input)?;
  let request = parse_rpc_message(input)?;
  expect_keyword(input, "returns")?;
  let response = parse_rpc_message(input)?;

  let token = expect_next(input, "Semi or BraceOpen")?;
  let inline_comment = match &token.value {
    Token::Semi => take_inline_comment(input, token.span.line),
    Token::Delimiter(Delimiter::BraceOpen) => {
      let inline = take_inline_comment(input, token.span.line);
      trace!("skipping options of rpc {}", name.value.0);
      let close = skip_block_body(input)?;
      if is_next(input, &Token::Semi) {
        next_significant(input);
      }
      match inline {
        Some(inline) => Some(inline),
        None => take_inline_comment(input, close.span.line),
      }
    }
    _ => return Err(unexpected(token, "Semi or BraceOpen")),
  };

  Ok(RpcDeclaration {
    name,
    request,
    response,
    comments,
    inline_comment,
  })
}

fn parse_rpc_message(input: &mut TokenStream) -> Result<RpcMessage, SyntaxError> {
  expect_token(input, Token::Delimiter(Delimiter::ParenOpen))?;

  // `stream` is a marker only when a type name follows it
  let stream = peek_significant(input).is_some_and(|token| is_keyword(token, "stream"))
    && peek_nth_significant(input, 1).is_some_and(|token| matches!(token.value, Token::Ident(_) | Token::Dot));
  if stream {
    next_significant(input);
  }

  let name = parse_full_ident(input)?;
  expect_token(input, Token::Delimiter(Delimiter::ParenClose))?;

  Ok(RpcMessage {
    name,
    stream,
  })
}

pub fn parse_message(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<MessageDeclaration, SyntaxError> {
  expect_keyword(input, "message")?;
  let name = expect_ident(input)?;
  let open = expect_token(input, Token::Delimiter(Delimiter::BraceOpen))?;
  let mut inline_comment = take_inline_comment(input, open.span.line);

  let mut body = Vec::new();
  loop {
    let item_comments = take_comments(input);
    let token = peek_significant(input).ok_or_else(|| SyntaxError::eof("field or BraceClose"))?;
    let (detached, item_comments) = split_detached(item_comments, token.span.line);
    if !detached.is_empty() {
      trace!("dropping {} detached comments in message {}", detached.len(), name.value.0);
    }

    match &token.value {
      Token::Delimiter(Delimiter::BraceClose) => {
        next_significant(input);
        if inline_comment.is_none() {
          inline_comment = take_inline_comment(input, token.span.line);
        }
        break;
      }
      Token::Semi => {
        next_significant(input);
      }
      Token::Ident(keyword) => match keyword.as_str() {
        "message" => body.push(MessageItem::Message(parse_message(input, item_comments)?)),
        "enum" => body.push(MessageItem::Enum(parse_enum(input, item_comments)?)),
        "oneof" => body.push(MessageItem::Oneof(parse_oneof(input, item_comments)?)),
        "map" if peek_nth_significant(input, 1).is_some_and(|token| token.value == Token::Lt) => {
          body.push(MessageItem::MapField(parse_map_field(input, item_comments)?))
        }
        "option" | "reserved" | "extensions" => {
          trace!("skipping {} in message {}", keyword, name.value.0);
          skip_statement(input)?;
        }
        "extend" => skip_block(input)?,
        _ => body.push(MessageItem::Field(parse_field(input, item_comments)?)),
      },
      Token::Dot => body.push(MessageItem::Field(parse_field(input, item_comments)?)),
      _ => return Err(unexpected(token, "field, message, enum, oneof or BraceClose")),
    }
  }

  Ok(MessageDeclaration {
    name,
    body,
    comments,
    inline_comment,
  })
}

pub fn parse_field(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<FieldDeclaration, SyntaxError> {
  let label = match peek_significant(input) {
    Some(token) => match &token.value {
      // a label is always followed by the type, never directly by the field name and `=`
      Token::Ident(keyword) if peek_nth_significant(input, 2).is_some_and(|it| it.value != Token::Eq) => {
        FieldLabel::from_keyword(keyword).map(|label| token.span.wrap(label))
      }
      _ => None,
    },
    None => None,
  };
  if label.is_some() {
    next_significant(input);
  }

  let kind = parse_full_ident(input)?;
  let name = expect_ident(input)?;
  expect_token(input, Token::Eq)?;
  let number = expect_number(input)?;
  skip_field_options(input)?;
  let inline_comment = end_statement(input)?;

  Ok(FieldDeclaration {
    label,
    kind,
    name,
    number,
    comments,
    inline_comment,
  })
}

pub fn parse_map_field(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<MapFieldDeclaration, SyntaxError> {
  expect_keyword(input, "map")?;
  expect_token(input, Token::Lt)?;
  let key_kind = parse_full_ident(input)?;
  expect_token(input, Token::Comma)?;
  let value_kind = parse_full_ident(input)?;
  expect_token(input, Token::Gt)?;
  let name = expect_ident(input)?;
  expect_token(input, Token::Eq)?;
  let number = expect_number(input)?;
  skip_field_options(input)?;
  let inline_comment = end_statement(input)?;

  Ok(MapFieldDeclaration {
    key_kind,
    value_kind,
    name,
    number,
    comments,
    inline_comment,
  })
}

pub fn parse_oneof(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<OneofDeclaration, SyntaxError> {
  expect_keyword(input, "oneof")?;
  let name = expect_ident(input)?;
  let open = expect_token(input, Token::Delimiter(Delimiter::BraceOpen))?;
  let inline_comment = take_inline_comment(input, open.span.line);

  let mut fields = Vec::new();
  loop {
    let field_comments = take_comments(input);
    let token = peek_significant(input).ok_or_else(|| SyntaxError::eof("field or BraceClose"))?;
    let (_, field_comments) = split_detached(field_comments, token.span.line);

    match &token.value {
      Token::Delimiter(Delimiter::BraceClose) => {
        next_significant(input);
        break;
      }
      Token::Semi => {
        next_significant(input);
      }
      Token::Ident(keyword) if keyword == "option" => {
        skip_statement(input)?;
      }
      Token::Ident(_) | Token::Dot => fields.push(parse_field(input, field_comments)?),
      _ => return Err(unexpected(token, "field or BraceClose")),
    }
  }

  Ok(OneofDeclaration {
    name,
    fields,
    comments,
    inline_comment,
  })
}

pub fn parse_enum(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<EnumDeclaration, SyntaxError> {
  expect_keyword(input, "enum")?;
  let name = expect_ident(input)?;
  let open = expect_token(input, Token::Delimiter(Delimiter::BraceOpen))?;
  let mut inline_comment = take_inline_comment(input, open.span.line);

  let mut constants = Vec::new();
  loop {
    let constant_comments = take_comments(input);
    let token = peek_significant(input).ok_or_else(|| SyntaxError::eof("enum constant or BraceClose"))?;
    let (_, constant_comments) = split_detached(constant_comments, token.span.line);

    match &token.value {
      Token::Delimiter(Delimiter::BraceClose) => {
        next_significant(input);
        if inline_comment.is_none() {
          inline_comment = take_inline_comment(input, token.span.line);
        }
        break;
      }
      Token::Semi => {
        next_significant(input);
      }
      Token::Ident(keyword) if keyword == "option" || keyword == "reserved" => {
        trace!("skipping {} in enum {}", keyword, name.value.0);
        skip_statement(input)?;
      }
      Token::Ident(_) => constants.push(parse_enum_constant(input, constant_comments)?),
      _ => return Err(unexpected(token, "enum constant or BraceClose")),
    }
  }

  Ok(EnumDeclaration {
    name,
    constants,
    comments,
    inline_comment,
  })
}

pub fn parse_enum_constant(input: &mut TokenStream, comments: Vec<CommentLit>) -> Result<EnumConstantDeclaration, SyntaxError> {
  let name = expect_ident(input)?;
  expect_token(input, Token::Eq)?;
  let value = expect_number(input)?;
  skip_field_options(input)?;
  let inline_comment = end_statement(input)?;

  Ok(EnumConstantDeclaration {
    name,
    value,
    comments,
    inline_comment,
  })
}

#[cfg(test)]
mod tests {
  use test_log::test;
  use tracing::debug;

  use super::*;

  fn parse(input: &str) -> Program {
    let program = parse_source(input).unwrap();
    debug!("{:?}", program);
    program
  }

  #[test]
  fn tokenizes_comments_strings_and_numbers() {
    let tokens = tokenizer(r#"
      // leading
      option x = "a \"quoted\" value"; /* block
      comment */ enum E { A = -1; }
    "#).unwrap();
    let values = tokens.iter().map(|it| it.value.clone()).collect_vec();

    assert_eq!(values[0], Token::Comment(Comment::Line("// leading".to_owned())));
    assert_eq!(values[1], Token::Ident("option".to_owned()));
    assert_eq!(values[4], Token::String("a \"quoted\" value".to_owned()));
    assert_eq!(values[5], Token::Semi);
    assert_eq!(values[6], Token::Comment(Comment::Block("/* block\n      comment */".to_owned())));
    assert_eq!(values[12], Token::Number("-1".to_owned()));

    assert_eq!(tokens[0].span.line, 2);
    assert_eq!(tokens[0].span.column, 7);
    assert_eq!(tokens[6].span.line, 3);
  }

  #[test]
  fn rejects_unknown_characters() {
    let error = tokenizer("message A { int32 a = 1; } #").unwrap_err();
    assert!(error.message().contains("unrecognized character"));
    assert_eq!(error.span().column, 28);
  }

  #[test]
  fn rejects_unterminated_block_comment() {
    assert!(tokenizer("/* never closed").is_err());
  }

  #[test]
  fn parses_services_and_stream_flags() {
    let program = parse(r#"
      syntax = "proto3";
      package demo.v1;

      import "google/protobuf/empty.proto";

      // Greeter greets.
      service Greeter {
        // Says hello.
        rpc Hello(HelloRequest) returns (HelloReply); // inline
        rpc Chat(stream Note) returns (stream .demo.v1.Note) {
          option deprecated = true;
        }
        rpc Upload(stream Chunk) returns (google.protobuf.Empty);
      }
    "#);

    let service = program.body.iter().find_map(|item| match item {
      ProgramItem::Service(service) => Some(service),
      _ => None,
    }).unwrap();
    assert_eq!(service.name.value.0, "Greeter");
    assert_eq!(service.comments.len(), 1);
    assert_eq!(service.rpcs.len(), 3);

    let hello = &service.rpcs[0];
    assert_eq!(hello.request.name.value.0, "HelloRequest");
    assert!(!hello.request.stream && !hello.response.stream);
    assert_eq!(hello.comments[0].lines(), vec![" Says hello."]);
    assert_eq!(hello.inline_comment.as_ref().unwrap().lines(), vec![" inline"]);

    let chat = &service.rpcs[1];
    assert!(chat.request.stream && chat.response.stream);
    assert_eq!(chat.response.name.value.0, ".demo.v1.Note");

    let upload = &service.rpcs[2];
    assert!(upload.request.stream && !upload.response.stream);
    assert_eq!(upload.response.name.value.0, "google.protobuf.Empty");

    let package = program.body.iter().find_map(|item| match item {
      ProgramItem::Package(package) => Some(package),
      _ => None,
    }).unwrap();
    assert_eq!(package.name.value.0, "demo.v1");
  }

  #[test]
  fn parses_nested_messages_maps_and_oneofs() {
    let program = parse(r#"
      message Outer {
        option (custom) = { a: 1 };
        reserved 4, 5;
        message Inner {
          repeated string tags = 1 [deprecated = true];
        }
        enum Kind {
          option allow_alias = true;
          KIND_UNSPECIFIED = 0;
          KIND_OTHER = -1; // negative
        }
        map<string, Inner> inners = 1;
        optional Kind kind = 2;
        oneof choice {
          string text = 3;
          .pkg.Other other = 6;
        }
      }
    "#);

    let outer = match &program.body[0] {
      ProgramItem::Message(message) => message,
      other => panic!("unexpected item {:?}", other),
    };
    assert_eq!(outer.body.len(), 5);

    match &outer.body[0] {
      MessageItem::Message(inner) => match &inner.body[0] {
        MessageItem::Field(field) => {
          assert!(field.is_repeated());
          assert_eq!(field.kind.value.0, "string");
          assert_eq!(field.name.value.0, "tags");
        }
        other => panic!("unexpected item {:?}", other),
      },
      other => panic!("unexpected item {:?}", other),
    }

    match &outer.body[1] {
      MessageItem::Enum(kind) => {
        assert_eq!(kind.constants.len(), 2);
        assert_eq!(kind.constants[1].value.value.0, "-1");
        assert_eq!(kind.constants[1].inline_comment.as_ref().unwrap().lines(), vec![" negative"]);
      }
      other => panic!("unexpected item {:?}", other),
    }

    match &outer.body[2] {
      MessageItem::MapField(map) => {
        assert_eq!(map.key_kind.value.0, "string");
        assert_eq!(map.value_kind.value.0, "Inner");
        assert_eq!(map.name.value.0, "inners");
      }
      other => panic!("unexpected item {:?}", other),
    }

    match &outer.body[3] {
      MessageItem::Field(field) => {
        assert_eq!(field.label.as_ref().map(|it| it.value), Some(FieldLabel::Optional));
        assert!(!field.is_repeated());
      }
      other => panic!("unexpected item {:?}", other),
    }

    match &outer.body[4] {
      MessageItem::Oneof(oneof) => {
        assert_eq!(oneof.name.value.0, "choice");
        assert_eq!(oneof.fields[1].kind.value.0, ".pkg.Other");
      }
      other => panic!("unexpected item {:?}", other),
    }
  }

  #[test]
  fn field_named_like_a_label() {
    let program = parse("message M { string optional = 1; repeated int32 repeated = 2; }");
    let message = match &program.body[0] {
      ProgramItem::Message(message) => message,
      other => panic!("unexpected item {:?}", other),
    };
    match (&message.body[0], &message.body[1]) {
      (MessageItem::Field(first), MessageItem::Field(second)) => {
        assert!(first.label.is_none());
        assert_eq!(first.name.value.0, "optional");
        assert!(second.is_repeated());
        assert_eq!(second.name.value.0, "repeated");
      }
      other => panic!("unexpected items {:?}", other),
    }
  }

  #[test]
  fn detached_comments_stay_at_file_level() {
    let program = parse(r#"
      // Copyright notice

      // Domain: billing
      syntax = "proto3"; // syntax note

      /* Detached block */

      // Attached to the message
      message M {}
    "#);

    let comments = program.body.iter().filter_map(|item| match item {
      ProgramItem::Comment(comment) => Some(comment.lines().join("\n")),
      _ => None,
    }).collect_vec();
    assert_eq!(comments, vec![" Copyright notice", " Domain: billing", " Detached block "]);

    let syntax = program.body.iter().find_map(|item| match item {
      ProgramItem::Syntax(syntax) => Some(syntax),
      _ => None,
    }).unwrap();
    assert_eq!(syntax.value.value.0, "proto3");
    assert!(syntax.inline_comment.is_some());

    let message = program.body.iter().find_map(|item| match item {
      ProgramItem::Message(message) => Some(message),
      _ => None,
    }).unwrap();
    assert_eq!(message.comments.len(), 1);
    assert_eq!(message.comments[0].lines(), vec![" Attached to the message"]);
  }

  #[test]
  fn comment_lines() {
    assert_eq!(CommentLit::line("/ doc style").lines(), vec![" doc style"]);
    assert_eq!(CommentLit::block("*\n * one\n * two\n ").lines(), vec!["*", " * one", " * two", " "]);
  }

  #[test]
  fn reports_missing_semicolon() {
    let error = parse_source("message M { int32 a = 1 }").unwrap_err();
    assert!(error.message().contains("expected Semi"), "{}", error);
  }

  #[test]
  fn reports_unexpected_eof() {
    let error = parse_source("service S {").unwrap_err();
    assert!(error.message().contains("unexpected end of input"));
    assert_eq!((error.span().line, error.span().column), (1, 11));
    assert_eq!(error.to_string(), "unexpected end of input, expected rpc or BraceClose (line 1, column 11)");

    let error = parse_source("message A {\n  int32 a = 1;\n  string b").unwrap_err();
    assert_eq!((error.span().line, error.span().column), (3, 10));
  }

  #[test]
  fn skips_options_with_negative_identifiers() {
    let tokens = tokenizer("-inf -1").unwrap();
    assert_eq!(tokens[0].value, Token::Minus);
    assert_eq!(tokens[1].value, Token::Ident("inf".to_owned()));
    assert_eq!(tokens[2].value, Token::Number("-1".to_owned()));

    let program = parse(r#"
      option (my.limit) = -inf;
      message M {
        double low = 1 [default = -inf];
        double high = 2;
      }
    "#);
    let ProgramItem::Message(message) = &program.body[0] else {
      panic!("expected message, got {:?}", program.body[0]);
    };
    assert_eq!(message.body.len(), 2);
  }
}
