//! Resolved documentation model handed to renderers.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::config::{SCOPE_SEPARATOR, X_CATEGORY_EXTENSION, X_DOMAIN_EXTENSION};

pub type Extensions = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoFile {
  pub services: Vec<Service>,
  pub objects: Vec<Object>,
  pub enums: Vec<Enum>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Service {
  pub comment: String,
  pub package_name: String,
  pub service_name: String,
  pub operations: Vec<Endpoint>,
}

impl Service {
  pub fn anchor(&self) -> String {
    format!("service-{}", anchor_token(&self.service_name))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcKind {
  Unary,
  ClientStreaming,
  ServerStreaming,
  BidirectionalStreaming,
}

impl RpcKind {
  pub fn from_streams(request_streams: bool, response_streams: bool) -> Self {
    match (request_streams, response_streams) {
      (false, false) => RpcKind::Unary,
      (true, false) => RpcKind::ClientStreaming,
      (false, true) => RpcKind::ServerStreaming,
      (true, true) => RpcKind::BidirectionalStreaming,
    }
  }

  pub fn is_streaming(&self) -> bool {
    *self != RpcKind::Unary
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RpcKind::Unary => "unary",
      RpcKind::ClientStreaming => "client-streaming",
      RpcKind::ServerStreaming => "server-streaming",
      RpcKind::BidirectionalStreaming => "bidirectional-streaming",
    }
  }

  /// What travels in each direction, as a sentence fragment.
  pub fn description(&self) -> &'static str {
    match self {
      RpcKind::Unary => "the client sends a single request message and receives a single response message",
      RpcKind::ClientStreaming => "the client sends a stream of request messages and receives a single response message",
      RpcKind::ServerStreaming => "the client sends a single request message and receives a stream of response messages",
      RpcKind::BidirectionalStreaming => "the client sends a stream of request messages and receives a stream of response messages",
    }
  }
}

impl Display for RpcKind {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Streaming calls go over a websocket upgrade, hence `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
  Post,
  Get,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      HttpMethod::Post => "POST",
      HttpMethod::Get => "GET",
    }
  }
}

impl Display for HttpMethod {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
  pub package_name: String,
  pub service_name: String,
  pub method_name: String,
  pub url_path: String,
  pub http_method: HttpMethod,
  pub kind: RpcKind,
  pub request: Request,
  pub response: Response,
  pub comment: String,
  pub extensions: Extensions,
}

impl Endpoint {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    package_name: &str,
    service_name: &str,
    method_name: &str,
    kind: RpcKind,
    request: Request,
    response: Response,
    comment: String,
    extensions: Extensions,
  ) -> Self {
    let http_method = if kind.is_streaming() { HttpMethod::Get } else { HttpMethod::Post };
    Endpoint {
      package_name: package_name.to_owned(),
      service_name: service_name.to_owned(),
      method_name: method_name.to_owned(),
      url_path: format!("/{}/{}/{}", package_name, service_name, method_name),
      http_method,
      kind,
      request,
      response,
      comment,
      extensions,
    }
  }

  /// `package.Service/Method`
  pub fn full_name(&self) -> String {
    format!("{}.{}/{}", self.package_name, self.service_name, self.method_name)
  }

  pub fn operation_id(&self) -> &str {
    &self.method_name
  }

  /// First line of the comment.
  pub fn summary(&self) -> &str {
    match self.comment.split_once('\n') {
      Some((summary, _)) => summary,
      None => &self.comment,
    }
  }

  /// Everything after the first line of the comment.
  pub fn description(&self) -> &str {
    match self.comment.split_once('\n') {
      Some((_, description)) => description,
      None => "",
    }
  }

  pub fn x_domain(&self) -> Option<&str> {
    self.extensions.get(X_DOMAIN_EXTENSION).map(String::as_str)
  }

  pub fn x_category(&self) -> Option<&str> {
    self.extensions.get(X_CATEGORY_EXTENSION).map(String::as_str)
  }

  pub fn anchor(&self) -> String {
    format!("method-{}", anchor_token(&self.full_name()))
  }
}

/// Message bound as an RPC body, with its fields listed inline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
  pub type_name: String,
  pub params: Vec<Field>,
}

impl Payload {
  pub fn is_empty(&self) -> bool {
    self.params.is_empty()
  }
}

pub type Request = Payload;
pub type Response = Payload;

/// What a field's type token turned out to denote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
  Scalar(String),
  Enum(String),
  Object(String),
  Map(Box<FieldKind>, Box<FieldKind>),
  /// Declared nowhere in the file; rendered as written.
  Opaque(String),
}

impl FieldKind {
  /// The bare type name, without the `enum`/`message` decoration.
  pub fn name(&self) -> String {
    match self {
      FieldKind::Scalar(name) | FieldKind::Enum(name) | FieldKind::Object(name) | FieldKind::Opaque(name) => name.to_owned(),
      FieldKind::Map(key, value) => format!("map<{}, {}>", key.name(), value.name()),
    }
  }

  pub fn display(&self) -> String {
    match self {
      FieldKind::Scalar(name) => name.to_owned(),
      FieldKind::Enum(name) => format!("enum {}", name),
      FieldKind::Object(name) => format!("message {}", name),
      FieldKind::Map(key, value) => format!("map<{}, {}>", key.name(), value.name()),
      FieldKind::Opaque(name) => format!("({})", name),
    }
  }

  /// Cross-reference token of the catalog entry this kind points at.
  pub fn anchor(&self) -> Option<String> {
    match self {
      FieldKind::Enum(name) => Some(enum_anchor(name)),
      FieldKind::Object(name) => Some(object_anchor(name)),
      FieldKind::Scalar(_) | FieldKind::Map(..) | FieldKind::Opaque(_) => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub comment: String,
  pub name: String,
  pub type_name: String,
  pub key_type_name: Option<String>,
  pub repeated: bool,
  /// Qualified name of the declaring message.
  pub enclosing_scope: String,
  pub kind: FieldKind,
}

impl Field {
  pub fn type_display(&self) -> String {
    if self.type_name.is_empty() {
      return "(nil)".to_owned();
    }
    let base = self.kind.display();
    if self.repeated {
      format!("[]{}", base)
    } else {
      base
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
  pub comment: String,
  pub name: String,
  pub attrs: Vec<Field>,
}

impl Object {
  pub fn is_empty(&self) -> bool {
    self.attrs.is_empty()
  }

  pub fn anchor(&self) -> String {
    object_anchor(&self.name)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enum {
  pub comment: String,
  pub name: String,
  pub constants: Vec<EnumField>,
}

impl Enum {
  pub fn anchor(&self) -> String {
    enum_anchor(&self.name)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumField {
  pub comment: String,
  pub name: String,
  pub value: String,
  pub enclosing_scope: String,
}

pub fn object_anchor(name: &str) -> String {
  format!("message-{}", anchor_token(name))
}

pub fn enum_anchor(name: &str) -> String {
  format!("enum-{}", anchor_token(name))
}

/// Lowercase, scope separators and other punctuation dropped.
fn anchor_token(name: &str) -> String {
  name
    .split(SCOPE_SEPARATOR)
    .map(|part| part.chars().filter(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '-').collect::<String>())
    .join("")
    .to_lowercase()
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;

  fn field(type_name: &str, kind: FieldKind, repeated: bool) -> Field {
    Field {
      comment: String::new(),
      name: "f".to_owned(),
      type_name: type_name.to_owned(),
      key_type_name: None,
      repeated,
      enclosing_scope: String::new(),
      kind,
    }
  }

  #[test]
  fn rpc_kind_covers_every_stream_combination() {
    assert_eq!(RpcKind::from_streams(false, false), RpcKind::Unary);
    assert_eq!(RpcKind::from_streams(true, false), RpcKind::ClientStreaming);
    assert_eq!(RpcKind::from_streams(false, true), RpcKind::ServerStreaming);
    assert_eq!(RpcKind::from_streams(true, true), RpcKind::BidirectionalStreaming);
    assert_eq!(RpcKind::BidirectionalStreaming.to_string(), "bidirectional-streaming");
    assert!(RpcKind::ClientStreaming.description().contains("a stream of request messages"));
    assert!(RpcKind::ClientStreaming.description().ends_with("a single response message"));
  }

  #[test]
  fn endpoint_derives_path_and_method() {
    let unary = Endpoint::new("demo", "S", "M", RpcKind::Unary, Payload::default(), Payload::default(), String::new(), Extensions::new());
    assert_eq!(unary.url_path, "/demo/S/M");
    assert_eq!(unary.http_method, HttpMethod::Post);
    assert_eq!(unary.full_name(), "demo.S/M");
    assert_eq!(unary.anchor(), "method-demosm");

    let streaming = Endpoint::new("demo", "S", "Watch", RpcKind::ServerStreaming, Payload::default(), Payload::default(), String::new(), Extensions::new());
    assert_eq!(streaming.http_method.as_str(), "GET");
  }

  #[test]
  fn summary_and_description_split_on_first_line() {
    let mut endpoint = Endpoint::new("p", "S", "M", RpcKind::Unary, Payload::default(), Payload::default(), "Gets a thing.\nLonger text\nmore".to_owned(), Extensions::new());
    assert_eq!(endpoint.summary(), "Gets a thing.");
    assert_eq!(endpoint.description(), "Longer text\nmore");

    endpoint.comment = "Only a summary".to_owned();
    assert_eq!(endpoint.summary(), "Only a summary");
    assert_eq!(endpoint.description(), "");
  }

  #[test]
  fn extension_accessors() {
    let mut extensions = Extensions::new();
    extensions.insert(X_DOMAIN_EXTENSION.to_owned(), "billing".to_owned());
    let endpoint = Endpoint::new("p", "S", "M", RpcKind::Unary, Payload::default(), Payload::default(), String::new(), extensions);
    assert_eq!(endpoint.x_domain(), Some("billing"));
    assert_eq!(endpoint.x_category(), None);
  }

  #[test]
  fn field_type_display() {
    assert_eq!(field("string", FieldKind::Scalar("string".to_owned()), true).type_display(), "[]string");
    assert_eq!(field("Kind", FieldKind::Enum("Outer.Kind".to_owned()), false).type_display(), "enum Outer.Kind");
    assert_eq!(field("Inner", FieldKind::Object("Outer.Inner".to_owned()), false).type_display(), "message Outer.Inner");
    assert_eq!(field("Missing", FieldKind::Opaque("Missing".to_owned()), false).type_display(), "(Missing)");
    assert_eq!(field("", FieldKind::Opaque(String::new()), false).type_display(), "(nil)");

    let map = FieldKind::Map(Box::new(FieldKind::Scalar("string".to_owned())), Box::new(FieldKind::Object("Outer.Inner".to_owned())));
    assert_eq!(field("Inner", map, false).type_display(), "map<string, Outer.Inner>");
  }

  #[test]
  fn anchors() {
    assert_eq!(FieldKind::Object("Outer.Inner".to_owned()).anchor().as_deref(), Some("message-outerinner"));
    assert_eq!(FieldKind::Enum("Kind".to_owned()).anchor().as_deref(), Some("enum-kind"));
    assert_eq!(FieldKind::Scalar("int32".to_owned()).anchor(), None);
  }
}
