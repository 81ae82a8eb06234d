//! First pass over the declaration tree.
//!
//! Produces the services with their bound request/response messages and the flat
//! message and enum catalogs keyed by qualified name. Nothing here resolves field
//! types: that needs the complete catalogs and happens in [`crate::assemble`].

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use thiserror::Error;
use tracing::debug;

use crate::comment::{compose_head, compose_head_and_inline};
use crate::config::{EMPTY_MESSAGE, MISSING_PACKAGE, SCOPE_SEPARATOR};
use crate::hl::{Enum, EnumField, Extensions, RpcKind};
use crate::{
  CommentLit, EnumDeclaration, FieldDeclaration, MessageDeclaration, MessageItem, Program, ProgramItem, RpcDeclaration,
  RpcMessage, ServiceDeclaration,
};

#[derive(Debug, Error)]
pub enum ModelError {
  #[error("{role} of {service}.{method} refers to message {message:?}, which is not declared in the file")]
  MissingMessage {
    role: PayloadRole,
    message: String,
    service: String,
    method: String,
  },
  #[error("message {0:?} is declared more than once")]
  DuplicateMessage(String),
  #[error("enum {0:?} is declared more than once")]
  DuplicateEnum(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadRole {
  Request,
  Response,
}

impl Display for PayloadRole {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      PayloadRole::Request => f.write_str("request"),
      PayloadRole::Response => f.write_str("response"),
    }
  }
}

/// A field as declared, type not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
  pub comment: String,
  pub name: String,
  pub type_name: String,
  pub key_type_name: Option<String>,
  pub repeated: bool,
  pub enclosing_scope: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPayload {
  pub type_name: String,
  pub params: Vec<RawField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawEndpoint {
  pub method_name: String,
  pub kind: RpcKind,
  pub request: RawPayload,
  pub response: RawPayload,
  pub comment: String,
  pub extensions: Extensions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawService {
  pub comment: String,
  pub package_name: String,
  pub service_name: String,
  pub operations: Vec<RawEndpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
  pub comment: String,
  pub name: String,
  pub attrs: Vec<RawField>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawModel {
  pub services: Vec<RawService>,
  /// Every declared message, depth-first in declaration order.
  pub messages: Vec<RawMessage>,
  /// Every declared enum, depth-first in declaration order.
  pub enums: Vec<Enum>,
}

/// `scope.name`, or just `name` at file level.
pub fn qualify(scope: &str, name: &str) -> String {
  if scope.is_empty() {
    name.to_owned()
  } else {
    format!("{}{}{}", scope, SCOPE_SEPARATOR, name)
  }
}

pub fn build(program: &Program) -> Result<RawModel, ModelError> {
  let package_name = extract_package_name(program);
  let (_, file_extensions) = compose_head(&file_comments(program), &Extensions::new());
  debug!("package {} with file extensions {:?}", package_name, file_extensions);

  let mut declarations = Declarations::default();
  for item in &program.body {
    match item {
      ProgramItem::Message(message) => declarations.add_message(message, "")?,
      ProgramItem::Enum(declaration) => declarations.add_enum(declaration, "")?,
      _ => {}
    }
  }
  debug!("collected {} messages and {} enums", declarations.messages.len(), declarations.enums.len());

  let services = program.body.iter()
    .filter_map(|item| match item {
      ProgramItem::Service(service) => Some(service),
      _ => None,
    })
    .map(|service| compose_service(service, program, &package_name, &file_extensions))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(RawModel {
    services,
    messages: declarations.messages,
    enums: declarations.enums,
  })
}

fn extract_package_name(program: &Program) -> String {
  program.body.iter()
    .find_map(|item| match item {
      ProgramItem::Package(package) => Some(package.name.value.0.to_owned()),
      _ => None,
    })
    .unwrap_or_else(|| MISSING_PACKAGE.to_owned())
}

/// Free-standing comments plus everything attached to the package statement.
fn file_comments(program: &Program) -> Vec<CommentLit> {
  let mut comments = Vec::new();
  for item in &program.body {
    match item {
      ProgramItem::Comment(comment) => comments.push(comment.clone()),
      ProgramItem::Package(package) => {
        comments.extend(package.comments.iter().cloned());
        comments.extend(package.inline_comment.clone());
      }
      ProgramItem::Syntax(_) | ProgramItem::Import(_) | ProgramItem::Service(_) | ProgramItem::Message(_) | ProgramItem::Enum(_) => {}
    }
  }
  comments
}

fn compose_service(
  service: &ServiceDeclaration,
  program: &Program,
  package_name: &str,
  file_extensions: &Extensions,
) -> Result<RawService, ModelError> {
  let service_name = service.name.value.0.to_owned();
  let (comment, service_extensions) = compose_head(&service.comments, file_extensions);
  let operations = service.rpcs.iter()
    .map(|rpc| compose_endpoint(rpc, program, &service_name, &service_extensions))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(RawService {
    comment,
    package_name: package_name.to_owned(),
    service_name,
    operations,
  })
}

fn compose_endpoint(
  rpc: &RpcDeclaration,
  program: &Program,
  service_name: &str,
  service_extensions: &Extensions,
) -> Result<RawEndpoint, ModelError> {
  let method_name = rpc.name.value.0.to_owned();
  let (comment, extensions) = compose_head_and_inline(&rpc.comments, rpc.inline_comment.as_ref(), "\n", service_extensions);
  let kind = RpcKind::from_streams(rpc.request.stream, rpc.response.stream);
  let request = compose_payload(program, &rpc.request, PayloadRole::Request, service_name, &method_name)?;
  let response = compose_payload(program, &rpc.response, PayloadRole::Response, service_name, &method_name)?;

  Ok(RawEndpoint {
    method_name,
    kind,
    request,
    response,
    comment,
    extensions,
  })
}

fn compose_payload(
  program: &Program,
  reference: &RpcMessage,
  role: PayloadRole,
  service_name: &str,
  method_name: &str,
) -> Result<RawPayload, ModelError> {
  let type_name = reference.name.value.0.to_owned();
  if let Some(message) = find_message(program, &type_name) {
    return Ok(RawPayload {
      params: compose_fields(message, &type_name),
      type_name,
    });
  }

  if type_name == EMPTY_MESSAGE {
    debug!("{} of {}.{} is the well-known empty message", role, service_name, method_name);
    return Ok(RawPayload {
      type_name,
      params: Vec::new(),
    });
  }

  Err(ModelError::MissingMessage {
    role,
    message: type_name,
    service: service_name.to_owned(),
    method: method_name.to_owned(),
  })
}

/// RPC bodies are looked up among top-level messages only.
fn find_message<'p>(program: &'p Program, name: &str) -> Option<&'p MessageDeclaration> {
  program.body.iter().find_map(|item| match item {
    ProgramItem::Message(message) if message.name.value.0 == name => Some(message),
    _ => None,
  })
}

fn compose_fields(message: &MessageDeclaration, enclosing_scope: &str) -> Vec<RawField> {
  let mut fields = Vec::with_capacity(message.body.len());
  for item in &message.body {
    match item {
      MessageItem::Field(field) => fields.push(compose_field(field, enclosing_scope)),
      MessageItem::MapField(map) => {
        let (comment, _) = compose_head_and_inline(&map.comments, map.inline_comment.as_ref(), " ", &Extensions::new());
        fields.push(RawField {
          comment,
          name: map.name.value.0.to_owned(),
          type_name: map.value_kind.value.0.to_owned(),
          key_type_name: Some(map.key_kind.value.0.to_owned()),
          repeated: false,
          enclosing_scope: enclosing_scope.to_owned(),
        });
      }
      MessageItem::Oneof(oneof) => fields.extend(oneof.fields.iter().map(|field| compose_field(field, enclosing_scope))),
      MessageItem::Message(_) | MessageItem::Enum(_) => {}
    }
  }
  fields
}

fn compose_field(field: &FieldDeclaration, enclosing_scope: &str) -> RawField {
  let (comment, _) = compose_head_and_inline(&field.comments, field.inline_comment.as_ref(), " ", &Extensions::new());
  RawField {
    comment,
    name: field.name.value.0.to_owned(),
    type_name: field.kind.value.0.to_owned(),
    key_type_name: None,
    repeated: field.is_repeated(),
    enclosing_scope: enclosing_scope.to_owned(),
  }
}

#[derive(Default)]
struct Declarations {
  messages: Vec<RawMessage>,
  enums: Vec<Enum>,
  message_names: HashSet<String>,
  enum_names: HashSet<String>,
}

impl Declarations {
  fn add_message(&mut self, message: &MessageDeclaration, scope: &str) -> Result<(), ModelError> {
    let name = qualify(scope, &message.name.value.0);
    if !self.message_names.insert(name.clone()) {
      return Err(ModelError::DuplicateMessage(name));
    }

    let (comment, _) = compose_head(&message.comments, &Extensions::new());
    self.messages.push(RawMessage {
      comment,
      attrs: compose_fields(message, &name),
      name: name.clone(),
    });

    for item in &message.body {
      match item {
        MessageItem::Message(nested) => self.add_message(nested, &name)?,
        MessageItem::Enum(nested) => self.add_enum(nested, &name)?,
        MessageItem::Field(_) | MessageItem::MapField(_) | MessageItem::Oneof(_) => {}
      }
    }
    Ok(())
  }

  fn add_enum(&mut self, declaration: &EnumDeclaration, scope: &str) -> Result<(), ModelError> {
    let name = qualify(scope, &declaration.name.value.0);
    if !self.enum_names.insert(name.clone()) {
      return Err(ModelError::DuplicateEnum(name));
    }

    let (comment, _) = compose_head(&declaration.comments, &Extensions::new());
    let constants = declaration.constants.iter()
      .map(|constant| EnumField {
        comment: compose_head_and_inline(&constant.comments, constant.inline_comment.as_ref(), " ", &Extensions::new()).0,
        name: constant.name.value.0.to_owned(),
        value: constant.value.value.0.to_owned(),
        enclosing_scope: name.clone(),
      })
      .collect_vec();

    self.enums.push(Enum {
      comment,
      name,
      constants,
    });
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::config::{X_CATEGORY_EXTENSION, X_DOMAIN_EXTENSION};
  use crate::span::Positioned;
  use crate::{parse_source, Identifier};

  fn build_source(input: &str) -> Result<RawModel, ModelError> {
    build(&parse_source(input).unwrap())
  }

  #[test]
  fn derives_rpc_kinds() {
    let model = build_source(r#"
      package demo;
      service S {
        rpc A(M) returns (M);
        rpc B(stream M) returns (M);
        rpc C(M) returns (stream M);
        rpc D(stream M) returns (stream M);
      }
      message M {}
    "#).unwrap();

    let kinds = model.services[0].operations.iter().map(|op| op.kind).collect_vec();
    assert_eq!(kinds, vec![RpcKind::Unary, RpcKind::ClientStreaming, RpcKind::ServerStreaming, RpcKind::BidirectionalStreaming]);
  }

  #[test]
  fn binds_request_fields_and_empty_sentinel() {
    let model = build_source(r#"
      package demo;
      service S {
        rpc M(Req) returns (google.protobuf.Empty);
      }
      message Req {
        // The name.
        string name = 1; // trailing
        map<string, int64> counters = 2;
        repeated Nested items = 3;
        oneof choice {
          int32 number = 4;
          string text = 5;
        }
        message Nested {}
      }
    "#).unwrap();

    let operation = &model.services[0].operations[0];
    assert_eq!(operation.request.type_name, "Req");
    assert_eq!(operation.response.type_name, "google.protobuf.Empty");
    assert!(operation.response.params.is_empty());

    let params = &operation.request.params;
    assert_eq!(params.iter().map(|it| it.name.as_str()).collect_vec(), vec!["name", "counters", "items", "number", "text"]);
    assert_eq!(params[0].comment, "The name. trailing");
    assert_eq!(params[0].enclosing_scope, "Req");
    assert_eq!(params[1].key_type_name.as_deref(), Some("string"));
    assert_eq!(params[1].type_name, "int64");
    assert!(params[2].repeated);
    assert!(params.iter().filter(|it| it.name != "counters").all(|it| it.key_type_name.is_none()));
  }

  #[test]
  fn missing_request_message_is_fatal() {
    let error = build_source(r#"
      package demo;
      service S {
        rpc Get(Missing) returns (google.protobuf.Empty);
      }
    "#).unwrap_err();

    match &error {
      ModelError::MissingMessage { role, message, service, method } => {
        assert_eq!(*role, PayloadRole::Request);
        assert_eq!(message, "Missing");
        assert_eq!(service, "S");
        assert_eq!(method, "Get");
      }
      other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(error.to_string(), "request of S.Get refers to message \"Missing\", which is not declared in the file");
  }

  #[test]
  fn nested_request_messages_are_not_bodies() {
    let error = build_source(r#"
      service S { rpc Get(Inner) returns (Outer); }
      message Outer { message Inner {} }
    "#).unwrap_err();
    assert!(matches!(error, ModelError::MissingMessage { role: PayloadRole::Request, .. }));
  }

  #[test]
  fn flattens_nested_declarations_depth_first() {
    let model = build_source(r#"
      message A {
        message B {
          enum E { E_ZERO = 0; }
          Leaf leaf = 1;
        }
        enum F { F_ZERO = 0; /* zero */ }
      }
      enum Top { TOP_ZERO = 0; }
      message C {}
    "#).unwrap();

    assert_eq!(model.messages.iter().map(|it| it.name.as_str()).collect_vec(), vec!["A", "A.B", "C"]);
    assert_eq!(model.enums.iter().map(|it| it.name.as_str()).collect_vec(), vec!["A.B.E", "A.F", "Top"]);
    assert_eq!(model.messages[1].attrs[0].enclosing_scope, "A.B");

    let f = &model.enums[1];
    assert_eq!(f.constants[0].name, "F_ZERO");
    assert_eq!(f.constants[0].value, "0");
    assert_eq!(f.constants[0].comment, "zero");
    assert_eq!(f.constants[0].enclosing_scope, "A.F");
  }

  #[test]
  fn rejects_duplicate_declarations() {
    let error = build_source("message A {} message A {}").unwrap_err();
    assert!(matches!(error, ModelError::DuplicateMessage(name) if name == "A"));

    let error = build_source("message A { enum E { X = 0; } enum E { Y = 0; } }").unwrap_err();
    assert!(matches!(error, ModelError::DuplicateEnum(name) if name == "A.E"));

    let model = build_source("message A {} enum A { X = 0; }").unwrap();
    assert_eq!(model.messages.len(), 1);
    assert_eq!(model.enums.len(), 1);
  }

  #[test]
  fn threads_extensions_from_file_to_method() {
    let model = build_source(r#"
      // Domain: billing

      syntax = "proto3";

      // Category: general
      package demo;

      // Invoices.
      service Invoices {
        // Lists invoices.
        // Category: listing
        rpc List(M) returns (M); // Paged.
        rpc Get(M) returns (M);
      }

      /* Domain: other */
      service Other {
        rpc Get(M) returns (M);
      }
      message M {}
    "#).unwrap();

    let invoices = &model.services[0];
    assert_eq!(invoices.comment, "Invoices.");
    assert_eq!(invoices.package_name, "demo");

    let list = &invoices.operations[0];
    assert_eq!(list.comment, "Lists invoices.\nPaged.");
    assert_eq!(list.extensions.get(X_DOMAIN_EXTENSION).map(String::as_str), Some("billing"));
    assert_eq!(list.extensions.get(X_CATEGORY_EXTENSION).map(String::as_str), Some("listing"));

    let get = &invoices.operations[1];
    assert_eq!(get.extensions.get(X_CATEGORY_EXTENSION).map(String::as_str), Some("general"));

    let other = &model.services[1].operations[0];
    assert_eq!(model.services[1].comment, "");
    assert_eq!(other.extensions.get(X_DOMAIN_EXTENSION).map(String::as_str), Some("other"));
    assert_eq!(other.extensions.get(X_CATEGORY_EXTENSION).map(String::as_str), Some("general"));
  }

  #[test]
  fn statement_comments_do_not_seed_file_extensions() {
    let model = build_source(r#"
      syntax = "proto3"; // Domain: ignored
      import "other.proto"; // Category: ignored
      package demo; // Domain: kept
      service S { rpc M(google.protobuf.Empty) returns (google.protobuf.Empty); }
    "#).unwrap();

    let extensions = &model.services[0].operations[0].extensions;
    assert_eq!(extensions.get(X_DOMAIN_EXTENSION).map(String::as_str), Some("kept"));
    assert_eq!(extensions.get(X_CATEGORY_EXTENSION), None);
  }

  #[test]
  fn missing_package_statement() {
    let model = build_source("service S { rpc M(google.protobuf.Empty) returns (google.protobuf.Empty); }").unwrap();
    assert_eq!(model.services[0].package_name, MISSING_PACKAGE);
  }

  #[test]
  fn builds_from_a_hand_made_tree() {
    let message = |name: &str| RpcMessage {
      name: Positioned::identity(Identifier(name.to_owned())),
      stream: false,
    };
    let program = Program {
      body: vec![
        ProgramItem::Comment(CommentLit::line(" x-category: health")),
        ProgramItem::Service(ServiceDeclaration {
          name: Positioned::identity(Identifier("Health".to_owned())),
          rpcs: vec![RpcDeclaration {
            name: Positioned::identity(Identifier("Ping".to_owned())),
            request: message(EMPTY_MESSAGE),
            response: message(EMPTY_MESSAGE),
            comments: vec![CommentLit::block("*\n   * Liveness check.\n   ")],
            inline_comment: None,
          }],
          comments: vec![],
          inline_comment: None,
        }),
      ],
    };

    let model = build(&program).unwrap();
    let ping = &model.services[0].operations[0];
    assert_eq!(ping.comment, "Liveness check.");
    assert_eq!(ping.extensions.get(X_CATEGORY_EXTENSION).map(String::as_str), Some("health"));
  }
}
