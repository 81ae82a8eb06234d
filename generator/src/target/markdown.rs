//! Markdown reference document with a linked table of contents.

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use protodoc_parser::hl::{enum_anchor, object_anchor, Endpoint, Enum, Field, FieldKind, Object, Payload, ProtoFile, Service};

use crate::target::doc::doc_to_markdown;

const TITLE_ANCHOR: &str = "api-reference";
const OBJECTS_ANCHOR: &str = "objects";
const ENUMS_ANCHOR: &str = "enums";

lazy_static! {
  static ref CELL_PIPE: Regex = Regex::new(r"\|").unwrap();
  static ref CELL_NEWLINE: Regex = Regex::new(r"\r?\n").unwrap();
}

pub fn generate_markdown(file: &ProtoFile) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("<a id=\"{}\"></a>\n# API reference\n\n", TITLE_ANCHOR));
  builder.push_str(&generate_toc(file));

  for service in &file.services {
    builder.push('\n');
    builder.push_str(&generate_service_markdown(service));
  }

  if !file.objects.is_empty() {
    builder.push_str(&format!("\n<a id=\"{}\"></a>\n## Objects\n", OBJECTS_ANCHOR));
    for object in &file.objects {
      builder.push('\n');
      builder.push_str(&generate_object_markdown(object));
    }
  }

  if !file.enums.is_empty() {
    builder.push_str(&format!("\n<a id=\"{}\"></a>\n## Enums\n", ENUMS_ANCHOR));
    for declaration in &file.enums {
      builder.push('\n');
      builder.push_str(&generate_enum_markdown(declaration));
    }
  }

  builder
}

fn generate_toc(file: &ProtoFile) -> String {
  let mut builder = String::new();
  for service in &file.services {
    builder.push_str(&format!("* [Service {}](#{})\n", service.service_name, service.anchor()));
    for endpoint in &service.operations {
      builder.push_str(&format!("    * [{}](#{})\n", endpoint.operation_id(), endpoint.anchor()));
    }
  }
  if !file.objects.is_empty() {
    builder.push_str(&format!("* [Objects](#{})\n", OBJECTS_ANCHOR));
    for object in &file.objects {
      builder.push_str(&format!("    * [Object {}](#{})\n", object.name, object.anchor()));
    }
  }
  if !file.enums.is_empty() {
    builder.push_str(&format!("* [Enums](#{})\n", ENUMS_ANCHOR));
    for declaration in &file.enums {
      builder.push_str(&format!("    * [Enum {}](#{})\n", declaration.name, declaration.anchor()));
    }
  }
  builder
}

fn generate_service_markdown(service: &Service) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("<a id=\"{}\"></a>\n## Service {}\n\n", service.anchor(), service.service_name));
  if !service.comment.is_empty() {
    builder.push_str(&format!("{}\n\n", service.comment));
  }

  builder.push_str(&service.operations.iter().map(generate_endpoint_markdown).join("\n"));
  builder
}

fn generate_endpoint_markdown(endpoint: &Endpoint) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("<a id=\"{}\"></a>\n### {}\n", endpoint.anchor(), endpoint.full_name()));
  builder.push_str(&format!("[[^]](#{})\n\n", TITLE_ANCHOR));

  if !endpoint.summary().is_empty() {
    builder.push_str(&format!("{}\n\n", endpoint.summary()));
  }

  builder.push_str(&format!("**Kind:** {} RPC (*{}*)  \n", endpoint.kind, endpoint.kind.description()));
  builder.push_str(&format!("**HTTP:** `{} {}`\n", endpoint.http_method, endpoint.url_path));
  if let Some(domain) = endpoint.x_domain() {
    builder.push_str(&format!("**Domain:** {}\n", domain));
  }
  if let Some(category) = endpoint.x_category() {
    builder.push_str(&format!("**Category:** {}\n", category));
  }
  builder.push('\n');

  let description = description_markdown(endpoint);
  if !description.is_empty() {
    builder.push_str(&format!("{}\n\n", description));
  }

  builder.push_str(&generate_payload_markdown("Request", &endpoint.request, "The request has no parameters."));
  builder.push_str(&generate_payload_markdown("Response", &endpoint.response, "The response carries no data."));
  builder
}

/// Everything after the summary line, read as doc comment markup.
fn description_markdown(endpoint: &Endpoint) -> String {
  doc_to_markdown(endpoint.description())
}

fn generate_payload_markdown(title: &str, payload: &Payload, empty_note: &str) -> String {
  if payload.is_empty() {
    return format!("{}\n\n", empty_note);
  }
  format!("{} parameters (`{}`):\n\n{}\n", title, payload.type_name, generate_fields_table(&payload.params))
}

fn generate_object_markdown(object: &Object) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("<a id=\"{}\"></a>\n### Object {}\n", object.anchor(), object.name));
  builder.push_str(&format!("[[^]](#{})\n\n", TITLE_ANCHOR));
  if !object.comment.is_empty() {
    builder.push_str(&format!("{}\n\n", object.comment));
  }

  if object.is_empty() {
    builder.push_str("The object has no attributes.\n");
  } else {
    builder.push_str(&format!("Attributes:\n\n{}", generate_fields_table(&object.attrs)));
  }
  builder
}

fn generate_enum_markdown(declaration: &Enum) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("<a id=\"{}\"></a>\n### Enum {}\n", declaration.anchor(), declaration.name));
  builder.push_str(&format!("[[^]](#{})\n\n", TITLE_ANCHOR));
  if !declaration.comment.is_empty() {
    builder.push_str(&format!("{}\n\n", declaration.comment));
  }

  builder.push_str("| Value | Name | Description |\n");
  builder.push_str("| --- | --- | --- |\n");
  for constant in &declaration.constants {
    builder.push_str(&format!("| {} | {} | {} |\n", constant.value, constant.name, escape_cell(&constant.comment)));
  }
  builder
}

fn generate_fields_table(fields: &[Field]) -> String {
  let mut builder = String::new();
  builder.push_str("| Name | Type | Description |\n");
  builder.push_str("| --- | --- | --- |\n");
  for field in fields {
    builder.push_str(&format!("| {} | {} | {} |\n", field.name, type_link(field), escape_cell(&field.comment)));
  }
  builder
}

/// Same text as `Field::type_display`, with catalogued types linked to their sections.
fn type_link(field: &Field) -> String {
  if field.type_name.is_empty() {
    return "(nil)".to_owned();
  }

  let base = match &field.kind {
    FieldKind::Scalar(name) => name.to_owned(),
    FieldKind::Enum(name) => format!("[enum {}](#{})", name, enum_anchor(name)),
    FieldKind::Object(name) => format!("[message {}](#{})", name, object_anchor(name)),
    FieldKind::Map(key, value) => format!("map<{}, {}>", component_link(key), component_link(value)),
    FieldKind::Opaque(name) => format!("({})", name),
  };
  if field.repeated {
    format!("[]{}", base)
  } else {
    base
  }
}

fn component_link(kind: &FieldKind) -> String {
  match kind {
    FieldKind::Enum(name) => format!("[{}](#{})", name, enum_anchor(name)),
    FieldKind::Object(name) => format!("[{}](#{})", name, object_anchor(name)),
    FieldKind::Scalar(_) | FieldKind::Opaque(_) | FieldKind::Map(..) => kind.name(),
  }
}

fn escape_cell(text: &str) -> String {
  let text = CELL_PIPE.replace_all(text, r"\|");
  CELL_NEWLINE.replace_all(&text, "<br>").into_owned()
}
