//! Plain-text listing: services with their methods, then enums and objects.

use protodoc_parser::hl::{Enum, Field, Object, ProtoFile, RpcKind, Service};

pub fn generate_text(file: &ProtoFile) -> String {
  let mut builder = String::new();
  for service in &file.services {
    builder.push_str(&generate_service_text(service));
  }
  for declaration in &file.enums {
    builder.push_str(&generate_enum_text(declaration));
  }
  for object in &file.objects {
    builder.push_str(&generate_object_text(object));
  }
  builder
}

fn generate_service_text(service: &Service) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("SERVICE {}.{}\n\n", service.package_name, service.service_name));
  builder.push_str(&format!("{}\n\n", service.comment));

  for endpoint in &service.operations {
    builder.push_str(&format!("METHOD {}.{}", endpoint.service_name, endpoint.method_name));
    if endpoint.kind != RpcKind::Unary {
      builder.push_str(&format!(" ({})", endpoint.kind));
    }
    builder.push('\n');
    builder.push_str(&format!("{} {}\n", endpoint.http_method, endpoint.url_path));
    builder.push_str(&format!("{}\n\n", endpoint.comment));

    builder.push_str(&format!("REQUEST PARAMETERS ({})\n", endpoint.request.type_name));
    push_fields(&mut builder, &endpoint.request.params);
    builder.push_str(&format!("RESPONSE PARAMETERS ({})\n", endpoint.response.type_name));
    push_fields(&mut builder, &endpoint.response.params);
    builder.push('\n');
  }
  builder
}

fn generate_enum_text(declaration: &Enum) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("ENUM {}\n", declaration.name));
  builder.push_str(&format!("{}\n\n", declaration.comment));
  builder.push_str("CONSTANTS\n");
  for constant in &declaration.constants {
    push_line(&mut builder, &[constant.name.as_str(), constant.value.as_str(), constant.comment.as_str()]);
  }
  builder.push('\n');
  builder
}

fn generate_object_text(object: &Object) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("OBJECT {}\n", object.name));
  builder.push_str(&format!("{}\n\n", object.comment));
  builder.push_str("ATTRIBUTES\n");
  push_fields(&mut builder, &object.attrs);
  builder.push('\n');
  builder
}

fn push_fields(builder: &mut String, fields: &[Field]) {
  for field in fields {
    push_line(builder, &[field.type_display().as_str(), field.name.as_str(), field.comment.as_str()]);
  }
}

/// Indented, space separated, without trailing blanks when the comment is empty.
fn push_line(builder: &mut String, columns: &[&str]) {
  builder.push_str("    ");
  builder.push_str(columns.join(" ").trim_end());
  builder.push('\n');
}
