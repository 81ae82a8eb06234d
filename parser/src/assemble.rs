//! Second pass: builds the final catalogs and resolves every field against them.

use std::collections::HashSet;

use itertools::Itertools;
use tracing::debug;

use crate::hl::{Endpoint, Field, Object, Payload, ProtoFile, Service};
use crate::resolve::{resolve, Catalogs};
use crate::walk::{self, ModelError, RawField, RawModel, RawPayload};
use crate::Program;

pub fn program_to_proto_file(program: &Program) -> Result<ProtoFile, ModelError> {
  Ok(assemble(walk::build(program)?))
}

/// Messages used as an RPC request or response are documented with their endpoint
/// and left out of the object catalog; fields pointing at them stay opaque.
pub fn assemble(raw: RawModel) -> ProtoFile {
  let bodies: HashSet<String> = raw.services.iter()
    .flat_map(|service| service.operations.iter())
    .flat_map(|operation| [operation.request.type_name.to_owned(), operation.response.type_name.to_owned()])
    .collect();

  let (kept, excluded): (Vec<_>, Vec<_>) = raw.messages.into_iter().partition(|message| !bodies.contains(&message.name));
  debug!("{} objects kept, {} documented as rpc bodies", kept.len(), excluded.len());

  let catalogs = Catalogs::new(
    raw.enums.iter().map(|declaration| declaration.name.to_owned()),
    kept.iter().map(|message| message.name.to_owned()),
  );

  let services = raw.services.into_iter()
    .map(|service| {
      let operations = service.operations.into_iter()
        .map(|operation| Endpoint::new(
          &service.package_name,
          &service.service_name,
          &operation.method_name,
          operation.kind,
          resolve_payload(operation.request, &catalogs),
          resolve_payload(operation.response, &catalogs),
          operation.comment,
          operation.extensions,
        ))
        .collect_vec();
      Service {
        comment: service.comment,
        package_name: service.package_name,
        service_name: service.service_name,
        operations,
      }
    })
    .collect_vec();

  let objects = kept.into_iter()
    .map(|message| Object {
      comment: message.comment,
      name: message.name,
      attrs: resolve_fields(message.attrs, &catalogs),
    })
    .collect_vec();

  ProtoFile {
    services,
    objects,
    enums: raw.enums,
  }
}

fn resolve_payload(payload: RawPayload, catalogs: &Catalogs) -> Payload {
  Payload {
    type_name: payload.type_name,
    params: resolve_fields(payload.params, catalogs),
  }
}

fn resolve_fields(fields: Vec<RawField>, catalogs: &Catalogs) -> Vec<Field> {
  fields.into_iter()
    .map(|field| {
      let kind = resolve(&field, catalogs);
      Field {
        comment: field.comment,
        name: field.name,
        type_name: field.type_name,
        key_type_name: field.key_type_name,
        repeated: field.repeated,
        enclosing_scope: field.enclosing_scope,
        kind,
      }
    })
    .collect_vec()
}
