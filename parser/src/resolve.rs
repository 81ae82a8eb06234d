//! Scope-chain type resolution for field type tokens.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use tracing::trace;

use crate::config::SCOPE_SEPARATOR;
use crate::hl::FieldKind;
use crate::walk::{qualify, RawField};

static SCALAR_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
  [
    "double", "float", "int32", "int64", "uint32", "uint64", "sint32", "sint64", "fixed32", "fixed64", "sfixed32",
    "sfixed64", "bool", "string", "bytes",
  ]
  .into_iter()
  .collect()
});

pub fn is_scalar(name: &str) -> bool {
  SCALAR_TYPES.contains(name)
}

/// Qualified names of everything a field may point at.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
  enums: HashSet<String>,
  objects: HashSet<String>,
}

impl Catalogs {
  pub fn new<E, O>(enums: E, objects: O) -> Self
  where
    E: IntoIterator<Item = String>,
    O: IntoIterator<Item = String>,
  {
    Catalogs {
      enums: enums.into_iter().collect(),
      objects: objects.into_iter().collect(),
    }
  }

  pub fn contains_enum(&self, name: &str) -> bool {
    self.enums.contains(name)
  }

  pub fn contains_object(&self, name: &str) -> bool {
    self.objects.contains(name)
  }

  /// Scalars win over everything; at one scope level an enum wins over a message.
  fn lookup(&self, scope: &str, name: &str) -> Option<FieldKind> {
    if is_scalar(name) {
      return Some(FieldKind::Scalar(name.to_owned()));
    }

    let candidate = qualify(scope, name);
    if self.contains_enum(&candidate) {
      Some(FieldKind::Enum(candidate))
    } else if self.contains_object(&candidate) {
      Some(FieldKind::Object(candidate))
    } else {
      None
    }
  }
}

pub fn resolve(field: &RawField, catalogs: &Catalogs) -> FieldKind {
  match &field.key_type_name {
    Some(key) => resolve_map(key, &field.type_name, &field.enclosing_scope, catalogs),
    None => resolve_named(&field.type_name, &field.enclosing_scope, catalogs),
  }
}

fn resolve_named(name: &str, scope: &str, catalogs: &Catalogs) -> FieldKind {
  scope_prefixes(scope)
    .into_iter()
    .find_map(|prefix| catalogs.lookup(prefix, name))
    .unwrap_or_else(|| {
      trace!("type {} is not declared in scope {:?}", name, scope);
      FieldKind::Opaque(name.to_owned())
    })
}

/// Key and value must both resolve at the same scope level.
fn resolve_map(key: &str, value: &str, scope: &str, catalogs: &Catalogs) -> FieldKind {
  for prefix in scope_prefixes(scope) {
    let Some(key_kind) = catalogs.lookup(prefix, key) else {
      continue;
    };
    if let Some(value_kind) = catalogs.lookup(prefix, value) {
      return FieldKind::Map(Box::new(key_kind), Box::new(value_kind));
    }
  }

  trace!("map<{}, {}> does not resolve in scope {:?}", key, value, scope);
  FieldKind::Map(Box::new(as_written(key)), Box::new(as_written(value)))
}

fn as_written(name: &str) -> FieldKind {
  if is_scalar(name) {
    FieldKind::Scalar(name.to_owned())
  } else {
    FieldKind::Opaque(name.to_owned())
  }
}

/// Enclosing scopes from the innermost one out to file level, e.g. `A.B`, `A`, ``.
fn scope_prefixes(scope: &str) -> Vec<&str> {
  let mut prefixes = Vec::new();
  if !scope.is_empty() {
    let mut current = scope;
    prefixes.push(current);
    while let Some((outer, _)) = current.rsplit_once(SCOPE_SEPARATOR) {
      prefixes.push(outer);
      current = outer;
    }
  }
  prefixes.push("");
  prefixes
}
