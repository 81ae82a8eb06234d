//! Fixed names shared by the model builder and the renderers.

/// Extension key filled from `Domain:` / `x-domain:` comment directives.
pub const X_DOMAIN_EXTENSION: &str = "x-domain";

/// Extension key filled from `Category:` / `x-category:` comment directives.
pub const X_CATEGORY_EXTENSION: &str = "x-category";

/// Comment line prefixes that are diverted into the extension map, with the key each one sets.
pub const EXTENSION_DIRECTIVES: [(&str, &str); 4] = [
  ("Domain:", X_DOMAIN_EXTENSION),
  ("Category:", X_CATEGORY_EXTENSION),
  ("x-domain:", X_DOMAIN_EXTENSION),
  ("x-category:", X_CATEGORY_EXTENSION),
];

/// Well-known message that may be used as an RPC body without being declared in the file.
pub const EMPTY_MESSAGE: &str = "google.protobuf.Empty";

/// Separator between nesting levels of a qualified name.
pub const SCOPE_SEPARATOR: char = '.';

/// Package name reported for files without a `package` statement.
pub const MISSING_PACKAGE: &str = "(missed-package)";
