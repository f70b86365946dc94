//! Key derivation for new entities.

use crate::error::{MapperError, MapperResult};
use crate::key::{Key, KeyId};
use crate::record_type::RecordType;
use crate::types::{StorageValue, Value};

/// A derived key together with the canonical storage form of the identifier.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: Key,
    pub identifier: StorageValue,
}

/// Whether `value` leaves an identifier unresolved: null, an empty string or
/// byte string, or the integer zero.
#[must_use]
pub fn is_blank_identifier(value: &Value) -> bool {
    match value {
        Value::Null | Value::Int(0) => true,
        Value::String(s) => s.is_empty(),
        Value::Bytes(b) => b.is_empty(),
        _ => false,
    }
}

/// Derives the storage key of a new entity of `record_type`.
///
/// The identifier is the explicit value unless it is blank (see
/// [`is_blank_identifier`]), otherwise the identifier field's default. It is then passed
/// through the field's full validate and storage pipeline so the key always
/// carries the canonical form. A child key inherits its parent's namespace;
/// an explicit `namespace` must agree with it.
///
/// # Errors
///
/// Returns [`MapperError::MissingIdentifier`] when no identifier value can be
/// resolved, [`MapperError::InvalidParent`] when `parent` is not a valid key or
/// lives in another namespace, and propagates identifier validation errors.
pub fn derive_key(
    record_type: &RecordType,
    explicit: Option<Value>,
    parent: Option<Key>,
    namespace: Option<String>,
) -> MapperResult<DerivedKey> {
    let descriptor = record_type.identifier();
    let missing = || MapperError::MissingIdentifier {
        kind: record_type.kind().to_string(),
        field: descriptor.name().to_string(),
    };

    let value = explicit
        .filter(|v| !is_blank_identifier(v))
        .or_else(|| descriptor.resolve_default())
        .filter(|v| !is_blank_identifier(v))
        .ok_or_else(missing)?;

    let identifier = descriptor.to_storage(value)?;
    let id = match KeyId::from_storage(descriptor.name(), &identifier)? {
        KeyId::Name(name) if name.is_empty() => return Err(missing()),
        KeyId::Id(0) => return Err(missing()),
        id => id,
    };

    let key = match parent {
        Some(parent) => {
            if namespace.is_some() && namespace.as_deref() != parent.namespace() {
                return Err(MapperError::InvalidParent {
                    reason: format!(
                        "parent namespace {:?} differs from {:?}",
                        parent.namespace(),
                        namespace
                    ),
                });
            }
            Key::with_parent(record_type.kind(), id, parent)?
        }
        None => Key::new(record_type.kind(), id).in_namespace(namespace),
    };

    Ok(DerivedKey { key, identifier })
}
