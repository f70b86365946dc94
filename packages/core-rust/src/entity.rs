//! Entities: record instances and their mapping to and from storage rows.
//!
//! An [`Entity`] owns its [`Key`] and a backing map of storage-form values.
//! Every read and write goes through the field's
//! [`FieldDescriptor`](crate::FieldDescriptor); fields that were never
//! assigned resolve their defaults lazily on first access.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::derivation::{derive_key, is_blank_identifier};
use crate::descriptor::Backing;
use crate::error::{MapperError, MapperResult};
use crate::key::Key;
use crate::record_type::RecordType;
use crate::row::StorageRow;
use crate::types::{StorageValue, Value};

/// Constructor arguments for an [`Entity`].
#[derive(Debug)]
pub struct EntityBuilder {
    record_type: Arc<RecordType>,
    parent: Option<Key>,
    namespace: Option<String>,
    values: BTreeMap<String, Value>,
}

impl EntityBuilder {
    /// Places the new entity's key under `parent`.
    #[must_use]
    pub fn parent(mut self, parent: Key) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Supplies a field value. A value for the identifier field becomes the
    /// key identifier; values for undeclared fields are ignored.
    #[must_use]
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Derives the key and assigns the supplied values.
    ///
    /// # Errors
    ///
    /// Returns key-derivation errors ([`MapperError::MissingIdentifier`],
    /// [`MapperError::InvalidParent`]) and any validation error raised while
    /// assigning the supplied values.
    pub fn build(self) -> MapperResult<Entity> {
        let EntityBuilder {
            record_type,
            parent,
            namespace,
            mut values,
        } = self;

        let explicit = values.remove(record_type.identifier_name());
        let derived = derive_key(&record_type, explicit, parent, namespace)?;

        let mut entity = Entity {
            key: derived.key,
            values: Backing::new(),
            record_type,
        };
        entity
            .values
            .insert(entity.record_type.identifier_name().to_string(), derived.identifier);

        for (name, value) in values {
            match entity.record_type.field(&name) {
                Some(descriptor) => descriptor.set(&mut entity.values, value)?,
                None => tracing::debug!(
                    kind = %entity.record_type.kind(),
                    field = %name,
                    "ignoring value for undeclared field"
                ),
            }
        }
        Ok(entity)
    }
}

/// A record instance: one key plus the storage form of its field values.
#[derive(Debug, Clone)]
pub struct Entity {
    record_type: Arc<RecordType>,
    key: Key,
    values: Backing,
}

impl Entity {
    /// Starts constructing an entity of `record_type`.
    #[must_use]
    pub fn builder(record_type: &Arc<RecordType>) -> EntityBuilder {
        EntityBuilder {
            record_type: record_type.clone(),
            parent: None,
            namespace: None,
            values: BTreeMap::new(),
        }
    }

    /// Reconstructs an entity from a fetched row.
    ///
    /// The identifier is seeded from the row (falling back to the row key's
    /// identifier), the key is replaced by the row key verbatim, and every
    /// other declared field takes the row's value normalized through its codec
    /// without re-validation. A declared field absent from the row reads as
    /// null rather than its default. Undeclared row fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::InvalidKey`] when the row key belongs to another
    /// kind, and propagates identifier and codec errors.
    pub fn from_row(record_type: &Arc<RecordType>, row: StorageRow) -> MapperResult<Self> {
        if row.key.kind() != record_type.kind() {
            return Err(MapperError::InvalidKey {
                reason: format!(
                    "row key kind '{}' does not match '{}'",
                    row.key.kind(),
                    record_type.kind()
                ),
            });
        }

        let StorageRow {
            key, mut fields, ..
        } = row;
        let id_descriptor = record_type.identifier();
        let seed = match fields.remove(id_descriptor.name()) {
            Some(stored) if !stored.is_null() => id_descriptor.from_storage(&stored)?,
            _ => key.id().to_value(),
        };

        let mut entity = Entity::builder(record_type)
            .value(id_descriptor.name(), seed)
            .build()?;
        entity.key = key;

        for descriptor in record_type.fields() {
            if descriptor.is_identifier() {
                continue;
            }
            let normalized = match fields.get(descriptor.name()) {
                Some(stored) => descriptor.normalize(stored)?,
                None => StorageValue::Null,
            };
            entity.values.insert(descriptor.name().to_string(), normalized);
        }
        Ok(entity)
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        self.record_type.kind()
    }

    #[must_use]
    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    /// Reads a field's rich value, resolving its default on first access.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::UnknownField`] for an undeclared field and
    /// propagates default-validation and codec errors.
    pub fn get(&mut self, name: &str) -> MapperResult<Value> {
        let descriptor = self.record_type.descriptor(name)?;
        descriptor.get(&mut self.values)
    }

    /// Validates and assigns a field value.
    ///
    /// Assigning the identifier field replaces the key with a new one built
    /// from the new identifier (same parent and namespace). A rejected
    /// assignment leaves the entity unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::UnknownField`] for an undeclared field,
    /// [`MapperError::MissingIdentifier`] when the identifier is given a blank
    /// value (null, empty or zero), and
    /// propagates validation errors.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> MapperResult<()> {
        let value = value.into();
        if name != self.record_type.identifier_name() {
            let descriptor = self.record_type.descriptor(name)?;
            return descriptor.set(&mut self.values, value);
        }
        if is_blank_identifier(&value) {
            return Err(MapperError::MissingIdentifier {
                kind: self.kind().to_string(),
                field: name.to_string(),
            });
        }
        let derived = derive_key(
            &self.record_type,
            Some(value),
            self.key.parent().cloned(),
            self.key.namespace().map(str::to_string),
        )?;
        self.key = derived.key;
        self.values.insert(name.to_string(), derived.identifier);
        Ok(())
    }

    /// Clears a field so the next read re-resolves its default.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::UnknownField`] for an undeclared field and
    /// [`MapperError::IdentifierRemoval`] for the identifier field.
    pub fn delete(&mut self, name: &str) -> MapperResult<()> {
        let descriptor = self.record_type.descriptor(name)?;
        if descriptor.is_identifier() {
            return Err(MapperError::IdentifierRemoval {
                kind: self.kind().to_string(),
                field: name.to_string(),
            });
        }
        descriptor.delete(&mut self.values);
        Ok(())
    }

    /// Raw storage-form value of a field, without default resolution.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&StorageValue> {
        self.values.get(name)
    }

    /// Stamps auto-now fields with `now`: `auto_now` fields always,
    /// `auto_now_add` fields only while still null.
    ///
    /// # Errors
    ///
    /// Propagates validation errors from the affected fields.
    pub fn apply_auto_now(&mut self, now: NaiveDateTime) -> MapperResult<()> {
        let record_type = self.record_type.clone();
        for descriptor in record_type.fields() {
            if !(descriptor.auto_now() || descriptor.auto_now_add()) {
                continue;
            }
            let Some(stamp) = descriptor.codec().now_value(now) else {
                continue;
            };
            if descriptor.auto_now() || descriptor.get(&mut self.values)?.is_null() {
                descriptor.set(&mut self.values, stamp)?;
            }
        }
        Ok(())
    }

    /// Maps the entity to a storage row, materializing every default first.
    ///
    /// # Errors
    ///
    /// Propagates default-resolution errors, e.g. a required field with no
    /// value and no default.
    pub fn to_row(&mut self) -> MapperResult<StorageRow> {
        let record_type = self.record_type.clone();
        for descriptor in record_type.fields() {
            descriptor.get(&mut self.values)?;
        }
        Ok(StorageRow {
            key: self.key.clone(),
            fields: self.values.clone(),
            excluded_from_index: record_type.unindexed_fields().clone(),
        })
    }
}
