//! Record types: the per-kind field registry.
//!
//! A [`RecordType`] is declared once through [`RecordTypeBuilder`] and is
//! read-only afterwards. [`RecordTypeBuilder::register`] also caches it in a
//! process-wide kind table; registering the same kind again replaces the
//! cached entry (last definition wins).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::descriptor::{Field, FieldDescriptor};
use crate::error::{MapperError, MapperResult};

/// Name of the identifier field synthesized when none is declared.
pub const DEFAULT_IDENTIFIER_FIELD: &str = "id";

/// Process-wide kind table.
static KINDS: LazyLock<DashMap<String, Arc<RecordType>>> = LazyLock::new(DashMap::new);

/// Returns the registered record type for `kind`, if any.
#[must_use]
pub fn lookup_kind(kind: &str) -> Option<Arc<RecordType>> {
    KINDS.get(kind).map(|entry| entry.value().clone())
}

/// Field registry of one record type.
#[derive(Debug)]
pub struct RecordType {
    kind: String,
    fields: BTreeMap<String, FieldDescriptor>,
    unindexed_fields: BTreeSet<String>,
    identifier_field: String,
}

impl RecordType {
    /// Starts declaring a record type whose kind is `kind`.
    #[must_use]
    pub fn builder(kind: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Descriptor for `name`, if declared.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    /// All descriptors, ordered by field name.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    /// Names of fields excluded from indexing.
    #[must_use]
    pub fn unindexed_fields(&self) -> &BTreeSet<String> {
        &self.unindexed_fields
    }

    /// Name of the field that supplies the key identifier.
    #[must_use]
    pub fn identifier_name(&self) -> &str {
        &self.identifier_field
    }

    /// Descriptor of the identifier field.
    #[must_use]
    pub fn identifier(&self) -> &FieldDescriptor {
        &self.fields[&self.identifier_field]
    }

    /// Descriptor for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::UnknownField`] if the field is not declared.
    pub fn descriptor(&self, name: &str) -> MapperResult<&FieldDescriptor> {
        self.fields.get(name).ok_or_else(|| MapperError::UnknownField {
            kind: self.kind.clone(),
            field: name.to_string(),
        })
    }
}

/// Declaration-time builder for a [`RecordType`].
#[derive(Debug)]
pub struct RecordTypeBuilder {
    kind: String,
    fields: BTreeMap<String, Field>,
}

impl RecordTypeBuilder {
    /// Declares a field. Declaring the same name twice keeps the later field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Builds the registry without caching it in the kind table.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::InvalidFieldDefinition`] for an invalid option
    /// combination, [`MapperError::MultipleIdentifierFields`] when more than
    /// one field is flagged as identifier, and
    /// [`MapperError::InvalidIdentifierType`] when the identifier field is not
    /// an Identifier, Integer or Text field.
    pub fn build(self) -> MapperResult<RecordType> {
        let kind = self.kind;

        for (name, field) in &self.fields {
            if let Some(reason) = field.definition_problem() {
                return Err(MapperError::InvalidFieldDefinition {
                    kind,
                    field: name.clone(),
                    reason,
                });
            }
        }

        let flagged: Vec<&String> = self
            .fields
            .iter()
            .filter(|(_, field)| field.is_identifier())
            .map(|(name, _)| name)
            .collect();
        if let [first, second, ..] = flagged.as_slice() {
            return Err(MapperError::MultipleIdentifierFields {
                first: (*first).clone(),
                second: (*second).clone(),
                kind,
            });
        }
        let explicit = flagged.first().map(|name| (*name).clone());

        let mut fields: BTreeMap<String, FieldDescriptor> = self
            .fields
            .into_iter()
            .map(|(name, field)| {
                let descriptor = field.bind(&name);
                (name, descriptor)
            })
            .collect();

        let identifier_field = match explicit {
            Some(name) => name,
            None => {
                if let Some(id_field) = fields.get_mut(DEFAULT_IDENTIFIER_FIELD) {
                    id_field.mark_identifier();
                } else {
                    fields.insert(
                        DEFAULT_IDENTIFIER_FIELD.to_string(),
                        Field::identifier().bind(DEFAULT_IDENTIFIER_FIELD),
                    );
                }
                DEFAULT_IDENTIFIER_FIELD.to_string()
            }
        };

        let codec = fields[&identifier_field].codec();
        if !codec.is_identifier_eligible() {
            return Err(MapperError::InvalidIdentifierType {
                kind,
                field: identifier_field,
                codec: codec.name(),
            });
        }

        let unindexed_fields = fields
            .values()
            .filter(|descriptor| !descriptor.is_indexed())
            .map(|descriptor| descriptor.name().to_string())
            .collect();

        Ok(RecordType {
            kind,
            fields,
            unindexed_fields,
            identifier_field,
        })
    }

    /// Builds the registry and caches it in the process-wide kind table,
    /// replacing any earlier registration of the same kind.
    ///
    /// A failed registration also evicts any earlier entry for the kind, so
    /// [`lookup_kind`] never returns a definition that was superseded by a
    /// broken one.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn register(self) -> MapperResult<Arc<RecordType>> {
        let kind = self.kind.clone();
        match self.build() {
            Ok(record_type) => {
                let record_type = Arc::new(record_type);
                tracing::debug!(
                    kind = %kind,
                    identifier = %record_type.identifier_name(),
                    fields = record_type.fields.len(),
                    "registered record type"
                );
                KINDS.insert(kind, record_type.clone());
                Ok(record_type)
            }
            Err(e) => {
                KINDS.remove(&kind);
                tracing::debug!(kind = %kind, error = %e, "record type registration failed");
                Err(e)
            }
        }
    }
}
