//! Field declarations and the descriptors bound to record types.
//!
//! A [`Field`] is the declaration-time builder (`Field::text().indexed(false)`).
//! Registration binds it to a name and freezes it into a [`FieldDescriptor`],
//! which owns all per-field policy: the validation chain, default resolution,
//! and the translation between an entity's backing map and rich values.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::{generate_identifier, Codec};
use crate::error::{MapperError, MapperResult};
use crate::types::{StorageValue, Value};

/// Custom validator: may transform or reject an already type-validated value.
pub type Validator = Arc<dyn Fn(&FieldDescriptor, Value) -> MapperResult<Value> + Send + Sync>;

/// Default generator, invoked at most once per entity and field.
pub type Generator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Backing map of an entity: field name to storage representation.
pub type Backing = BTreeMap<String, StorageValue>;

/// Default for a field: a fixed value or a generator.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Generator(Generator),
}

impl DefaultValue {
    /// Produces the default, invoking the generator if there is one.
    #[must_use]
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Generator(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// Declaration of a field, configured with chained options and handed to
/// [`RecordTypeBuilder::field`](crate::RecordTypeBuilder::field).
#[derive(Clone)]
pub struct Field {
    codec: Codec,
    indexed: bool,
    repeated: bool,
    required: bool,
    default: Option<DefaultValue>,
    choices: Option<Vec<Value>>,
    validator: Option<Validator>,
    identifier: bool,
    auto_now_add: bool,
    auto_now: bool,
    misused_option: Option<&'static str>,
}

impl Field {
    fn new(codec: Codec) -> Self {
        Self {
            codec,
            indexed: true,
            repeated: false,
            required: false,
            default: None,
            choices: None,
            validator: None,
            identifier: false,
            auto_now_add: false,
            auto_now: false,
            misused_option: None,
        }
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::new(Codec::Boolean)
    }

    #[must_use]
    pub fn integer() -> Self {
        Self::new(Codec::Integer)
    }

    #[must_use]
    pub fn float() -> Self {
        Self::new(Codec::Float)
    }

    /// Opaque bytes. Unindexed unless explicitly indexed.
    #[must_use]
    pub fn blob() -> Self {
        Self::new(Codec::Blob { compressed: false }).indexed(false)
    }

    /// UTF-8 text. Unindexed unless explicitly indexed.
    #[must_use]
    pub fn text() -> Self {
        Self::new(Codec::Text).indexed(false)
    }

    /// Any [`Value`] graph, stored as `MsgPack` bytes.
    #[must_use]
    pub fn pickle() -> Self {
        Self::new(Codec::Pickle { compressed: false }).indexed(false)
    }

    /// JSON document, stored as UTF-8 JSON bytes.
    #[must_use]
    pub fn json() -> Self {
        Self::new(Codec::Json { compressed: false }).indexed(false)
    }

    /// Auto-generated identifier. Acts as the key identifier unless
    /// [`as_identifier(false)`](Field::as_identifier) is applied.
    #[must_use]
    pub fn identifier() -> Self {
        let mut field = Self::new(Codec::Identifier);
        field.identifier = true;
        field.default = Some(DefaultValue::Generator(Arc::new(|| {
            Value::String(generate_identifier())
        })));
        field
    }

    #[must_use]
    pub fn datetime() -> Self {
        Self::new(Codec::DateTime)
    }

    #[must_use]
    pub fn date() -> Self {
        Self::new(Codec::Date)
    }

    #[must_use]
    pub fn time() -> Self {
        Self::new(Codec::Time)
    }

    #[must_use]
    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    #[must_use]
    pub fn repeated(mut self, repeated: bool) -> Self {
        self.repeated = repeated;
        self
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Fixed default used when the field is read before being assigned.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Default produced by `generator`, called once per entity on first read.
    #[must_use]
    pub fn default_with<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Generator(Arc::new(generator)));
        self
    }

    /// Restricts assignments to the given set of values.
    #[must_use]
    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&FieldDescriptor, Value) -> MapperResult<Value> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Marks (or unmarks) this field as the key identifier.
    #[must_use]
    pub fn as_identifier(mut self, identifier: bool) -> Self {
        self.identifier = identifier;
        self
    }

    /// Stores values zstd-compressed. Blob, Pickle and Json fields only.
    #[must_use]
    pub fn compressed(mut self, compressed: bool) -> Self {
        match &mut self.codec {
            Codec::Blob { compressed: c }
            | Codec::Pickle { compressed: c }
            | Codec::Json { compressed: c } => *c = compressed,
            _ if compressed => {
                self.misused_option = Some("compression applies only to Blob, Pickle and Json fields");
            }
            _ => {}
        }
        self
    }

    /// Sets the field to the current time on first save, when still null.
    #[must_use]
    pub fn auto_now_add(mut self, enabled: bool) -> Self {
        self.auto_now_add = enabled;
        self
    }

    /// Sets the field to the current time on every save.
    #[must_use]
    pub fn auto_now(mut self, enabled: bool) -> Self {
        self.auto_now = enabled;
        self
    }

    #[must_use]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    #[must_use]
    pub fn is_identifier(&self) -> bool {
        self.identifier
    }

    /// Checks option combinations that can never be valid.
    pub(crate) fn definition_problem(&self) -> Option<&'static str> {
        if let Some(problem) = self.misused_option {
            return Some(problem);
        }
        if self.codec.is_compressed() && self.indexed {
            return Some("a compressed field cannot be indexed");
        }
        if (self.auto_now || self.auto_now_add) && !self.codec.is_temporal() {
            return Some("auto_now and auto_now_add apply only to DateTime, Date and Time fields");
        }
        if self.repeated && (self.auto_now || self.auto_now_add) {
            return Some("a repeated field cannot use auto_now or auto_now_add");
        }
        if self.repeated && self.identifier {
            return Some("a repeated field cannot be the identifier");
        }
        None
    }

    pub(crate) fn bind(self, name: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            field: self,
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("codec", &self.codec)
            .field("indexed", &self.indexed)
            .field("repeated", &self.repeated)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("choices", &self.choices)
            .field("validator", &self.validator.is_some())
            .field("identifier", &self.identifier)
            .field("auto_now_add", &self.auto_now_add)
            .field("auto_now", &self.auto_now)
            .finish()
    }
}

/// A [`Field`] bound to its name on a registered record type.
///
/// Immutable once built. Shared by every entity of the type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    field: Field,
}

impl FieldDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn codec(&self) -> Codec {
        self.field.codec
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.field.indexed
    }

    #[must_use]
    pub fn is_repeated(&self) -> bool {
        self.field.repeated
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.field.required
    }

    #[must_use]
    pub fn is_identifier(&self) -> bool {
        self.field.identifier
    }

    #[must_use]
    pub fn auto_now_add(&self) -> bool {
        self.field.auto_now_add
    }

    #[must_use]
    pub fn auto_now(&self) -> bool {
        self.field.auto_now
    }

    /// Resolves the default, invoking a generator. `None` when no default is declared.
    #[must_use]
    pub fn resolve_default(&self) -> Option<Value> {
        self.field.default.as_ref().map(DefaultValue::resolve)
    }

    pub(crate) fn mark_identifier(&mut self) {
        self.field.identifier = true;
    }

    /// Runs the validation chain: choices, required, null short-circuit,
    /// codec validation, custom validator.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::TypeConstraint`] for a value outside `choices` or
    /// of the wrong type, [`MapperError::RequiredValue`] for null on a required
    /// field, or whatever the custom validator returns.
    pub fn validate(&self, value: Value) -> MapperResult<Value> {
        if let Some(choices) = &self.field.choices {
            if !choices.contains(&value) {
                return Err(MapperError::type_constraint(
                    &self.name,
                    "one of the declared choices",
                    format!("{value:?}"),
                ));
            }
        }
        if self.field.required && value.is_null() {
            return Err(MapperError::RequiredValue {
                field: self.name.clone(),
            });
        }
        if value.is_null() {
            return Ok(Value::Null);
        }
        let value = self.field.codec.validate(&self.name, value)?;
        match &self.field.validator {
            Some(validator) => validator(self, value),
            None => Ok(value),
        }
    }

    /// Validates a single (non-repeated) value and converts it to storage form.
    ///
    /// # Errors
    ///
    /// Propagates validation and codec errors.
    pub fn to_storage(&self, value: Value) -> MapperResult<StorageValue> {
        let value = self.validate(value)?;
        self.field.codec.to_storage(&self.name, &value)
    }

    /// Converts a single stored value to its rich form.
    ///
    /// # Errors
    ///
    /// Propagates codec errors.
    pub fn from_storage(&self, stored: &StorageValue) -> MapperResult<Value> {
        self.field.codec.from_storage(&self.name, stored)
    }

    /// Reads the field from `backing`, resolving and storing the default on first access.
    ///
    /// Repeated fields always yield [`Value::Array`].
    ///
    /// # Errors
    ///
    /// Propagates errors from validating the default and from decoding the stored value.
    pub fn get(&self, backing: &mut Backing) -> MapperResult<Value> {
        if !backing.contains_key(&self.name) {
            let default = self.resolve_default();
            tracing::trace!(field = %self.name, "resolving default on first access");
            if self.field.repeated {
                let initial = match default {
                    Some(Value::Null) | None => Value::Array(Vec::new()),
                    Some(v) => v,
                };
                self.set(backing, initial)?;
            } else {
                self.set(backing, default.unwrap_or(Value::Null))?;
            }
        }

        let stored = backing.get(&self.name).unwrap_or(&StorageValue::Null);
        if !self.field.repeated {
            return self.from_storage(stored);
        }
        match stored {
            StorageValue::Array(items) => items
                .iter()
                .map(|item| self.from_storage(item))
                .collect::<MapperResult<Vec<_>>>()
                .map(Value::Array),
            StorageValue::Null => Ok(Value::Array(Vec::new())),
            other => Err(MapperError::type_constraint(
                &self.name,
                "stored array",
                other.type_name(),
            )),
        }
    }

    /// Validates and converts `value`, then writes it into `backing`.
    ///
    /// All-or-nothing: on error the previously stored value is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::TypeConstraint`] when a repeated field is given a
    /// non-array, and propagates validation and codec errors.
    pub fn set(&self, backing: &mut Backing, value: Value) -> MapperResult<()> {
        let stored = if self.field.repeated {
            let Value::Array(items) = value else {
                return Err(MapperError::type_constraint(
                    &self.name,
                    "array for repeated field",
                    value.type_name(),
                ));
            };
            StorageValue::Array(
                items
                    .into_iter()
                    .map(|item| self.to_storage(item))
                    .collect::<MapperResult<_>>()?,
            )
        } else {
            self.to_storage(value)?
        };
        backing.insert(self.name.clone(), stored);
        Ok(())
    }

    /// Removes the field's backing entry; the next `get` re-resolves the default.
    pub fn delete(&self, backing: &mut Backing) {
        backing.remove(&self.name);
    }

    /// Passes a stored value through `from_storage` then back through the
    /// codec's storage step, without re-running validation.
    ///
    /// # Errors
    ///
    /// Propagates codec errors.
    pub fn normalize(&self, stored: &StorageValue) -> MapperResult<StorageValue> {
        let codec = self.field.codec;
        match stored {
            StorageValue::Array(items) if self.field.repeated => items
                .iter()
                .map(|item| codec.to_storage(&self.name, &codec.from_storage(&self.name, item)?))
                .collect::<MapperResult<Vec<_>>>()
                .map(StorageValue::Array),
            other => codec.to_storage(&self.name, &codec.from_storage(&self.name, other)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn bound(field: Field) -> FieldDescriptor {
        field.bind("f")
    }

    #[test]
    fn unset_scalar_reads_null() {
        let desc = bound(Field::boolean());
        let mut backing = Backing::new();
        assert_eq!(desc.get(&mut backing).unwrap(), Value::Null);
        assert_eq!(backing.get("f"), Some(&StorageValue::Null));
    }

    #[test]
    fn fixed_default_is_stored_on_first_read() {
        let desc = bound(Field::integer().default(3));
        let mut backing = Backing::new();
        assert_eq!(desc.get(&mut backing).unwrap(), Value::Int(3));
        assert_eq!(backing.get("f"), Some(&StorageValue::Int(3)));
    }

    #[test]
    fn generator_default_runs_once_per_backing() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let desc = bound(Field::text().default_with(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Value::String(format!("v{n}"))
        }));
        let mut backing = Backing::new();
        let first = desc.get(&mut backing).unwrap();
        let second = desc.get(&mut backing).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_re_triggers_default_resolution() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let desc = bound(Field::integer().default_with(move || {
            Value::Int(i64::from(counter.fetch_add(1, Ordering::SeqCst)))
        }));
        let mut backing = Backing::new();
        assert_eq!(desc.get(&mut backing).unwrap(), Value::Int(0));
        desc.delete(&mut backing);
        assert!(!backing.contains_key("f"));
        assert_eq!(desc.get(&mut backing).unwrap(), Value::Int(1));
    }

    #[test]
    fn choices_checked_before_null_short_circuit() {
        let desc = bound(Field::text().choices(["a", "b"]));
        assert!(desc.validate(Value::from("a")).is_ok());
        assert!(matches!(
            desc.validate(Value::from("c")),
            Err(MapperError::TypeConstraint { .. })
        ));
        assert!(matches!(
            desc.validate(Value::Null),
            Err(MapperError::TypeConstraint { .. })
        ));
    }

    #[test]
    fn required_rejects_null_but_accepts_values() {
        let desc = bound(Field::integer().required(true));
        assert!(matches!(
            desc.validate(Value::Null),
            Err(MapperError::RequiredValue { .. })
        ));
        assert_eq!(desc.validate(Value::Int(1)).unwrap(), Value::Int(1));
    }

    #[test]
    fn null_skips_codec_and_custom_validator() {
        let desc = bound(Field::integer().validator(|_, _| {
            Err(MapperError::type_constraint("f", "never", "called"))
        }));
        assert_eq!(desc.validate(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn custom_validator_sees_type_validated_value() {
        let desc = bound(Field::float().validator(|desc, value| {
            assert_eq!(desc.name(), "f");
            match value {
                Value::Float(f) => Ok(Value::Float(f * 2.0)),
                other => Err(MapperError::type_constraint("f", "float", other.type_name())),
            }
        }));
        assert_eq!(desc.validate(Value::Int(2)).unwrap(), Value::Float(4.0));
    }

    #[test]
    fn rejected_assignment_keeps_previous_value() {
        let desc = bound(Field::integer());
        let mut backing = Backing::new();
        desc.set(&mut backing, Value::Int(7)).unwrap();
        assert!(desc.set(&mut backing, Value::from("eight")).is_err());
        assert_eq!(desc.get(&mut backing).unwrap(), Value::Int(7));
    }

    #[test]
    fn repeated_field_defaults_to_empty_array() {
        let desc = bound(Field::integer().repeated(true));
        let mut backing = Backing::new();
        assert_eq!(desc.get(&mut backing).unwrap(), Value::Array(Vec::new()));
    }

    #[test]
    fn repeated_field_requires_sequence_and_validates_every_element() {
        let desc = bound(Field::float().repeated(true));
        let mut backing = Backing::new();
        assert!(matches!(
            desc.set(&mut backing, Value::Float(1.0)),
            Err(MapperError::TypeConstraint { .. })
        ));
        desc.set(&mut backing, Value::Array(vec![Value::Int(1), Value::Float(2.5)]))
            .unwrap();
        assert_eq!(
            desc.get(&mut backing).unwrap(),
            Value::Array(vec![Value::Float(1.0), Value::Float(2.5)])
        );
        let before = backing.get("f").cloned();
        assert!(desc
            .set(&mut backing, Value::Array(vec![Value::Int(1), Value::from("x")]))
            .is_err());
        assert_eq!(backing.get("f").cloned(), before);
    }

    #[test]
    fn repeated_default_is_used_when_present() {
        let desc = bound(
            Field::text()
                .repeated(true)
                .default(Value::Array(vec![Value::from("x")])),
        );
        let mut backing = Backing::new();
        assert_eq!(
            desc.get(&mut backing).unwrap(),
            Value::Array(vec![Value::from("x")])
        );
    }

    #[test]
    fn definition_problems_are_detected() {
        assert!(Field::blob().compressed(true).indexed(true).definition_problem().is_some());
        assert!(Field::blob().compressed(true).definition_problem().is_none());
        assert!(Field::blob().indexed(true).definition_problem().is_none());
        assert!(Field::datetime().repeated(true).auto_now(true).definition_problem().is_some());
        assert!(Field::date().repeated(true).auto_now_add(true).definition_problem().is_some());
        assert!(Field::integer().auto_now(true).definition_problem().is_some());
        assert!(Field::text().compressed(true).definition_problem().is_some());
        assert!(Field::identifier().repeated(true).definition_problem().is_some());
    }

    #[test]
    fn normalize_decodes_legacy_text_bytes() {
        let desc = bound(Field::text());
        let normalized = desc.normalize(&StorageValue::Bytes(b"ann".to_vec())).unwrap();
        assert_eq!(normalized, StorageValue::String("ann".into()));
    }
}
