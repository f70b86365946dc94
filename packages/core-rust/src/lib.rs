//! `dsorm` Core — value codecs, field descriptors, record types, key derivation,
//! and entity mapping for schemaless key/value document stores.

pub mod clock;
pub mod codec;
pub mod derivation;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod key;
pub mod record_type;
pub mod row;
pub mod types;

pub use clock::{ClockSource, FixedClock, SystemClock};
pub use codec::{generate_identifier, Codec};
pub use derivation::{derive_key, is_blank_identifier, DerivedKey};
pub use descriptor::{Backing, DefaultValue, Field, FieldDescriptor, Generator, Validator};
pub use entity::{Entity, EntityBuilder};
pub use error::{MapperError, MapperResult};
pub use key::{Key, KeyId, PathElement};
pub use record_type::{lookup_kind, RecordType, RecordTypeBuilder, DEFAULT_IDENTIFIER_FIELD};
pub use row::StorageRow;
pub use types::{StorageValue, Value};
