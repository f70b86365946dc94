//! Storage keys: `(kind, identifier, parent)` plus an optional namespace.
//!
//! A key's identifier is either a numeric id or a string name. Keys are
//! values: they are never mutated in place once bound to an entity, and a
//! changed identifier always produces a new key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, MapperResult};
use crate::types::{StorageValue, Value};

/// Identifier component of a [`Key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyId {
    /// Numeric id.
    Id(i64),
    /// String name.
    Name(String),
}

impl KeyId {
    /// Builds an identifier from the storage form of an identifier field.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::TypeConstraint`] for anything other than an
    /// integer or string.
    pub fn from_storage(field: &str, stored: &StorageValue) -> MapperResult<Self> {
        match stored {
            StorageValue::Int(i) => Ok(KeyId::Id(*i)),
            StorageValue::String(s) => Ok(KeyId::Name(s.clone())),
            other => Err(MapperError::type_constraint(
                field,
                "int or string identifier",
                other.type_name(),
            )),
        }
    }

    /// Rich value of this identifier.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            KeyId::Id(i) => Value::Int(*i),
            KeyId::Name(s) => Value::String(s.clone()),
        }
    }
}

impl From<i64> for KeyId {
    fn from(v: i64) -> Self {
        KeyId::Id(v)
    }
}

impl From<i32> for KeyId {
    fn from(v: i32) -> Self {
        KeyId::Id(i64::from(v))
    }
}

impl From<&str> for KeyId {
    fn from(v: &str) -> Self {
        KeyId::Name(v.to_string())
    }
}

impl From<String> for KeyId {
    fn from(v: String) -> Self {
        KeyId::Name(v)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Id(i) => write!(f, "{i}"),
            KeyId::Name(s) => write!(f, "{s:?}"),
        }
    }
}

/// One `(kind, identifier)` step of a key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathElement {
    pub kind: String,
    pub id: KeyId,
}

/// Fully qualified storage key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    kind: String,
    id: KeyId,
    parent: Option<Box<Key>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

impl Key {
    /// Creates a root key in the default namespace.
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            parent: None,
            namespace: None,
        }
    }

    /// Creates a key under `parent`, inheriting the parent's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::InvalidParent`] if `parent` is not a valid key.
    pub fn with_parent(
        kind: impl Into<String>,
        id: impl Into<KeyId>,
        parent: Key,
    ) -> MapperResult<Self> {
        parent
            .validate()
            .map_err(|e| MapperError::InvalidParent {
                reason: e.to_string(),
            })?;
        Ok(Self {
            kind: kind.into(),
            id: id.into(),
            namespace: parent.namespace.clone(),
            parent: Some(Box::new(parent)),
        })
    }

    /// Builds a key from root-first `(kind, id)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::InvalidKey`] for an empty path or an invalid element.
    pub fn from_pairs<I, K, V>(pairs: I) -> MapperResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<KeyId>,
    {
        Self::from_path(
            pairs
                .into_iter()
                .map(|(kind, id)| PathElement {
                    kind: kind.into(),
                    id: id.into(),
                })
                .collect(),
        )
    }

    /// Builds a key from a root-first path.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::InvalidKey`] for an empty path or an invalid element.
    pub fn from_path(path: Vec<PathElement>) -> MapperResult<Self> {
        let mut key: Option<Key> = None;
        for element in path {
            key = Some(Key {
                kind: element.kind,
                id: element.id,
                parent: key.map(Box::new),
                namespace: None,
            });
        }
        let key = key.ok_or_else(|| MapperError::InvalidKey {
            reason: "a key path needs at least one element".into(),
        })?;
        key.validate()?;
        Ok(key)
    }

    /// Returns this key (and its ancestors) moved into `namespace`.
    #[must_use]
    pub fn in_namespace(mut self, namespace: Option<String>) -> Self {
        self.parent = self
            .parent
            .map(|p| Box::new(p.in_namespace(namespace.clone())));
        self.namespace = namespace;
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Root-first `(kind, id)` path of this key.
    #[must_use]
    pub fn path(&self) -> Vec<PathElement> {
        let mut path = self.parent.as_ref().map(|p| p.path()).unwrap_or_default();
        path.push(PathElement {
            kind: self.kind.clone(),
            id: self.id.clone(),
        });
        path
    }

    /// Checks structural validity: non-empty kinds and names, and a single
    /// namespace across the whole path.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::InvalidKey`] describing the first problem found.
    pub fn validate(&self) -> MapperResult<()> {
        if self.kind.is_empty() {
            return Err(MapperError::InvalidKey {
                reason: "kind must not be empty".into(),
            });
        }
        if matches!(&self.id, KeyId::Name(name) if name.is_empty()) {
            return Err(MapperError::InvalidKey {
                reason: format!("kind '{}': name must not be empty", self.kind),
            });
        }
        if let Some(parent) = &self.parent {
            if parent.namespace != self.namespace {
                return Err(MapperError::InvalidKey {
                    reason: format!(
                        "parent namespace {:?} differs from {:?}",
                        parent.namespace, self.namespace
                    ),
                });
            }
            parent.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{parent}/")?;
        } else if let Some(ns) = &self.namespace {
            write!(f, "[{ns}]")?;
        }
        write!(f, "{}:{}", self.kind, self.id)
    }
}
