//! Save, fetch and delete of mapped entities against a [`Store`].
//!
//! [`EntityStore`] is the only place where entities meet the backing store:
//! it stamps auto-now fields from an injected [`ClockSource`], maps entities to
//! rows, and rebuilds entities from fetched rows.

use std::sync::Arc;

use dsorm_core::{
    derive_key, is_blank_identifier, ClockSource, Entity, Key, MapperError, MapperResult,
    RecordType, SystemClock, Value,
};
use tracing::{debug, trace, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::Store;

/// Entity lifecycle over a pluggable [`Store`].
pub struct EntityStore {
    store: Arc<dyn Store>,
    clock: Arc<dyn ClockSource>,
    config: StoreConfig,
}

impl EntityStore {
    /// Creates an entity store reading time from the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: StoreConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the clock used to stamp auto-now fields.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Persists `entity` and returns its stored key.
    ///
    /// Auto-now fields are stamped before the row is built, so the entity
    /// reflects the saved timestamps afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Mapping`] if the entity cannot be mapped to a row
    /// and [`StoreError::Backend`] if the store rejects the write.
    pub async fn save(&self, entity: &mut Entity) -> StoreResult<Key> {
        let mut keys = self.save_all(std::slice::from_mut(entity)).await?;
        keys.pop()
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("store returned no key for put")))
    }

    /// Persists every entity in a single `put` call.
    ///
    /// Entities are stamped and mapped on copies; the copies replace the
    /// originals only once the store has accepted every row. On any error the
    /// entities are left untouched and nothing is written by this call.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save). A store that returns a different number
    /// of keys than rows sent is reported as [`StoreError::Backend`].
    pub async fn save_all(&self, entities: &mut [Entity]) -> StoreResult<Vec<Key>> {
        let now = self.clock.now_utc();
        let mut staged = entities.to_vec();
        let rows = staged
            .iter_mut()
            .map(|entity| {
                entity.apply_auto_now(now)?;
                entity.to_row()
            })
            .collect::<MapperResult<Vec<_>>>()?;

        let sent = rows.len();
        trace!(rows = sent, "put");
        let keys = self.store.put(rows).await?;
        if keys.len() != sent {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "store returned {} keys for {sent} rows",
                keys.len()
            )));
        }
        for (entity, saved) in entities.iter_mut().zip(staged) {
            *entity = saved;
        }
        debug!(rows = sent, "saved entities");
        Ok(keys)
    }

    /// Fetches the entity of `record_type` whose identifier is `id`.
    ///
    /// The identifier goes through the identifier field's codec first, so
    /// e.g. a text identifier given as bytes finds the same row. The key is
    /// built in the configured namespace with no parent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectDoesNotExist`] if no row is stored under
    /// the key, [`StoreError::Mapping`] if the identifier is blank or invalid
    /// or the row cannot be mapped back, and [`StoreError::Backend`] on store
    /// failure.
    pub async fn fetch_by_id(
        &self,
        record_type: &Arc<RecordType>,
        id: impl Into<Value>,
    ) -> StoreResult<Entity> {
        let key = self.key_for(record_type, id.into())?;
        trace!(kind = %record_type.kind(), key = %key, "get");
        let row = self
            .store
            .get(std::slice::from_ref(&key))
            .await?
            .into_iter()
            .next()
            .flatten();

        match row {
            Some(row) => Ok(Entity::from_row(record_type, row)?),
            None => Err(StoreError::ObjectDoesNotExist {
                kind: record_type.kind().to_string(),
                id: key.id().clone(),
            }),
        }
    }

    /// Fetches every entity of `record_type` whose identifier is in `ids`.
    ///
    /// Missing rows are omitted; found entities keep the order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Mapping`] if any identifier is invalid or a row
    /// cannot be mapped back, and [`StoreError::Backend`] on store failure.
    pub async fn fetch_many<I, V>(
        &self,
        record_type: &Arc<RecordType>,
        ids: I,
    ) -> StoreResult<Vec<Entity>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let keys = ids
            .into_iter()
            .map(|id| self.key_for(record_type, id.into()))
            .collect::<StoreResult<Vec<_>>>()?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        trace!(kind = %record_type.kind(), keys = keys.len(), "get");
        let rows = self.store.get(&keys).await?;
        if rows.len() != keys.len() {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "store returned {} rows for {} keys",
                rows.len(),
                keys.len()
            )));
        }

        let entities = rows
            .into_iter()
            .flatten()
            .map(|row| Entity::from_row(record_type, row))
            .collect::<Result<Vec<_>, _>>()?;
        if entities.len() < keys.len() {
            warn!(
                kind = %record_type.kind(),
                requested = keys.len(),
                found = entities.len(),
                "fetch omitted missing rows"
            );
        }
        Ok(entities)
    }

    /// Deletes the stored row of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on store failure.
    pub async fn delete(&self, entity: &Entity) -> StoreResult<()> {
        self.delete_keys(std::slice::from_ref(entity.key())).await
    }

    /// Deletes the rows stored under `keys`. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on store failure.
    pub async fn delete_keys(&self, keys: &[Key]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        trace!(keys = keys.len(), "delete");
        self.store.delete(keys).await?;
        debug!(keys = keys.len(), "deleted entities");
        Ok(())
    }

    fn key_for(&self, record_type: &RecordType, id: Value) -> StoreResult<Key> {
        if is_blank_identifier(&id) {
            return Err(MapperError::MissingIdentifier {
                kind: record_type.kind().to_string(),
                field: record_type.identifier_name().to_string(),
            }
            .into());
        }
        let derived = derive_key(record_type, Some(id), None, self.config.namespace.clone())?;
        Ok(derived.key)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use dsorm_core::{Field, FixedClock, KeyId, StorageRow, StorageValue};

    use super::*;
    use crate::memory::MemoryStore;

    fn person(kind: &str) -> Arc<RecordType> {
        RecordType::builder(kind)
            .field("name", Field::text())
            .field("age", Field::integer().default(0))
            .register()
            .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, EntityStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = EntityStore::new(memory.clone(), StoreConfig::default());
        (memory, store)
    }

    fn at(millis: i64) -> NaiveDateTime {
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap()
            .naive_utc()
    }

    #[tokio::test]
    async fn save_then_fetch_by_id() {
        let kind = person("LifecyclePerson");
        let (_, store) = setup();
        let mut ann = Entity::builder(&kind)
            .value("id", "ann")
            .value("name", "Ann")
            .build()
            .unwrap();

        let key = store.save(&mut ann).await.unwrap();
        assert_eq!(key, Key::new("LifecyclePerson", "ann"));

        let mut fetched = store.fetch_by_id(&kind, "ann").await.unwrap();
        assert_eq!(fetched.key(), &key);
        assert_eq!(fetched.get("name").unwrap(), Value::from("Ann"));
        assert_eq!(fetched.get("age").unwrap(), Value::Int(0));
    }

    #[tokio::test]
    async fn save_materializes_defaults_in_row() {
        let kind = person("LifecycleDefaults");
        let (memory, store) = setup();
        let mut entity = Entity::builder(&kind).value("id", "x").build().unwrap();
        let key = store.save(&mut entity).await.unwrap();

        let row = memory.get(&[key]).await.unwrap().remove(0).unwrap();
        assert_eq!(row.fields.get("age"), Some(&StorageValue::Int(0)));
        assert_eq!(
            row.fields.get("id"),
            Some(&StorageValue::String("x".into()))
        );
        assert!(row.excluded_from_index.contains("name"));
    }

    #[tokio::test]
    async fn fetch_missing_is_object_does_not_exist() {
        let kind = person("LifecycleMissing");
        let (_, store) = setup();
        let err = store.fetch_by_id(&kind, "ghost").await.unwrap_err();
        match err {
            StoreError::ObjectDoesNotExist { kind, id } => {
                assert_eq!(kind, "LifecycleMissing");
                assert_eq!(id, KeyId::from("ghost"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn fetch_blank_id_is_missing_identifier() {
        let kind = person("LifecycleNullId");
        let (_, store) = setup();
        for blank in [Value::Null, Value::from("")] {
            let err = store.fetch_by_id(&kind, blank).await.unwrap_err();
            assert!(matches!(
                err,
                StoreError::Mapping(MapperError::MissingIdentifier { .. })
            ));
        }
    }

    #[tokio::test]
    async fn fetch_canonicalizes_identifier() {
        let kind = RecordType::builder("LifecycleCanonical")
            .field("id", Field::text().as_identifier(true))
            .register()
            .unwrap();
        let (_, store) = setup();
        let mut entity = Entity::builder(&kind).value("id", "abc").build().unwrap();
        store.save(&mut entity).await.unwrap();

        let fetched = store
            .fetch_by_id(&kind, Value::Bytes(b"abc".to_vec()))
            .await
            .unwrap();
        assert_eq!(fetched.key().id(), &KeyId::from("abc"));
    }

    #[tokio::test]
    async fn fetch_many_omits_missing_and_keeps_order() {
        let kind = person("LifecycleMany");
        let (_, store) = setup();
        let mut entities = vec![
            Entity::builder(&kind).value("id", "a").build().unwrap(),
            Entity::builder(&kind).value("id", "c").build().unwrap(),
        ];
        let keys = store.save_all(&mut entities).await.unwrap();
        assert_eq!(keys.len(), 2);

        let fetched = store.fetch_many(&kind, ["c", "b", "a"]).await.unwrap();
        let ids: Vec<_> = fetched.iter().map(|e| e.key().id().clone()).collect();
        assert_eq!(ids, vec![KeyId::from("c"), KeyId::from("a")]);
    }

    #[tokio::test]
    async fn fetch_many_with_no_ids_skips_store() {
        let kind = person("LifecycleManyEmpty");
        let (_, store) = setup();
        let fetched = store
            .fetch_many(&kind, Vec::<Value>::new())
            .await
            .unwrap();
        assert!(fetched.is_empty());
    }

    #[tokio::test]
    async fn integer_identifiers_round_trip() {
        let kind = RecordType::builder("LifecycleIntId")
            .field("id", Field::integer().as_identifier(true))
            .field("label", Field::text())
            .register()
            .unwrap();
        let (_, store) = setup();
        let mut entity = Entity::builder(&kind)
            .value("id", 42)
            .value("label", "answer")
            .build()
            .unwrap();
        store.save(&mut entity).await.unwrap();

        let mut fetched = store.fetch_by_id(&kind, 42).await.unwrap();
        assert_eq!(fetched.key().id(), &KeyId::Id(42));
        assert_eq!(fetched.get("label").unwrap(), Value::from("answer"));
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let kind = person("LifecycleDelete");
        let (memory, store) = setup();
        let mut entity = Entity::builder(&kind).value("id", "gone").build().unwrap();
        let key = store.save(&mut entity).await.unwrap();
        assert!(memory.contains_key(&key));

        store.delete(&entity).await.unwrap();
        assert!(!memory.contains_key(&key));
        assert!(matches!(
            store.fetch_by_id(&kind, "gone").await,
            Err(StoreError::ObjectDoesNotExist { .. })
        ));
    }

    #[tokio::test]
    async fn delete_keys_ignores_missing() {
        let (memory, store) = setup();
        memory.insert_raw(StorageRow::new(Key::new("LifecycleRaw", "a")));
        store
            .delete_keys(&[Key::new("LifecycleRaw", "a"), Key::new("LifecycleRaw", "b")])
            .await
            .unwrap();
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn configured_namespace_scopes_fetch() {
        let kind = person("LifecycleNamespaced");
        let memory = Arc::new(MemoryStore::new());
        let scoped = EntityStore::new(
            memory.clone(),
            StoreConfig::default().with_namespace("tenant-a"),
        );
        let unscoped = EntityStore::new(memory.clone(), StoreConfig::default());

        let mut entity = Entity::builder(&kind)
            .value("id", "n1")
            .namespace("tenant-a")
            .build()
            .unwrap();
        let key = scoped.save(&mut entity).await.unwrap();
        assert_eq!(key.namespace(), Some("tenant-a"));

        assert!(scoped.fetch_by_id(&kind, "n1").await.is_ok());
        assert!(matches!(
            unscoped.fetch_by_id(&kind, "n1").await,
            Err(StoreError::ObjectDoesNotExist { .. })
        ));
    }

    #[tokio::test]
    async fn auto_now_fields_use_injected_clock() {
        let kind = RecordType::builder("LifecycleStamped")
            .field("created", Field::datetime().auto_now_add(true))
            .field("updated", Field::datetime().auto_now(true))
            .field("day", Field::date().auto_now(true))
            .register()
            .unwrap();
        let clock = Arc::new(FixedClock::new(1_700_000_000_000));
        let (_, store) = setup();
        let store = store.with_clock(clock.clone());

        let mut entity = Entity::builder(&kind).value("id", "s").build().unwrap();
        store.save(&mut entity).await.unwrap();
        let first = at(1_700_000_000_000);
        assert_eq!(entity.get("created").unwrap(), Value::DateTime(first));
        assert_eq!(entity.get("updated").unwrap(), Value::DateTime(first));
        assert_eq!(
            entity.get("day").unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2023, 11, 14).unwrap())
        );

        clock.advance(60_000);
        store.save(&mut entity).await.unwrap();
        let second = at(1_700_000_060_000);
        assert_eq!(entity.get("created").unwrap(), Value::DateTime(first));
        assert_eq!(entity.get("updated").unwrap(), Value::DateTime(second));

        let mut fetched = store.fetch_by_id(&kind, "s").await.unwrap();
        assert_eq!(fetched.get("created").unwrap(), Value::DateTime(first));
        assert_eq!(fetched.get("updated").unwrap(), Value::DateTime(second));
    }

    #[tokio::test]
    async fn required_field_without_value_is_not_saved() {
        let kind = RecordType::builder("LifecycleRequired")
            .field("email", Field::text().required(true))
            .register()
            .unwrap();
        let (memory, store) = setup();
        let mut entity = Entity::builder(&kind).value("id", "r").build().unwrap();
        let err = store.save(&mut entity).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Mapping(MapperError::RequiredValue { .. })
        ));
        assert!(memory.is_empty());
    }

    struct RejectingStore;

    #[async_trait::async_trait]
    impl Store for RejectingStore {
        async fn get(&self, keys: &[Key]) -> anyhow::Result<Vec<Option<StorageRow>>> {
            Ok(vec![None; keys.len()])
        }

        async fn put(&self, _rows: Vec<StorageRow>) -> anyhow::Result<Vec<Key>> {
            anyhow::bail!("write rejected")
        }

        async fn delete(&self, _keys: &[Key]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn stamped(kind: &str) -> Arc<RecordType> {
        RecordType::builder(kind)
            .field("email", Field::text().required(true))
            .field("updated", Field::datetime().auto_now(true))
            .register()
            .unwrap()
    }

    #[tokio::test]
    async fn failed_batch_leaves_entities_untouched() {
        let kind = stamped("LifecycleBatchFailure");
        let (memory, store) = setup();
        let store = store.with_clock(Arc::new(FixedClock::new(1_700_000_000_000)));
        let mut entities = vec![
            Entity::builder(&kind)
                .value("id", "ok")
                .value("email", "a@example.com")
                .build()
                .unwrap(),
            Entity::builder(&kind).value("id", "bad").build().unwrap(),
        ];

        let err = store.save_all(&mut entities).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Mapping(MapperError::RequiredValue { .. })
        ));
        assert!(memory.is_empty());
        assert!(entities[0].raw("updated").is_none());
        assert_eq!(entities[0].get("updated").unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn rejected_write_leaves_entity_untouched() {
        let kind = stamped("LifecycleRejectedWrite");
        let store = EntityStore::new(Arc::new(RejectingStore), StoreConfig::default())
            .with_clock(Arc::new(FixedClock::new(1_700_000_000_000)));
        let mut entity = Entity::builder(&kind)
            .value("id", "w")
            .value("email", "w@example.com")
            .build()
            .unwrap();

        let err = store.save(&mut entity).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(entity.raw("updated").is_none());
    }

    #[tokio::test]
    async fn successful_batch_stamps_every_entity() {
        let kind = stamped("LifecycleBatchSuccess");
        let (_, store) = setup();
        let store = store.with_clock(Arc::new(FixedClock::new(1_700_000_000_000)));
        let mut entities = vec![
            Entity::builder(&kind)
                .value("id", "a")
                .value("email", "a@example.com")
                .build()
                .unwrap(),
            Entity::builder(&kind)
                .value("id", "b")
                .value("email", "b@example.com")
                .build()
                .unwrap(),
        ];
        store.save_all(&mut entities).await.unwrap();
        for entity in &mut entities {
            assert_eq!(
                entity.get("updated").unwrap(),
                Value::DateTime(at(1_700_000_000_000))
            );
        }
    }

    #[tokio::test]
    async fn unindexed_fields_are_reported_to_store() {
        let kind = RecordType::builder("LifecycleUnindexed")
            .field("bio", Field::text())
            .field("score", Field::integer())
            .register()
            .unwrap();
        let (memory, store) = setup();
        let mut entity = Entity::builder(&kind)
            .value("id", "u")
            .value("bio", "hello")
            .value("score", 3)
            .build()
            .unwrap();
        let key = store.save(&mut entity).await.unwrap();
        let row = memory.get(&[key]).await.unwrap().remove(0).unwrap();
        assert!(row.excluded_from_index.contains("bio"));
        assert!(!row.excluded_from_index.contains("score"));
    }

    #[tokio::test]
    async fn parent_keys_survive_save_and_raw_fetch() {
        let kind = person("LifecycleChild");
        let (memory, store) = setup();
        let parent = Key::new("Org", "acme");
        let mut entity = Entity::builder(&kind)
            .value("id", "kid")
            .parent(parent.clone())
            .build()
            .unwrap();
        let key = store.save(&mut entity).await.unwrap();
        assert_eq!(key.parent(), Some(&parent));

        let row = memory.get(&[key.clone()]).await.unwrap().remove(0).unwrap();
        let rebuilt = Entity::from_row(&kind, row).unwrap();
        assert_eq!(rebuilt.key(), &key);
    }
}
