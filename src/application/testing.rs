//! In-memory repository doubles shared by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::application::repos::{
    GenerationRepo, NewRenderEntry, RenderEntryRepo, RepoError, SchemaRepo, SettingsRepo,
};
use crate::cache::RenderKey;
use crate::domain::render::{EntityId, Generation};
use crate::domain::settings::{SettingKey, SettingRecord};

pub(crate) struct MemorySchemaRepo {
    declared: i32,
    pub version: AtomicI32,
    pub tables: AtomicBool,
    pub applies: AtomicUsize,
    pub fail_next_apply: AtomicBool,
}

impl MemorySchemaRepo {
    pub fn new(declared: i32) -> Self {
        Self {
            declared,
            version: AtomicI32::new(0),
            tables: AtomicBool::new(false),
            applies: AtomicUsize::new(0),
            fail_next_apply: AtomicBool::new(false),
        }
    }

    pub fn installed(declared: i32) -> Self {
        let repo = Self::new(declared);
        repo.version.store(declared, Ordering::SeqCst);
        repo.tables.store(true, Ordering::SeqCst);
        repo
    }

    fn require_tables(&self) -> Result<(), RepoError> {
        if self.tables.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RepoError::missing_table("vellum_settings"))
        }
    }
}

#[async_trait]
impl SchemaRepo for MemorySchemaRepo {
    fn declared_version(&self) -> i32 {
        self.declared
    }

    async fn schema_version(&self) -> Result<i32, RepoError> {
        Ok(self.version.load(Ordering::SeqCst))
    }

    async fn tables_exist(&self) -> Result<bool, RepoError> {
        Ok(self.tables.load(Ordering::SeqCst))
    }

    async fn apply_schema(&self, target: i32) -> Result<(), RepoError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(RepoError::from_persistence("simulated DDL failure"));
        }
        self.tables.store(true, Ordering::SeqCst);
        self.version.fetch_max(target, Ordering::SeqCst);
        Ok(())
    }

    async fn drop_all(&self) -> Result<(), RepoError> {
        self.tables.store(false, Ordering::SeqCst);
        self.version.store(0, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MemorySettingsRepo {
    schema: std::sync::Arc<MemorySchemaRepo>,
    rows: Mutex<BTreeMap<String, SettingRecord>>,
    pub failing_keys: Mutex<HashSet<String>>,
    pub fail_imports: AtomicBool,
}

impl MemorySettingsRepo {
    pub fn new(schema: std::sync::Arc<MemorySchemaRepo>) -> Self {
        Self {
            schema,
            rows: Mutex::new(BTreeMap::new()),
            failing_keys: Mutex::new(HashSet::new()),
            fail_imports: AtomicBool::new(false),
        }
    }

    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|(key, record)| (key.clone(), record.value.clone()))
            .collect()
    }
}

#[async_trait]
impl SettingsRepo for MemorySettingsRepo {
    async fn find_setting(&self, key: &SettingKey) -> Result<Option<SettingRecord>, RepoError> {
        self.schema.require_tables()?;
        Ok(self.rows.lock().unwrap().get(key.as_str()).cloned())
    }

    async fn setting_exists(&self, key: &SettingKey) -> Result<bool, RepoError> {
        self.schema.require_tables()?;
        Ok(self.rows.lock().unwrap().contains_key(key.as_str()))
    }

    async fn upsert_setting(&self, key: &SettingKey, value: &Value) -> Result<(), RepoError> {
        self.schema.require_tables()?;
        if self.failing_keys.lock().unwrap().contains(key.as_str()) {
            return Err(RepoError::from_persistence("simulated write failure"));
        }
        self.rows.lock().unwrap().insert(
            key.as_str().to_string(),
            SettingRecord {
                key: key.as_str().to_string(),
                value: value.clone(),
                updated_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn delete_setting(&self, key: &SettingKey) -> Result<bool, RepoError> {
        self.schema.require_tables()?;
        Ok(self.rows.lock().unwrap().remove(key.as_str()).is_some())
    }

    async fn list_settings(&self) -> Result<Vec<SettingRecord>, RepoError> {
        self.schema.require_tables()?;
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn import_settings(
        &self,
        entries: &[(SettingKey, Value)],
        replace: bool,
    ) -> Result<u64, RepoError> {
        self.schema.require_tables()?;
        if self.fail_imports.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("simulated import failure"));
        }
        let mut rows = self.rows.lock().unwrap();
        let mut staged = if replace {
            BTreeMap::new()
        } else {
            rows.clone()
        };
        for (key, value) in entries {
            staged.insert(
                key.as_str().to_string(),
                SettingRecord {
                    key: key.as_str().to_string(),
                    value: value.clone(),
                    updated_at: OffsetDateTime::now_utc(),
                },
            );
        }
        *rows = staged;
        Ok(entries.len() as u64)
    }
}

#[derive(Default)]
pub(crate) struct MemoryGenerationRepo {
    counters: Mutex<HashMap<EntityId, Generation>>,
    pub reads: AtomicUsize,
}

#[async_trait]
impl GenerationRepo for MemoryGenerationRepo {
    async fn current_generation(&self, entity: EntityId) -> Result<Generation, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .counters
            .lock()
            .unwrap()
            .get(&entity)
            .copied()
            .unwrap_or_default())
    }

    async fn increment_generation(&self, entity: EntityId) -> Result<Generation, RepoError> {
        let mut counters = self.counters.lock().unwrap();
        let next = counters.get(&entity).copied().unwrap_or_default().next();
        counters.insert(entity, next);
        Ok(next)
    }
}

#[derive(Default)]
pub(crate) struct MemoryRenderEntryRepo {
    entries: Mutex<HashMap<String, (String, OffsetDateTime)>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MemoryRenderEntryRepo {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl RenderEntryRepo for MemoryRenderEntryRepo {
    async fn find_entry(
        &self,
        key: &RenderKey,
        now: OffsetDateTime,
    ) -> Result<Option<String>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&key.storage_key())
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(payload, _)| payload.clone()))
    }

    async fn store_entry(&self, entry: NewRenderEntry<'_>) -> Result<(), RepoError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().insert(
            entry.key.storage_key(),
            (entry.payload.to_string(), entry.expires_at),
        );
        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}
