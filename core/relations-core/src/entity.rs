use crate::clock::Clock;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The kinds of domain items that take part in indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Term,
    Text,
    Person,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Term, EntityType::Text, EntityType::Person];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Term => "term",
            EntityType::Text => "text",
            EntityType::Person => "person",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "term" => Ok(EntityType::Term),
            "text" => Ok(EntityType::Text),
            "person" => Ok(EntityType::Person),
            other => bail!("unknown item type: {}", other),
        }
    }
}

/// Read-only view of a domain item as the indexer needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntity {
    pub id: u64,
    pub entity_type: EntityType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Type-specific extras such as a text's author or a person's first name.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl IndexedEntity {
    /// Unique key across all item types, used to replace stale documents.
    pub fn uid(&self) -> String {
        uid(self.entity_type, self.id)
    }

    /// The later of the creation and modification instants.
    pub fn last_change(&self) -> DateTime<Utc> {
        self.created.max(self.modified)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

pub fn uid(entity_type: EntityType, id: u64) -> String {
    format!("{}:{}", entity_type.as_str(), id)
}

/// The domain data layer, as seen by the refresh engine.
pub trait EntitySource: Send + Sync {
    /// Items of `entity_type` created or modified at or after `since`.
    fn changed_since(
        &self,
        entity_type: EntityType,
        since: DateTime<Utc>,
    ) -> Result<Vec<IndexedEntity>>;

    fn all(&self, entity_type: EntityType) -> Result<Vec<IndexedEntity>>;
}

/// In-memory entity store that stamps items with the supplied clock.
pub struct MemorySource {
    clock: Arc<dyn Clock>,
    items: RwLock<BTreeMap<(EntityType, u64), IndexedEntity>>,
    next_id: RwLock<u64>,
}

impl MemorySource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            items: RwLock::new(BTreeMap::new()),
            next_id: RwLock::new(1),
        }
    }

    /// Creates a new item and returns its identifier.
    pub fn create(&self, entity_type: EntityType, title: &str, body: &str) -> u64 {
        self.create_with(entity_type, title, body, BTreeMap::new())
    }

    pub fn create_with(
        &self,
        entity_type: EntityType,
        title: &str,
        body: &str,
        attributes: BTreeMap<String, String>,
    ) -> u64 {
        let id = {
            let mut next = self.next_id.write();
            let id = *next;
            *next += 1;
            id
        };
        let now = self.clock.now();
        self.items.write().insert(
            (entity_type, id),
            IndexedEntity {
                id,
                entity_type,
                title: title.to_string(),
                body: body.to_string(),
                created: now,
                modified: now,
                attributes,
            },
        );
        id
    }

    /// Inserts an item as given, keeping its own identifier and timestamps.
    pub fn insert(&self, entity: IndexedEntity) {
        {
            let mut next = self.next_id.write();
            if entity.id >= *next {
                *next = entity.id + 1;
            }
        }
        self.items
            .write()
            .insert((entity.entity_type, entity.id), entity);
    }

    /// Applies `edit` to an item and bumps its modification time.
    pub fn modify<F>(&self, entity_type: EntityType, id: u64, edit: F) -> Result<()>
    where
        F: FnOnce(&mut IndexedEntity),
    {
        let mut items = self.items.write();
        let Some(entity) = items.get_mut(&(entity_type, id)) else {
            bail!("no {} with id {}", entity_type, id);
        };
        edit(entity);
        entity.modified = self.clock.now();
        Ok(())
    }

    pub fn remove(&self, entity_type: EntityType, id: u64) -> Option<IndexedEntity> {
        self.items.write().remove(&(entity_type, id))
    }

    pub fn get(&self, entity_type: EntityType, id: u64) -> Option<IndexedEntity> {
        self.items.read().get(&(entity_type, id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl EntitySource for MemorySource {
    fn changed_since(
        &self,
        entity_type: EntityType,
        since: DateTime<Utc>,
    ) -> Result<Vec<IndexedEntity>> {
        Ok(self
            .items
            .read()
            .values()
            .filter(|entity| entity.entity_type == entity_type)
            .filter(|entity| entity.created >= since || entity.modified >= since)
            .cloned()
            .collect())
    }

    fn all(&self, entity_type: EntityType) -> Result<Vec<IndexedEntity>> {
        Ok(self
            .items
            .read()
            .values()
            .filter(|entity| entity.entity_type == entity_type)
            .cloned()
            .collect())
    }
}
