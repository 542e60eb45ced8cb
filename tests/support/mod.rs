#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::Notify;

use monsterdex::application::catalog::CatalogService;
use monsterdex::application::monsters::{
    CreateMonsterCommand, MonsterImageUpload, MonsterWriteService,
};
use monsterdex::application::repos::{
    CreateMonsterParams, MonsterQueryFilter, MonsterSortField, MonstersRepo, MonstersWriteRepo,
    ReferenceRepo, RepoError, SortDirection, UpdateMonsterParams,
};
use monsterdex::application::storage::{ObjectStore, StorageError};
use monsterdex::cache::{CacheConfig, CacheTrigger, TtlCache};
use monsterdex::domain::entities::{CategoryRecord, MonsterImage, MonsterRecord, TypeRecord};
use monsterdex::domain::monsters::{Actor, ActorRole};

#[derive(Debug, Clone)]
struct StoredMonster {
    id: String,
    name: String,
    category_id: String,
    description: String,
    length: f32,
    weight: u16,
    hp: u16,
    attack: u16,
    defends: u16,
    speed: u16,
    captured: bool,
    image: Option<MonsterImage>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Default)]
struct Tables {
    monsters: BTreeMap<String, StoredMonster>,
    monster_types: Vec<(String, String)>,
}

/// Relational store kept in memory with the same referential checks as the schema.
pub struct MemoryCatalog {
    categories: Vec<CategoryRecord>,
    types: Vec<TypeRecord>,
    tables: Mutex<Tables>,
    sequence: AtomicUsize,
    epoch: OffsetDateTime,
    pub list_reads: AtomicUsize,
    pub find_reads: AtomicUsize,
    pub reference_reads: AtomicUsize,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::seeded()
    }
}

impl MemoryCatalog {
    pub fn seeded() -> Self {
        Self {
            categories: owned(&[("seed", "Seed"), ("lizard", "Lizard"), ("mouse", "Mouse")])
                .into_iter()
                .map(|(id, name)| CategoryRecord { id, name })
                .collect(),
            types: owned(&[
                ("grass", "Grass"),
                ("poison", "Poison"),
                ("fire", "Fire"),
                ("electric", "Electric"),
            ])
            .into_iter()
            .map(|(id, name)| TypeRecord { id, name })
            .collect(),
            tables: Mutex::new(Tables::default()),
            sequence: AtomicUsize::new(0),
            epoch: OffsetDateTime::UNIX_EPOCH + TimeDuration::days(20_000),
            list_reads: AtomicUsize::new(0),
            find_reads: AtomicUsize::new(0),
            reference_reads: AtomicUsize::new(0),
        }
    }

    pub fn monster_count(&self) -> usize {
        self.tables.lock().expect("tables").monsters.len()
    }

    pub fn association_count(&self) -> usize {
        self.tables.lock().expect("tables").monster_types.len()
    }

    fn tick(&self) -> OffsetDateTime {
        let step = self.sequence.fetch_add(1, Ordering::SeqCst) as i64;
        self.epoch + TimeDuration::seconds(step)
    }

    fn check_references(&self, category_id: &str, type_ids: &[String]) -> Result<(), RepoError> {
        if !self.categories.iter().any(|category| category.id == category_id) {
            return Err(RepoError::ConstraintViolation {
                constraint: "monsters_category_id_fkey".to_string(),
            });
        }
        if let Some(missing) = type_ids
            .iter()
            .find(|id| !self.types.iter().any(|ty| &ty.id == *id))
        {
            return Err(RepoError::ConstraintViolation {
                constraint: format!("monster_types_type_id_fkey ({missing})"),
            });
        }
        Ok(())
    }

    fn hydrate(&self, tables: &Tables, stored: &StoredMonster) -> MonsterRecord {
        let category = self
            .categories
            .iter()
            .find(|category| category.id == stored.category_id)
            .cloned()
            .unwrap_or_else(|| CategoryRecord {
                id: stored.category_id.clone(),
                name: String::new(),
            });
        let mut types: Vec<TypeRecord> = tables
            .monster_types
            .iter()
            .filter(|(monster_id, _)| monster_id == &stored.id)
            .filter_map(|(_, type_id)| self.types.iter().find(|ty| &ty.id == type_id).cloned())
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        MonsterRecord {
            id: stored.id.clone(),
            name: stored.name.clone(),
            category,
            description: stored.description.clone(),
            length: stored.length,
            weight: stored.weight,
            hp: stored.hp,
            attack: stored.attack,
            defends: stored.defends,
            speed: stored.speed,
            captured: stored.captured,
            image: stored.image.clone(),
            types,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }

    fn replace_types(tables: &mut Tables, id: &str, type_ids: &[String]) {
        tables.monster_types.retain(|(monster_id, _)| monster_id != id);
        for type_id in type_ids {
            let pair = (id.to_string(), type_id.clone());
            if !tables.monster_types.contains(&pair) {
                tables.monster_types.push(pair);
            }
        }
    }
}

fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect()
}

#[async_trait]
impl MonstersRepo for MemoryCatalog {
    async fn list_monsters(
        &self,
        filter: &MonsterQueryFilter,
    ) -> Result<Vec<MonsterRecord>, RepoError> {
        self.list_reads.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock().expect("tables");
        let needle = filter.name.as_ref().map(|name| name.to_lowercase());

        let mut matched: Vec<&StoredMonster> = tables
            .monsters
            .values()
            .filter(|monster| {
                needle
                    .as_ref()
                    .is_none_or(|needle| monster.name.to_lowercase().contains(needle))
            })
            .filter(|monster| filter.captured.is_none_or(|flag| monster.captured == flag))
            .filter(|monster| {
                filter.type_ids.is_empty()
                    || tables.monster_types.iter().any(|(monster_id, type_id)| {
                        monster_id == &monster.id && filter.type_ids.contains(type_id)
                    })
            })
            .collect();

        match filter.sort {
            Some(sort) => {
                matched.sort_by(|a, b| {
                    let ordering = match sort.field {
                        MonsterSortField::Name => a.name.cmp(&b.name),
                        MonsterSortField::Length => a.length.total_cmp(&b.length),
                        MonsterSortField::Weight => a.weight.cmp(&b.weight),
                        MonsterSortField::Hp => a.hp.cmp(&b.hp),
                        MonsterSortField::Attack => a.attack.cmp(&b.attack),
                        MonsterSortField::Defends => a.defends.cmp(&b.defends),
                        MonsterSortField::Speed => a.speed.cmp(&b.speed),
                        MonsterSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                        MonsterSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                    };
                    let ordering = match sort.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    };
                    ordering.then_with(|| a.id.cmp(&b.id))
                });
            }
            None => matched.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }

        Ok(matched
            .into_iter()
            .map(|monster| self.hydrate(&tables, monster))
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MonsterRecord>, RepoError> {
        self.find_reads.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock().expect("tables");
        Ok(tables
            .monsters
            .get(id)
            .map(|monster| self.hydrate(&tables, monster)))
    }
}

#[async_trait]
impl MonstersWriteRepo for MemoryCatalog {
    async fn create_monster(
        &self,
        params: CreateMonsterParams,
    ) -> Result<MonsterRecord, RepoError> {
        self.check_references(&params.category_id, &params.type_ids)?;

        let at = self.tick();
        let id = uuid::Uuid::new_v4().to_string();
        let stored = StoredMonster {
            id: id.clone(),
            name: params.name,
            category_id: params.category_id,
            description: params.description,
            length: params.length,
            weight: params.weight,
            hp: params.hp,
            attack: params.attack,
            defends: params.defends,
            speed: params.speed,
            captured: false,
            image: None,
            created_at: at,
            updated_at: at,
        };

        let mut tables = self.tables.lock().expect("tables");
        Self::replace_types(&mut tables, &id, &params.type_ids);
        tables.monsters.insert(id.clone(), stored);
        let record = self.hydrate(&tables, &tables.monsters[&id]);
        Ok(record)
    }

    async fn update_monster(
        &self,
        params: UpdateMonsterParams,
    ) -> Result<MonsterRecord, RepoError> {
        let type_ids = params.type_ids.clone().unwrap_or_default();
        self.check_references(&params.category_id, &type_ids)?;
        let at = self.tick();

        let mut tables = self.tables.lock().expect("tables");
        let stored = tables
            .monsters
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        stored.name = params.name;
        stored.category_id = params.category_id;
        stored.description = params.description;
        stored.length = params.length;
        stored.weight = params.weight;
        stored.hp = params.hp;
        stored.attack = params.attack;
        stored.defends = params.defends;
        stored.speed = params.speed;
        stored.captured = params.captured;
        stored.updated_at = at;

        if let Some(ids) = params.type_ids.filter(|ids| !ids.is_empty()) {
            Self::replace_types(&mut tables, &params.id, &ids);
        }
        let record = self.hydrate(&tables, &tables.monsters[&params.id]);
        Ok(record)
    }

    async fn set_monster_image(
        &self,
        id: &str,
        image: MonsterImage,
    ) -> Result<MonsterRecord, RepoError> {
        let mut tables = self.tables.lock().expect("tables");
        let stored = tables.monsters.get_mut(id).ok_or(RepoError::NotFound)?;
        stored.image = Some(image);
        let record = self.hydrate(&tables, &tables.monsters[id]);
        Ok(record)
    }

    async fn set_monster_captured(&self, id: &str, captured: bool) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().expect("tables");
        let stored = tables.monsters.get_mut(id).ok_or(RepoError::NotFound)?;
        stored.captured = captured;
        Ok(())
    }

    async fn delete_monster(&self, id: &str) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().expect("tables");
        tables.monster_types.retain(|(monster_id, _)| monster_id != id);
        tables
            .monsters
            .remove(id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl ReferenceRepo for MemoryCatalog {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        self.reference_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.categories.clone())
    }

    async fn list_types(&self) -> Result<Vec<TypeRecord>, RepoError> {
        self.reference_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.types.clone())
    }
}

/// Read side over a [`MemoryCatalog`] that can park one `find_by_id` after it has
/// loaded its row, so a write can run while the read is in flight.
pub struct GatedReads {
    inner: Arc<MemoryCatalog>,
    armed: AtomicBool,
    loaded: Notify,
    release: Notify,
}

impl GatedReads {
    pub fn new(inner: Arc<MemoryCatalog>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            loaded: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Park the next `find_by_id` once it has read its row.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until the parked read has loaded its row.
    pub async fn wait_loaded(&self) {
        self.loaded.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl MonstersRepo for GatedReads {
    async fn list_monsters(
        &self,
        filter: &MonsterQueryFilter,
    ) -> Result<Vec<MonsterRecord>, RepoError> {
        self.inner.list_monsters(filter).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MonsterRecord>, RepoError> {
        let row = self.inner.find_by_id(id).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.loaded.notify_one();
            self.release.notified().await;
        }
        Ok(row)
    }
}

/// Blob store kept in memory. `fail_puts` makes every upload fail.
#[derive(Default)]
pub struct MemoryBlobs {
    objects: Mutex<HashMap<String, Bytes>>,
    pub fail_puts: AtomicBool,
}

impl MemoryBlobs {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().expect("blobs").keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().expect("blobs").contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryBlobs {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<String, StorageError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::remote("bucket unavailable"));
        }
        self.objects
            .lock()
            .expect("blobs")
            .insert(key.to_string(), body);
        Ok(format!("https://blobs.test/{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().expect("blobs").remove(key);
        Ok(())
    }
}

/// Services wired over the in-memory stores, sharing one cache.
pub struct Harness {
    pub store: Arc<MemoryCatalog>,
    pub blobs: Arc<MemoryBlobs>,
    pub cache: Arc<TtlCache>,
    pub trigger: CacheTrigger,
    pub catalog: Arc<CatalogService>,
    pub writer: Arc<MonsterWriteService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let store = Arc::new(MemoryCatalog::seeded());
        let blobs = Arc::new(MemoryBlobs::default());
        let cache = Arc::new(TtlCache::new());
        let (trigger, _handle) = CacheTrigger::start(&config, Arc::clone(&cache));

        let reader: Arc<dyn MonstersRepo> = store.clone();
        let write: Arc<dyn MonstersWriteRepo> = store.clone();
        let reference: Arc<dyn ReferenceRepo> = store.clone();
        let object_store: Arc<dyn ObjectStore> = blobs.clone();

        let catalog = Arc::new(CatalogService::new(
            reader.clone(),
            reference,
            Arc::clone(&cache),
            trigger.clone(),
        ));
        let writer = Arc::new(MonsterWriteService::new(
            reader,
            write,
            object_store,
            trigger.clone(),
        ));

        Self {
            store,
            blobs,
            cache,
            trigger,
            catalog,
            writer,
        }
    }

    pub async fn settle(&self) {
        self.trigger.flush().await;
    }

    /// A catalog sharing this harness's cache and trigger whose detail reads can be parked.
    pub fn gated_catalog(&self) -> (Arc<GatedReads>, Arc<CatalogService>) {
        let gate = Arc::new(GatedReads::new(Arc::clone(&self.store)));
        let catalog = Arc::new(CatalogService::new(
            gate.clone(),
            self.store.clone(),
            Arc::clone(&self.cache),
            self.trigger.clone(),
        ));
        (gate, catalog)
    }
}

pub fn admin() -> Actor {
    Actor::new("professor-oak", ActorRole::Admin)
}

pub fn member() -> Actor {
    Actor::new("ash", ActorRole::Member)
}

pub fn png(filename: &str) -> MonsterImageUpload {
    MonsterImageUpload {
        filename: filename.to_string(),
        content_type: "image/png".to_string(),
        data: Bytes::from_static(b"\x89PNG\r\n\x1a\nfake"),
    }
}

pub fn create_command(name: &str, category_id: &str, type_ids: &[&str]) -> CreateMonsterCommand {
    CreateMonsterCommand {
        name: name.to_string(),
        category_id: category_id.to_string(),
        description: format!("{name} description"),
        length: 0.7,
        weight: 69,
        hp: 45,
        attack: 49,
        defends: 49,
        speed: 45,
        type_ids: type_ids.iter().map(|id| id.to_string()).collect(),
        image: png(&format!("{}.png", name.to_lowercase())),
    }
}
