//! Write coordination across the relational store, the blob store and the cache.
//!
//! Relational writes are the only transactional step. Blob work follows a committed
//! relational write and cache work always comes last; nothing is rolled back when a
//! later step fails.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::application::catalog::encode_payload;
use crate::application::error::CatalogError;
use crate::application::repos::{
    CreateMonsterParams, MonstersRepo, MonstersWriteRepo, UpdateMonsterParams,
};
use crate::application::storage::{ObjectStore, StorageError};
use crate::cache::{CacheKey, CacheTrigger};
use crate::domain::entities::{MonsterImage, MonsterRecord};
use crate::domain::monsters::{Actor, MonsterFields, MonsterPatch, image_object_key};

pub const DEFAULT_BLOB_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MonsterImageUpload {
    pub filename: String,
    /// Declared content type; guessed from the filename when blank.
    pub content_type: String,
    pub data: Bytes,
}

impl MonsterImageUpload {
    fn resolved_content_type(&self) -> String {
        let declared = self.content_type.trim();
        if declared.is_empty() {
            mime_guess::from_path(&self.filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        } else {
            declared.to_string()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateMonsterCommand {
    pub name: String,
    pub category_id: String,
    pub description: String,
    pub length: f32,
    pub weight: u16,
    pub hp: u16,
    pub attack: u16,
    pub defends: u16,
    pub speed: u16,
    pub type_ids: Vec<String>,
    pub image: MonsterImageUpload,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMonsterCommand {
    pub patch: MonsterPatch,
    /// Replaces the associations only when at least one non-blank id is present.
    pub type_ids: Vec<String>,
    pub image: Option<MonsterImageUpload>,
}

#[derive(Clone)]
pub struct MonsterWriteService {
    reader: Arc<dyn MonstersRepo>,
    writer: Arc<dyn MonstersWriteRepo>,
    blobs: Arc<dyn ObjectStore>,
    trigger: CacheTrigger,
    blob_timeout: Duration,
}

impl MonsterWriteService {
    pub fn new(
        reader: Arc<dyn MonstersRepo>,
        writer: Arc<dyn MonstersWriteRepo>,
        blobs: Arc<dyn ObjectStore>,
        trigger: CacheTrigger,
    ) -> Self {
        Self {
            reader,
            writer,
            blobs,
            trigger,
            blob_timeout: DEFAULT_BLOB_TIMEOUT,
        }
    }

    pub fn with_blob_timeout(mut self, timeout: Duration) -> Self {
        self.blob_timeout = timeout;
        self
    }

    pub async fn create(
        &self,
        actor: &Actor,
        command: CreateMonsterCommand,
    ) -> Result<MonsterRecord, CatalogError> {
        ensure_admin(actor, "create monsters")?;

        let CreateMonsterCommand {
            name,
            category_id,
            description,
            length,
            weight,
            hp,
            attack,
            defends,
            speed,
            type_ids,
            image,
        } = command;

        let record = self
            .writer
            .create_monster(CreateMonsterParams {
                name,
                category_id,
                description,
                length,
                weight,
                hp,
                attack,
                defends,
                speed,
                type_ids: normalize_ids(type_ids),
            })
            .await?;
        info!(monster_id = %record.id, actor = %actor.id, "Monster row created");

        let key = image_object_key(&actor.id, OffsetDateTime::now_utc(), &image.filename);
        let location = match self.upload(&key, &image).await {
            Ok(location) => location,
            Err(err) => {
                warn!(
                    monster_id = %record.id,
                    blob_key = %key,
                    error = %err,
                    "Image upload failed; monster kept without image"
                );
                self.trigger.invalidate(&CacheKey::MonsterList);
                return Err(err.into());
            }
        };

        let record = self
            .writer
            .set_monster_image(
                &record.id,
                MonsterImage {
                    name: key,
                    url: location,
                },
            )
            .await
            .map_err(|err| {
                self.trigger.invalidate(&CacheKey::MonsterList);
                CatalogError::for_monster(&record.id, err)
            })?;

        self.trigger.invalidate(&CacheKey::MonsterList);
        self.populate(&record);
        Ok(record)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: &str,
        command: UpdateMonsterCommand,
    ) -> Result<MonsterRecord, CatalogError> {
        ensure_admin(actor, "update monsters")?;

        let current = self.load(id).await?;
        let fields = MonsterFields::from(&current);
        let merged = command.patch.apply(&fields)?;
        let type_ids = Some(normalize_ids(command.type_ids)).filter(|ids| !ids.is_empty());

        if merged == fields && type_ids.is_none() && command.image.is_none() {
            debug!(monster_id = %id, "Update carries no changes");
            return Ok(current);
        }

        let mut record = self
            .writer
            .update_monster(UpdateMonsterParams {
                id: current.id.clone(),
                name: merged.name,
                category_id: merged.category_id,
                description: merged.description,
                length: merged.length,
                weight: merged.weight,
                hp: merged.hp,
                attack: merged.attack,
                defends: merged.defends,
                speed: merged.speed,
                captured: merged.captured,
                type_ids,
            })
            .await
            .map_err(|err| CatalogError::for_monster(id, err))?;

        if let Some(image) = command.image {
            record = match self.replace_image(actor, &record, &image).await {
                Ok(updated) => updated,
                Err(err) => {
                    self.invalidate(id);
                    return Err(err);
                }
            };
        }

        self.invalidate(id);
        self.populate(&record);
        info!(monster_id = %id, actor = %actor.id, "Monster updated");
        Ok(record)
    }

    /// Any actor may flip the captured flag.
    pub async fn mark_captured(
        &self,
        actor: &Actor,
        id: &str,
        captured: bool,
    ) -> Result<bool, CatalogError> {
        let current = self.load(id).await?;

        self.writer
            .set_monster_captured(&current.id, captured)
            .await
            .map_err(|err| CatalogError::for_monster(id, err))?;

        self.invalidate(id);
        info!(monster_id = %id, actor = %actor.id, captured, "Monster captured flag set");
        Ok(true)
    }

    pub async fn delete(&self, actor: &Actor, id: &str) -> Result<bool, CatalogError> {
        ensure_admin(actor, "delete monsters")?;
        if id.trim().is_empty() {
            return Err(CatalogError::not_found(id));
        }

        let current = self.load(id).await?;
        self.writer
            .delete_monster(&current.id)
            .await
            .map_err(|err| CatalogError::for_monster(id, err))?;

        if let Some(name) = current.image_name() {
            if let Err(err) = self.remove_blob(name).await {
                warn!(monster_id = %id, blob_key = %name, error = %err, "Image delete failed");
                self.invalidate(id);
                return Err(err.into());
            }
        }

        self.invalidate(id);
        info!(monster_id = %id, actor = %actor.id, "Monster deleted");
        Ok(true)
    }

    async fn load(&self, id: &str) -> Result<MonsterRecord, CatalogError> {
        self.reader
            .find_by_id(id)
            .await
            .map_err(|err| CatalogError::for_monster(id, err))?
            .ok_or_else(|| CatalogError::not_found(id))
    }

    async fn replace_image(
        &self,
        actor: &Actor,
        record: &MonsterRecord,
        image: &MonsterImageUpload,
    ) -> Result<MonsterRecord, CatalogError> {
        if let Some(previous) = record.image_name() {
            self.remove_blob(previous).await?;
        }

        let key = image_object_key(&actor.id, OffsetDateTime::now_utc(), &image.filename);
        let location = self.upload(&key, image).await?;
        self.writer
            .set_monster_image(
                &record.id,
                MonsterImage {
                    name: key,
                    url: location,
                },
            )
            .await
            .map_err(|err| CatalogError::for_monster(&record.id, err))
    }

    async fn upload(&self, key: &str, image: &MonsterImageUpload) -> Result<String, StorageError> {
        let content_type = image.resolved_content_type();
        let location = self
            .bounded(
                "put",
                self.blobs.put(key, image.data.clone(), &content_type),
            )
            .await?;
        debug!(blob_key = %key, bytes = image.data.len(), "Image uploaded");
        Ok(location)
    }

    async fn remove_blob(&self, key: &str) -> Result<(), StorageError> {
        self.bounded("delete", self.blobs.delete(key)).await?;
        debug!(blob_key = %key, "Image deleted");
        Ok(())
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.blob_timeout, call)
            .await
            .unwrap_or(Err(StorageError::Timeout { operation }))
    }

    fn invalidate(&self, id: &str) {
        self.trigger.invalidate(&CacheKey::monster(id));
        self.trigger.invalidate(&CacheKey::MonsterList);
    }

    fn populate(&self, record: &MonsterRecord) {
        let key = CacheKey::monster(record.id.as_str());
        if let Some(payload) = encode_payload(&key, record) {
            self.trigger.store(&key, payload);
        }
    }
}

fn ensure_admin(actor: &Actor, action: &'static str) -> Result<(), CatalogError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(CatalogError::Forbidden {
            actor: actor.id.clone(),
            action,
        })
    }
}

fn normalize_ids(ids: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !normalized.iter().any(|existing| existing == id) {
            normalized.push(id.to_string());
        }
    }
    normalized
}
