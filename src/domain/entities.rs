//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub id: String,
    pub name: String,
}

/// Blob reference for a monster image.
///
/// `name` addresses the object store; `url` is the location the store resolved
/// for it and may change across re-uploads. The two only ever travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterImage {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterRecord {
    pub id: String,
    pub name: String,
    pub category: CategoryRecord,
    pub description: String,
    pub length: f32,
    pub weight: u16,
    pub hp: u16,
    pub attack: u16,
    pub defends: u16,
    pub speed: u16,
    pub captured: bool,
    pub image: Option<MonsterImage>,
    pub types: Vec<TypeRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl MonsterRecord {
    pub fn type_ids(&self) -> Vec<String> {
        self.types.iter().map(|ty| ty.id.clone()).collect()
    }

    pub fn image_name(&self) -> Option<&str> {
        self.image.as_ref().map(|image| image.name.as_str())
    }
}
