//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{CategoryRecord, MonsterImage, MonsterRecord, TypeRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    /// A referenced row does not exist. Raised for foreign-key violations regardless of backend.
    #[error("constraint `{constraint}` rejected a missing reference")]
    ConstraintViolation { constraint: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Columns a list read may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonsterSortField {
    Name,
    Length,
    Weight,
    Hp,
    Attack,
    Defends,
    Speed,
    CreatedAt,
    UpdatedAt,
}

impl MonsterSortField {
    pub fn parse(value: &str) -> Option<Self> {
        let field = match value.trim().to_ascii_lowercase().as_str() {
            "name" => Self::Name,
            "length" => Self::Length,
            "weight" => Self::Weight,
            "hp" => Self::Hp,
            "attack" => Self::Attack,
            "defends" => Self::Defends,
            "speed" => Self::Speed,
            "created_at" => Self::CreatedAt,
            "updated_at" => Self::UpdatedAt,
            _ => return None,
        };
        Some(field)
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Name => "m.name",
            Self::Length => "m.length",
            Self::Weight => "m.weight",
            Self::Hp => "m.hp",
            Self::Attack => "m.attack",
            Self::Defends => "m.defends",
            Self::Speed => "m.speed",
            Self::CreatedAt => "m.created_at",
            Self::UpdatedAt => "m.updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonsterSort {
    pub field: MonsterSortField,
    pub direction: SortDirection,
}

/// Validated list filter. All predicates are conjunctive; `type_ids` matches any of its members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonsterQueryFilter {
    pub name: Option<String>,
    pub captured: Option<bool>,
    pub sort: Option<MonsterSort>,
    pub type_ids: Vec<String>,
}

impl MonsterQueryFilter {
    pub fn is_unfiltered(&self) -> bool {
        self.name.is_none()
            && self.captured.is_none()
            && self.sort.is_none()
            && self.type_ids.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CreateMonsterParams {
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
}

#[derive(Debug, Clone)]
pub struct UpdateMonsterParams {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub description: String,
    pub length: f32,
    pub weight: u16,
    pub hp: u16,
    pub attack: u16,
    pub defends: u16,
    pub speed: u16,
    pub captured: bool,
    /// `Some` replaces the whole association set; `None` leaves it untouched.
    pub type_ids: Option<Vec<String>>,
}

#[async_trait]
pub trait MonstersRepo: Send + Sync {
    async fn list_monsters(
        &self,
        filter: &MonsterQueryFilter,
    ) -> Result<Vec<MonsterRecord>, RepoError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<MonsterRecord>, RepoError>;
}

#[async_trait]
pub trait MonstersWriteRepo: Send + Sync {
    async fn create_monster(
        &self,
        params: CreateMonsterParams,
    ) -> Result<MonsterRecord, RepoError>;

    async fn update_monster(
        &self,
        params: UpdateMonsterParams,
    ) -> Result<MonsterRecord, RepoError>;

    async fn set_monster_image(
        &self,
        id: &str,
        image: MonsterImage,
    ) -> Result<MonsterRecord, RepoError>;

    async fn set_monster_captured(&self, id: &str, captured: bool) -> Result<(), RepoError>;

    async fn delete_monster(&self, id: &str) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ReferenceRepo: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError>;

    async fn list_types(&self) -> Result<Vec<TypeRecord>, RepoError>;
}
