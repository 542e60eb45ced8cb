//! Monster write rules: actors, sparse patches and blob naming.

use std::path::Path;

use slug::slugify;
use time::OffsetDateTime;

use crate::domain::entities::{MonsterImage, MonsterRecord};
use crate::domain::error::DomainError;

const BLOB_PREFIX: &str = "monsters";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    Admin,
    Member,
}

impl ActorRole {
    /// Unknown roles degrade to `Member`.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::Member
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

/// Caller identity attached to every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

/// Scalar monster fields a write may change.
#[derive(Debug, Clone, PartialEq)]
pub struct MonsterFields {
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
}

impl From<&MonsterRecord> for MonsterFields {
    fn from(record: &MonsterRecord) -> Self {
        Self {
            name: record.name.clone(),
            category_id: record.category.id.clone(),
            description: record.description.clone(),
            length: record.length,
            weight: record.weight,
            hp: record.hp,
            attack: record.attack,
            defends: record.defends,
            speed: record.speed,
            captured: record.captured,
        }
    }
}

/// Textual patch as received from a caller. Absent and blank values keep the current field.
#[derive(Debug, Clone, Default)]
pub struct MonsterPatch {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub description: Option<String>,
    pub length: Option<String>,
    pub weight: Option<String>,
    pub hp: Option<String>,
    pub attack: Option<String>,
    pub defends: Option<String>,
    pub speed: Option<String>,
    pub captured: Option<String>,
}

impl MonsterPatch {
    /// Merge onto `current`. Every present value is parsed before anything is returned,
    /// so a malformed field leaves the caller with nothing to persist.
    pub fn apply(&self, current: &MonsterFields) -> Result<MonsterFields, DomainError> {
        let mut merged = current.clone();

        if let Some(name) = present(&self.name) {
            merged.name = name.to_string();
        }
        if let Some(category_id) = present(&self.category_id) {
            merged.category_id = category_id.to_string();
        }
        if let Some(description) = present(&self.description) {
            merged.description = description.to_string();
        }
        if let Some(length) = present(&self.length) {
            merged.length = parse_length(length)?;
        }
        if let Some(weight) = present(&self.weight) {
            merged.weight = parse_stat("weight", weight)?;
        }
        if let Some(hp) = present(&self.hp) {
            merged.hp = parse_stat("hp", hp)?;
        }
        if let Some(attack) = present(&self.attack) {
            merged.attack = parse_stat("attack", attack)?;
        }
        if let Some(defends) = present(&self.defends) {
            merged.defends = parse_stat("defends", defends)?;
        }
        if let Some(speed) = present(&self.speed) {
            merged.speed = parse_stat("speed", speed)?;
        }
        if let Some(captured) = present(&self.captured) {
            merged.captured = parse_flag("captured", captured)?;
        }

        Ok(merged)
    }

    /// Fields of a new monster. Every scalar except `captured` must be present;
    /// a new monster always starts uncaptured.
    pub fn into_new_fields(&self) -> Result<MonsterFields, DomainError> {
        Ok(MonsterFields {
            name: required("name", &self.name)?.to_string(),
            category_id: required("category_id", &self.category_id)?.to_string(),
            description: required("description", &self.description)?.to_string(),
            length: parse_length(required("length", &self.length)?)?,
            weight: parse_stat("weight", required("weight", &self.weight)?)?,
            hp: parse_stat("hp", required("hp", &self.hp)?)?,
            attack: parse_stat("attack", required("attack", &self.attack)?)?,
            defends: parse_stat("defends", required("defends", &self.defends)?)?,
            speed: parse_stat("speed", required("speed", &self.speed)?)?,
            captured: false,
        })
    }
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, DomainError> {
    present(value).ok_or_else(|| DomainError::validation(format!("{field} is required")))
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_stat(field: &'static str, value: &str) -> Result<u16, DomainError> {
    value.parse::<u16>().map_err(|err| {
        DomainError::validation(format!("{field} must be an unsigned integer: {err}"))
    })
}

fn parse_length(value: &str) -> Result<f32, DomainError> {
    let length = value
        .parse::<f32>()
        .map_err(|err| DomainError::validation(format!("length must be a number: {err}")))?;
    if !length.is_finite() {
        return Err(DomainError::validation("length must be a finite number"));
    }
    Ok(length)
}

/// Boolean parsing that accepts `1/0`, `t/f` and `true/false` in the usual casings.
pub fn parse_flag(field: &'static str, value: &str) -> Result<bool, DomainError> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(DomainError::validation(format!(
            "{field} must be a boolean, got `{other}`"
        ))),
    }
}

/// Pair the stored image columns, rejecting a name without a URL or the reverse.
pub fn pair_image(
    name: Option<String>,
    url: Option<String>,
) -> Result<Option<MonsterImage>, DomainError> {
    match (name, url) {
        (Some(name), Some(url)) => Ok(Some(MonsterImage { name, url })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(DomainError::invariant("image name stored without url")),
        (None, Some(_)) => Err(DomainError::invariant("image url stored without name")),
    }
}

/// Object key for an uploaded image: actor, upload instant and original filename.
pub fn image_object_key(actor_id: &str, at: OffsetDateTime, original_filename: &str) -> String {
    let mut actor = slugify(actor_id);
    if actor.is_empty() {
        actor = "anonymous".to_string();
    }
    let filename = sanitize_filename(original_filename);
    format!(
        "{BLOB_PREFIX}/{actor}_{}_{filename}",
        at.unix_timestamp_nanos()
    )
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}
