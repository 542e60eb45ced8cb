//! Cache key definitions.

use std::fmt;

const MONSTER_LIST_KEY: &str = "monsters";
const CATEGORIES_KEY: &str = "categories";
const TYPES_KEY: &str = "types";
const MONSTER_DETAIL_PREFIX: &str = "monster_id_";

/// Keys the catalog caches under. Filtered list reads never get a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Unfiltered monster list.
    MonsterList,
    /// Single monster detail view.
    MonsterDetail(String),
    Categories,
    Types,
}

impl CacheKey {
    pub fn monster(id: impl Into<String>) -> Self {
        Self::MonsterDetail(id.into())
    }

    /// Metric label grouping per-id keys together.
    pub fn family(&self) -> &'static str {
        match self {
            Self::MonsterList => "monster_list",
            Self::MonsterDetail(_) => "monster_detail",
            Self::Categories => "categories",
            Self::Types => "types",
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MonsterList => f.write_str(MONSTER_LIST_KEY),
            Self::MonsterDetail(id) => write!(f, "{MONSTER_DETAIL_PREFIX}{id}"),
            Self::Categories => f.write_str(CATEGORIES_KEY),
            Self::Types => f.write_str(TYPES_KEY),
        }
    }
}
