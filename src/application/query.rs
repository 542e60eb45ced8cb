//! Translation of raw list parameters into a validated [`MonsterQueryFilter`].

use crate::application::repos::{MonsterQueryFilter, MonsterSort, MonsterSortField, SortDirection};
use crate::domain::error::DomainError;
use crate::domain::monsters::parse_flag;

pub const ORDER_REQUIRES_SORT: &str = "for use order, query parameter sort is required";

/// List parameters as supplied by the caller. Blank values count as absent.
#[derive(Debug, Clone, Default)]
pub struct MonsterListQuery {
    pub name: Option<String>,
    pub captured: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub types: Vec<String>,
}

impl MonsterListQuery {
    /// True when no filter, sort or type parameter was supplied.
    pub fn is_empty(&self) -> bool {
        non_blank(&self.name).is_none()
            && non_blank(&self.captured).is_none()
            && non_blank(&self.sort).is_none()
            && non_blank(&self.order).is_none()
            && self.types.iter().all(|id| id.trim().is_empty())
    }

    pub fn into_filter(self) -> Result<MonsterQueryFilter, DomainError> {
        let name = non_blank(&self.name).map(str::to_string);
        let captured = non_blank(&self.captured)
            .map(|value| parse_flag("captured", value))
            .transpose()?;

        let direction = non_blank(&self.order).map(parse_direction).transpose()?;
        let sort = match (non_blank(&self.sort), direction) {
            (None, Some(_)) => return Err(DomainError::validation(ORDER_REQUIRES_SORT)),
            (None, None) => None,
            (Some(field), direction) => {
                let field = MonsterSortField::parse(field).ok_or_else(|| {
                    DomainError::validation(format!("unsupported sort field `{field}`"))
                })?;
                Some(MonsterSort {
                    field,
                    direction: direction.unwrap_or_default(),
                })
            }
        };

        let mut type_ids: Vec<String> = Vec::with_capacity(self.types.len());
        for id in self.types {
            let id = id.trim();
            if !id.is_empty() && !type_ids.iter().any(|existing| existing == id) {
                type_ids.push(id.to_string());
            }
        }

        Ok(MonsterQueryFilter {
            name,
            captured,
            sort,
            type_ids,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_direction(value: &str) -> Result<SortDirection, DomainError> {
    if value.eq_ignore_ascii_case("asc") {
        Ok(SortDirection::Asc)
    } else if value.eq_ignore_ascii_case("desc") {
        Ok(SortDirection::Desc)
    } else {
        Err(DomainError::validation(format!(
            "order must be `asc` or `desc`, got `{value}`"
        )))
    }
}
