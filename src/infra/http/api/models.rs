use serde::{Deserialize, Serialize};

use crate::application::query::MonsterListQuery;

/// `GET /monsters` query string. `types` may repeat.
#[derive(Debug, Default, Deserialize)]
pub struct MonsterListParams {
    pub name: Option<String>,
    pub captured: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

impl From<MonsterListParams> for MonsterListQuery {
    fn from(params: MonsterListParams) -> Self {
        Self {
            name: params.name,
            captured: params.captured,
            sort: params.sort,
            order: params.order,
            types: params.types,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CapturedRequest {
    pub captured: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
