use std::sync::Arc;

use crate::application::catalog::CatalogService;
use crate::application::monsters::MonsterWriteService;

#[derive(Clone)]
pub struct ApiState {
    pub catalog: Arc<CatalogService>,
    pub monsters: Arc<MonsterWriteService>,
    /// Largest accepted image, in bytes.
    pub max_image_bytes: usize,
}
