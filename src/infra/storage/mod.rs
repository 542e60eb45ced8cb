//! Object store adapters for monster images.

mod filesystem;
mod bucket;

pub use filesystem::FilesystemObjectStore;
pub use bucket::{DeletePolling, S3ObjectStore};
pub(crate) use bucket::METRIC_BLOB_DELETE_UNCONFIRMED;

use std::sync::Arc;

use tracing::info;

use crate::application::storage::ObjectStore;
use crate::config::{StorageBackend, StorageSettings};
use crate::infra::error::InfraError;

/// Build the configured object store.
pub fn build_object_store(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, InfraError> {
    match &settings.backend {
        StorageBackend::Filesystem {
            directory,
            public_base_url,
        } => {
            let store = FilesystemObjectStore::new(directory.clone(), public_base_url.as_str())?;
            info!(directory = %directory.display(), "Using filesystem object store");
            Ok(Arc::new(store))
        }
        StorageBackend::S3(s3) => {
            let polling = DeletePolling {
                attempts: settings.delete_poll_attempts.get(),
                interval: settings.delete_poll_interval,
            };
            let store = S3ObjectStore::new(s3, polling)
                .map_err(|err| InfraError::storage(err.to_string()))?;
            info!(bucket = %s3.bucket, region = %s3.region, "Using S3 object store");
            Ok(Arc::new(store))
        }
    }
}
