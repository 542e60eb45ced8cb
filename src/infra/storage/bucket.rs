//! S3-compatible object store built on `rust-s3`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tracing::{debug, warn};

use crate::application::storage::{ObjectStore, StorageError};
use crate::config::S3Settings;

pub(crate) const METRIC_BLOB_DELETE_UNCONFIRMED: &str = "monsterdex_blob_delete_unconfirmed_total";

#[derive(Debug, Clone, Copy)]
pub struct DeletePolling {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for DeletePolling {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_millis(200),
        }
    }
}

pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    polling: DeletePolling,
}

impl S3ObjectStore {
    pub fn new(settings: &S3Settings, polling: DeletePolling) -> Result<Self, StorageError> {
        let region = match settings.endpoint.as_deref() {
            Some(endpoint) => Region::Custom {
                region: settings.region.clone(),
                endpoint: endpoint.to_string(),
            },
            None => settings.region.parse::<Region>().map_err(StorageError::remote)?,
        };
        let credentials = Credentials::new(
            settings.access_key.as_deref(),
            settings.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(StorageError::remote)?;

        let mut bucket =
            Bucket::new(&settings.bucket, region, credentials).map_err(StorageError::remote)?;
        if settings.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket, polling })
    }

    fn location_for(&self, key: &str) -> String {
        format!("{}/{key}", self.bucket.url().trim_end_matches('/'))
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StorageError> {
        let status = self.bucket.head_object(key).await.map(|(_, status)| status);
        presence_from_head(key, status)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &body, content_type)
            .await
            .map_err(StorageError::remote)?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status {
                key: key.to_string(),
                status,
            });
        }

        debug!(blob_key = %key, status, "Object stored");
        Ok(self.location_for(key))
    }

    /// Issue the delete, then poll `HEAD` until the object is reported gone.
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let status = self
            .bucket
            .delete_object(key)
            .await
            .map(|response| response.status_code());
        match delete_issued(key, status)? {
            DeleteIssued::AlreadyGone => Ok(()),
            DeleteIssued::Accepted => {
                await_deletion(key, self.polling, || self.object_exists(key)).await
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum DeleteIssued {
    Accepted,
    AlreadyGone,
}

/// Classify a `DELETE` response. A missing object counts as deleted.
fn delete_issued(key: &str, status: Result<u16, S3Error>) -> Result<DeleteIssued, StorageError> {
    match status {
        Ok(404) | Err(S3Error::HttpFailWithBody(404, _)) => Ok(DeleteIssued::AlreadyGone),
        Ok(status) if (200..300).contains(&status) => Ok(DeleteIssued::Accepted),
        Ok(status) => Err(StorageError::Status {
            key: key.to_string(),
            status,
        }),
        Err(err) => Err(StorageError::remote(err)),
    }
}

/// Classify a `HEAD` response: `Ok(true)` while the object is still visible.
fn presence_from_head(key: &str, status: Result<u16, S3Error>) -> Result<bool, StorageError> {
    match status {
        Ok(404) | Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
        Ok(status) if (200..300).contains(&status) => Ok(true),
        Ok(status) => Err(StorageError::Status {
            key: key.to_string(),
            status,
        }),
        Err(err) => Err(StorageError::remote(err)),
    }
}

/// Poll `exists` until it reports the object gone, at most `polling.attempts` times.
///
/// A zero attempt budget still checks once. Running out of attempts yields
/// [`StorageError::DeleteUnconfirmed`] and bumps the unconfirmed-delete counter.
async fn await_deletion<F, Fut>(
    key: &str,
    polling: DeletePolling,
    mut exists: F,
) -> Result<(), StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, StorageError>>,
{
    let attempts = polling.attempts.max(1);
    for attempt in 1..=attempts {
        if !exists().await? {
            debug!(blob_key = %key, attempt, "Object delete confirmed");
            return Ok(());
        }
        if attempt < attempts {
            tokio::time::sleep(polling.interval).await;
        }
    }

    counter!(METRIC_BLOB_DELETE_UNCONFIRMED).increment(1);
    warn!(blob_key = %key, attempts, "Object still visible after delete");
    Err(StorageError::DeleteUnconfirmed {
        key: key.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
    use tokio::time::Instant;

    const KEY: &str = "monsters/oak_1_bulbasaur.png";

    fn polling(attempts: u32) -> DeletePolling {
        DeletePolling {
            attempts,
            interval: Duration::from_millis(200),
        }
    }

    /// Existence check that reports the object present for the first `visible_for` calls.
    fn vanishing_after(
        visible_for: u32,
    ) -> (
        Arc<AtomicU32>,
        impl FnMut() -> std::future::Ready<Result<bool, StorageError>>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let check = move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(call <= visible_for))
        };
        (calls, check)
    }

    fn unconfirmed_count(snapshotter: &Snapshotter) -> u64 {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == METRIC_BLOB_DELETE_UNCONFIRMED)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => count,
                _ => 0,
            })
            .sum()
    }

    #[tokio::test(start_paused = true)]
    async fn object_gone_on_first_check_returns_immediately() {
        let (calls, check) = vanishing_after(0);
        let started = Instant::now();

        await_deletion(KEY, polling(5), check)
            .await
            .expect("delete confirmed");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn object_disappearing_mid_poll_is_confirmed() {
        let (calls, check) = vanishing_after(2);
        let started = Instant::now();

        await_deletion(KEY, polling(5), check)
            .await
            .expect("delete confirmed");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(400) && waited < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn object_that_never_disappears_is_unconfirmed_and_counted() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let (calls, check) = vanishing_after(u32::MAX);
        let started = Instant::now();

        let err = await_deletion(KEY, polling(3), check)
            .await
            .expect_err("still visible");

        assert!(matches!(
            err,
            StorageError::DeleteUnconfirmed { ref key, attempts: 3 } if key == KEY
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(400) && waited < Duration::from_millis(600));
        assert_eq!(unconfirmed_count(&snapshotter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempt_budget_still_checks_once() {
        let (calls, check) = vanishing_after(u32::MAX);

        let err = await_deletion(KEY, polling(0), check)
            .await
            .expect_err("still visible");

        assert!(matches!(err, StorageError::DeleteUnconfirmed { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn existence_check_errors_abort_polling() {
        let calls = AtomicU32::new(0);
        let err = await_deletion(KEY, polling(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<bool, _>(StorageError::Status {
                key: KEY.to_string(),
                status: 500,
            }))
        })
        .await
        .expect_err("head failed");

        assert!(matches!(err, StorageError::Status { status: 500, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_object_counts_as_deleted() {
        assert_eq!(delete_issued(KEY, Ok(404)).expect("gone"), DeleteIssued::AlreadyGone);
        assert_eq!(
            delete_issued(KEY, Err(S3Error::HttpFailWithBody(404, String::new()))).expect("gone"),
            DeleteIssued::AlreadyGone
        );
        assert_eq!(delete_issued(KEY, Ok(204)).expect("accepted"), DeleteIssued::Accepted);
        assert!(matches!(
            delete_issued(KEY, Ok(403)),
            Err(StorageError::Status { status: 403, .. })
        ));
    }

    #[test]
    fn head_not_found_means_absent() {
        assert!(!presence_from_head(KEY, Ok(404)).expect("absent"));
        assert!(
            !presence_from_head(KEY, Err(S3Error::HttpFailWithBody(404, String::new())))
                .expect("absent")
        );
        assert!(presence_from_head(KEY, Ok(200)).expect("present"));
        assert!(matches!(
            presence_from_head(KEY, Ok(500)),
            Err(StorageError::Status { status: 500, .. })
        ));
    }
}
