//! Cache-aside reads for monsters and reference data.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::application::error::CatalogError;
use crate::application::query::MonsterListQuery;
use crate::application::repos::{MonsterQueryFilter, MonstersRepo, ReferenceRepo};
use crate::cache::{CacheKey, CacheTrigger, METRIC_CACHE_HIT, METRIC_CACHE_MISS, TtlCache};
use crate::domain::entities::{CategoryRecord, MonsterRecord, TypeRecord};

#[derive(Clone)]
pub struct CatalogService {
    monsters: Arc<dyn MonstersRepo>,
    reference: Arc<dyn ReferenceRepo>,
    cache: Arc<TtlCache>,
    trigger: CacheTrigger,
}

impl CatalogService {
    pub fn new(
        monsters: Arc<dyn MonstersRepo>,
        reference: Arc<dyn ReferenceRepo>,
        cache: Arc<TtlCache>,
        trigger: CacheTrigger,
    ) -> Self {
        Self {
            monsters,
            reference,
            cache,
            trigger,
        }
    }

    /// List monsters. Only the parameterless listing goes through the cache.
    pub async fn list_monsters(
        &self,
        query: MonsterListQuery,
    ) -> Result<Vec<MonsterRecord>, CatalogError> {
        if query.is_empty() {
            return self
                .read_through(CacheKey::MonsterList, || async {
                    self.monsters
                        .list_monsters(&MonsterQueryFilter::default())
                        .await
                        .map_err(CatalogError::from)
                })
                .await;
        }

        let filter = query.into_filter()?;
        debug!(?filter, "Listing monsters live");
        Ok(self.monsters.list_monsters(&filter).await?)
    }

    pub async fn find_monster(&self, id: &str) -> Result<MonsterRecord, CatalogError> {
        self.read_through(CacheKey::monster(id), || async {
            self.monsters
                .find_by_id(id)
                .await?
                .ok_or_else(|| CatalogError::not_found(id))
        })
        .await
    }

    pub async fn list_categories(&self) -> Result<Vec<CategoryRecord>, CatalogError> {
        self.read_through(CacheKey::Categories, || async {
            Ok(self.reference.list_categories().await?)
        })
        .await
    }

    pub async fn list_types(&self) -> Result<Vec<TypeRecord>, CatalogError> {
        self.read_through(CacheKey::Types, || async {
            Ok(self.reference.list_types().await?)
        })
        .await
    }

    async fn read_through<T, F, Fut>(&self, key: CacheKey, load: F) -> Result<T, CatalogError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        if !self.trigger.is_enabled() {
            return load().await;
        }

        let rendered = key.render();
        if let Some(payload) = self.cache.get(&rendered) {
            match serde_json::from_slice::<T>(&payload) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT, "family" => key.family()).increment(1);
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        cache_key = %rendered,
                        error = %err,
                        "Cached payload could not be decoded; reading live"
                    );
                }
            }
        }

        counter!(METRIC_CACHE_MISS, "family" => key.family()).increment(1);
        let generation = self.cache.generation(&rendered);
        let value = load().await?;
        if let Some(payload) = encode_payload(&key, &value) {
            self.trigger.fill(&key, payload, generation);
        }
        Ok(value)
    }
}

/// Serialize `value` for the cache. Failures are logged and yield `None`.
pub(crate) fn encode_payload<T: Serialize>(key: &CacheKey, value: &T) -> Option<Bytes> {
    match serde_json::to_vec(value) {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(err) => {
            warn!(cache_key = %key, error = %err, "Cache payload could not be encoded");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;

    use crate::application::repos::RepoError;
    use crate::cache::CacheConfig;

    fn monster(id: &str) -> MonsterRecord {
        let now = OffsetDateTime::now_utc();
        MonsterRecord {
            id: id.to_string(),
            name: format!("monster {id}"),
            category: CategoryRecord {
                id: "c1".to_string(),
                name: "Seed".to_string(),
            },
            description: "test".to_string(),
            length: 1.5,
            weight: 10,
            hp: 1,
            attack: 2,
            defends: 3,
            speed: 4,
            captured: false,
            image: None,
            types: vec![TypeRecord {
                id: "t1".to_string(),
                name: "Grass".to_string(),
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[derive(Default)]
    struct CountingRepo {
        list_calls: AtomicUsize,
        find_calls: AtomicUsize,
        filters: Mutex<Vec<MonsterQueryFilter>>,
    }

    #[async_trait]
    impl MonstersRepo for CountingRepo {
        async fn list_monsters(
            &self,
            filter: &MonsterQueryFilter,
        ) -> Result<Vec<MonsterRecord>, RepoError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.filters
                .lock()
                .expect("filters lock")
                .push(filter.clone());
            Ok(vec![monster("m1")])
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<MonsterRecord>, RepoError> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            Ok((id == "m1").then(|| monster(id)))
        }
    }

    #[async_trait]
    impl ReferenceRepo for CountingRepo {
        async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
            Ok(vec![CategoryRecord {
                id: "c1".to_string(),
                name: "Seed".to_string(),
            }])
        }

        async fn list_types(&self) -> Result<Vec<TypeRecord>, RepoError> {
            Err(RepoError::Timeout)
        }
    }

    fn service(config: CacheConfig) -> (CatalogService, Arc<CountingRepo>, Arc<TtlCache>) {
        let repo = Arc::new(CountingRepo::default());
        let cache = Arc::new(TtlCache::new());
        let (trigger, _handle) = CacheTrigger::start(&config, Arc::clone(&cache));
        let service = CatalogService::new(repo.clone(), repo.clone(), Arc::clone(&cache), trigger);
        (service, repo, cache)
    }

    #[tokio::test]
    async fn unfiltered_list_is_served_from_cache_after_first_read() {
        let (service, repo, cache) = service(CacheConfig::default());

        let first = service
            .list_monsters(MonsterListQuery::default())
            .await
            .expect("first list");
        service.trigger.flush().await;
        assert!(cache.get("monsters").is_some());

        let second = service
            .list_monsters(MonsterListQuery::default())
            .await
            .expect("second list");

        assert_eq!(first, second);
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filtered_list_bypasses_cache() {
        let (service, repo, cache) = service(CacheConfig::default());
        let query = MonsterListQuery {
            name: Some("saur".to_string()),
            ..Default::default()
        };

        service.list_monsters(query.clone()).await.expect("list");
        service.list_monsters(query).await.expect("list");
        service.trigger.flush().await;

        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
        let filters = repo.filters.lock().expect("filters lock");
        assert_eq!(filters[0].name.as_deref(), Some("saur"));
    }

    #[tokio::test]
    async fn invalid_query_never_reaches_the_store() {
        let (service, repo, _cache) = service(CacheConfig::default());
        let query = MonsterListQuery {
            order: Some("asc".to_string()),
            ..Default::default()
        };

        let err = service.list_monsters(query).await.expect_err("order without sort");
        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_monster_is_not_cached() {
        let (service, repo, cache) = service(CacheConfig::default());

        let err = service.find_monster("nope").await.expect_err("missing");
        assert_eq!(err.to_string(), "monster with id nope not found");
        service.trigger.flush().await;

        assert!(cache.is_empty());
        assert_eq!(repo.find_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn detail_reads_populate_per_id_key() {
        let (service, repo, cache) = service(CacheConfig::default());

        let record = service.find_monster("m1").await.expect("found");
        service.trigger.flush().await;

        let cached = cache.get("monster_id_m1").expect("cached detail");
        let decoded: MonsterRecord = serde_json::from_slice(&cached).expect("decode");
        assert_eq!(decoded, record);

        service.find_monster("m1").await.expect("found again");
        assert_eq!(repo.find_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_payload_is_treated_as_a_miss() {
        let (service, repo, cache) = service(CacheConfig::default());
        cache.set_with_ttl(
            "monster_id_m1",
            Bytes::from_static(b"not json"),
            std::time::Duration::from_secs(60),
        );

        let record = service.find_monster("m1").await.expect("found");
        assert_eq!(record.id, "m1");
        assert_eq!(repo.find_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_cache_always_reads_live() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let (service, repo, cache) = service(config);

        service.list_monsters(MonsterListQuery::default()).await.expect("list");
        service.list_monsters(MonsterListQuery::default()).await.expect("list");

        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn reference_errors_propagate() {
        let (service, _repo, _cache) = service(CacheConfig::default());

        let categories = service.list_categories().await.expect("categories");
        assert_eq!(categories.len(), 1);

        let err = service.list_types().await.expect_err("types fail");
        assert!(matches!(err, CatalogError::Repo(RepoError::Timeout)));
    }
}
