//! Memoizing wrapper around the address client.

use hashbrown::HashMap;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

use crate::error::{LookupError, LookupResult, SelectionError};
use crate::kepco::{HttpTransport, KepcoClient, RemoteResponse, Transport};
use crate::models::{AddressLevel, AddressSelection, OptionList};

/// Cache key: the requested level plus the values of every level before it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub level: AddressLevel,
    pub ancestors: Vec<String>,
}

/// Address client with an explicit `(level, ancestors)` → options cache.
///
/// Only successful lookups are cached, so a failed fetch is retried the next
/// time the same options are requested.
pub struct AddressResolver<T = HttpTransport> {
    client: KepcoClient<T>,
    cache: RwLock<HashMap<CacheKey, OptionList>>,
    preflight: OnceCell<()>,
}

impl<T: Transport> AddressResolver<T> {
    pub fn new(client: KepcoClient<T>) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
            preflight: OnceCell::new(),
        }
    }

    pub fn client(&self) -> &KepcoClient<T> {
        &self.client
    }

    pub async fn provinces(&self) -> LookupResult<OptionList> {
        self.options(AddressLevel::Province, &[]).await
    }

    /// Options for `level` under the ancestors held by `selection`
    pub async fn options_for(
        &self,
        level: AddressLevel,
        selection: &AddressSelection,
    ) -> LookupResult<OptionList> {
        let ancestors = selection
            .ancestors_of(level)
            .ok_or(LookupError::IncompleteAncestors(level))?;
        self.options(level, &ancestors).await
    }

    /// Like [`options_for`](Self::options_for), but every ancestor must appear in
    /// its parent level's option list before anything is fetched for `level`.
    ///
    /// Cache entries can then only be created for ancestor tuples the upstream
    /// itself offered.
    pub async fn checked_options_for(
        &self,
        level: AddressLevel,
        selection: &AddressSelection,
    ) -> LookupResult<OptionList> {
        let ancestors = selection
            .ancestors_of(level)
            .ok_or(LookupError::IncompleteAncestors(level))?;

        for (depth, value) in ancestors.iter().enumerate() {
            let parent = AddressLevel::all()[depth];
            let offered = self.options(parent, &ancestors[..depth]).await?;
            if !offered.contains(value) {
                return Err(SelectionError::NotAnOption {
                    level: parent,
                    value: value.clone(),
                }
                .into());
            }
        }

        self.options(level, &ancestors).await
    }

    /// Options for `level` given every ancestor value, served from cache when possible
    pub async fn options(&self, level: AddressLevel, ancestors: &[String]) -> LookupResult<OptionList> {
        let key = CacheKey {
            level,
            ancestors: ancestors.to_vec(),
        };

        if let Some(hit) = self.cache.read().await.get(&key) {
            debug!("Cache hit for {} under {:?}", level, ancestors);
            return Ok(hit.clone());
        }

        self.ensure_preflight().await;
        let options = self.client.fetch_with_ancestors(level, ancestors).await?;
        self.cache.write().await.insert(key, options.clone());
        Ok(options)
    }

    /// Reference number lookup, preceded by the handshake calls like any other request
    pub async fn lookup_by_reference_number(&self, reference: &str) -> LookupResult<RemoteResponse> {
        if self.client.has_reference_lookup() {
            self.ensure_preflight().await;
        }
        self.client.lookup_by_reference_number(reference).await
    }

    /// Drop every entry whose ancestors are no longer a prefix of `selection`.
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate_outside(&self, selection: &AddressSelection) -> usize {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|key, _| selection.has_prefix(&key.ancestors));
        let removed = before - cache.len();
        if removed > 0 {
            debug!("Invalidated {} cached option lists", removed);
        }
        removed
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Runs the configured handshake calls once. Failures are logged only.
    async fn ensure_preflight(&self) {
        if !self.client.has_preflight() {
            return;
        }
        self.preflight
            .get_or_init(|| async {
                if let Err(e) = self.client.run_preflight().await {
                    warn!("Pre-flight call failed, continuing: {}", e);
                }
            })
            .await;
    }
}
