use super::{BookmarkStore, Change};
use crate::api::{ApiError, BookmarkBackend};
use crate::models::{is_temp_id, Bookmark, BookmarkPatch, NewBookmark};
use crate::util::new_temp_id;
use chrono::Utc;
use leptos::prelude::{RwSignal, Update};
use tracing::{debug, info, warn};

/// Something that owns a [`BookmarkStore`] and may be torn down.
pub(crate) trait StoreHandle {
    /// Run `f` against the store. `None` means the owner is gone and the
    /// change was discarded.
    fn mutate<R>(&self, f: impl FnOnce(&mut BookmarkStore) -> R) -> Option<R>;
}

impl StoreHandle for RwSignal<BookmarkStore> {
    fn mutate<R>(&self, f: impl FnOnce(&mut BookmarkStore) -> R) -> Option<R> {
        // Disposed signals return None, which drops late completions.
        self.try_update(f)
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub(crate) enum MutationError {
    #[error("{0}")]
    Validation(String),
    #[error("bookmark {0} is not in the list")]
    NotFound(String),
    #[error("bookmark is still being saved")]
    Pending,
    #[error("create failed: {0}")]
    Create(#[source] ApiError),
    #[error("update failed: {0}")]
    Update(#[source] ApiError),
    #[error("delete failed: {0}")]
    Delete(#[source] ApiError),
    #[error("bookmark list is no longer mounted")]
    Detached,
}

impl MutationError {
    pub fn cause(&self) -> Option<&ApiError> {
        match self {
            Self::Create(e) | Self::Update(e) | Self::Delete(e) => Some(e),
            _ => None,
        }
    }

    /// The backend rejected the session token; the caller should sign out.
    pub fn is_unauthorized(&self) -> bool {
        self.cause().is_some_and(|c| c.is_unauthorized())
    }

    pub fn banner_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(_) => "That bookmark no longer exists.".to_string(),
            Self::Pending => "This bookmark is still being saved. Try again in a moment.".to_string(),
            Self::Create(_) => "Could not save bookmark. Please try again.".to_string(),
            Self::Update(_) => "Could not update bookmark. Your changes were reverted.".to_string(),
            Self::Delete(_) => "Could not delete bookmark. It has been restored.".to_string(),
            Self::Detached => String::new(),
        }
    }
}

/// Trim and check user input before anything touches the store.
pub(crate) fn validate_input(title: &str, url: &str) -> Result<BookmarkPatch, MutationError> {
    let title = title.trim();
    let url = url.trim();

    if title.is_empty() {
        return Err(MutationError::Validation("Title is required".to_string()));
    }
    if url.is_empty() {
        return Err(MutationError::Validation("URL is required".to_string()));
    }
    if reqwest::Url::parse(url).is_err() {
        return Err(MutationError::Validation(format!("\"{url}\" is not a valid URL")));
    }

    Ok(BookmarkPatch {
        title: title.to_string(),
        url: url.to_string(),
    })
}

/// Applies create/update/delete locally first, then settles them against the backend.
///
/// Each call is independent: the local change happens synchronously before
/// the first await, so overlapping calls never wait on each other.
#[derive(Clone)]
pub(crate) struct OptimisticMutator<S, B> {
    store: S,
    backend: B,
    owner: String,
}

impl<S: StoreHandle, B: BookmarkBackend> OptimisticMutator<S, B> {
    pub fn new(store: S, backend: B, owner: impl Into<String>) -> Self {
        Self {
            store,
            backend,
            owner: owner.into(),
        }
    }

    /// Initial fetch. Returns the number of rows loaded.
    pub async fn load(&self) -> Result<usize, ApiError> {
        let rows = self.backend.list().await?;
        let n = rows.len();
        if self.store.mutate(|s| s.replace_all(rows)).is_none() {
            debug!("bookmark list torn down before initial fetch completed");
        }
        info!(count = n, "loaded bookmarks");
        Ok(n)
    }

    pub async fn create(&self, title: &str, url: &str) -> Result<Bookmark, MutationError> {
        let input = validate_input(title, url)?;

        let temp_id = new_temp_id();
        let placeholder = Bookmark::optimistic(
            temp_id.clone(),
            &self.owner,
            &input.title,
            &input.url,
            Utc::now(),
        );
        self.store
            .mutate(|s| s.push_front(placeholder))
            .ok_or(MutationError::Detached)?;

        let new = NewBookmark {
            title: input.title,
            url: input.url,
            user_id: self.owner.clone(),
        };

        match self.backend.insert(&new).await {
            Ok(record) => {
                debug!(temp_id = %temp_id, id = %record.id, "create confirmed");
                let confirmed = Change::Confirm {
                    temp_id,
                    record: record.clone(),
                };
                if self.store.mutate(|s| s.reconcile(confirmed)).is_none() {
                    debug!("create confirmed after teardown; ignoring");
                }
                Ok(record)
            }
            Err(e) => {
                warn!(temp_id = %temp_id, error = %e, "create failed; dropping placeholder");
                self.store.mutate(|s| s.remove(&temp_id));
                Err(MutationError::Create(e))
            }
        }
    }

    pub async fn update(&self, id: &str, title: &str, url: &str) -> Result<Bookmark, MutationError> {
        let patch = validate_input(title, url)?;
        if is_temp_id(id) {
            return Err(MutationError::Pending);
        }

        let snapshot = self
            .store
            .mutate(|s| {
                let snapshot = s.snapshot();
                s.edit(id, &patch).then_some(snapshot)
            })
            .ok_or(MutationError::Detached)?
            .ok_or_else(|| MutationError::NotFound(id.to_string()))?;

        match self.backend.update(id, &patch).await {
            Ok(record) => {
                self.store.mutate(|s| s.reconcile(Change::Update(record.clone())));
                Ok(record)
            }
            Err(e) => {
                warn!(id, error = %e, "update failed; restoring previous list");
                self.store.mutate(|s| s.restore(snapshot));
                Err(MutationError::Update(e))
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), MutationError> {
        if is_temp_id(id) {
            return Err(MutationError::Pending);
        }

        let snapshot = self
            .store
            .mutate(|s| {
                let snapshot = s.snapshot();
                s.remove(id).map(|_| snapshot)
            })
            .ok_or(MutationError::Detached)?
            .ok_or_else(|| MutationError::NotFound(id.to_string()))?;

        match self.backend.delete(id).await {
            Ok(()) => {
                // Remember the id so a late echo or confirm cannot bring it back.
                self.store.mutate(|s| s.reconcile(Change::Delete { id: id.to_string() }));
                Ok(())
            }
            Err(e) => {
                warn!(id, error = %e, "delete failed; restoring previous list");
                self.store.mutate(|s| s.restore(snapshot));
                Err(MutationError::Delete(e))
            }
        }
    }
}
