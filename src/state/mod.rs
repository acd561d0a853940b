use crate::api::SupabaseClient;
use crate::auth::{AuthChange, AuthNotifier};
use crate::config::EnvConfig;
use crate::derived::{filter_bookmarks, stats, Stats};
#[cfg(test)]
use crate::models::AuthUser;
use crate::models::{Bookmark, Session};
use crate::realtime::LiveStatus;
use crate::storage::clear_session_storage;
use crate::store::{BookmarkStore, MutationError, OptimisticMutator};
use leptos::prelude::*;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: EnvConfig,
    pub client: RwSignal<SupabaseClient>,
    pub session: RwSignal<Option<Session>>,

    /// Set once the first session lookup for this page load has finished.
    pub session_checked: RwSignal<bool>,

    /// Sign-in failures, shown on the landing page.
    pub auth_error: RwSignal<Option<String>>,

    pub notifier: AuthNotifier,
}

impl AppState {
    pub fn new(config: EnvConfig) -> Self {
        Self {
            client: RwSignal::new(SupabaseClient::new(&config)),
            config,
            session: RwSignal::new(None),
            session_checked: RwSignal::new(false),
            auth_error: RwSignal::new(None),
            notifier: AuthNotifier::new(),
        }
    }

    #[cfg(test)]
    pub fn user(&self) -> Option<AuthUser> {
        self.session.with(|s| s.as_ref().map(|s| s.user.clone()))
    }

    /// Update the signals for `change`, then tell subscribers.
    pub fn apply_auth_change(&self, change: AuthChange) {
        match &change {
            AuthChange::SignedIn(s) | AuthChange::TokenRefreshed(s) => {
                let token = s.access_token.clone();
                self.client.update(|c| c.set_token(token));
                self.session.set(Some(s.clone()));
            }
            AuthChange::SignedOut => {
                self.client.update(|c| c.clear_token());
                self.session.set(None);
            }
        }
        self.session_checked.set(true);
        self.notifier.notify(&change);
    }

    /// The backend rejected our token: forget it and bounce to the landing page.
    pub fn expire_session(&self) {
        warn!("session rejected by backend; signing out");
        clear_session_storage();
        self.apply_auth_change(AuthChange::SignedOut);
    }
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);

pub(crate) type DashboardMutator = OptimisticMutator<RwSignal<BookmarkStore>, SupabaseClient>;

/// Everything the dashboard owns for one mount. Built by the page and
/// disposed on cleanup, after which late completions are dropped.
#[derive(Clone, Copy)]
pub(crate) struct DashboardState {
    pub store: RwSignal<BookmarkStore>,
    pub query: RwSignal<String>,
    pub error: RwSignal<Option<String>>,
    pub loading: RwSignal<bool>,
    pub live: RwSignal<LiveStatus>,
    pub editing: RwSignal<Option<Bookmark>>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            store: RwSignal::new(BookmarkStore::new()),
            query: RwSignal::new(String::new()),
            error: RwSignal::new(None),
            loading: RwSignal::new(true),
            live: RwSignal::new(LiveStatus::Connecting),
            editing: RwSignal::new(None),
        }
    }

    pub fn mutator(&self, client: SupabaseClient, owner: &str) -> DashboardMutator {
        OptimisticMutator::new(self.store, client, owner)
    }

    pub fn visible(&self) -> Vec<Bookmark> {
        let q = self.query.get();
        self.store.with(|s| filter_bookmarks(s.items(), &q))
    }

    pub fn stats(&self) -> Stats {
        self.store.with(|s| stats(s.items()))
    }

    pub fn report(&self, err: &MutationError) {
        if matches!(err, MutationError::Detached) {
            return;
        }
        warn!(error = %err, "bookmark change failed");
        let _ = self.error.try_set(Some(err.banner_message()));
    }

    pub fn dispose(self) {
        self.store.dispose();
        self.query.dispose();
        self.error.dispose();
        self.loading.dispose();
        self.live.dispose();
        self.editing.dispose();
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
