use crate::api::{ApiError, SupabaseClient};
use crate::models::{AuthUser, Session};
use crate::storage::{
    clear_session_storage, load_session_from_storage, save_session_to_storage, SESSION_KEY,
};
use crate::util::now_secs;
use leptos::ev;
use leptos_dom::helpers::{window_event_listener, WindowListenerHandle};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};

pub(crate) const OAUTH_PROVIDER: &str = "google";
pub(crate) const DASHBOARD_PATH: &str = "/dashboard";

/// Refresh this long before the access token runs out.
const REFRESH_LEAD_SECS: i64 = 60;

/* ========================================================== */
/*                   OAuth redirect fragment                  */
/* ========================================================== */

/// Tokens handed back in the URL fragment after the provider round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FragmentTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
    pub expires_at: Option<i64>,
}

impl FragmentTokens {
    pub fn into_session(self, user: AuthUser, now_secs: i64) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|s| now_secs + s))
            .unwrap_or(now_secs + 3600);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RedirectResult {
    Tokens(FragmentTokens),
    Failed(String),
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.clone())
}

/// Parse `#access_token=..&refresh_token=..` (or `#error=..&error_description=..`).
/// Returns `None` when the fragment is not an auth redirect.
pub(crate) fn parse_redirect_fragment(fragment: &str) -> Option<RedirectResult> {
    let fragment = fragment.trim_start_matches('#');
    if fragment.is_empty() {
        return None;
    }

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = None;
    let mut expires_at = None;
    let mut error = None;
    let mut error_description = None;

    for pair in fragment.split('&') {
        let Some((k, v)) = pair.split_once('=') else {
            continue;
        };
        let v = decode_component(v);
        match k {
            "access_token" => access_token = Some(v),
            "refresh_token" => refresh_token = Some(v),
            "expires_in" => expires_in = v.parse().ok(),
            "expires_at" => expires_at = v.parse().ok(),
            "error" => error = Some(v),
            "error_description" => error_description = Some(v),
            _ => {}
        }
    }

    if let Some(err) = error {
        return Some(RedirectResult::Failed(error_description.unwrap_or(err)));
    }

    match (access_token, refresh_token) {
        (Some(access_token), Some(refresh_token)) if !access_token.is_empty() => {
            Some(RedirectResult::Tokens(FragmentTokens {
                access_token,
                refresh_token,
                expires_in,
                expires_at,
            }))
        }
        _ => None,
    }
}

fn current_fragment() -> Option<String> {
    web_sys::window()
        .and_then(|w| w.location().hash().ok())
        .filter(|h| !h.is_empty())
}

/// Drop the fragment from the address bar without a navigation.
fn scrub_fragment() {
    let Some(window) = web_sys::window() else {
        return;
    };
    let location = window.location();
    let path = format!(
        "{}{}",
        location.pathname().unwrap_or_default(),
        location.search().unwrap_or_default()
    );
    if let Ok(history) = window.history() {
        let _ = history.replace_state_with_url(&JsValue::NULL, "", Some(&path));
    }
}

/* ========================================================== */
/*                      Current session                       */
/* ========================================================== */

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StoredSession {
    Missing,
    Valid(Session),
    Expired(Session),
}

pub(crate) fn classify_stored(stored: Option<Session>, now_secs: i64) -> StoredSession {
    match stored {
        None => StoredSession::Missing,
        Some(s) if s.is_expired_at(now_secs) => StoredSession::Expired(s),
        Some(s) => StoredSession::Valid(s),
    }
}

/// Exchange the refresh token and persist the new session.
pub(crate) async fn refresh_session(
    client: &SupabaseClient,
    session: &Session,
) -> Result<Session, ApiError> {
    let fresh = client
        .refresh_session(&session.refresh_token, now_secs())
        .await?;
    save_session_to_storage(&fresh);
    debug!(expires_at = fresh.expires_at, "session refreshed");
    Ok(fresh)
}

/// Resolve the session for this page load.
///
/// A redirect fragment wins over whatever is persisted. An expired persisted
/// session is refreshed once; if that fails it is cleared and treated as absent.
pub(crate) async fn current_session(client: &SupabaseClient) -> Result<Option<Session>, ApiError> {
    if let Some(result) = current_fragment().as_deref().and_then(parse_redirect_fragment) {
        scrub_fragment();
        return match result {
            RedirectResult::Tokens(tokens) => {
                let user = client.get_user(&tokens.access_token).await?;
                let session = tokens.into_session(user, now_secs());
                save_session_to_storage(&session);
                info!(user = %session.user.id, "signed in from redirect");
                Ok(Some(session))
            }
            RedirectResult::Failed(reason) => {
                warn!(%reason, "oauth redirect returned an error");
                Err(ApiError::rejected(reason))
            }
        };
    }

    match classify_stored(load_session_from_storage(), now_secs()) {
        StoredSession::Missing => Ok(None),
        StoredSession::Valid(s) => Ok(Some(s)),
        StoredSession::Expired(s) => match refresh_session(client, &s).await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(e) => {
                warn!(error = %e, "stored session could not be refreshed; clearing");
                clear_session_storage();
                Ok(None)
            }
        },
    }
}

/// Navigate away to the provider. Control returns only on failure.
pub(crate) fn sign_in_with_oauth(client: &SupabaseClient, provider: &str) -> Result<(), ApiError> {
    if client.anon_key.is_empty() {
        return Err(ApiError::config("Sign-in is not configured (missing anon key)"));
    }
    let window = web_sys::window().ok_or_else(|| ApiError::config("no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|e| ApiError::config(&format!("could not read origin: {e:?}")))?;
    let url = client.authorize_url(provider, &format!("{origin}{DASHBOARD_PATH}"));
    info!(provider, "starting oauth sign-in");
    window
        .location()
        .set_href(&url)
        .map_err(|e| ApiError::config(&format!("could not redirect: {e:?}")))
}

/// Best-effort remote logout, then forget the local session.
pub(crate) async fn sign_out(client: &SupabaseClient) {
    if client.is_authenticated() {
        if let Err(e) = client.logout().await {
            warn!(error = %e, "remote logout failed; clearing local session anyway");
        }
    }
    clear_session_storage();
    info!("signed out");
}

/* ========================================================== */
/*                   Auth-change notifications                */
/* ========================================================== */

#[derive(Clone, Debug, PartialEq, Eq, strum::AsRefStr)]
pub(crate) enum AuthChange {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

type Listener = Arc<dyn Fn(&AuthChange) + Send + Sync>;
type Listeners = Mutex<Vec<(u64, Listener)>>;

#[derive(Default)]
struct Registry {
    next_id: Mutex<u64>,
    listeners: Listeners,
}

/// Fan-out of auth changes to whoever is mounted.
#[derive(Clone, Default)]
pub(crate) struct AuthNotifier {
    inner: Arc<Registry>,
}

impl AuthNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, f: impl Fn(&AuthChange) + Send + Sync + 'static) -> AuthSubscription {
        let id = match self.inner.next_id.lock() {
            Ok(mut n) => {
                *n += 1;
                *n
            }
            Err(_) => 0,
        };
        if let Ok(mut l) = self.inner.listeners.lock() {
            l.push((id, Arc::new(f)));
        }
        AuthSubscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn notify(&self, change: &AuthChange) {
        // Copy out first so listeners may subscribe or unsubscribe re-entrantly.
        let listeners: Vec<Listener> = match self.inner.listeners.lock() {
            Ok(l) => l.iter().map(|(_, f)| f.clone()).collect(),
            Err(_) => return,
        };
        debug!(change = change.as_ref(), listeners = listeners.len(), "auth change");
        for f in listeners {
            f(change);
        }
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Removes its listener when dropped.
pub(crate) struct AuthSubscription {
    id: u64,
    registry: Weak<Registry>,
}

impl AuthSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(reg) = self.registry.upgrade() {
            if let Ok(mut l) = reg.listeners.lock() {
                l.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/* ========================================================== */
/*                       Session watcher                      */
/* ========================================================== */

pub(crate) fn refresh_delay_ms(expires_at: i64, now_secs: i64) -> i32 {
    let secs = (expires_at - REFRESH_LEAD_SECS - now_secs).max(0);
    secs.saturating_mul(1000).min(i32::MAX as i64) as i32
}

/// True when a `storage` event means another tab dropped our session.
pub(crate) fn is_session_removed(key: Option<&str>, new_value: Option<&str>) -> bool {
    match key {
        // `localStorage.clear()`
        None => true,
        Some(k) => k == SESSION_KEY && new_value.is_none(),
    }
}

/// Watches one session for expiry and for removal by another tab.
/// Dropping it cancels the timer and the listener.
pub(crate) struct SessionWatcher {
    timeout_id: Option<i32>,
    _on_due: Closure<dyn FnMut()>,
    storage_handle: Option<WindowListenerHandle>,
}

impl SessionWatcher {
    pub fn start(
        session: &Session,
        on_refresh_due: impl Fn() + 'static,
        on_removed_elsewhere: impl Fn() + 'static,
    ) -> Self {
        let delay = refresh_delay_ms(session.expires_at, now_secs());
        let on_due = Closure::wrap(Box::new(move || on_refresh_due()) as Box<dyn FnMut()>);

        let timeout_id = web_sys::window().and_then(|w| {
            w.set_timeout_with_callback_and_timeout_and_arguments_0(
                on_due.as_ref().unchecked_ref(),
                delay,
            )
            .ok()
        });
        debug!(delay_ms = delay, "session refresh scheduled");

        let storage_handle = window_event_listener(ev::storage, move |e: web_sys::StorageEvent| {
            let key = e.key();
            let new_value = e.new_value();
            if is_session_removed(key.as_deref(), new_value.as_deref()) {
                info!("session removed in another tab");
                on_removed_elsewhere();
            }
        });

        Self {
            timeout_id,
            _on_due: on_due,
            storage_handle: Some(storage_handle),
        }
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        if let (Some(w), Some(id)) = (web_sys::window(), self.timeout_id.take()) {
            w.clear_timeout_with_handle(id);
        }
        if let Some(h) = self.storage_handle.take() {
            h.remove();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(expires_at: i64) -> Session {
        Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at,
            user: AuthUser {
                id: "u-1".into(),
                email: None,
            },
        }
    }

    #[test]
    fn test_parse_redirect_fragment_tokens() {
        let frag = "#access_token=eyJ.a.b&expires_at=1700003600&expires_in=3600&provider_token=g&refresh_token=r-1&token_type=bearer";
        let Some(RedirectResult::Tokens(t)) = parse_redirect_fragment(frag) else {
            panic!("expected tokens");
        };
        assert_eq!(t.access_token, "eyJ.a.b");
        assert_eq!(t.refresh_token, "r-1");
        assert_eq!(t.expires_at, Some(1_700_003_600));

        let user = AuthUser {
            id: "u-1".into(),
            email: None,
        };
        assert_eq!(t.into_session(user, 0).expires_at, 1_700_003_600);
    }

    #[test]
    fn test_parse_redirect_fragment_error() {
        let frag = "#error=access_denied&error_code=403&error_description=User+cancelled%20login";
        assert_eq!(
            parse_redirect_fragment(frag),
            Some(RedirectResult::Failed("User cancelled login".into()))
        );
    }

    #[test]
    fn test_parse_redirect_fragment_ignores_other_fragments() {
        assert_eq!(parse_redirect_fragment(""), None);
        assert_eq!(parse_redirect_fragment("#"), None);
        assert_eq!(parse_redirect_fragment("#section-2"), None);
        assert_eq!(parse_redirect_fragment("#access_token=a"), None);
    }

    #[test]
    fn test_fragment_without_expires_at_uses_expires_in() {
        let Some(RedirectResult::Tokens(t)) =
            parse_redirect_fragment("access_token=a&refresh_token=r&expires_in=60")
        else {
            panic!("expected tokens");
        };
        let s = t.into_session(
            AuthUser {
                id: "u".into(),
                email: None,
            },
            100,
        );
        assert_eq!(s.expires_at, 160);
    }

    #[test]
    fn test_classify_stored() {
        assert_eq!(classify_stored(None, 0), StoredSession::Missing);
        assert_eq!(
            classify_stored(Some(session(1_000)), 100),
            StoredSession::Valid(session(1_000))
        );
        assert_eq!(
            classify_stored(Some(session(1_000)), 1_000),
            StoredSession::Expired(session(1_000))
        );
    }

    #[test]
    fn test_notifier_fans_out_until_unsubscribed() {
        let notifier = AuthNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let a = {
            let hits = hits.clone();
            notifier.subscribe(move |c| {
                if *c == AuthChange::SignedOut {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        let b = {
            let hits = hits.clone();
            notifier.subscribe(move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };
        assert_eq!(notifier.listener_count(), 2);

        notifier.notify(&AuthChange::SignedOut);
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        a.unsubscribe();
        notifier.notify(&AuthChange::SignedOut);
        assert_eq!(hits.load(Ordering::SeqCst), 21);

        drop(b);
        notifier.notify(&AuthChange::SignedOut);
        assert_eq!(hits.load(Ordering::SeqCst), 21);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_notifier_is_harmless() {
        let notifier = AuthNotifier::new();
        let sub = notifier.subscribe(|_| {});
        drop(notifier);
        drop(sub);
    }

    #[test]
    fn test_refresh_delay() {
        assert_eq!(refresh_delay_ms(1_000, 0), 940_000);
        assert_eq!(refresh_delay_ms(1_000, 990), 0);
        assert_eq!(refresh_delay_ms(i64::MAX / 2, 0), i32::MAX);
    }

    #[test]
    fn test_is_session_removed() {
        assert!(is_session_removed(None, None));
        assert!(is_session_removed(Some(SESSION_KEY), None));
        assert!(!is_session_removed(Some(SESSION_KEY), Some("{}")));
        assert!(!is_session_removed(Some("other"), None));
    }
}
