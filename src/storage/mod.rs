use crate::models::Session;
use serde::{Deserialize, Serialize};

pub(crate) const SESSION_KEY: &str = "savora_session";

fn local_storage() -> Option<web_sys::Storage> {
    // No browser globals off wasm (native unit tests).
    if !cfg!(target_arch = "wasm32") {
        return None;
    }
    web_sys::window().and_then(|w| w.local_storage().ok().flatten())
}

pub(crate) fn load_json_from_storage<T: for<'de> Deserialize<'de>>(key: &str) -> Option<T> {
    let storage = local_storage()?;
    let json = storage.get_item(key).ok().flatten()?;
    serde_json::from_str(&json).ok()
}

pub(crate) fn save_json_to_storage<T: Serialize>(key: &str, value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        if let Some(storage) = local_storage() {
            let _ = storage.set_item(key, &json);
        }
    }
}

pub(crate) fn remove_from_storage(key: &str) {
    if let Some(storage) = local_storage() {
        let _ = storage.remove_item(key);
    }
}

pub(crate) fn save_session_to_storage(session: &Session) {
    save_json_to_storage(SESSION_KEY, session);
}

pub(crate) fn load_session_from_storage() -> Option<Session> {
    load_json_from_storage::<Session>(SESSION_KEY)
}

pub(crate) fn clear_session_storage() {
    remove_from_storage(SESSION_KEY);
}

// WASM-only tests (run with `cargo test --target wasm32-unknown-unknown` + wasm-bindgen-test-runner)
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use crate::models::AuthUser;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_session_storage_roundtrip() {
        clear_session_storage();
        assert!(load_session_from_storage().is_none());

        let s = Session {
            access_token: "a1".to_string(),
            refresh_token: "r1".to_string(),
            expires_at: 4_102_444_800,
            user: AuthUser {
                id: "u-1".to_string(),
                email: Some("u@example.com".to_string()),
            },
        };
        save_session_to_storage(&s);
        assert_eq!(load_session_from_storage(), Some(s));

        clear_session_storage();
        assert!(load_session_from_storage().is_none());
    }
}
