use serde::{Deserialize, Serialize};

const DEFAULT_SUPABASE_URL: &str = "http://localhost:54321";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct EnvConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub log_level: String,
}

impl EnvConfig {
    pub fn new() -> Self {
        // We support BOTH `window.ENV.SUPABASE_URL` (documented in README) and
        // `window.ENV.supabase_url` for compatibility.
        let env = web_sys::window()
            .and_then(|w| w.get("ENV"))
            .filter(|env| !env.is_undefined() && env.is_object());

        let read = |upper: &str, lower: &str| -> Option<String> {
            let env = env.as_ref()?;
            [upper, lower].iter().find_map(|k| {
                js_sys::Reflect::get(env, &(*k).into())
                    .ok()
                    .and_then(|v| v.as_string())
            })
        };

        Self::from_values(
            read("SUPABASE_URL", "supabase_url"),
            read("SUPABASE_ANON_KEY", "supabase_anon_key"),
            read("LOG_LEVEL", "log_level"),
        )
    }

    pub(crate) fn from_values(
        url: Option<String>,
        anon_key: Option<String>,
        log_level: Option<String>,
    ) -> Self {
        let url = url
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SUPABASE_URL.to_string());

        Self {
            supabase_url: url,
            supabase_anon_key: anon_key.map(|s| s.trim().to_string()).unwrap_or_default(),
            log_level: log_level
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_anon_key.is_empty()
    }

    pub fn level_filter(&self) -> tracing::level_filters::LevelFilter {
        self.log_level
            .parse()
            .unwrap_or(tracing::level_filters::LevelFilter::INFO)
    }

    /// `http(s)://host` -> `ws(s)://host/realtime/v1/websocket?...`
    pub fn realtime_url(&self) -> String {
        let base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.supabase_url.clone()
        };
        format!(
            "{base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            urlencoding::encode(&self.supabase_anon_key)
        )
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_env_missing() {
        let c = EnvConfig::from_values(None, None, None);
        assert_eq!(c.supabase_url, DEFAULT_SUPABASE_URL);
        assert!(!c.is_configured());
        assert_eq!(c.level_filter(), tracing::level_filters::LevelFilter::INFO);
    }

    #[test]
    fn test_url_is_trimmed() {
        let c = EnvConfig::from_values(
            Some(" https://proj.supabase.co/ ".into()),
            Some("anon".into()),
            Some("DEBUG".into()),
        );
        assert_eq!(c.supabase_url, "https://proj.supabase.co");
        assert!(c.is_configured());
        assert_eq!(c.level_filter(), tracing::level_filters::LevelFilter::DEBUG);
    }

    #[test]
    fn test_realtime_url_switches_scheme() {
        let c = EnvConfig::from_values(Some("https://proj.supabase.co".into()), Some("k".into()), None);
        assert_eq!(
            c.realtime_url(),
            "wss://proj.supabase.co/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );

        let c = EnvConfig::from_values(Some("http://localhost:54321".into()), Some("k".into()), None);
        assert!(c.realtime_url().starts_with("ws://localhost:54321/realtime/v1/websocket"));
    }

    #[test]
    fn test_bad_log_level_falls_back_to_info() {
        let c = EnvConfig::from_values(None, None, Some("chatty".into()));
        assert_eq!(c.level_filter(), tracing::level_filters::LevelFilter::INFO);
    }
}
