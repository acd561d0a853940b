use crate::config::EnvConfig;
use crate::models::{AuthUser, Bookmark, BookmarkPatch, NewBookmark, Session};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    Unauthorized,
    Network,
    Http,
    Parse,
    Config,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub(crate) struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    fn network(e: reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: e.to_string(),
        }
    }

    pub(crate) fn parse(e: impl std::fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            message: e.to_string(),
        }
    }

    pub(crate) fn unauthorized() -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized,
            message: "Unauthorized".to_string(),
        }
    }

    /// The auth service refused the sign-in (e.g. `#error=access_denied` on the redirect).
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized,
            message: message.into(),
        }
    }

    pub(crate) fn http(status: u16, body: String, ctx: &str) -> Self {
        Self {
            kind: ApiErrorKind::Http,
            message: format!("{ctx} ({status}): {body}"),
        }
    }

    /// A 401 means the session token was rejected; anything else is a plain HTTP failure.
    pub(crate) fn from_status(status: u16, body: String, ctx: &str) -> Self {
        if status == 401 {
            Self::unauthorized()
        } else {
            Self::http(status, body, ctx)
        }
    }

    pub(crate) fn config(message: &str) -> Self {
        Self {
            kind: ApiErrorKind::Config,
            message: message.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Unauthorized
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// Remote operations on the owner-scoped `bookmarks` table.
///
/// Owner scoping is enforced server-side; callers never re-check it.
pub(crate) trait BookmarkBackend {
    async fn list(&self) -> ApiResult<Vec<Bookmark>>;
    async fn insert(&self, new: &NewBookmark) -> ApiResult<Bookmark>;
    async fn update(&self, id: &str, patch: &BookmarkPatch) -> ApiResult<Bookmark>;
    async fn delete(&self, id: &str) -> ApiResult<()>;
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct RefreshRequest {
    pub refresh_token: String,
}

/// GoTrue token endpoint response.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl TokenResponse {
    pub fn into_session(self, now_secs: i64) -> Session {
        Session {
            expires_at: self.expires_at.unwrap_or(now_secs + self.expires_in),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user,
        }
    }
}

const BOOKMARKS_PATH: &str = "/rest/v1/bookmarks";

#[derive(Clone, Debug)]
pub(crate) struct SupabaseClient {
    pub(crate) base_url: String,
    pub(crate) anon_key: String,
    pub(crate) token: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &EnvConfig) -> Self {
        Self {
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            token: None,
        }
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    #[cfg(test)]
    pub fn with_token(mut self, token: &str) -> Self {
        self.set_token(token.to_string());
        self
    }

    /// The anon key doubles as bearer for unauthenticated calls.
    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.as_deref().unwrap_or(&self.anon_key))
    }

    fn with_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
    }

    fn build(&self, method: reqwest::Method, path: &str) -> ApiResult<reqwest::RequestBuilder> {
        if self.anon_key.is_empty() {
            return Err(ApiError::config("Backend is not configured (missing anon key)"));
        }
        let url = format!("{}{}", self.base_url, path);
        Ok(self.with_headers(reqwest::Client::new().request(method, url)))
    }

    async fn send(req: reqwest::RequestBuilder, ctx: &str) -> ApiResult<reqwest::Response> {
        let res = req.send().await.map_err(ApiError::network)?;
        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(ApiError::from_status(status.as_u16(), body, ctx))
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        req: reqwest::RequestBuilder,
        ctx: &str,
    ) -> ApiResult<T> {
        Self::send(req, ctx).await?.json().await.map_err(ApiError::parse)
    }

    /// PostgREST answers `return=representation` writes with an array.
    /// An empty array means the row was missing or hidden by the access policy.
    pub(crate) fn single_row(rows: Vec<Bookmark>, ctx: &str) -> ApiResult<Bookmark> {
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::http(404, "no matching bookmark".to_string(), ctx))
    }

    pub(crate) fn id_filter(id: &str) -> String {
        format!("{BOOKMARKS_PATH}?id=eq.{}", urlencoding::encode(id))
    }

    pub async fn list_bookmarks(&self) -> ApiResult<Vec<Bookmark>> {
        let req = self.build(
            reqwest::Method::GET,
            &format!("{BOOKMARKS_PATH}?select=*&order=created_at.desc"),
        )?;
        Self::send_json(req, "Load bookmarks failed").await
    }

    pub async fn insert_bookmark(&self, new: &NewBookmark) -> ApiResult<Bookmark> {
        let req = self
            .build(reqwest::Method::POST, BOOKMARKS_PATH)?
            .header("Prefer", "return=representation")
            .json(&[new]);
        let rows: Vec<Bookmark> = Self::send_json(req, "Insert bookmark failed").await?;
        Self::single_row(rows, "Insert bookmark failed")
    }

    pub async fn update_bookmark(&self, id: &str, patch: &BookmarkPatch) -> ApiResult<Bookmark> {
        let req = self
            .build(reqwest::Method::PATCH, &Self::id_filter(id))?
            .header("Prefer", "return=representation")
            .json(patch);
        let rows: Vec<Bookmark> = Self::send_json(req, "Update bookmark failed").await?;
        Self::single_row(rows, "Update bookmark failed")
    }

    pub async fn delete_bookmark(&self, id: &str) -> ApiResult<()> {
        let req = self
            .build(reqwest::Method::DELETE, &Self::id_filter(id))?
            .header("Prefer", "return=representation");
        let rows: Vec<Bookmark> = Self::send_json(req, "Delete bookmark failed").await?;
        Self::single_row(rows, "Delete bookmark failed").map(|_| ())
    }

    pub fn authorize_url(&self, provider: &str, redirect_to: &str) -> String {
        format!(
            "{}/auth/v1/authorize?provider={}&redirect_to={}",
            self.base_url,
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to)
        )
    }

    pub async fn get_user(&self, access_token: &str) -> ApiResult<AuthUser> {
        let req = self
            .build(reqwest::Method::GET, "/auth/v1/user")?
            .header("Authorization", format!("Bearer {access_token}"));
        Self::send_json(req, "Load user failed").await
    }

    pub async fn refresh_session(&self, refresh_token: &str, now_secs: i64) -> ApiResult<Session> {
        let req = self
            .build(reqwest::Method::POST, "/auth/v1/token?grant_type=refresh_token")?
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            });
        let res: TokenResponse = Self::send_json(req, "Refresh session failed").await?;
        Ok(res.into_session(now_secs))
    }

    pub async fn logout(&self) -> ApiResult<()> {
        let req = self.build(reqwest::Method::POST, "/auth/v1/logout")?;
        Self::send(req, "Sign out failed").await.map(|_| ())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl BookmarkBackend for SupabaseClient {
    async fn list(&self) -> ApiResult<Vec<Bookmark>> {
        self.list_bookmarks().await
    }

    async fn insert(&self, new: &NewBookmark) -> ApiResult<Bookmark> {
        self.insert_bookmark(new).await
    }

    async fn update(&self, id: &str, patch: &BookmarkPatch) -> ApiResult<Bookmark> {
        self.update_bookmark(id, patch).await
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        self.delete_bookmark(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, true)]
    #[case(403, false)]
    #[case(404, false)]
    #[case(500, false)]
    fn test_only_401_rejects_the_session(#[case] status: u16, #[case] unauthorized: bool) {
        let e = ApiError::from_status(status, "body".to_string(), "list bookmarks");
        assert_eq!(e.is_unauthorized(), unauthorized);
    }

    fn client() -> SupabaseClient {
        SupabaseClient::new(&EnvConfig::from_values(
            Some("https://proj.supabase.co".to_string()),
            Some("anon-key".to_string()),
            None,
        ))
    }

    #[test]
    fn test_bearer_falls_back_to_anon_key() {
        let c = client();
        assert_eq!(c.bearer(), "Bearer anon-key");
        assert!(!c.is_authenticated());

        let c = c.with_token("user-jwt");
        assert_eq!(c.bearer(), "Bearer user-jwt");
        assert!(c.is_authenticated());
    }

    #[test]
    fn test_clear_token() {
        let mut c = client().with_token("t");
        c.clear_token();
        assert!(c.token.is_none());
    }

    #[test]
    fn test_authorize_url_encodes_redirect() {
        let url = client().authorize_url("google", "https://savora.app/dashboard");
        assert_eq!(
            url,
            "https://proj.supabase.co/auth/v1/authorize?provider=google&redirect_to=https%3A%2F%2Fsavora.app%2Fdashboard"
        );
    }

    #[test]
    fn test_id_filter_encodes_id() {
        assert_eq!(
            SupabaseClient::id_filter("a b"),
            "/rest/v1/bookmarks?id=eq.a%20b"
        );
    }

    #[test]
    fn test_missing_anon_key_is_config_error() {
        let c = SupabaseClient::new(&EnvConfig::from_values(None, None, None));
        let err = c
            .build(reqwest::Method::GET, BOOKMARKS_PATH)
            .expect_err("unconfigured client should refuse to build requests");
        assert_eq!(err.kind, ApiErrorKind::Config);
    }

    #[test]
    fn test_single_row_empty_is_http_error() {
        let err = SupabaseClient::single_row(vec![], "Update bookmark failed")
            .expect_err("empty representation should fail");
        assert_eq!(err.kind, ApiErrorKind::Http);
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_token_response_contract_deserialize() {
        let json = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1700003600,
            "refresh_token": "r-2",
            "user": {"id": "u-1", "email": "u@example.com", "aud": "authenticated"}
        }"#;
        let parsed: TokenResponse = serde_json::from_str(json).expect("token response should parse");
        let s = parsed.into_session(1_700_000_000);
        assert_eq!(s.expires_at, 1_700_003_600);
        assert_eq!(s.user.id, "u-1");
        assert_eq!(s.refresh_token, "r-2");
    }

    #[test]
    fn test_token_response_without_expires_at_uses_expires_in() {
        let json = r#"{
            "access_token": "jwt",
            "expires_in": 60,
            "refresh_token": "r",
            "user": {"id": "u-1"}
        }"#;
        let parsed: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.into_session(100).expires_at, 160);
    }

    #[test]
    fn test_new_bookmark_serialization() {
        let v = serde_json::to_value([NewBookmark {
            title: "t".to_string(),
            url: "https://a.com".to_string(),
            user_id: "u-1".to_string(),
        }])
        .unwrap();
        assert_eq!(v[0]["user_id"], "u-1");
        assert!(v[0].get("id").is_none());
    }
}
