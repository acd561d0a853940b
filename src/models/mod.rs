use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bookmark row from the `bookmarks` table.
///
/// The backend stores the owner in `user_id`; we keep the wire name so rows
/// from the REST API and the realtime feed deserialize without mapping.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "user_id")]
    pub owner: String,
}

/// Accept RFC 3339 (REST API) as well as Postgres' text form ("2025-02-01 10:15:30.1+00"),
/// which the change feed may send.
fn de_timestamp<'de, D>(d: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {raw}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl Bookmark {
    /// Local placeholder shown until the backend confirms the insert.
    pub fn optimistic(
        temp_id: String,
        owner: &str,
        title: &str,
        url: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: temp_id,
            title: title.to_string(),
            url: url.to_string(),
            created_at,
            owner: owner.to_string(),
        }
    }

    pub fn is_pending(&self) -> bool {
        is_temp_id(&self.id)
    }
}

/// Insert payload. Server assigns `id` and `created_at`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct BookmarkPatch {
    pub title: String,
    pub url: String,
}

impl BookmarkPatch {
    pub fn apply_to(&self, b: &mut Bookmark) {
        b.title = self.title.clone();
        b.url = self.url.clone();
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: AuthUser,
}

impl Session {
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        // Treat tokens inside the last 10s of their life as already expired.
        self.expires_at <= now_secs + 10
    }
}

const TEMP_ID_PREFIX: &str = "tmp-";

pub(crate) fn make_temp_id(now_ms: u64, rand: u64) -> String {
    format!("{TEMP_ID_PREFIX}{now_ms}-{rand}")
}

pub(crate) fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_row_deserialize() {
        // Shape returned by PostgREST for `select=*`.
        let json = r#"{
            "id": "5b8f7c1e-3a2d-4e7b-9a61-0c2f1d9e8b7a",
            "title": "Design Inspiration",
            "url": "https://example.com",
            "created_at": "2025-02-01T10:15:30.123456+00:00",
            "user_id": "u-1"
        }"#;
        let b: Bookmark = serde_json::from_str(json).expect("row should parse");
        assert_eq!(b.owner, "u-1");
        assert_eq!(b.title, "Design Inspiration");
        assert!(!b.is_pending());
    }

    #[test]
    fn test_parse_timestamp_accepts_postgres_text_form() {
        let a = parse_timestamp("2025-02-01T10:15:30+00:00").unwrap();
        let b = parse_timestamp("2025-02-01 10:15:30+00").unwrap();
        let c = parse_timestamp("2025-02-01 12:15:30.000+02:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_bookmark_serializes_owner_as_user_id() {
        let b = Bookmark::optimistic(
            make_temp_id(1, 2),
            "u-1",
            "t",
            "https://a.com",
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        let v = serde_json::to_value(&b).unwrap();
        assert_eq!(v["user_id"], "u-1");
        assert!(v.get("owner").is_none());
    }

    #[test]
    fn test_temp_ids_never_look_like_server_ids() {
        let id = make_temp_id(1_700_000_000_000, 42);
        assert_eq!(id, "tmp-1700000000000-42");
        assert!(is_temp_id(&id));
        assert!(!is_temp_id("5b8f7c1e-3a2d-4e7b-9a61-0c2f1d9e8b7a"));
    }

    #[test]
    fn test_session_expiry_has_grace_window() {
        let s = Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: 1_000,
            user: AuthUser {
                id: "u".into(),
                email: None,
            },
        };
        assert!(!s.is_expired_at(900));
        assert!(s.is_expired_at(995));
        assert!(s.is_expired_at(2_000));
    }
}
