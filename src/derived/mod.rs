//! Values computed from the bookmark list for display. Nothing here mutates the store.

use crate::models::Bookmark;
use chrono::{DateTime, Utc};

/// Host part of `url`, if it parses.
pub(crate) fn hostname(url: &str) -> Option<String> {
    reqwest::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .filter(|h| !h.is_empty())
}

/// Host without a leading `www.`; malformed urls are shown as-is.
pub(crate) fn display_hostname(url: &str) -> String {
    match hostname(url) {
        Some(h) => h.strip_prefix("www.").map(str::to_string).unwrap_or(h),
        None => url.to_string(),
    }
}

/// Site icon for a card, keyed by display host.
pub(crate) fn favicon_url(host: &str) -> String {
    format!("https://favicon.clearbit.com/{}", urlencoding::encode(host))
}

/// Letter avatar shown when the site icon fails to load.
pub(crate) fn avatar_url(host: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&background=random",
        urlencoding::encode(host)
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub(crate) enum SmartTag {
    Video,
    Code,
    Article,
    Design,
    Social,
    Link,
}

const TAG_DOMAINS: &[(SmartTag, &[&str])] = &[
    (SmartTag::Video, &["youtube.com", "youtu.be", "vimeo.com"]),
    (SmartTag::Code, &["github.com", "gitlab.com"]),
    (SmartTag::Article, &["medium.com", "substack.com"]),
    (SmartTag::Design, &["figma.com", "dribbble.com"]),
    (SmartTag::Social, &["twitter.com", "x.com", "linkedin.com"]),
];

fn on_domain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

pub(crate) fn smart_tag(url: &str) -> SmartTag {
    let Some(host) = hostname(url) else {
        return SmartTag::Link;
    };

    TAG_DOMAINS
        .iter()
        .find(|(_, domains)| domains.iter().any(|d| on_domain(&host, d)))
        .map(|(tag, _)| *tag)
        .unwrap_or(SmartTag::Link)
}

/// Most frequent display hostname. Ties go to whichever host was seen first.
pub(crate) fn top_source(items: &[Bookmark]) -> Option<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for b in items {
        let host = display_hostname(&b.url);
        match counts.iter_mut().find(|(h, _)| *h == host) {
            Some((_, n)) => *n += 1,
            None => counts.push((host, 1)),
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (host, n) in counts {
        if best.as_ref().map_or(true, |(_, m)| n > *m) {
            best = Some((host, n));
        }
    }
    best.map(|(h, _)| h)
}

/// The list is kept newest first, so the head is the latest addition.
pub(crate) fn last_added(items: &[Bookmark]) -> Option<DateTime<Utc>> {
    items.first().map(|b| b.created_at)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Stats {
    pub total: usize,
    pub top_source: Option<String>,
    pub last_added: Option<DateTime<Utc>>,
}

pub(crate) fn stats(items: &[Bookmark]) -> Stats {
    Stats {
        total: items.len(),
        top_source: top_source(items),
        last_added: last_added(items),
    }
}

pub(crate) fn matches_query(b: &Bookmark, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    q.is_empty() || b.title.to_lowercase().contains(&q) || b.url.to_lowercase().contains(&q)
}

pub(crate) fn filter_bookmarks(items: &[Bookmark], query: &str) -> Vec<Bookmark> {
    items
        .iter()
        .filter(|b| matches_query(b, query))
        .cloned()
        .collect()
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Rough "time ago" wording in the style of date-fns `formatDistanceToNow`.
pub(crate) fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    let mins = (secs + 30) / 60;
    let hours = (mins + 30) / 60;
    let days = (hours + 12) / 24;

    let phrase = if secs < 45 {
        "less than a minute".to_string()
    } else if mins < 45 {
        plural(mins.max(1), "minute")
    } else if mins < 90 {
        "about 1 hour".to_string()
    } else if hours < 24 {
        format!("about {}", plural(hours, "hour"))
    } else if hours < 42 {
        "1 day".to_string()
    } else if days < 30 {
        plural(days, "day")
    } else if days < 45 {
        "about 1 month".to_string()
    } else if days < 365 {
        plural((days + 15) / 30, "month")
    } else {
        format!("about {}", plural(days / 365, "year"))
    };

    format!("{phrase} ago")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn with_url(id: &str, title: &str, url: &str) -> Bookmark {
        Bookmark {
            id: id.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
            owner: "u-1".to_string(),
        }
    }

    fn from_urls(urls: &[&str]) -> Vec<Bookmark> {
        urls.iter()
            .enumerate()
            .map(|(i, u)| with_url(&i.to_string(), "t", u))
            .collect()
    }

    #[test]
    fn test_icon_urls_use_display_host() {
        let host = display_hostname("https://www.github.com/rust-lang");
        assert_eq!(favicon_url(&host), "https://favicon.clearbit.com/github.com");
        assert_eq!(
            avatar_url(&host),
            "https://ui-avatars.com/api/?name=github.com&background=random"
        );
        // Unparsable urls fall back to the raw text, which must stay a single path segment.
        assert_eq!(favicon_url("not a url"), "https://favicon.clearbit.com/not%20a%20url");
    }

    #[test]
    fn test_top_source_picks_most_frequent() {
        let items = from_urls(&["https://a.com/1", "https://b.com", "https://a.com/2"]);
        assert_eq!(top_source(&items).as_deref(), Some("a.com"));
    }

    #[test]
    fn test_top_source_empty_is_none() {
        assert_eq!(top_source(&[]), None);
        assert_eq!(stats(&[]).last_added, None);
    }

    #[test]
    fn test_top_source_tie_goes_to_first_seen() {
        let items = from_urls(&["https://b.com", "https://a.com", "https://a.com", "https://b.com"]);
        assert_eq!(top_source(&items).as_deref(), Some("b.com"));
    }

    #[test]
    fn test_top_source_counts_www_with_bare_host() {
        let items = from_urls(&["https://www.a.com", "https://b.com", "https://a.com"]);
        assert_eq!(top_source(&items).as_deref(), Some("a.com"));
    }

    #[test]
    fn test_malformed_url_falls_back_to_raw_string() {
        assert_eq!(display_hostname("not a url"), "not a url");
        assert_eq!(display_hostname("https://www.rust-lang.org/learn"), "rust-lang.org");
        assert_eq!(smart_tag("::::"), SmartTag::Link);
    }

    #[test]
    fn test_search_matches_url_case_insensitively() {
        let items = vec![
            with_url("1", "My Notes", "https://github.com/x"),
            with_url("2", "Recipes", "https://food.example.com"),
        ];
        let hits = filter_bookmarks(&items, "git");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");

        assert_eq!(filter_bookmarks(&items, "RECIPES")[0].id, "2");
        assert_eq!(filter_bookmarks(&items, "  ").len(), 2);
        assert!(filter_bookmarks(&items, "zzz").is_empty());
    }

    #[test]
    fn test_stats_head_is_last_added() {
        let mut a = with_url("a", "t", "https://a.com");
        a.created_at = DateTime::from_timestamp(500, 0).unwrap();
        let b = with_url("b", "t", "https://b.com");
        let s = stats(&[a.clone(), b]);
        assert_eq!(s.total, 2);
        assert_eq!(s.last_added, Some(a.created_at));
    }

    #[rstest]
    #[case("https://www.youtube.com/watch?v=1", SmartTag::Video)]
    #[case("https://vimeo.com/1", SmartTag::Video)]
    #[case("https://github.com/rust-lang/rust", SmartTag::Code)]
    #[case("https://gitlab.com/x", SmartTag::Code)]
    #[case("https://blog.medium.com/post", SmartTag::Article)]
    #[case("https://www.figma.com/file/1", SmartTag::Design)]
    #[case("https://x.com/someone", SmartTag::Social)]
    #[case("https://www.linkedin.com/in/someone", SmartTag::Social)]
    #[case("https://dropbox.com/s/1", SmartTag::Link)]
    #[case("https://example.com", SmartTag::Link)]
    fn test_smart_tag(#[case] url: &str, #[case] expected: SmartTag) {
        assert_eq!(smart_tag(url), expected);
    }

    #[rstest]
    #[case(Duration::seconds(10), "less than a minute ago")]
    #[case(Duration::seconds(70), "1 minute ago")]
    #[case(Duration::minutes(5), "5 minutes ago")]
    #[case(Duration::minutes(60), "about 1 hour ago")]
    #[case(Duration::hours(3), "about 3 hours ago")]
    #[case(Duration::hours(30), "1 day ago")]
    #[case(Duration::days(3), "3 days ago")]
    #[case(Duration::days(40), "about 1 month ago")]
    #[case(Duration::days(90), "3 months ago")]
    #[case(Duration::days(800), "about 2 years ago")]
    #[case(Duration::seconds(-30), "less than a minute ago")]
    fn test_relative_time(#[case] ago: Duration, #[case] expected: &str) {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(relative_time(now - ago, now), expected);
    }

    #[test]
    fn test_smart_tag_display() {
        assert_eq!(SmartTag::Code.to_string(), "Code");
        assert_eq!(SmartTag::Link.as_ref(), "Link");
    }
}
