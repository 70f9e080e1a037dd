//! Signed playlist extraction from catalog detail pages.
//!
//! The catalog embeds the playlist location and its signature as quoted
//! literals inside an inline script:
//!
//! ```text
//! url: 'https://host/playlist/123456?b=1',
//! params: { 'token': 'abc', 'expires': '1700000000', ... }
//! ```
//!
//! The script is not a stable structured contract, so each field is matched on
//! its own with a narrow pattern. All three must be present.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

static PLAYLIST_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"url:\s*'([^']+/playlist/\d+[^']*)'").expect("playlist url pattern is valid")
});
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'token'\s*:\s*'([^']+)'").expect("token pattern is valid")
});
static EXPIRES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'expires'\s*:\s*'([^']+)'").expect("expires pattern is valid")
});

const OVERRIDDEN_KEYS: [&str; 4] = ["token", "expires", "h", "lang"];

#[derive(Debug, Error)]
pub(crate) enum ResolveError {
    #[error("playlist not found in page (missing {missing})")]
    PlaylistNotFound { missing: &'static str },
    #[error("playlist url '{url}' is not a valid url: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlaylistToken {
    pub(crate) url: String,
    pub(crate) token: String,
    pub(crate) expires: String,
}

pub(crate) fn extract_playlist(html: &str) -> Result<PlaylistToken, ResolveError> {
    let url = capture(&PLAYLIST_URL_RE, html)
        .ok_or(ResolveError::PlaylistNotFound { missing: "url" })?;
    let token = capture(&TOKEN_RE, html)
        .ok_or(ResolveError::PlaylistNotFound { missing: "token" })?;
    let expires = capture(&EXPIRES_RE, html)
        .ok_or(ResolveError::PlaylistNotFound { missing: "expires" })?;

    Ok(PlaylistToken {
        url,
        token,
        expires,
    })
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl PlaylistToken {
    /// Builds the signed stream URL.
    ///
    /// `url` is resolved against `base` when relative. Existing query pairs are
    /// kept except `token`, `expires`, `h` and `lang`, which are always set from
    /// the token (`h=1`, `lang=en`).
    pub(crate) fn stream_url(&self, base: &Url) -> Result<Url, ResolveError> {
        let mut url = base
            .join(&self.url)
            .map_err(|source| ResolveError::InvalidUrl {
                url: self.url.clone(),
                source,
            })?;

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !OVERRIDDEN_KEYS.contains(&key.as_ref()))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("token", &self.token)
            .append_pair("expires", &self.expires)
            .append_pair("h", "1")
            .append_pair("lang", "en");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <script>
            window.video = {"id":1};
            window.masterPlaylist = {
                params: {
                    'token': 'tok-123',
                    'expires': '1700000000',
                    'asn': ''
                },
                url: 'https://cdn.example.test/playlist/98765?b=1&lang=it',
            }
        </script>
    "#;

    fn base() -> Url {
        Url::parse("https://catalog.example.test").unwrap()
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn extracts_all_three_fields() {
        let token = extract_playlist(PAGE).expect("page should resolve");
        assert_eq!(token.url, "https://cdn.example.test/playlist/98765?b=1&lang=it");
        assert_eq!(token.token, "tok-123");
        assert_eq!(token.expires, "1700000000");
    }

    #[test]
    fn any_missing_field_is_not_found() {
        let without_url = PAGE.replace("/playlist/98765", "/video/98765");
        let without_token = PAGE.replace("'token'", "'tkn'");
        let without_expires = PAGE.replace("'expires'", "'expiry'");

        for (page, field) in [
            (without_url, "url"),
            (without_token, "token"),
            (without_expires, "expires"),
        ] {
            match extract_playlist(&page) {
                Err(ResolveError::PlaylistNotFound { missing }) => assert_eq!(missing, field),
                other => panic!("expected not found for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn playlist_path_requires_digits() {
        let page = PAGE.replace("/playlist/98765", "/playlist/abc");
        assert!(extract_playlist(&page).is_err());
    }

    #[test]
    fn stream_url_overrides_signature_and_keeps_other_params() {
        let token = PlaylistToken {
            url: "https://cdn.example.test/playlist/1?b=1&token=stale&h=0&lang=it&x=a&x=b"
                .to_string(),
            token: "fresh".to_string(),
            expires: "99".to_string(),
        };

        let url = token.stream_url(&base()).expect("url should build");
        let pairs = pairs(&url);

        assert_eq!(url.path(), "/playlist/1");
        assert!(pairs.contains(&("b".to_string(), "1".to_string())));
        assert!(pairs.contains(&("x".to_string(), "a".to_string())));
        assert!(pairs.contains(&("x".to_string(), "b".to_string())));
        for (key, expected) in [("token", "fresh"), ("expires", "99"), ("h", "1"), ("lang", "en")] {
            let values: Vec<_> = pairs.iter().filter(|(k, _)| k == key).collect();
            assert_eq!(values.len(), 1, "{key} should appear once");
            assert_eq!(values[0].1, expected);
        }
    }

    #[test]
    fn relative_playlist_is_resolved_against_catalog() {
        let token = PlaylistToken {
            url: "/playlist/55".to_string(),
            token: "t".to_string(),
            expires: "e".to_string(),
        };

        let url = token.stream_url(&base()).expect("url should build");
        assert_eq!(
            url.as_str(),
            "https://catalog.example.test/playlist/55?token=t&expires=e&h=1&lang=en"
        );
    }

    #[test]
    fn signature_values_are_percent_encoded() {
        let token = PlaylistToken {
            url: "https://cdn.example.test/playlist/2".to_string(),
            token: "a+b/c=".to_string(),
            expires: "1".to_string(),
        };

        let url = token.stream_url(&base()).expect("url should build");
        let reparsed = Url::parse(url.as_str()).unwrap();
        assert!(pairs(&reparsed).contains(&("token".to_string(), "a+b/c=".to_string())));
    }
}
