//! Document locator handling: storage-token stripping, `${app}` resolution
//! and equality of locators that spell the same document differently.

use url::Url;

const APP_TOKEN: &str = "${app}";
const TOKEN_KEY: &str = "sasToken=";
const HOST_KEY: &str = "&hostName=";
const CONTAINER_KEY: &str = "&containerName=";

/// Short-lived storage access parameters embedded in a locator query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageCredentials {
    pub host: String,
    pub container: String,
    pub token: String,
}

/// A locator with any storage token removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLocator {
    pub url: String,
    /// Present only when token, host and container were all non-empty.
    pub credentials: Option<StorageCredentials>,
}

/// Split `?sasToken=T&hostName=H&containerName=C` off a locator.
///
/// The token itself may contain `&`, so the query is cut at the known keys
/// rather than parsed as form data. Queries without a token are kept.
pub fn strip_storage_token(raw: &str) -> ParsedLocator {
    let Some((base, query)) = raw.split_once('?') else {
        return ParsedLocator {
            url: raw.to_string(),
            credentials: None,
        };
    };
    let Some(token_at) = query.find(TOKEN_KEY) else {
        return ParsedLocator {
            url: raw.to_string(),
            credentials: None,
        };
    };

    let host_at = query.find(HOST_KEY);
    let container_at = query.find(CONTAINER_KEY);

    let token_start = token_at + TOKEN_KEY.len();
    let token_end = [host_at, container_at]
        .into_iter()
        .flatten()
        .filter(|&at| at >= token_start)
        .min()
        .unwrap_or(query.len());
    let token = &query[token_start..token_end];

    let host = host_at
        .map(|at| {
            let start = at + HOST_KEY.len();
            let end = container_at.filter(|&c| c >= start).unwrap_or(query.len());
            &query[start..end]
        })
        .unwrap_or("");

    let container = container_at
        .map(|at| {
            let start = at + CONTAINER_KEY.len();
            let end = host_at.filter(|&h| h >= start).unwrap_or(query.len());
            &query[start..end]
        })
        .unwrap_or("");

    let credentials = (!token.is_empty() && !host.is_empty() && !container.is_empty()).then(|| {
        StorageCredentials {
            host: host.to_string(),
            container: container.to_string(),
            token: token.to_string(),
        }
    });

    ParsedLocator {
        url: base.to_string(),
        credentials,
    }
}

/// Substitute the `${app}` token with the application directory.
pub fn resolve_tokens(raw: &str, app_root: &str) -> String {
    raw.replace(APP_TOKEN, app_root.trim_end_matches(['/', '\\']))
}

/// A single leading `.` means "relative to the parent of `${app}`".
pub fn resolve_relative(raw: &str, app_root: &str) -> String {
    if raw.starts_with("./") || raw.starts_with(".\\") {
        resolve_tokens(&format!("{APP_TOKEN}/..{}", &raw[1..]), app_root)
    } else {
        raw.to_string()
    }
}

/// Canonical form used to compare locators.
///
/// URLs with a real scheme go through [`Url`] (lower-cased scheme and host,
/// dot segments removed). Everything else is treated as a file path.
pub fn normalize_locator(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(parsed) = Url::parse(trimmed) {
        // Single-letter schemes are Windows drive letters.
        if parsed.scheme().len() > 1 {
            let mut s = parsed.to_string();
            if s.len() > 1 && s.ends_with('/') && parsed.path() != "/" {
                s.pop();
            }
            return s;
        }
    }
    normalize_path(&trimmed.replace('\\', "/"))
}

fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

pub fn urls_equal(a: &str, b: &str) -> bool {
    normalize_locator(a) == normalize_locator(b)
}
