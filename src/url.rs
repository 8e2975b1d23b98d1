//! URL building and remote path helpers for DAV endpoints

use percent_encoding::percent_decode_str;
use url::Url;

use crate::config::Protocol;
use crate::error::RemoteError;

/// Base URL (`scheme://host[:port]/`) for a configured server.
pub fn base_url(protocol: Protocol, server: &str) -> Result<Url, RemoteError> {
    let server = server.trim().trim_end_matches('/');
    let server = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"))
        .unwrap_or(server);
    if server.is_empty() || server.contains('/') {
        return Err(RemoteError::Url(format!("bad server address '{}'", server)));
    }
    Url::parse(&format!("{}://{}/", protocol, server)).map_err(|e| RemoteError::Url(e.to_string()))
}

/// Remote directory path with exactly one leading and one trailing `/`.
pub fn dir_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

/// Remote root for a run: `davstart`, narrowed to `start` unless it names the top.
pub fn remote_root(davstart: &str, start: &str) -> String {
    let start = start.trim();
    if start.is_empty() || start == "/" || start == "." {
        return dir_path(davstart);
    }
    let base = dir_path(davstart);
    dir_path(&format!("{}{}", base, start.trim_start_matches("./").trim_start_matches('/')))
}

/// Absolute URL for a remote path; every segment is percent-encoded.
pub fn url_for(base: &Url, path: &str) -> Result<Url, RemoteError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| RemoteError::Url(format!("'{}' cannot be a base", base)))?;
        segments.clear();
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        if path.ends_with('/') && path != "/" {
            segments.push("");
        }
    }
    Ok(url)
}

/// Decoded server path for an href that may be absolute (`http://...`) or
/// path-only. `None` when the decoded bytes are not UTF-8.
pub fn href_to_path(href: &str) -> Option<String> {
    let href = href.trim();
    let raw_path = if href.starts_with("http://") || href.starts_with("https://") {
        match Url::parse(href) {
            Ok(u) => u.path().to_string(),
            Err(_) => href.to_string(),
        }
    } else {
        href.to_string()
    };
    percent_decode_str(&raw_path)
        .decode_utf8()
        .ok()
        .map(|p| p.into_owned())
}
