// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-store URL helpers.
//!
//! Store URLs have the shape `<scheme>://<bucket>/<path>`. All pipeline
//! coordination state is addressed through these helpers so the persisted
//! layout stays consistent across components.

/// Returns the scheme of a URL, or `""` when it has none.
pub fn scheme(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => &url[..idx],
        None => "",
    }
}

/// Returns the bucket (host) component of a URL.
pub fn bucket(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => return "",
    };
    match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

/// Returns the path component of a URL, without a leading slash.
pub fn path(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    match rest.find('/') {
        Some(idx) => rest[idx + 1..].trim_start_matches('/'),
        None => "",
    }
}

/// Joins URL segments with single slashes, preserving the base scheme.
pub fn join(base: &str, segments: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Splits a URL into its parent URL and final segment name.
///
/// `mem://b/a/x.json` → (`mem://b/a`, `x.json`). A URL addressing the
/// bucket root returns the bucket URL itself and an empty name.
pub fn split(url: &str) -> (String, String) {
    let trimmed = url.trim_end_matches('/');
    let start = match trimmed.find("://") {
        Some(idx) => idx + 3,
        None => 0,
    };
    match trimmed[start..].rfind('/') {
        Some(idx) => {
            let cut = start + idx;
            (trimmed[..cut].to_string(), trimmed[cut + 1..].to_string())
        }
        None => (trimmed.to_string(), String::new()),
    }
}

/// True when the URL's path begins with the given prefix.
///
/// The prefix is compared against the path component only, so trigger
/// routing ignores the scheme and bucket of the delivered URL.
pub fn has_path_prefix(url: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        return false;
    }
    let p = path(url);
    p == prefix || p.starts_with(&format!("{}/", prefix))
}

#[cfg(test)]
#[path = "url_tests.rs"]
mod tests;
