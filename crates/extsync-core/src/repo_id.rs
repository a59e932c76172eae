//! Repository identifier normalization.
//!
//! Accepts `owner/name`, web URLs (`https://github.com/owner/name/tree/main`),
//! and SSH locators (`git@github.com:owner/name.git`,
//! `ssh://git@github.com/owner/name`), and reduces them to `owner/name`.

use crate::{Result, SyncError};
use url::Url;

/// Normalize user input into an `owner/name` repository identifier.
pub fn normalize_repository(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let invalid = || SyncError::InvalidRepository {
        input: input.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let path = if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|_| invalid())?;
        url.path().to_string()
    } else if let Some((_, rest)) = scp_like(trimmed) {
        rest.to_string()
    } else if let Some(rest) = strip_bare_host(trimmed) {
        rest.to_string()
    } else {
        trimmed.to_string()
    };

    let segments: Vec<&str> = path
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();

    let [owner, name] = segments.as_slice() else {
        return Err(invalid());
    };
    let name = name.strip_suffix(".git").unwrap_or(*name);
    if owner.is_empty() || name.is_empty() {
        return Err(invalid());
    }

    Ok(format!("{}/{}", owner, name))
}

/// Split `user@host:path` (an SSH locator without a scheme) into host and path.
fn scp_like(input: &str) -> Option<(&str, &str)> {
    let (head, rest) = input.split_once(':')?;
    if head.contains('/') || !head.contains('@') {
        return None;
    }
    Some((head, rest))
}

/// Strip a scheme-less host prefix such as `github.com/`.
fn strip_bare_host(input: &str) -> Option<&str> {
    let (first, rest) = input.split_once('/')?;
    if first.contains('.') && !rest.is_empty() {
        Some(rest)
    } else {
        None
    }
}
