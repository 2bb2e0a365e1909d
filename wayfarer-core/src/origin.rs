//! Origin allow-list check for the web bridge.

use url::Url;

/// Decide whether a page origin may handshake with the bridge.
///
/// Rules:
/// - `file://` origins are accepted only when `allow_file_origins` is set.
/// - Otherwise the origin must be `https` with a non-empty host.
/// - The origin matches an allow-list entry when the entry is `https` and
///   the hosts compare equal case-insensitively. Paths and ports are not
///   compared.
pub fn is_origin_allowed(origin: &str, allow_list: &[String], allow_file_origins: bool) -> bool {
    let Ok(origin) = Url::parse(origin) else {
        return false;
    };

    if allow_file_origins && origin.scheme() == "file" {
        return true;
    }

    if origin.scheme() != "https" {
        return false;
    }
    let Some(host) = origin.host_str() else {
        return false;
    };

    allow_list.iter().any(|entry| {
        Url::parse(entry).ok().is_some_and(|candidate| {
            candidate.scheme() == "https"
                && candidate
                    .host_str()
                    .is_some_and(|candidate_host| candidate_host.eq_ignore_ascii_case(host))
        })
    })
}
