//! Request signatures used as cache keys

use sha2::{Digest, Sha256};
use url::Url;

/// Parameters that carry credentials and never take part in a signature
pub const IGNORED_PARAMS: &[&str] = &["access_token", "authorization"];

/// Compute the cache key for a request.
///
/// Query parameters already present on `url` are merged with `params` and sorted, so the
/// same logical request produces the same signature whatever order its parameters arrive
/// in. Credential parameters are dropped.
pub fn request_signature(
    method: &str,
    url: &str,
    params: &[(String, String)],
    body: Option<&[u8]>,
) -> String {
    let (base, mut pairs) = match Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            parsed.set_query(None);
            parsed.set_fragment(None);
            (parsed.to_string(), pairs)
        }
        Err(_) => (url.to_string(), Vec::new()),
    };

    pairs.extend(params.iter().cloned());
    pairs.retain(|(key, _)| !IGNORED_PARAMS.contains(&key.to_ascii_lowercase().as_str()));
    pairs.sort();

    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b" ");
    hasher.update(base.as_bytes());
    for (key, value) in &pairs {
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    if let Some(body) = body {
        hasher.update(b"\n\n");
        hasher.update(body);
    }
    hex::encode(hasher.finalize())
}
