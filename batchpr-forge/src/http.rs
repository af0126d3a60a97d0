//! Response handling shared by the hosted backends.

use reqwest::header::{HeaderMap, LINK};
use reqwest::{Method, Response, StatusCode};

use crate::error::ForgeError;

/// Pass successful responses through; map everything else to
/// [`ForgeError::Conflict`] or [`ForgeError::Api`].
pub(crate) async fn check_status(
    response: Response,
    method: &Method,
    is_conflict: fn(StatusCode) -> bool,
) -> Result<Response, ForgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    let method = method.to_string();
    let conflict = is_conflict(status);
    let status = status.as_u16();

    if conflict {
        Err(ForgeError::Conflict {
            status,
            method,
            url,
            message,
        })
    } else {
        Err(ForgeError::Api {
            status,
            method,
            url,
            message,
        })
    }
}

/// The `message` field of a JSON error body, else the trimmed body text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Target of the `rel="next"` entry of a `Link` header.
pub(crate) fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_owned)
    })
}
