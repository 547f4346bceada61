//! Extraction of login-flow values from provider pages
//!
//! One function per page type. Every function is pure and fails with
//! [`AuthError::ProtocolShape`] naming the element it could not find; there
//! is no fallback guessing, because a missing element almost always means
//! the provider changed its markup.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use super::error::AuthError;
use super::types::LoginForm;

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => re,
        // Patterns are compile-time literals covered by the unit tests below.
        Err(e) => unreachable!("invalid built-in pattern {pattern}: {e}"),
    })
}

fn form_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(?is)<form\b([^>]*)>")
}

fn input_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(?is)<input\b([^>]*)>")
}

fn attribute() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
}

fn idk_object() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"window\._IDK\s*=\s*\{")
}

fn csrf_entry() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"csrf_token:\s*'([^']+)'")
}

fn hmac_entry() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r#""hmac"\s*:\s*"([^"]+)""#)
}

fn js_redirect() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r#"window\.location\s*=\s*["']([^"']+)["']"#)
}

/// Attributes of a single tag, names lowercased, values entity-decoded
fn attributes(tag_body: &str) -> BTreeMap<String, String> {
    attribute()
        .captures_iter(tag_body)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?.as_str();
            Some((name, decode_entities(value)))
        })
        .collect()
}

/// Decode the HTML entities that appear in attribute values
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((ch, end + 1))
        });

        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// First `<form>` action and every hidden input on the page
///
/// Hidden inputs without a `value` attribute map to an empty string.
///
/// # Errors
/// [`AuthError::ProtocolShape`] if there is no form or it has no action.
pub fn extract_login_form(html: &str) -> Result<LoginForm, AuthError> {
    let form = form_tag()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .ok_or(AuthError::ProtocolShape { element: "login form" })?;

    let action = attributes(form.as_str())
        .remove("action")
        .filter(|action| !action.is_empty())
        .ok_or(AuthError::ProtocolShape { element: "form action" })?;

    let hidden_fields = input_tag()
        .captures_iter(html)
        .filter_map(|caps| {
            let mut attrs = attributes(caps.get(1)?.as_str());
            let is_hidden = attrs.get("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
            if !is_hidden {
                return None;
            }
            let name = attrs.remove("name")?;
            Some((name, attrs.remove("value").unwrap_or_default()))
        })
        .collect();

    Ok(LoginForm { action, hidden_fields })
}

/// CSRF token and HMAC from the `window._IDK` object of the password page
///
/// # Errors
/// [`AuthError::ProtocolShape`] naming the first missing element.
pub fn extract_csrf_and_hmac(html: &str) -> Result<(String, String), AuthError> {
    if !idk_object().is_match(html) {
        return Err(AuthError::ProtocolShape { element: "window._IDK object" });
    }

    let csrf = extract_csrf_token(html)?;
    let hmac = hmac_entry()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(AuthError::ProtocolShape { element: "hmac" })?;

    Ok((csrf, hmac))
}

/// CSRF token alone, as found on the consent page
///
/// # Errors
/// [`AuthError::ProtocolShape`] if no `csrf_token` entry is present.
pub fn extract_csrf_token(html: &str) -> Result<String, AuthError> {
    csrf_entry()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(AuthError::ProtocolShape { element: "csrf token" })
}

/// Target of a `window.location = "..."` script redirect
///
/// # Errors
/// [`AuthError::ProtocolShape`] if the page has no script redirect.
pub fn extract_js_redirect(html: &str) -> Result<String, AuthError> {
    js_redirect()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(AuthError::ProtocolShape { element: "javascript redirect" })
}

/// First value of query parameter `name`
#[must_use]
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
}

/// First value of `name` in the query string, else in the fragment
///
/// Custom-scheme redirects (`myaudi:///#code=...`) carry their parameters in
/// the fragment.
#[must_use]
pub fn redirect_param(url: &Url, name: &str) -> Option<String> {
    query_param(url, name).or_else(|| {
        url.fragment().and_then(|fragment| {
            url::form_urlencoded::parse(fragment.as_bytes())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        })
    })
}

/// Authorization code carried by a redirect location
#[must_use]
pub fn authorization_code(url: &Url) -> Option<String> {
    redirect_param(url, "code").filter(|code| !code.is_empty())
}
