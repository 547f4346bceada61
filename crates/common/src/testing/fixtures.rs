//! Test fixture generators
//!
//! Page bodies mirror the markup the sign-in service serves, reduced to the
//! parts the login flow reads.

use chrono::{Duration, Utc};

use crate::auth::types::{CapabilityToken, SessionRecord, TokenSet};

/// Email step page with a form posting to `action`
#[must_use]
pub fn email_page(action: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><body>
<form id="emailPasswordForm" name="emailPasswordForm" method="POST" action="{action}">
  <input type="hidden" id="csrf" name="_csrf" value="csrf-email"/>
  <input type="hidden" id="input_relayState" name="relayState" value="relay-email"/>
  <input type="hidden" id="hmac" name="hmac" value="hmac-email"/>
  <input type="email" id="input_email" name="email" autocomplete="username"/>
  <button type="submit">Next</button>
</form>
</body></html>"#
    )
}

/// Password step page exposing `csrf` and `hmac` through `window._IDK`
#[must_use]
pub fn password_page(csrf: &str, hmac: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><head>
<script>
  window._IDK = {{
    templateModel: {{"emailPasswordForm":{{"email":"driver@example.com"}},"hmac":"{hmac}","relayState":"relay"}},
    csrf_token: '{csrf}',
    disabledFeatures: {{ isRTLEnabled: false }}
  }};
</script>
</head><body></body></html>"#
    )
}

/// Marketing consent page carrying `csrf`
#[must_use]
pub fn consent_page(csrf: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><head>
<script>
  window._IDK = {{
    csrf_token: '{csrf}',
    templateModel: {{"marketingPermission":"UNKNOWN"}}
  }};
</script>
</head><body><form method="POST"></form></body></html>"#
    )
}

/// Interstitial page that navigates to `target` from script
#[must_use]
pub fn script_redirect_page(target: &str) -> String {
    format!(r#"<html><body><script>window.location = "{target}";</script></body></html>"#)
}

/// Record with identity tokens valid for an hour and capability token `mbb`
/// valid for thirty minutes
#[must_use]
pub fn sample_record(access: &str, mbb: &str) -> SessionRecord {
    let now = Utc::now();
    SessionRecord::new(
        TokenSet {
            access_token: access.to_string(),
            refresh_token: Some("refresh-token".to_string()),
            id_token: Some("id-token".to_string()),
            expiry: now + Duration::hours(1),
        },
        CapabilityToken { token: mbb.to_string(), expiry: now + Duration::minutes(30) },
    )
}

/// Record whose tokens all expired a minute ago
#[must_use]
pub fn expired_record(access: &str, mbb: &str) -> SessionRecord {
    let mut record = sample_record(access, mbb);
    let past = Utc::now() - Duration::minutes(1);
    record.tokens.expiry = past;
    if let Some(capability) = record.capability.as_mut() {
        capability.expiry = past;
    }
    record
}
