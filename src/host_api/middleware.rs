use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::credentials::CredentialValidator;
use crate::error::{GatewayError, GatewayResult};
use crate::service::event_log::EventLog;

/// Identity attached to a request once its credentials pass validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub identifier: String,
}

/// Decoded `Authorization: Basic` credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub identifier: String,
    pub secret: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Everything the gate needs per request. Cloned into each request task;
/// the validator and log are shared read-only.
#[derive(Clone)]
pub struct GateState {
    validator: Arc<dyn CredentialValidator>,
    events: Arc<dyn EventLog>,
    challenge: HeaderValue,
}

impl GateState {
    pub fn new(
        validator: Arc<dyn CredentialValidator>,
        events: Arc<dyn EventLog>,
        realm: &str,
    ) -> GatewayResult<Self> {
        let challenge = HeaderValue::from_str(&format!("Basic realm=\"{}\"", realm))
            .map_err(|_| GatewayError::Config(format!("realm is not a valid header value: {realm}")))?;
        Ok(Self {
            validator,
            events,
            challenge,
        })
    }
}

/// Extract Basic credentials from the `Authorization` header (RFC 7617).
///
/// Returns `None` when the header is absent, not valid ASCII, uses another
/// scheme, is not valid base64, does not decode to UTF-8, or lacks the `:`
/// separator. The scheme name is matched case-insensitively (RFC 7235 §2.1)
/// and the pair is split at the first `:`, since a user-id cannot contain one.
pub fn basic_credentials(headers: &HeaderMap) -> Option<BasicCredentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = match value.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("basic ") => value[6..].trim(),
        _ => return None,
    };

    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (identifier, secret) = decoded.split_once(':')?;

    Some(BasicCredentials {
        identifier: identifier.to_string(),
        secret: secret.to_string(),
    })
}

fn unauthorized(challenge: &HeaderValue) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge.clone())],
        "Unauthorized.",
    )
        .into_response()
}

/// Reject the request with a Basic challenge unless it carries credentials
/// the validator accepts. On success the identity is stored in the request
/// extensions as [`AuthenticatedUser`] and the inner handler's response is
/// returned unchanged.
pub async fn auth_gate(State(gate): State<GateState>, mut req: Request<Body>, next: Next) -> Response {
    let reason = match basic_credentials(req.headers()) {
        Some(creds) if gate.validator.validate(&creds.identifier, &creds.secret) => {
            req.extensions_mut().insert(AuthenticatedUser {
                identifier: creds.identifier,
            });
            return next.run(req).await;
        }
        Some(_) => "invalid_credentials",
        None => "missing_credentials",
    };

    gate.events.warn(&format!(
        "AUDIT DENIED method={} path={} reason={}",
        req.method(),
        req.uri().path(),
        reason
    ));
    unauthorized(&gate.challenge)
}
