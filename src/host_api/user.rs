use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::middleware::AuthenticatedUser;

/// Response body of the protected resource. The `Name` field is part of the
/// wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUser {
    #[serde(rename = "Name")]
    pub name: String,
}

/// Echo the authenticated identity. Only reachable behind `auth_gate`.
pub async fn active_user(Extension(user): Extension<AuthenticatedUser>) -> Json<ActiveUser> {
    Json(ActiveUser {
        name: user.identifier,
    })
}
