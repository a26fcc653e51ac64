//! Desk endpoint paths and wire types

use std::fmt;

use serde::{Deserialize, Serialize};

pub const LOGIN: &str = "/admin/api/login";
pub const LOGOUT: &str = "/admin/api/logout";
pub const SYSTEM_VERSION: &str = "/admin/api/system-version";
pub const SAFETY: &str = "/admin/api/safety";
pub const CONTROL_TOKEN: &str = "/admin/api/control-token";
pub const CONTROL_TOKEN_REQUEST: &str = "/admin/api/control-token/request";
pub const CONTROL_TOKEN_FCI: &str = "/admin/api/control-token/fci";
pub const OPEN_BRAKES: &str = "/desk/api/robot/open-brakes";
pub const CLOSE_BRAKES: &str = "/desk/api/robot/close-brakes";
pub const GRIPPER_HOMING: &str = "/desk/api/gripper/homing";

/// Query flag turning a token request into a forced one
pub const FORCE_QUERY: &str = "force";

/// Response of `GET /admin/api/safety`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetySettings {
    /// Seconds to wait for a forced token to become active
    pub token_force_timeout: f64,
}

/// Identifier of a control token
///
/// Firmware releases differ in whether this is a number or a string, so
/// both are accepted and compared as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenId {
    Number(u64),
    Text(String),
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenId::Number(n) => write!(f, "{}", n),
            TokenId::Text(s) => f.write_str(s),
        }
    }
}

/// Token issued by `POST /admin/api/control-token/request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub id: TokenId,
}

/// Response of `GET /admin/api/control-token`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTokenResponse {
    pub active_token: Option<ActiveToken>,
}

/// The token currently holding control authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveToken {
    pub id: TokenId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_id_accepts_number_and_string() {
        let numeric: IssuedToken = serde_json::from_str(r#"{"token":"abc","id":7}"#).unwrap();
        assert_eq!(numeric.id, TokenId::Number(7));

        let text: IssuedToken = serde_json::from_str(r#"{"token":"abc","id":"7"}"#).unwrap();
        assert_eq!(text.id, TokenId::Text("7".to_string()));
        assert_ne!(numeric.id, text.id);
    }

    #[test]
    fn test_active_token_null() {
        let resp: ActiveTokenResponse = serde_json::from_str(r#"{"activeToken":null}"#).unwrap();
        assert!(resp.active_token.is_none());

        let resp: ActiveTokenResponse =
            serde_json::from_str(r#"{"activeToken":{"id":3,"ownedBy":"franka"}}"#).unwrap();
        let active = resp.active_token.unwrap();
        assert_eq!(active.id, TokenId::Number(3));
        assert_eq!(active.owned_by.as_deref(), Some("franka"));
    }

    #[test]
    fn test_safety_settings_integer_timeout() {
        let safety: SafetySettings = serde_json::from_str(r#"{"tokenForceTimeout":30}"#).unwrap();
        assert_eq!(safety.token_force_timeout, 30.0);
    }
}
