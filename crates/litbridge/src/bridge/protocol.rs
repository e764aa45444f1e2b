//! Endpoint paths and typed records for the worker's HTTP surface.
//!
//! Request records serialize to exactly the camelCase bodies the worker reads.
//! Response records name the fields callers use; anything else the worker sends
//! is kept in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{BridgeError, JsonObject};

pub const IS_READY: &str = "/isReady";
pub const SET_AUTH_TOKEN: &str = "/setAuthToken";
pub const NODE_CLIENT_NEW: &str = "/litNodeClient/new";
pub const NODE_CLIENT_CONNECT: &str = "/litNodeClient/connect";
pub const NODE_CLIENT_DISCONNECT: &str = "/litNodeClient/disconnect";
pub const NODE_CLIENT_GET_PROPERTY: &str = "/litNodeClient/getProperty";
pub const NODE_CLIENT_EXECUTE_JS: &str = "/litNodeClient/executeJs";
pub const NODE_CLIENT_GET_SESSION_SIGS: &str = "/litNodeClient/getSessionSigs";
pub const NODE_CLIENT_PKP_SIGN: &str = "/litNodeClient/pkpSign";
pub const CONTRACTS_CLIENT_NEW: &str = "/litContractsClient/new";
pub const CONTRACTS_CLIENT_MINT_WITH_AUTH: &str = "/litContractsClient/mintWithAuth";
pub const AUTH_CREATE_SIWE_MESSAGE: &str = "/authHelpers/createSiweMessage";
pub const AUTH_GENERATE_AUTH_SIG: &str = "/authHelpers/generateAuthSig";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAuthTokenRequest {
    pub auth_token: String,
}

/// Configuration for the worker-side `LitNodeClient`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LitNodeClientConfig {
    pub lit_network: String,
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPropertyRequest {
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPropertyResponse {
    /// Missing when the property is undefined on the worker side.
    #[serde(default)]
    pub property: Value,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteJsParams {
    pub code: String,
    pub js_params: JsonObject,
    pub session_sigs: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteJsResponse {
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub logs: Value,
    /// Signatures, decryptions, claims and whatever else the action produced.
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSigsParams {
    pub chain: String,
    pub expiration: String,
    pub resource_ability_requests: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSigsResponse {
    pub session_sigs: JsonObject,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkpSignParams {
    pub pub_key: String,
    /// Raw bytes, sent as an array of integers.
    pub to_sign: Vec<u8>,
    pub session_sigs: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkpSignResponse {
    pub signature: Value,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Configuration for the worker-side `LitContracts` client.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LitContractsClientConfig {
    pub private_key: String,
    pub network: String,
    pub debug: bool,
}

impl std::fmt::Debug for LitContractsClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LitContractsClientConfig")
            .field("private_key", &"<redacted>")
            .field("network", &self.network)
            .field("debug", &self.debug)
            .finish()
    }
}

/// An authentication method as understood by the contracts client.
///
/// `access_token` is usually a structured auth signature. The worker only
/// accepts it as a JSON-encoded string, see [`MintWithAuthParams::into_wire`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethod {
    pub auth_method_type: u32,
    pub access_token: Value,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintWithAuthParams {
    pub auth_method: AuthMethod,
    pub scopes: Vec<u32>,
}

impl MintWithAuthParams {
    /// Shape the payload the way the worker expects it: a structured
    /// `accessToken` is re-encoded as a JSON string. A token that already is a
    /// string passes through untouched.
    pub fn into_wire(mut self) -> Result<Self, BridgeError> {
        let token = &mut self.auth_method.access_token;
        match token {
            Value::Object(_) | Value::Array(_) => {
                let encoded = serde_json::to_string(&*token).map_err(|e| {
                    BridgeError::InvalidPayload(format!("failed to encode accessToken: {}", e))
                })?;
                *token = Value::String(encoded);
            }
            Value::String(_) => {}
            Value::Null | Value::Bool(_) | Value::Number(_) => {
                return Err(BridgeError::InvalidPayload(
                    "accessToken must be an object or a JSON string".to_string(),
                ));
            }
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintWithAuthResponse {
    pub pkp: JsonObject,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiweMessageParams {
    pub uri: String,
    pub expiration: String,
    pub resources: Vec<Value>,
    pub wallet_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiweMessageResponse {
    pub siwe_message: String,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAuthSigRequest {
    pub to_sign: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSigResponse {
    pub auth_sig: JsonObject,
    #[serde(flatten)]
    pub extra: JsonObject,
}
