use serde::Deserialize;

use crate::{AudienceSet, RealmConfig};

/// 認証設定ファイルのルート。
#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub realm: RealmConfig,
    pub client: Option<ClientSettings>,
    pub validator: Option<ValidatorSettings>,
}

/// 送信側 (Client Credentials) の設定。
///
/// 省略した値は各クレートの既定値が使われる。
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expiry_skew_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// 受信側 (JWT 検証) の設定。
#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorSettings {
    pub issuer: Option<String>,
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub audience: AudienceSet,
    pub algorithm: Option<String>,
    pub key_cache_ttl_secs: Option<u64>,
    pub key_cache_capacity: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub leeway_secs: Option<u64>,
}
