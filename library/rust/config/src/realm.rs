//! Keycloak レルムの URL 導出。

use serde::{Deserialize, Serialize};

/// RealmConfig は認証サーバーのベース URL とレルム名を保持する。
///
/// 発行者・トークンエンドポイント・JWKS エンドポイントはすべてここから導出する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmConfig {
    /// 認証サーバーのベース URL。例: `https://auth.example.com`
    pub base_url: String,

    /// レルム名。
    pub realm: String,
}

impl RealmConfig {
    pub fn new(base_url: &str, realm: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            realm: realm.to_string(),
        }
    }

    /// 発行者 `{base_url}/auth/realms/{realm}` を返す。
    pub fn issuer(&self) -> String {
        format!(
            "{}/auth/realms/{}",
            self.base_url.trim_end_matches('/'),
            self.realm
        )
    }

    /// Client Credentials / UMA で使うトークンエンドポイント URL を返す。
    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer())
    }

    /// 公開鍵を配布する JWKS エンドポイント URL を返す。
    pub fn jwks_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }
}
