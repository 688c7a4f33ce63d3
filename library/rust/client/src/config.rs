//! Client Credentials フローの設定構造体。

use realmauth_config::{ClientSettings, RealmConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::registry::CredentialsKey;

/// expiry_skew_secs のデフォルト値（10 秒）。
fn default_expiry_skew_secs() -> u64 {
    10
}

/// timeout_secs のデフォルト値（30 秒）。
fn default_timeout_secs() -> u64 {
    30
}

/// ClientCredentialsConfig はサービスが自身の ID とシークレットでトークンを取得するための設定を表す。
///
/// YAML または環境変数から serde でデシリアライズ可能。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentialsConfig {
    /// トークンエンドポイント URL。
    pub token_url: String,

    /// OAuth2 クライアント ID。
    pub client_id: String,

    /// OAuth2 クライアントシークレット。
    pub client_secret: String,

    /// 要求するスコープ。空なら `scope` パラメータを送らない。
    #[serde(default)]
    pub scopes: Vec<String>,

    /// 有効期限の何秒前に期限切れとみなすか（デフォルト: 10 秒）。
    #[serde(default = "default_expiry_skew_secs")]
    pub expiry_skew_secs: u64,

    /// トークンエンドポイントへの HTTP タイムアウト秒数（デフォルト: 30 秒）。
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClientCredentialsConfig {
    /// 最小限の設定で ClientCredentialsConfig を生成する。
    pub fn new(token_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes: Vec::new(),
            expiry_skew_secs: default_expiry_skew_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// 設定ファイルの client セクションから生成する。
    ///
    /// token_url が省略されていればレルムから導出する。
    pub fn from_settings(settings: &ClientSettings, realm: &RealmConfig) -> Self {
        let token_url = settings
            .token_url
            .clone()
            .unwrap_or_else(|| realm.token_url());
        let mut config = Self::new(&token_url, &settings.client_id, &settings.client_secret)
            .with_scopes(settings.scopes.clone());
        if let Some(secs) = settings.expiry_skew_secs {
            config.expiry_skew_secs = secs;
        }
        if let Some(secs) = settings.timeout_secs {
            config.timeout_secs = secs;
        }
        config
    }

    /// スコープを設定する。
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// 期限判定のスキュー秒数を設定する。
    pub fn with_expiry_skew_secs(mut self, secs: u64) -> Self {
        self.expiry_skew_secs = secs;
        self
    }

    /// タイムアウト秒数を設定する。
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// レジストリで使うキャッシュキーを返す。
    pub fn key(&self) -> CredentialsKey {
        CredentialsKey::new(
            &self.client_id,
            &self.client_secret,
            &self.token_url,
            &self.scopes,
        )
    }
}

impl fmt::Debug for ClientCredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("expiry_skew_secs", &self.expiry_skew_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
