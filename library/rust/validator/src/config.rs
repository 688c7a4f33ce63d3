//! トークン検証器の設定構造体。

use jsonwebtoken::Algorithm;
use realmauth_config::{AudienceSet, ConfigError, RealmConfig, ValidatorSettings};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

fn default_algorithm() -> Algorithm {
    Algorithm::RS256
}

/// key_cache_ttl_secs のデフォルト値（2 時間）。
fn default_key_cache_ttl_secs() -> u64 {
    2 * 60 * 60
}

/// key_cache_capacity のデフォルト値（5 件）。
fn default_key_cache_capacity() -> usize {
    5
}

/// timeout_secs のデフォルト値（30 秒）。
fn default_timeout_secs() -> u64 {
    30
}

/// ValidatorConfig は TokenValidator の設定を表す。
///
/// 発行者と JWKS URL は明示しなければレルムから導出する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub realm: RealmConfig,

    /// 発行者の上書き。省略時は `{base_url}/auth/realms/{realm}`。
    #[serde(default)]
    pub issuer: Option<String>,

    /// JWKS URL の上書き。
    #[serde(default)]
    pub jwks_url: Option<String>,

    /// 署名アルゴリズム（デフォルト: RS256）。
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,

    /// 受け入れるオーディエンス。空なら検査しない。
    #[serde(default)]
    pub audience: AudienceSet,

    #[serde(default = "default_key_cache_ttl_secs")]
    pub key_cache_ttl_secs: u64,

    #[serde(default = "default_key_cache_capacity")]
    pub key_cache_capacity: usize,

    /// JWKS 取得の HTTP タイムアウト秒数。
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `exp` 判定に許容する時刻ずれ（秒）。
    #[serde(default)]
    pub leeway_secs: u64,
}

impl ValidatorConfig {
    pub fn new(base_url: &str, realm: &str) -> Self {
        Self::for_realm(RealmConfig::new(base_url, realm))
    }

    pub fn for_realm(realm: RealmConfig) -> Self {
        Self {
            realm,
            issuer: None,
            jwks_url: None,
            algorithm: default_algorithm(),
            audience: AudienceSet::default(),
            key_cache_ttl_secs: default_key_cache_ttl_secs(),
            key_cache_capacity: default_key_cache_capacity(),
            timeout_secs: default_timeout_secs(),
            leeway_secs: 0,
        }
    }

    /// 設定ファイルの validator セクションから生成する。
    pub fn from_settings(
        settings: &ValidatorSettings,
        realm: &RealmConfig,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::for_realm(realm.clone()).with_audience(settings.audience.clone());
        config.issuer.clone_from(&settings.issuer);
        config.jwks_url.clone_from(&settings.jwks_url);
        if let Some(alg) = &settings.algorithm {
            config.algorithm = Algorithm::from_str(alg).map_err(|_| {
                ConfigError::Validation(format!("unsupported validator.algorithm: {alg}"))
            })?;
        }
        if let Some(secs) = settings.key_cache_ttl_secs {
            config.key_cache_ttl_secs = secs;
        }
        if let Some(capacity) = settings.key_cache_capacity {
            config.key_cache_capacity = capacity;
        }
        if let Some(secs) = settings.timeout_secs {
            config.timeout_secs = secs;
        }
        if let Some(secs) = settings.leeway_secs {
            config.leeway_secs = secs;
        }
        Ok(config)
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.issuer = Some(issuer.to_string());
        self
    }

    pub fn with_jwks_url(mut self, jwks_url: &str) -> Self {
        self.jwks_url = Some(jwks_url.to_string());
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_audience(mut self, audience: AudienceSet) -> Self {
        self.audience = audience;
        self
    }

    /// 鍵キャッシュの TTL と容量を設定する。
    pub fn with_key_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.key_cache_ttl_secs = ttl.as_secs();
        self.key_cache_capacity = capacity;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_leeway_secs(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// 実際に照合する発行者を返す。
    pub fn issuer(&self) -> String {
        self.issuer.clone().unwrap_or_else(|| self.realm.issuer())
    }

    /// 実際に取得する JWKS URL を返す。
    pub fn jwks_url(&self) -> String {
        self.jwks_url.clone().unwrap_or_else(|| self.realm.jwks_url())
    }

    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
