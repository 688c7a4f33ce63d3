//! realmauth-config: 認証ライブラリ共通の設定型。
//!
//! オーディエンス集合、レルムからの URL 導出、YAML 設定ファイルの読み込みを提供する。

mod audience;
mod realm;
mod types;

use thiserror::Error;

pub use audience::AudienceSet;
pub use realm::RealmConfig;
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// YAML を読み込み AuthSettings を返す。
pub fn load(path: &str) -> Result<AuthSettings, ConfigError> {
    let data = std::fs::read_to_string(path)?;
    from_yaml(&data)
}

/// YAML 文字列から AuthSettings を解析する。
pub fn from_yaml(data: &str) -> Result<AuthSettings, ConfigError> {
    Ok(serde_yaml::from_str(data)?)
}

/// 設定値のバリデーション。
pub fn validate(settings: &AuthSettings) -> Result<(), ConfigError> {
    if settings.realm.base_url.is_empty() {
        return Err(ConfigError::Validation("realm.base_url is required".into()));
    }
    if settings.realm.realm.is_empty() {
        return Err(ConfigError::Validation("realm.realm is required".into()));
    }
    if let Some(client) = &settings.client {
        if client.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "client.client_id is required".into(),
            ));
        }
        if client.client_secret.is_empty() {
            return Err(ConfigError::Validation(
                "client.client_secret is required".into(),
            ));
        }
    }
    if let Some(validator) = &settings.validator {
        if validator.key_cache_capacity == Some(0) {
            return Err(ConfigError::Validation(
                "validator.key_cache_capacity must be > 0".into(),
            ));
        }
    }
    Ok(())
}
