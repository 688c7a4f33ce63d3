//! クライアント ID とシークレットから各種クライアントを組み立てるプロバイダー。

use realmauth_config::RealmConfig;
use std::sync::Arc;

use crate::config::ClientCredentialsConfig;
use crate::error::ClientError;
use crate::managed::{HttpClientOptions, ManagedClient};
use crate::registry::ManagedClientRegistry;
use crate::source::ClientCredentialsSource;
use crate::uma::{UmaOptions, UmaTokenSource};

/// ClientWithSecret はサービス自身の認証情報を保持し、トークンソースや HTTP クライアントを生成する。
#[derive(Debug, Clone)]
pub struct ClientWithSecret {
    config: ClientCredentialsConfig,
}

impl ClientWithSecret {
    /// レルムのトークンエンドポイントを使う ClientWithSecret を生成する。
    pub fn new(client_id: &str, client_secret: &str, realm: &RealmConfig) -> Self {
        Self {
            config: ClientCredentialsConfig::new(&realm.token_url(), client_id, client_secret),
        }
    }

    /// 設定済みの ClientCredentialsConfig から生成する。
    pub fn from_config(config: ClientCredentialsConfig) -> Self {
        Self { config }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.with_scopes(scopes);
        self
    }

    /// トークンエンドポイントを上書きする。
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.config.token_url = token_url.to_string();
        self
    }

    pub fn with_expiry_skew_secs(mut self, secs: u64) -> Self {
        self.config = self.config.with_expiry_skew_secs(secs);
        self
    }

    pub fn token_url(&self) -> &str {
        &self.config.token_url
    }

    pub fn credentials(&self) -> &ClientCredentialsConfig {
        &self.config
    }

    /// キャッシュ付きの Client Credentials トークンソースを生成する。
    pub fn token_source(&self) -> Result<ClientCredentialsSource, ClientError> {
        ClientCredentialsSource::new(self.config.clone())
    }

    /// UMA チケットでトークンを取得するソースを生成する。
    pub fn uma_token_source(&self, options: UmaOptions) -> Result<UmaTokenSource, ClientError> {
        UmaTokenSource::new(self.config.clone(), options)
    }

    /// レジストリを介さない新しい ManagedClient を生成する。
    pub fn http_client(&self, options: HttpClientOptions) -> Result<ManagedClient, ClientError> {
        let source = self.token_source()?;
        ManagedClient::new(Arc::new(source), options)
    }

    /// レジストリで共有される ManagedClient を返す。
    pub fn managed_http_client(
        &self,
        registry: &ManagedClientRegistry,
        options: HttpClientOptions,
    ) -> Result<Arc<ManagedClient>, ClientError> {
        registry.get_or_create(&self.config, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm() -> RealmConfig {
        RealmConfig::new("https://auth.example.com", "services")
    }

    #[test]
    fn test_token_url_derived_from_realm() {
        let client = ClientWithSecret::new("svc", "sec", &realm());
        assert_eq!(
            client.token_url(),
            "https://auth.example.com/auth/realms/services/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_token_url_override() {
        let client = ClientWithSecret::new("svc", "sec", &realm())
            .with_token_url("http://localhost:8080/token");
        assert_eq!(client.token_url(), "http://localhost:8080/token");
    }

    #[test]
    fn test_credentials_carry_scopes() {
        let client = ClientWithSecret::new("svc", "sec", &realm()).with_scopes(["builds:read"]);
        assert_eq!(client.credentials().scopes, vec!["builds:read".to_string()]);
    }

    #[test]
    fn test_managed_http_client_is_shared() {
        let registry = ManagedClientRegistry::new();
        let client = ClientWithSecret::new("svc", "sec", &realm());
        let a = client
            .managed_http_client(&registry, HttpClientOptions::new())
            .unwrap();
        let b = ClientWithSecret::new("svc", "sec", &realm())
            .managed_http_client(&registry, HttpClientOptions::new())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_http_client_is_not_shared() {
        let registry = ManagedClientRegistry::new();
        let client = ClientWithSecret::new("svc", "sec", &realm());
        client.http_client(HttpClientOptions::new()).unwrap();
        assert!(registry.is_empty());
    }
}
