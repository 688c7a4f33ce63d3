//! UMA チケットによる権限付きトークンの取得。

use base64::{engine::general_purpose::STANDARD, Engine};
use realmauth_config::AudienceSet;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientCredentialsConfig;
use crate::endpoint::request_token;
use crate::error::ClientError;
use crate::token::CachedToken;

const UMA_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";
const JWT_TOKEN_FORMAT: &str = "urn:ietf:params:oauth:token-type:jwt";

/// Permission は要求するリソースとスコープの組。`resource#scope` 形式で送信する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub resource: String,
    pub scope: String,
}

impl Permission {
    pub fn new(resource: &str, scope: &str) -> Self {
        Self {
            resource: resource.to_string(),
            scope: scope.to_string(),
        }
    }

    /// フォームの `permission` フィールド値を返す。スコープが空ならリソース名のみ。
    pub fn encode(&self) -> String {
        if self.scope.is_empty() {
            self.resource.clone()
        } else {
            format!("{}#{}", self.resource, self.scope)
        }
    }
}

/// UmaOptions は UmaTokenSource 全体に適用する設定。
#[derive(Debug, Clone, Default)]
pub struct UmaOptions {
    /// すべての要求に付与するオーディエンス。
    pub audience: AudienceSet,
}

impl UmaOptions {
    pub fn with_audience(mut self, audience: AudienceSet) -> Self {
        self.audience = audience;
        self
    }
}

/// UmaTokenSource は UMA チケット付与でリソース権限付きトークンを取得する。
///
/// 要求ごとに権限が異なるためキャッシュせず、呼び出しのたびに新しいトークンを取得する。
pub struct UmaTokenSource {
    config: ClientCredentialsConfig,
    options: UmaOptions,
    http_client: reqwest::Client,
}

impl UmaTokenSource {
    pub fn new(config: ClientCredentialsConfig, options: UmaOptions) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self::with_http_client(config, options, http_client))
    }

    pub fn with_http_client(
        config: ClientCredentialsConfig,
        options: UmaOptions,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            options,
            http_client,
        }
    }

    /// クレームなしで権限付きトークンを取得する。
    pub async fn token(
        &self,
        permissions: &[Permission],
        audience: &AudienceSet,
    ) -> Result<CachedToken, ClientError> {
        let form = self.form(None, permissions, audience);
        self.request(&form).await
    }

    /// 任意のクレームを `claim_token` として添えて権限付きトークンを取得する。
    pub async fn token_with_claim<C>(
        &self,
        claim: &C,
        permissions: &[Permission],
        audience: &AudienceSet,
    ) -> Result<CachedToken, ClientError>
    where
        C: Serialize + ?Sized + Sync,
    {
        let encoded = encode_claim(claim)?;
        let form = self.form(Some(encoded), permissions, audience);
        self.request(&form).await
    }

    async fn request(&self, form: &[(&'static str, String)]) -> Result<CachedToken, ClientError> {
        debug!(
            client_id = %self.config.client_id,
            token_url = %self.config.token_url,
            "UMA チケットでトークンを取得します"
        );
        request_token(&self.http_client, &self.config.token_url, form).await
    }

    /// 送信するフォームを組み立てる。オーディエンスは設定値と引数をマージし重複を除く。
    pub(crate) fn form(
        &self,
        claim_token: Option<String>,
        permissions: &[Permission],
        audience: &AudienceSet,
    ) -> Vec<(&'static str, String)> {
        let mut form = vec![("grant_type", UMA_GRANT_TYPE.to_string())];
        if let Some(claim_token) = claim_token {
            form.push(("claim_token", claim_token));
            form.push(("claim_token_format", JWT_TOKEN_FORMAT.to_string()));
        }
        form.push(("client_id", self.config.client_id.clone()));
        form.push(("client_secret", self.config.client_secret.clone()));
        for permission in permissions {
            form.push(("permission", permission.encode()));
        }
        for aud in self.options.audience.merged(audience).iter() {
            form.push(("audience", aud.to_string()));
        }
        form
    }
}

/// クレームを JSON 化し、パディング付き標準 Base64 でエンコードする。
pub(crate) fn encode_claim<C: Serialize + ?Sized>(claim: &C) -> Result<String, ClientError> {
    let json = serde_json::to_vec(claim)?;
    Ok(STANDARD.encode(json))
}
