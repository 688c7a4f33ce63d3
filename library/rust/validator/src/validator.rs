//! トークン検証器: 署名 → 発行者 → オーディエンスの順に検証する。

use async_trait::async_trait;
use http::HeaderMap;
use realmauth_config::AudienceSet;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::bearer::bearer_token;
use crate::claims::{normalize_audience, ClaimsView};
use crate::config::ValidatorConfig;
use crate::error::{AuthError, ValidationError};
use crate::keys::{JwksKeySource, SigningKeySource};
use crate::verifier::{JwtVerifier, SignatureVerifier};

/// RequestAuthenticator はリクエストヘッダーを認証し、検証済みクレームを返すトレイト。
///
/// 単一発行者の `TokenValidator` と複数発行者の `ValidatorRepository` が実装する。
#[async_trait]
pub trait RequestAuthenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<ClaimsView, AuthError>;
}

/// TokenValidator は 1 つの発行者に対して JWT を検証する。
///
/// 1 回の検証で署名検証は 1 回、JWKS 取得は未知の kid に対して高々 1 回。失敗しても再試行しない。
pub struct TokenValidator {
    issuer: String,
    audience: AudienceSet,
    verifier: Arc<dyn JwtVerifier>,
}

impl TokenValidator {
    /// JWKS エンドポイントから鍵を取得する TokenValidator を生成する。
    pub fn new(config: ValidatorConfig) -> Result<Self, ValidationError> {
        let key_source = JwksKeySource::new(
            &config.jwks_url(),
            config.key_cache_ttl(),
            config.key_cache_capacity,
            config.timeout(),
        )?;
        Ok(Self::with_key_source(config, Arc::new(key_source)))
    }

    /// 鍵ソースを差し替えて生成する。
    pub fn with_key_source(config: ValidatorConfig, key_source: Arc<dyn SigningKeySource>) -> Self {
        let verifier = SignatureVerifier::new(key_source, config.algorithm)
            .with_leeway_secs(config.leeway_secs);
        Self::with_verifier(config, Arc::new(verifier))
    }

    /// 署名検証そのものを差し替えて生成する（テスト用）。
    pub fn with_verifier(config: ValidatorConfig, verifier: Arc<dyn JwtVerifier>) -> Self {
        Self {
            issuer: config.issuer(),
            audience: config.audience,
            verifier,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &AudienceSet {
        &self.audience
    }

    /// リクエストを検証し、結果のみを返す。
    pub async fn validate(&self, headers: &HeaderMap) -> Result<(), ValidationError> {
        self.validate_and_return_claims(headers).await.map(|_| ())
    }

    /// リクエストを検証し、後続の認可判定に使うクレームを返す。
    pub async fn validate_and_return_claims(
        &self,
        headers: &HeaderMap,
    ) -> Result<ClaimsView, ValidationError> {
        let token = bearer_token(headers)?;
        self.validate_token(token).await
    }

    /// トークン文字列を検証する。
    pub async fn validate_token(&self, token: &str) -> Result<ClaimsView, ValidationError> {
        let result = self.check(token).await;
        match &result {
            Err(e) if e.is_internal() => {
                error!(issuer = %self.issuer, error = %e, "トークン検証で内部エラーが発生しました");
            }
            Err(e) => debug!(issuer = %self.issuer, error = %e, "トークンを拒否しました"),
            Ok(_) => debug!(issuer = %self.issuer, "トークンを検証しました"),
        }
        result
    }

    async fn check(&self, token: &str) -> Result<ClaimsView, ValidationError> {
        let verified = self.verifier.verify(token).await?;
        self.check_issuer(&verified.claims)?;
        self.check_audience(&verified.claims)?;
        Ok(ClaimsView::new(verified.claims))
    }

    fn check_issuer(&self, claims: &serde_json::Map<String, Value>) -> Result<(), ValidationError> {
        let actual = claims.get("iss").and_then(Value::as_str).unwrap_or_default();
        if actual != self.issuer {
            return Err(ValidationError::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// 設定が空なら検査しない。空でなければトークンの aud と 1 つ以上一致する必要がある。
    fn check_audience(&self, claims: &serde_json::Map<String, Value>) -> Result<(), ValidationError> {
        if self.audience.is_empty() {
            return Ok(());
        }
        let actual = normalize_audience(claims)?;
        if self.audience.intersects(actual.iter().map(String::as_str)) {
            return Ok(());
        }
        Err(ValidationError::InvalidAudience {
            expected: self.audience.as_slice().to_vec(),
            actual,
        })
    }
}

#[async_trait]
impl RequestAuthenticator for TokenValidator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<ClaimsView, AuthError> {
        Ok(self.validate_and_return_claims(headers).await?)
    }
}
