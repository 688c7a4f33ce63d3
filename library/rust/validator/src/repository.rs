//! 複数発行者のトークン検証器を iss クレームで振り分けるリポジトリ。

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::bearer::bearer_token;
use crate::claims::ClaimsView;
use crate::error::{AuthError, RepositoryError};
use crate::metrics::{ValidationMetrics, UNKNOWN_ISSUER};
use crate::validator::{RequestAuthenticator, TokenValidator};

/// ValidatorRepository は発行者 URL ごとに TokenValidator を保持する。
///
/// 振り分けに使う iss は署名検証前の値なので、選ばれた検証器が改めて署名と発行者を検証する。
#[derive(Default)]
pub struct ValidatorRepository {
    validators: HashMap<String, Arc<TokenValidator>>,
    metrics: Option<Arc<ValidationMetrics>>,
}

impl ValidatorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 検証器を発行者 URL で登録する。同じ発行者の既存の検証器は置き換える。
    pub fn register(&mut self, validator: Arc<TokenValidator>) -> &mut Self {
        self.validators
            .insert(validator.issuer().to_string(), validator);
        self
    }

    /// 検証器を登録したリポジトリを返す。
    pub fn with_validator(mut self, validator: Arc<TokenValidator>) -> Self {
        self.register(validator);
        self
    }

    /// 検証の成功・失敗を発行者ごとに記録する。
    pub fn with_metrics(mut self, metrics: Arc<ValidationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn issuers(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// リクエストの Bearer トークンの発行者に対応する検証器を返す。
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Arc<TokenValidator>, RepositoryError> {
        let token = bearer_token(headers)?;
        self.resolve_token(token)
    }

    /// トークンの発行者に対応する検証器を返す。
    pub fn resolve_token(&self, token: &str) -> Result<Arc<TokenValidator>, RepositoryError> {
        let issuer = unverified_issuer(token)?;
        self.validators
            .get(&issuer)
            .cloned()
            .ok_or(RepositoryError::UnknownIssuer(issuer))
    }

    fn record(&self, issuer: &str, ok: bool) {
        if let Some(metrics) = &self.metrics {
            if ok {
                metrics.record_success(issuer);
            } else {
                metrics.record_failure(issuer);
            }
        }
    }
}

#[async_trait]
impl RequestAuthenticator for ValidatorRepository {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<ClaimsView, AuthError> {
        let validator = match self.resolve(headers) {
            Ok(validator) => validator,
            Err(e) => {
                debug!(error = %e, "トークンの発行者を解決できませんでした");
                self.record(UNKNOWN_ISSUER, false);
                return Err(e.into());
            }
        };

        let result = validator.validate_and_return_claims(headers).await;
        self.record(validator.issuer(), result.is_ok());
        Ok(result?)
    }
}

/// 署名を検証せずに JWT ペイロードの iss クレームを取り出す。
///
/// 振り分け専用であり、戻り値を信頼してはならない。
pub fn unverified_issuer(token: &str) -> Result<String, RepositoryError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(RepositoryError::MalformedJwt {
            segments: segments.len(),
        });
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| RepositoryError::InvalidPayload(e.to_string()))?;
    let payload: Value = serde_json::from_slice(&payload)
        .map_err(|e| RepositoryError::InvalidPayload(e.to_string()))?;

    match payload.get("iss").and_then(Value::as_str) {
        Some(issuer) if !issuer.is_empty() => Ok(issuer.to_string()),
        _ => Err(RepositoryError::MissingIssuer),
    }
}
