//! JWT の署名検証。

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Header, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::ValidationError;
use crate::keys::SigningKeySource;

/// VerifiedToken は署名検証済みのヘッダーとクレーム。
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub header: Header,
    pub claims: Map<String, Value>,
}

/// JwtVerifier はトークン文字列の署名と有効期限を検証するトレイト。
///
/// 発行者とオーディエンスの検査は TokenValidator が行う。
/// テストで署名検証を差し替える場合はこのトレイトを実装する。
#[async_trait]
pub trait JwtVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedToken, ValidationError>;
}

/// SignatureVerifier は SigningKeySource の鍵で署名を検証するデフォルト実装。
pub struct SignatureVerifier {
    key_source: Arc<dyn SigningKeySource>,
    algorithm: Algorithm,
    leeway_secs: u64,
}

impl SignatureVerifier {
    pub fn new(key_source: Arc<dyn SigningKeySource>, algorithm: Algorithm) -> Self {
        Self {
            key_source,
            algorithm,
            leeway_secs: 0,
        }
    }

    /// `exp` 判定に許容する時刻ずれを設定する。
    pub fn with_leeway_secs(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }
}

#[async_trait]
impl JwtVerifier for SignatureVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedToken, ValidationError> {
        let header = decode_header(token).map_err(|e| ValidationError::Signature(e.to_string()))?;

        if header.alg != self.algorithm {
            return Err(ValidationError::Signature(format!(
                "unexpected signing algorithm: {:?}",
                header.alg
            )));
        }

        let kid = header.kid.as_deref().unwrap_or_default();
        let key = self.key_source.get_key(kid).await?;

        let mut validation = Validation::new(self.algorithm);
        validation.validate_aud = false;
        validation.leeway = self.leeway_secs;

        let data = decode::<Map<String, Value>>(token, &key.key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => ValidationError::TokenExpired,
                _ => ValidationError::Signature(e.to_string()),
            }
        })?;

        Ok(VerifiedToken {
            header,
            claims: data.claims,
        })
    }
}
