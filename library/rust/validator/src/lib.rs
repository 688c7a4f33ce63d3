//! realmauth-validator: 認可サーバーが発行した JWT の検証ライブラリ。
//!
//! JWKS エンドポイントから署名鍵を取得して TTL 付き LRU キャッシュに保持し、
//! 署名・有効期限・発行者・オーディエンスを検証する。検証済みクレームから
//! スコープと UMA リソース権限を照会でき、複数発行者の振り分けと axum 用ミドルウェアも提供する。
//!
//! # 使い方
//!
//! ```ignore
//! use realmauth_config::AudienceSet;
//! use realmauth_validator::{TokenValidator, ValidatorConfig};
//!
//! let config = ValidatorConfig::new("https://auth.example.com", "services")
//!     .with_audience(AudienceSet::single("build-api"));
//! let validator = TokenValidator::new(config)?;
//!
//! let claims = validator.validate_and_return_claims(request.headers()).await?;
//! claims.validate_scopes(&["build:read"])?;
//! claims.validate_permission_scopes("app-42", &["deploy"])?;
//! ```

mod bearer;
pub mod claims;
pub mod config;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod middleware;
pub mod repository;
pub mod validator;
pub mod verifier;

pub use claims::{ClaimsView, UmaPermission};
pub use config::ValidatorConfig;
pub use error::{AuthError, ClaimError, RepositoryError, ValidationError};
pub use keys::{
    HttpJwksFetcher, JwksDocument, JwksFetcher, JwksKeySource, SigningKey, SigningKeySource,
    StaticKeySource,
};
pub use metrics::ValidationMetrics;
pub use middleware::{
    auth_middleware, claims_from_request, AuthLayerState, ErrorWriter, JsonErrorWriter,
    PlainTextErrorWriter,
};
pub use repository::{unverified_issuer, ValidatorRepository};
pub use validator::{RequestAuthenticator, TokenValidator};
pub use verifier::{JwtVerifier, SignatureVerifier, VerifiedToken};

#[cfg(feature = "mock")]
pub use keys::{MockJwksFetcher, MockSigningKeySource};
