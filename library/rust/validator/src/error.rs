//! トークン検証・クレーム抽出・発行者解決のエラー定義。

/// ValidationError はトークン検証で発生するエラーを表す。
#[derive(thiserror::Error, Debug, Clone)]
pub enum ValidationError {
    #[error("missing Authorization header")]
    MissingToken,

    #[error("invalid Authorization header format")]
    InvalidAuthorizationHeader,

    #[error("JWKS fetch failed: {0}")]
    KeyFetch(String),

    #[error("malformed JWKS document: {0}")]
    MalformedKeySet(String),

    #[error("missing kid in token header")]
    MissingKeyId,

    #[error("unknown kid: {0}")]
    UnknownKey(String),

    #[error("invalid token: {0}")]
    Signature(String),

    #[error("token expired")]
    TokenExpired,

    #[error("issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("invalid audience: expected one of {expected:?}, got {actual:?}")]
    InvalidAudience {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// 想定外のクレーム型など、通常のトラフィックでは起きないエラー。
    #[error("internal validation error: {0}")]
    Internal(String),
}

impl ValidationError {
    /// 運用でアラート対象にすべき内部エラーかどうかを返す。
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// 鍵配布エンドポイントに到達できない、または応答が壊れている場合に true。
    pub fn is_key_source_failure(&self) -> bool {
        matches!(self, Self::KeyFetch(_) | Self::MalformedKeySet(_))
    }
}

/// ClaimError は検証済みクレームからの抽出に失敗したことを表す。トークン自体は有効なまま。
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ClaimError {
    #[error("missing claim: {0}")]
    MissingClaim(String),

    #[error("resource not found in permissions: {0}")]
    ResourceNotFound(String),

    #[error("missing scope: {0}")]
    MissingScope(String),

    #[error("no permission scopes for resource: {0}")]
    NoPermissionScopes(String),

    #[error("missing scope {scope} for resource {resource}")]
    MissingPermissionScope { resource: String, scope: String },

    #[error("malformed claim: {0}")]
    Malformed(String),
}

/// RepositoryError は未検証 JWT から検証器を選べなかったことを表す。
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("missing Authorization header")]
    MissingAuthorizationHeader,

    #[error("invalid Authorization header format: expected Bearer token")]
    InvalidAuthorizationHeader,

    #[error("malformed JWT: expected 3 segments, got {segments}")]
    MalformedJwt { segments: usize },

    #[error("invalid JWT payload: {0}")]
    InvalidPayload(String),

    #[error("JWT payload has no iss claim")]
    MissingIssuer,

    #[error("no validator registered for issuer {0}")]
    UnknownIssuer(String),
}

/// AuthError はリクエスト認証全体（発行者解決 + 検証）のエラーを表す。
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl AuthError {
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Validation(e) if e.is_internal())
    }

    /// レスポンスボディに載せるエラーコードを返す。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Repository(RepositoryError::UnknownIssuer(_)) => "AUTH_INVALID_ISSUER",
            Self::Repository(
                RepositoryError::MissingAuthorizationHeader
                | RepositoryError::InvalidAuthorizationHeader,
            )
            | Self::Validation(
                ValidationError::MissingToken | ValidationError::InvalidAuthorizationHeader,
            ) => "AUTH_UNAUTHENTICATED",
            Self::Repository(_) => "AUTH_INVALID_TOKEN",
            Self::Validation(e) => match e {
                ValidationError::TokenExpired => "AUTH_TOKEN_EXPIRED",
                ValidationError::IssuerMismatch { .. } => "AUTH_INVALID_ISSUER",
                ValidationError::InvalidAudience { .. } => "AUTH_INVALID_AUDIENCE",
                ValidationError::KeyFetch(_) | ValidationError::MalformedKeySet(_) => {
                    "AUTH_KEY_FETCH_FAILED"
                }
                ValidationError::Internal(_) => "AUTH_INTERNAL_ERROR",
                _ => "AUTH_INVALID_TOKEN",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_is_distinguished() {
        assert!(ValidationError::Internal("x".into()).is_internal());
        assert!(!ValidationError::TokenExpired.is_internal());
        assert!(AuthError::from(ValidationError::Internal("x".into())).is_internal());
        assert!(!AuthError::from(RepositoryError::MissingIssuer).is_internal());
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            AuthError::from(RepositoryError::MissingAuthorizationHeader).code(),
            "AUTH_UNAUTHENTICATED"
        );
        assert_eq!(
            AuthError::from(RepositoryError::MalformedJwt { segments: 2 }).code(),
            "AUTH_INVALID_TOKEN"
        );
        assert_eq!(
            AuthError::from(ValidationError::TokenExpired).code(),
            "AUTH_TOKEN_EXPIRED"
        );
        assert_eq!(
            AuthError::from(ValidationError::KeyFetch("down".into())).code(),
            "AUTH_KEY_FETCH_FAILED"
        );
    }

    #[test]
    fn test_messages_name_the_subject() {
        assert_eq!(
            ClaimError::ResourceNotFound("missing".into()).to_string(),
            "resource not found in permissions: missing"
        );
        assert_eq!(
            ClaimError::MissingScope("build:write".into()).to_string(),
            "missing scope: build:write"
        );
        assert!(RepositoryError::UnknownIssuer("https://evil".into())
            .to_string()
            .contains("https://evil"));
    }
}
