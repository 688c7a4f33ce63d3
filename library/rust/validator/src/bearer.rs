//! Authorization ヘッダーからの Bearer トークン取り出し。

use http::header::AUTHORIZATION;
use http::HeaderMap;

use crate::error::{RepositoryError, ValidationError};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum BearerError {
    Missing,
    Invalid,
}

/// Authorization ヘッダーから Bearer トークンを取り出す。スキーム名は大文字小文字を区別しない。
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, BearerError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::Invalid)?;

    let value = value.trim_start();
    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(BearerError::Invalid);
    }

    // スキームを切り出してから前後の空白を除く
    let token = token.trim();
    if token.is_empty() {
        return Err(BearerError::Missing);
    }
    Ok(token)
}

impl From<BearerError> for ValidationError {
    fn from(err: BearerError) -> Self {
        match err {
            BearerError::Missing => Self::MissingToken,
            BearerError::Invalid => Self::InvalidAuthorizationHeader,
        }
    }
}

impl From<BearerError> for RepositoryError {
    fn from(err: BearerError) -> Self {
        match err {
            BearerError::Missing => Self::MissingAuthorizationHeader,
            BearerError::Invalid => Self::InvalidAuthorizationHeader,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers("BEARER abc")), Ok("abc"));
        assert_eq!(bearer_token(&headers("bearer abc")), Ok("abc"));
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), Err(BearerError::Missing));
    }

    #[test]
    fn test_non_bearer_scheme() {
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), Err(BearerError::Invalid));
        assert_eq!(bearer_token(&headers("abc")), Err(BearerError::Invalid));
    }

    #[test]
    fn test_empty_token() {
        assert_eq!(bearer_token(&headers("Bearer   ")), Err(BearerError::Missing));
        assert_eq!(bearer_token(&headers("Bearer")), Err(BearerError::Missing));
        assert_eq!(bearer_token(&headers("  bearer  tok  ")), Ok("tok"));
    }
}
