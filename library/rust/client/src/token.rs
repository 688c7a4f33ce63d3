//! キャッシュ対象のアクセストークン。

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::fmt;

/// トークンエンドポイントのレスポンス（OAuth2 標準形式）。
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// トークンエンドポイントから取得したアクセストークン。
///
/// 更新時は値ごと置き換え、フィールド単位で書き換えない。
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// Bearer アクセストークン文字列。
    pub access_token: String,

    /// トークン種別（通常は "Bearer"）。
    pub token_type: String,

    /// リフレッシュトークン。このライブラリでは使用しない。
    pub refresh_token: Option<String>,

    /// 有効期限。`None` は期限なしを意味する。
    pub expiry: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// 発行時刻と `expires_in` から有効期限を計算して生成する。
    ///
    /// `expires_in` が省略または 0 の場合は期限なしとして扱う。
    pub fn new(
        access_token: String,
        token_type: String,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let expiry = expires_in
            .filter(|secs| *secs > 0)
            .and_then(seconds)
            .and_then(|ttl| issued_at.checked_add_signed(ttl));
        Self {
            access_token,
            token_type,
            refresh_token,
            expiry,
        }
    }

    pub(crate) fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self::new(
            response.access_token,
            response.token_type,
            response.refresh_token,
            response.expires_in,
            issued_at,
        )
    }

    /// 現在時刻で有効かどうかを返す。
    pub fn is_valid(&self, skew: TimeDelta) -> bool {
        self.is_valid_at(Utc::now(), skew)
    }

    /// `now < expiry - skew` を満たす場合に有効とみなす。
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: TimeDelta) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            None => true,
            Some(expiry) => expiry
                .checked_sub_signed(skew)
                .is_some_and(|deadline| now < deadline),
        }
    }

    /// Authorization ヘッダー用の文字列を返す。
    ///
    /// token_type が空または大文字小文字違いの "bearer" なら "Bearer" に正規化する。
    pub fn bearer_header(&self) -> String {
        let scheme = if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer")
        {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", scheme, self.access_token)
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// 秒数を TimeDelta に変換する。範囲外なら `None`。
pub(crate) fn seconds(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}
