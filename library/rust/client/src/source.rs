//! トークンソースのトレイトと Client Credentials 実装。

use async_trait::async_trait;
use chrono::TimeDelta;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::config::ClientCredentialsConfig;
use crate::endpoint::request_token;
use crate::error::ClientError;
use crate::token::{seconds, CachedToken};

#[cfg(feature = "mock")]
use mockall::automock;

/// TokenSource はアクセストークンを必要に応じて払い出すトレイト。
///
/// `ClientCredentialsSource` がデフォルト実装。テスト時は `MockTokenSource` が使用可能。
#[async_trait]
#[cfg_attr(feature = "mock", automock)]
pub trait TokenSource: Send + Sync {
    /// 有効なトークンを返す。期限切れならトークンエンドポイントに問い合わせる。
    async fn token(&self) -> Result<CachedToken, ClientError>;

    /// キャッシュを破棄し、次の `token` 呼び出しで再認証させる。
    fn reset(&self);
}

/// ClientCredentialsSource は Client Credentials フローでトークンを取得しメモリにキャッシュする。
///
/// ネットワーク I/O の間はロックを保持しない。同時に期限切れを検知した呼び出しは
/// それぞれ取得を行い、最後に取得したトークンでキャッシュを置き換える。
pub struct ClientCredentialsSource {
    config: ClientCredentialsConfig,
    http_client: reqwest::Client,
    skew: TimeDelta,
    cache: RwLock<Option<CachedToken>>,
    // reset のたびに進める。取得中に reset された古い結果を保存しないために使う
    generation: AtomicU64,
}

impl ClientCredentialsSource {
    /// 新しい ClientCredentialsSource を生成する。
    ///
    /// `config.timeout_secs` で指定したタイムアウトを持つ HTTP クライアントを内部で生成する。
    pub fn new(config: ClientCredentialsConfig) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self::with_http_client(config, http_client))
    }

    /// 既存の HTTP クライアントを使って生成する。
    pub fn with_http_client(config: ClientCredentialsConfig, http_client: reqwest::Client) -> Self {
        let skew = seconds(config.expiry_skew_secs).unwrap_or(TimeDelta::MAX);
        Self {
            config,
            http_client,
            skew,
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ClientCredentialsConfig {
        &self.config
    }

    /// キャッシュを使わずにトークンエンドポイントへ問い合わせる。
    pub async fn fetch_token(&self) -> Result<CachedToken, ClientError> {
        debug!(
            client_id = %self.config.client_id,
            token_url = %self.config.token_url,
            "Client Credentials フローでトークンを取得します"
        );

        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
        ];
        if !self.config.scopes.is_empty() {
            form.push(("scope", self.config.scopes.join(" ")));
        }

        request_token(&self.http_client, &self.config.token_url, &form).await
    }

    /// 有効なキャッシュ済みトークンを返す。
    fn cached(&self) -> Option<CachedToken> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|token| token.is_valid(self.skew))
            .cloned()
    }

    fn store(&self, token: &CachedToken, generation: u64) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) == generation {
            *cache = Some(token.clone());
        } else {
            debug!(client_id = %self.config.client_id, "取得中にリセットされたためトークンをキャッシュしません");
        }
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsSource {
    async fn token(&self) -> Result<CachedToken, ClientError> {
        if let Some(token) = self.cached() {
            debug!("キャッシュ済みトークンを返します");
            return Ok(token);
        }

        let generation = self.generation.load(Ordering::Acquire);
        debug!(client_id = %self.config.client_id, "トークンをリフレッシュします");
        let token = self.fetch_token().await?;
        self.store(&token, generation);
        Ok(token)
    }

    fn reset(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        *cache = None;
        debug!(client_id = %self.config.client_id, "トークンキャッシュをリセットしました");
    }
}
