//! 署名鍵ソース: JWKS エンドポイントから公開鍵を取得し、TTL と容量上限付きでキャッシュする。

use async_trait::async_trait;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use lru::LruCache;
use serde::Deserialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};

use crate::error::ValidationError;

#[cfg(feature = "mock")]
use mockall::automock;

/// SigningKey は JWT の署名検証に使う公開鍵。
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub algorithm: Option<Algorithm>,
    pub key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// SigningKeySource は kid から署名鍵を引くトレイト。
///
/// `JwksKeySource` がデフォルト実装。固定鍵を使う場合は `StaticKeySource`。
#[async_trait]
#[cfg_attr(feature = "mock", automock)]
pub trait SigningKeySource: Send + Sync {
    /// kid に対応する鍵を返す。トークンに kid がない場合は空文字列が渡される。
    async fn get_key(&self, kid: &str) -> Result<SigningKey, ValidationError>;
}

/// JWKS ドキュメント。鍵は個別に解釈し、扱えない鍵は読み飛ばす。
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<serde_json::Value>,
}

/// JwksFetcher は JWKS エンドポイントからの取得を抽象化するトレイト。
#[async_trait]
#[cfg_attr(feature = "mock", automock)]
pub trait JwksFetcher: Send + Sync {
    async fn fetch_jwks(&self, jwks_url: &str) -> Result<JwksDocument, ValidationError>;
}

/// HttpJwksFetcher は reqwest で JWKS を取得するデフォルト実装。
pub struct HttpJwksFetcher {
    http_client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// リクエストタイムアウト付きで生成する。
    pub fn new(timeout: Duration) -> Result<Self, ValidationError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidationError::Internal(e.to_string()))?;
        Ok(Self { http_client })
    }

    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch_jwks(&self, jwks_url: &str) -> Result<JwksDocument, ValidationError> {
        debug!(jwks_url = %jwks_url, "JWKS を取得します");

        let response = self.http_client.get(jwks_url).send().await.map_err(|e| {
            error!(error = %e, jwks_url = %jwks_url, "JWKS エンドポイントへの HTTP リクエストに失敗しました");
            ValidationError::KeyFetch(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, jwks_url = %jwks_url, "JWKS の取得に失敗しました");
            return Err(ValidationError::KeyFetch(format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ValidationError::KeyFetch(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| {
            error!(error = %e, jwks_url = %jwks_url, "JWKS の解析に失敗しました");
            ValidationError::MalformedKeySet(e.to_string())
        })
    }
}

/// JWKS ドキュメントから kid 付きの署名鍵を取り出す。
fn parse_keys(document: &JwksDocument) -> Vec<SigningKey> {
    document
        .keys
        .iter()
        .filter_map(|raw| {
            let kid = raw.get("kid").and_then(serde_json::Value::as_str)?;
            let jwk: Jwk = match serde_json::from_value(raw.clone()) {
                Ok(jwk) => jwk,
                Err(e) => {
                    warn!(kid = %kid, error = %e, "解釈できない JWK を読み飛ばします");
                    return None;
                }
            };
            let key = match DecodingKey::from_jwk(&jwk) {
                Ok(key) => key,
                Err(e) => {
                    warn!(kid = %kid, error = %e, "署名検証に使えない JWK を読み飛ばします");
                    return None;
                }
            };
            let algorithm = raw
                .get("alg")
                .and_then(serde_json::Value::as_str)
                .and_then(|alg| Algorithm::from_str(alg).ok());
            Some(SigningKey {
                kid: kid.to_string(),
                algorithm,
                key,
            })
        })
        .collect()
}

/// キャッシュエントリ。
struct CachedKey {
    key: SigningKey,
    fetched_at: Instant,
}

/// 進行中の JWKS 取得。同時にキャッシュを外した呼び出しはすべて同じ取得結果を待つ。
type FetchSlot = Arc<OnceCell<Result<Vec<SigningKey>, ValidationError>>>;

enum Pending {
    Cached(SigningKey),
    Fetch(FetchSlot),
}

/// JwksKeySource は JWKS エンドポイントから鍵を取得し、TTL と容量上限付きでキャッシュする。
///
/// 未知の kid を引いたときに JWKS 全体を取得し、ドキュメント内のすべての鍵をキャッシュに入れる。
/// 容量を超えると最も長く参照されていない鍵から追い出す。
/// ロックはキャッシュ操作の間だけ保持し、JWKS 取得中は保持しない。
/// 同時に発生したキャッシュミスは 1 回の取得にまとめる。
pub struct JwksKeySource {
    jwks_url: String,
    ttl: Duration,
    cache: Mutex<LruCache<String, CachedKey>>,
    in_flight: Mutex<Option<FetchSlot>>,
    fetcher: Arc<dyn JwksFetcher>,
}

impl JwksKeySource {
    /// HTTP で JWKS を取得する JwksKeySource を生成する。
    pub fn new(
        jwks_url: &str,
        ttl: Duration,
        capacity: usize,
        timeout: Duration,
    ) -> Result<Self, ValidationError> {
        let fetcher = HttpJwksFetcher::new(timeout)?;
        Ok(Self::with_fetcher(jwks_url, ttl, capacity, Arc::new(fetcher)))
    }

    /// カスタムフェッチャーを使う JwksKeySource を生成する（テスト用）。
    pub fn with_fetcher(
        jwks_url: &str,
        ttl: Duration,
        capacity: usize,
        fetcher: Arc<dyn JwksFetcher>,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            jwks_url: jwks_url.to_string(),
            ttl,
            cache: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(None),
            fetcher,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// キャッシュから有効な鍵を引く。期限切れの鍵は取り除く。
    fn lookup(&self, kid: &str) -> Option<SigningKey> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match cache.get(kid) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => return Some(entry.key.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(kid);
        }
        None
    }

    fn store(&self, keys: Vec<SigningKey>) {
        let fetched_at = Instant::now();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            cache.put(key.kid.clone(), CachedKey { key, fetched_at });
        }
    }

    /// 進行中の取得があれば合流する。なければキャッシュを再確認してから新しい取得を登録する。
    fn pending(&self, kid: &str) -> Pending {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = in_flight.as_ref() {
            return Pending::Fetch(slot.clone());
        }
        // 直前に完了した取得が鍵を入れているかもしれない
        if let Some(key) = self.lookup(kid) {
            return Pending::Cached(key);
        }
        let slot = FetchSlot::default();
        *in_flight = Some(slot.clone());
        Pending::Fetch(slot)
    }

    /// 完了した取得を登録から外す。後から別の取得が登録されていれば触らない。
    fn finish(&self, slot: &FetchSlot) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.as_ref().is_some_and(|current| Arc::ptr_eq(current, slot)) {
            *in_flight = None;
        }
    }

    async fn fetch_and_store(&self) -> Result<Vec<SigningKey>, ValidationError> {
        let document = self.fetcher.fetch_jwks(&self.jwks_url).await?;
        let keys = parse_keys(&document);
        debug!(
            jwks_url = %self.jwks_url,
            count = keys.len(),
            "JWKS から鍵を取得しました"
        );
        self.store(keys.clone());
        Ok(keys)
    }

    /// キャッシュを破棄する。鍵ローテーション時に使用。
    pub fn invalidate_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl SigningKeySource for JwksKeySource {
    async fn get_key(&self, kid: &str) -> Result<SigningKey, ValidationError> {
        if kid.is_empty() {
            return Err(ValidationError::MissingKeyId);
        }
        if let Some(key) = self.lookup(kid) {
            return Ok(key);
        }

        let slot = match self.pending(kid) {
            Pending::Cached(key) => return Ok(key),
            Pending::Fetch(slot) => slot,
        };

        let found = match slot.get_or_init(|| self.fetch_and_store()).await {
            Ok(keys) => keys
                .iter()
                .find(|k| k.kid == kid)
                .cloned()
                .ok_or_else(|| ValidationError::UnknownKey(kid.to_string())),
            Err(e) => Err(e.clone()),
        };
        self.finish(&slot);
        found
    }
}

/// StaticKeySource は kid に関係なく常に同じ鍵を返す。
///
/// JWKS を使わずに公開鍵や共有シークレットを直接指定する場合に使う。
pub struct StaticKeySource {
    key: SigningKey,
}

impl StaticKeySource {
    pub fn new(key: DecodingKey) -> Self {
        Self {
            key: SigningKey {
                kid: String::new(),
                algorithm: None,
                key,
            },
        }
    }

    /// PEM 形式の RSA 公開鍵から生成する。
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, ValidationError> {
        let key =
            DecodingKey::from_rsa_pem(pem).map_err(|e| ValidationError::Internal(e.to_string()))?;
        Ok(Self::new(key))
    }

    /// HMAC 用の共有シークレットから生成する。
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::new(DecodingKey::from_secret(secret))
    }
}

#[async_trait]
impl SigningKeySource for StaticKeySource {
    async fn get_key(&self, _kid: &str) -> Result<SigningKey, ValidationError> {
        Ok(self.key.clone())
    }
}
