//! HTTP トランスポートのトレイトと、Bearer 付与・401 再送のデコレータ。

use async_trait::async_trait;
use http_body_util::BodyExt;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::source::TokenSource;

#[cfg(feature = "mock")]
use mockall::automock;

/// Transport はリクエストを 1 回送信してレスポンスを返すトレイト。
#[async_trait]
#[cfg_attr(feature = "mock", automock)]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: reqwest::Request) -> Result<reqwest::Response, ClientError>;
}

/// ReqwestTransport は reqwest::Client をそのまま使う最下層のトランスポート。
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(&self, request: reqwest::Request) -> Result<reqwest::Response, ClientError> {
        Ok(self.client.execute(request).await?)
    }
}

/// BearerTransport は送信直前にトークンソースから取得したトークンを Authorization ヘッダーに付与する。
pub struct BearerTransport {
    inner: Arc<dyn Transport>,
    source: Arc<dyn TokenSource>,
}

impl BearerTransport {
    pub fn new(inner: Arc<dyn Transport>, source: Arc<dyn TokenSource>) -> Self {
        Self { inner, source }
    }
}

#[async_trait]
impl Transport for BearerTransport {
    async fn round_trip(
        &self,
        mut request: reqwest::Request,
    ) -> Result<reqwest::Response, ClientError> {
        let token = self.source.token().await?;
        let mut value = HeaderValue::from_str(&token.bearer_header())
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        self.inner.round_trip(request).await
    }
}

/// RetryOnUnauthorizedTransport は上流が 401 を返したときにトークンをリセットし、1 回だけ再送する。
///
/// 2 回目のレスポンスは 401 であってもそのまま返す。
/// 再送できるよう、ストリーミングボディは最初の送信前にすべてバッファリングする。
pub struct RetryOnUnauthorizedTransport {
    inner: Arc<dyn Transport>,
    source: Arc<dyn TokenSource>,
}

impl RetryOnUnauthorizedTransport {
    /// `inner` は Bearer を付与する層（通常は `BearerTransport`）であること。
    pub fn new(inner: Arc<dyn Transport>, source: Arc<dyn TokenSource>) -> Self {
        Self { inner, source }
    }
}

#[async_trait]
impl Transport for RetryOnUnauthorizedTransport {
    async fn round_trip(&self, request: reqwest::Request) -> Result<reqwest::Response, ClientError> {
        let request = buffer_body(request).await?;
        let replay = request.try_clone();

        let response = self.inner.round_trip(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(replay) = replay else {
            warn!(url = %response.url(), "リクエストを複製できないため 401 を再送せずに返します");
            return Ok(response);
        };

        debug!(url = %response.url(), "401 を受信したためトークンをリセットして再送します");
        drop(response);
        self.source.reset();
        self.inner.round_trip(replay).await
    }
}

/// 複製できないボディをメモリに読み込み、バイト列ボディに置き換える。
async fn buffer_body(mut request: reqwest::Request) -> Result<reqwest::Request, ClientError> {
    let streaming = request
        .body()
        .is_some_and(|body| body.as_bytes().is_none());
    if !streaming {
        return Ok(request);
    }

    if let Some(body) = request.body_mut().take() {
        let bytes = body.collect().await?.to_bytes();
        *request.body_mut() = Some(reqwest::Body::from(bytes));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CachedToken;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 呼び出し回数を数え、reset のたびに別のトークンを返すテスト用ソース。
    #[derive(Default)]
    struct CountingSource {
        tokens: AtomicU32,
        resets: AtomicU32,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn token(&self) -> Result<CachedToken, ClientError> {
            self.tokens.fetch_add(1, Ordering::SeqCst);
            let generation = self.resets.load(Ordering::SeqCst);
            Ok(CachedToken::new(
                format!("token-{generation}"),
                "Bearer".into(),
                None,
                Some(3600),
                Utc::now(),
            ))
        }

        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn chain(source: Arc<CountingSource>) -> RetryOnUnauthorizedTransport {
        let base: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(reqwest::Client::new()));
        let bearer: Arc<dyn Transport> = Arc::new(BearerTransport::new(base, source.clone()));
        RetryOnUnauthorizedTransport::new(bearer, source)
    }

    // --- Bearer 付与 テスト ---

    #[tokio::test]
    async fn test_bearer_header_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apps"))
            .and(header("authorization", "Bearer token-0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let source = Arc::new(CountingSource::default());
        let transport = chain(source.clone());
        let request = reqwest::Client::new()
            .get(format!("{}/apps", server.uri()))
            .build()
            .unwrap();

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(source.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_token_header_is_rejected() {
        struct BrokenSource;

        #[async_trait]
        impl TokenSource for BrokenSource {
            async fn token(&self) -> Result<CachedToken, ClientError> {
                Ok(CachedToken::new(
                    "line\nbreak".into(),
                    "Bearer".into(),
                    None,
                    Some(3600),
                    Utc::now(),
                ))
            }
            fn reset(&self) {}
        }

        let base: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(reqwest::Client::new()));
        let transport = BearerTransport::new(base, Arc::new(BrokenSource));
        let request = reqwest::Client::new()
            .get("http://127.0.0.1:1/never")
            .build()
            .unwrap();

        assert!(matches!(
            transport.round_trip(request).await,
            Err(ClientError::InvalidRequest(_))
        ));
    }

    // --- 401 再送 テスト ---

    #[tokio::test]
    async fn test_unauthorized_resets_and_replays_once() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        Mock::given(method("GET"))
            .and(path("/apps"))
            .respond_with(move |req: &wiremock::Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                let auth = req
                    .headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                // 初回のトークンは失効扱い
                if auth == "Bearer token-0" {
                    ResponseTemplate::new(401)
                } else {
                    ResponseTemplate::new(200).set_body_string("ok")
                }
            })
            .mount(&server)
            .await;

        let source = Arc::new(CountingSource::default());
        let transport = chain(source.clone());
        let request = reqwest::Client::new()
            .get(format!("{}/apps", server.uri()))
            .build()
            .unwrap();

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.resets.load(Ordering::SeqCst), 1);
        assert_eq!(source.tokens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_unauthorized_returned_verbatim() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        Mock::given(method("GET"))
            .and(path("/apps"))
            .respond_with(move |_: &wiremock::Request| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                ResponseTemplate::new(401).set_body_string(format!("denied-{n}"))
            })
            .mount(&server)
            .await;

        let source = Arc::new(CountingSource::default());
        let transport = chain(source.clone());
        let request = reqwest::Client::new()
            .get(format!("{}/apps", server.uri()))
            .build()
            .unwrap();

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.text().await.unwrap(), "denied-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_401_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apps"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let source = Arc::new(CountingSource::default());
        let transport = chain(source.clone());
        let request = reqwest::Client::new()
            .get(format!("{}/apps", server.uri()))
            .build()
            .unwrap();

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(source.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replay_resends_body() {
        let server = MockServer::start().await;
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let recorded = bodies.clone();
        Mock::given(method("POST"))
            .and(path("/builds"))
            .respond_with(move |req: &wiremock::Request| {
                let mut bodies = recorded.lock().unwrap();
                bodies.push(String::from_utf8_lossy(&req.body).to_string());
                if bodies.len() == 1 {
                    ResponseTemplate::new(401)
                } else {
                    ResponseTemplate::new(201)
                }
            })
            .mount(&server)
            .await;

        let source = Arc::new(CountingSource::default());
        let transport = chain(source);
        let request = reqwest::Client::new()
            .post(format!("{}/builds", server.uri()))
            .body("{\"branch\":\"main\"}")
            .build()
            .unwrap();

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bodies = bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], "{\"branch\":\"main\"}");
        assert_eq!(bodies[1], bodies[0]);
    }

    /// ファイルから読み出すストリーミングボディを持つリクエストを組み立てる。
    async fn streaming_request(url: String, contents: &[u8]) -> (reqwest::Request, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, contents).unwrap();
        let stream = tokio::fs::File::open(file.path()).await.unwrap();
        let request = reqwest::Client::new()
            .post(url)
            .body(reqwest::Body::from(stream))
            .build()
            .unwrap();
        (request, file)
    }

    #[tokio::test]
    async fn test_streaming_body_is_buffered_for_replay() {
        let (request, _file) =
            streaming_request("http://127.0.0.1:1/upload".into(), b"artifact-bytes").await;
        assert!(request.try_clone().is_none());

        let request = buffer_body(request).await.unwrap();
        assert_eq!(
            request.body().and_then(reqwest::Body::as_bytes),
            Some(&b"artifact-bytes"[..])
        );
        assert!(request.try_clone().is_some());
    }

    #[tokio::test]
    async fn test_replay_resends_streaming_body() {
        let server = MockServer::start().await;
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let recorded = bodies.clone();
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(move |req: &wiremock::Request| {
                let mut bodies = recorded.lock().unwrap();
                bodies.push(req.body.clone());
                if bodies.len() == 1 {
                    ResponseTemplate::new(401)
                } else {
                    ResponseTemplate::new(201)
                }
            })
            .mount(&server)
            .await;

        let contents = vec![7u8; 64 * 1024];
        let (request, _file) = streaming_request(format!("{}/upload", server.uri()), &contents).await;
        let source = Arc::new(CountingSource::default());
        let transport = chain(source.clone());

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(source.resets.load(Ordering::SeqCst), 1);
        let bodies = bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], contents);
        assert_eq!(bodies[1], contents);
    }

    #[tokio::test]
    async fn test_token_error_propagates() {
        struct FailingSource;

        #[async_trait]
        impl TokenSource for FailingSource {
            async fn token(&self) -> Result<CachedToken, ClientError> {
                Err(ClientError::InvalidTokenResponse("boom".into()))
            }
            fn reset(&self) {}
        }

        let source: Arc<dyn TokenSource> = Arc::new(FailingSource);
        let base: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(reqwest::Client::new()));
        let transport = BearerTransport::new(base, source);
        let request = reqwest::Client::new()
            .get("http://127.0.0.1:1/never")
            .build()
            .unwrap();

        assert!(matches!(
            transport.round_trip(request).await,
            Err(ClientError::InvalidTokenResponse(_))
        ));
    }
}
