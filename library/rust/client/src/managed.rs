//! 認証付き HTTP クライアント。

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClientError;
use crate::source::TokenSource;
use crate::transport::{BearerTransport, ReqwestTransport, RetryOnUnauthorizedTransport, Transport};

/// HttpClientOptions は ManagedClient の下層 HTTP クライアントの設定を表す。
#[derive(Debug, Clone, Default)]
pub struct HttpClientOptions {
    /// 下層で使う reqwest::Client。省略時は新規に生成する。
    pub base_client: Option<reqwest::Client>,

    /// リクエストごとのタイムアウト。呼び出し側が個別に設定したものが優先される。
    pub timeout: Option<Duration>,
}

impl HttpClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下層の reqwest::Client を指定する。
    pub fn with_base_client(mut self, client: reqwest::Client) -> Self {
        self.base_client = Some(client);
        self
    }

    /// リクエストタイムアウトを指定する。
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// ManagedClient はトークン付与と 401 時の再認証を組み込んだ HTTP クライアント。
///
/// トランスポートは `RetryOnUnauthorized -> Bearer -> reqwest` の順に積み上げる。
pub struct ManagedClient {
    http_client: reqwest::Client,
    source: Arc<dyn TokenSource>,
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
}

impl ManagedClient {
    /// トークンソースと HTTP 設定から ManagedClient を生成する。
    pub fn new(source: Arc<dyn TokenSource>, options: HttpClientOptions) -> Result<Self, ClientError> {
        let http_client = match options.base_client {
            Some(client) => client,
            None => reqwest::Client::builder().build()?,
        };
        let base: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(http_client.clone()));
        let mut client = Self::with_transport(http_client, source, base);
        client.timeout = options.timeout;
        Ok(client)
    }

    /// 最下層のトランスポートを差し替えて生成する。
    pub fn with_transport(
        http_client: reqwest::Client,
        source: Arc<dyn TokenSource>,
        base: Arc<dyn Transport>,
    ) -> Self {
        let bearer: Arc<dyn Transport> = Arc::new(BearerTransport::new(base, source.clone()));
        let transport = Arc::new(RetryOnUnauthorizedTransport::new(bearer, source.clone()));
        Self {
            http_client,
            source,
            transport,
            timeout: None,
        }
    }

    /// 共有しているトークンソースを返す。
    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        self.source.clone()
    }

    /// 下層の reqwest::Client でリクエストビルダーを作る。送信は `send` で行うこと。
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http_client.request(method, url)
    }

    /// 組み立て済みのリクエストを認証付きで送信する。
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response, ClientError> {
        if let Some(timeout) = self.timeout {
            if request.timeout().is_none() {
                *request.timeout_mut() = Some(timeout);
            }
        }
        self.transport.round_trip(request).await
    }

    pub async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        self.execute(builder.build()?).await
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response, ClientError> {
        self.send(self.request(reqwest::Method::GET, url)).await
    }

    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
    ) -> Result<reqwest::Response, ClientError> {
        self.send(self.request(reqwest::Method::POST, url).form(form))
            .await
    }
}
