//! realmauth-client: サービス間通信用の認証付き HTTP クライアントライブラリ。
//!
//! OAuth2 Client Credentials フローでトークンを取得・キャッシュし、
//! リクエストへの Bearer 付与と 401 受信時の再認証・再送を透過的に行う。
//! UMA チケットによるリソース権限付きトークンの取得もサポートする。
//!
//! # 使い方
//!
//! ```ignore
//! use realmauth_client::{ClientWithSecret, HttpClientOptions, ManagedClientRegistry};
//! use realmauth_config::RealmConfig;
//!
//! let realm = RealmConfig::new("https://auth.example.com", "services");
//! let registry = ManagedClientRegistry::new();
//!
//! let client = ClientWithSecret::new("build-service", "secret", &realm)
//!     .managed_http_client(&registry, HttpClientOptions::new())?;
//!
//! // トークンは期限切れまでキャッシュされ、401 なら 1 回だけ再認証して再送する
//! let response = client.get("https://api.example.com/apps").await?;
//! ```

pub mod config;
mod endpoint;
pub mod error;
pub mod managed;
pub mod provider;
pub mod registry;
pub mod source;
pub mod token;
pub mod transport;
pub mod uma;

pub use config::ClientCredentialsConfig;
pub use error::ClientError;
pub use managed::{HttpClientOptions, ManagedClient};
pub use provider::ClientWithSecret;
pub use registry::{CredentialsKey, ManagedClientRegistry};
pub use source::{ClientCredentialsSource, TokenSource};
pub use token::CachedToken;
pub use transport::{BearerTransport, ReqwestTransport, RetryOnUnauthorizedTransport, Transport};
pub use uma::{Permission, UmaOptions, UmaTokenSource};

#[cfg(feature = "mock")]
pub use source::MockTokenSource;
#[cfg(feature = "mock")]
pub use transport::MockTransport;
