//! 認証情報ごとに 1 つの ManagedClient を共有するレジストリ。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::config::ClientCredentialsConfig;
use crate::error::ClientError;
use crate::managed::{HttpClientOptions, ManagedClient};
use crate::source::ClientCredentialsSource;

/// CredentialsKey は ManagedClient を識別するキー。
///
/// スコープが異なれば別のクライアントとして扱う。スコープは順序と重複を正規化する。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialsKey {
    client_id: String,
    client_secret: String,
    token_url: String,
    scopes: Vec<String>,
}

impl CredentialsKey {
    pub fn new(client_id: &str, client_secret: &str, token_url: &str, scopes: &[String]) -> Self {
        let mut scopes = scopes.to_vec();
        scopes.sort();
        scopes.dedup();
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_url: token_url.to_string(),
            scopes,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl std::fmt::Debug for CredentialsKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsKey")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// ManagedClientRegistry は CredentialsKey ごとに ManagedClient を 1 つだけ生成して共有する。
///
/// 同じキーで同時に初回アクセスしても生成は 1 回だけで、全員が同じインスタンスを受け取る。
/// エントリは削除しない。プロセス全体で共有する場合はコンポジションルートで 1 つ生成して注入すること。
#[derive(Default)]
pub struct ManagedClientRegistry {
    clients: RwLock<HashMap<CredentialsKey, Arc<ManagedClient>>>,
}

impl ManagedClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定に対応する ManagedClient を返す。なければ生成して登録する。
    ///
    /// `options` は最初に生成したときだけ使われる。
    pub fn get_or_create(
        &self,
        config: &ClientCredentialsConfig,
        options: HttpClientOptions,
    ) -> Result<Arc<ManagedClient>, ClientError> {
        self.get_or_create_with(config.key(), || {
            let source = ClientCredentialsSource::new(config.clone())?;
            ManagedClient::new(Arc::new(source), options)
        })
    }

    /// キーに対応する ManagedClient を返す。なければ `create` で生成して登録する。
    ///
    /// `create` は書き込みロック内で高々 1 回呼ばれる。ネットワーク I/O を行わないこと。
    pub fn get_or_create_with<F>(
        &self,
        key: CredentialsKey,
        create: F,
    ) -> Result<Arc<ManagedClient>, ClientError>
    where
        F: FnOnce() -> Result<ManagedClient, ClientError>,
    {
        if let Some(client) = self.get(&key) {
            return Ok(client);
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);

        // ダブルチェック: 別スレッドがすでに登録しているかもしれない
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        debug!(client_id = %key.client_id(), "ManagedClient を生成します");
        let client = Arc::new(create()?);
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// 登録済みの ManagedClient を返す。
    pub fn get(&self, key: &CredentialsKey) -> Option<Arc<ManagedClient>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
