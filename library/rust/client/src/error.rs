//! 認証付き HTTP クライアントのエラー定義。

/// ClientError はトークン取得と認証付きリクエスト送信で発生するエラーを表す。
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// トークンエンドポイントまたは上流サービスへの通信に失敗した。
    #[error("HTTP リクエスト失敗: {0}")]
    Http(#[from] reqwest::Error),

    /// トークンエンドポイントが 2xx 以外を返した。
    #[error("トークン取得失敗: HTTP {status} - {body}")]
    TokenRetrieval {
        status: reqwest::StatusCode,
        body: String,
    },

    /// トークンレスポンスを解釈できなかった。
    #[error("不正なトークンレスポンス: {0}")]
    InvalidTokenResponse(String),

    /// UMA クレームのエンコードに失敗した。
    #[error("クレームのエンコード失敗: {0}")]
    ClaimEncoding(#[from] serde_json::Error),

    /// リクエストを組み立てられなかった。
    #[error("不正なリクエスト: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// トークンエンドポイントが返したステータスコードを返す。
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::TokenRetrieval { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}
