//! axum 用の認証ミドルウェア。

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::claims::ClaimsView;
use crate::error::{AuthError, ValidationError};
use crate::validator::RequestAuthenticator;

/// ErrorWriter は認証失敗時のレスポンスを組み立てるトレイト。
///
/// `Fn(&AuthError) -> Response` のクロージャもそのまま使える。
pub trait ErrorWriter: Send + Sync {
    fn write(&self, err: &AuthError) -> Response;
}

impl<F> ErrorWriter for F
where
    F: Fn(&AuthError) -> Response + Send + Sync,
{
    fn write(&self, err: &AuthError) -> Response {
        self(err)
    }
}

/// PlainTextErrorWriter はエラーメッセージを 401 のプレーンテキストで返すデフォルト実装。
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextErrorWriter;

impl ErrorWriter for PlainTextErrorWriter {
    fn write(&self, err: &AuthError) -> Response {
        (StatusCode::UNAUTHORIZED, err.to_string()).into_response()
    }
}

/// JsonErrorWriter は `{"error": コード, "message": メッセージ}` を返す。
///
/// 内部エラーと鍵配布エンドポイントの障害は 500、それ以外は 401。
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorWriter;

impl ErrorWriter for JsonErrorWriter {
    fn write(&self, err: &AuthError) -> Response {
        let key_source_failure =
            matches!(err, AuthError::Validation(e) if e.is_key_source_failure());
        let (status, message) = if err.is_internal() {
            (StatusCode::INTERNAL_SERVER_ERROR, "認証処理で内部エラーが発生しました")
        } else if key_source_failure {
            (StatusCode::INTERNAL_SERVER_ERROR, "認証サービスへの接続に失敗しました")
        } else {
            (StatusCode::UNAUTHORIZED, message_for(err))
        };

        let body = json!({
            "error": err.code(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

fn message_for(err: &AuthError) -> &'static str {
    match err {
        AuthError::Validation(ValidationError::TokenExpired) => "トークンの有効期限が切れています",
        AuthError::Validation(ValidationError::InvalidAudience { .. }) => {
            "トークンの対象者が一致しません"
        }
        AuthError::Validation(ValidationError::IssuerMismatch { .. }) => {
            "トークンの発行者が一致しません"
        }
        _ => match err.code() {
            "AUTH_UNAUTHENTICATED" => "認証が必要です",
            "AUTH_INVALID_ISSUER" => "トークンの発行者が一致しません",
            _ => "トークンが無効です",
        },
    }
}

/// AuthLayerState はミドルウェアが使用する共有状態。
#[derive(Clone)]
pub struct AuthLayerState {
    authenticator: Arc<dyn RequestAuthenticator>,
    error_writer: Arc<dyn ErrorWriter>,
}

impl AuthLayerState {
    /// PlainTextErrorWriter を使う状態を生成する。
    pub fn new(authenticator: Arc<dyn RequestAuthenticator>) -> Self {
        Self {
            authenticator,
            error_writer: Arc::new(PlainTextErrorWriter),
        }
    }

    pub fn with_error_writer(mut self, error_writer: Arc<dyn ErrorWriter>) -> Self {
        self.error_writer = error_writer;
        self
    }
}

/// auth_middleware は Bearer トークンを検証するミドルウェア。
/// 検証成功時は ClaimsView をリクエストエクステンションに格納し、失敗時は ErrorWriter の応答を返す。
pub async fn auth_middleware(
    State(state): State<AuthLayerState>,
    mut req: Request,
    next: Next,
) -> Response {
    match state.authenticator.authenticate(req.headers()).await {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            if e.is_internal() {
                error!(error = %e, "リクエスト認証で内部エラーが発生しました");
            }
            state.error_writer.write(&e)
        }
    }
}

/// リクエストエクステンションから ClaimsView を取得する。
pub fn claims_from_request(req: &Request) -> Option<&ClaimsView> {
    req.extensions().get::<ClaimsView>()
}
