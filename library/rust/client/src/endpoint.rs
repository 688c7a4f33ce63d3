//! トークンエンドポイントへのフォーム POST。

use chrono::Utc;
use tracing::{debug, error};

use crate::error::ClientError;
use crate::token::{CachedToken, TokenResponse};

/// フォームをトークンエンドポイントへ POST し、レスポンスを CachedToken に変換する。
///
/// 同じキーを複数回含むフォーム（`permission`, `audience`）もそのまま送信する。
pub(crate) async fn request_token(
    http_client: &reqwest::Client,
    token_url: &str,
    form: &[(&str, String)],
) -> Result<CachedToken, ClientError> {
    let response = http_client
        .post(token_url)
        .form(form)
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, token_url = %token_url, "トークンエンドポイントへの HTTP リクエストに失敗しました");
            ClientError::Http(e)
        })?;

    let status = response.status();
    // 発行時刻はレスポンス受信時点とする
    let issued_at = Utc::now();
    let body = response.text().await?;

    if !status.is_success() {
        error!(
            status = %status,
            body = %body,
            token_url = %token_url,
            "トークン取得に失敗しました"
        );
        return Err(ClientError::TokenRetrieval { status, body });
    }

    let token_resp: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        error!(error = %e, "トークンレスポンスの解析に失敗しました");
        ClientError::InvalidTokenResponse(e.to_string())
    })?;

    if token_resp.access_token.is_empty() {
        return Err(ClientError::InvalidTokenResponse(
            "access_token が含まれていません".to_string(),
        ));
    }

    debug!(
        token_url = %token_url,
        expires_in = ?token_resp.expires_in,
        "トークンを取得しました"
    );

    Ok(CachedToken::from_response(token_resp, issued_at))
}
