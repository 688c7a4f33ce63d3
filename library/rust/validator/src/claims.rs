//! 検証済みクレームのビューと、UMA 権限・スコープの抽出。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{ClaimError, ValidationError};

/// UmaPermission は `authorization.permissions` の 1 エントリ。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UmaPermission {
    #[serde(default)]
    pub scopes: Vec<String>,

    /// リソースに紐づく任意のクレーム。
    #[serde(default)]
    pub claims: Value,

    #[serde(rename = "rsid", default)]
    pub resource_id: String,

    #[serde(rename = "rsname", default)]
    pub resource_name: String,
}

/// `aud` クレームを文字列のリストに正規化する。
///
/// 未設定は空リスト、文字列は 1 要素のリスト。それ以外の型は内部エラーとする。
pub(crate) fn normalize_audience(claims: &Map<String, Value>) -> Result<Vec<String>, ValidationError> {
    match claims.get("aud") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(aud)) => Ok(vec![aud.clone()]),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    ValidationError::Internal(format!("unexpected aud element type: {v}"))
                })
            })
            .collect(),
        Some(other) => Err(ValidationError::Internal(format!(
            "unexpected aud claim type: {other}"
        ))),
    }
}

/// ClaimsView は検証済みトークンのクレームを保持し、スコープ・権限の照会を提供する。
///
/// スコープ集合は最初の照会時に一度だけ構築する。
#[derive(Debug, Clone)]
pub struct ClaimsView {
    payload: Map<String, Value>,
    scopes: OnceLock<HashSet<String>>,
}

impl ClaimsView {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            payload,
            scopes: OnceLock::new(),
        }
    }

    /// すべてのクレームを返す。
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.payload.get("iss").and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.payload.get("sub").and_then(Value::as_str)
    }

    /// 正規化したオーディエンス。型が不正な場合は空を返す。
    pub fn audience(&self) -> Vec<String> {
        normalize_audience(&self.payload).unwrap_or_default()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("iat")
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("exp")
    }

    fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        let value = self.payload.get(name)?;
        let secs = value
            .as_i64()
            // 小数秒は切り捨てる
            .or_else(|| value.as_f64().map(|f| f.trunc() as i64))?;
        DateTime::from_timestamp(secs, 0)
    }

    /// `authorization.permissions` を返す。存在しなければ MissingClaim。
    pub fn permissions(&self) -> Result<Vec<UmaPermission>, ClaimError> {
        let raw = self
            .payload
            .get("authorization")
            .and_then(|a| a.get("permissions"))
            .filter(|p| !p.is_null())
            .ok_or_else(|| ClaimError::MissingClaim("authorization.permissions".to_string()))?;
        serde_json::from_value(raw.clone()).map_err(|e| ClaimError::Malformed(e.to_string()))
    }

    /// 権限一覧を先頭から走査し、リソース名が一致する最初のエントリを返す。
    fn find_permission(&self, resource_name: &str) -> Result<UmaPermission, ClaimError> {
        let permissions = match self.permissions() {
            Ok(permissions) => permissions,
            Err(ClaimError::MissingClaim(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        permissions
            .into_iter()
            .find(|p| p.resource_name == resource_name)
            .ok_or_else(|| ClaimError::ResourceNotFound(resource_name.to_string()))
    }

    /// リソースに紐づくクレームを呼び出し側の型に変換して返す。
    ///
    /// 不透明な JSON をいったん値として取り出し、`T` としてデシリアライズし直す。
    pub fn claim<T: DeserializeOwned>(&self, resource_name: &str) -> Result<T, ClaimError> {
        let permission = self.find_permission(resource_name)?;
        serde_json::from_value(permission.claims).map_err(|e| ClaimError::Malformed(e.to_string()))
    }

    fn scope_set(&self) -> &HashSet<String> {
        self.scopes.get_or_init(|| {
            self.payload
                .get("scope")
                .and_then(Value::as_str)
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default()
        })
    }

    /// `scope` クレームに必要なスコープがすべて含まれるか検査する。
    ///
    /// 最初に見つからなかったスコープ名をエラーに含める。
    pub fn validate_scopes(&self, required: &[&str]) -> Result<(), ClaimError> {
        if required.is_empty() {
            return Ok(());
        }
        if !self.payload.contains_key("scope") {
            return Err(ClaimError::MissingClaim("scope".to_string()));
        }
        let scopes = self.scope_set();
        match required.iter().find(|s| !scopes.contains(**s)) {
            Some(missing) => Err(ClaimError::MissingScope((*missing).to_string())),
            None => Ok(()),
        }
    }

    /// 指定リソースの権限エントリに必要なスコープがすべて含まれるか検査する。
    pub fn validate_permission_scopes(
        &self,
        resource_name: &str,
        required: &[&str],
    ) -> Result<(), ClaimError> {
        let permission = self.find_permission(resource_name)?;
        if permission.scopes.is_empty() {
            return Err(ClaimError::NoPermissionScopes(resource_name.to_string()));
        }
        match required
            .iter()
            .find(|s| !permission.scopes.iter().any(|p| p == **s))
        {
            Some(missing) => Err(ClaimError::MissingPermissionScope {
                resource: resource_name.to_string(),
                scope: (*missing).to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view(claims: Value) -> ClaimsView {
        match claims {
            Value::Object(map) => ClaimsView::new(map),
            _ => panic!("claims must be an object"),
        }
    }

    fn with_permissions(permissions: Value) -> ClaimsView {
        view(json!({ "authorization": { "permissions": permissions } }))
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct BuildClaim {
        build_id: String,
    }

    // --- オーディエンス テスト ---

    #[test]
    fn test_normalize_audience() {
        let cases = [
            (json!({}), vec![]),
            (json!({"aud": null}), vec![]),
            (json!({"aud": "a"}), vec!["a".to_string()]),
            (json!({"aud": ["a", "b"]}), vec!["a".to_string(), "b".to_string()]),
        ];
        for (claims, expected) in cases {
            let map = claims.as_object().unwrap().clone();
            assert_eq!(normalize_audience(&map).unwrap(), expected);
        }
    }

    #[test]
    fn test_normalize_audience_rejects_other_types() {
        for claims in [json!({"aud": 42}), json!({"aud": ["a", 1]}), json!({"aud": {"x": 1}})] {
            let map = claims.as_object().unwrap().clone();
            assert!(normalize_audience(&map).unwrap_err().is_internal());
        }
    }

    // --- 基本クレーム テスト ---

    #[test]
    fn test_standard_claims() {
        let v = view(json!({
            "iss": "https://issuer",
            "sub": "svc",
            "aud": "api",
            "iat": 1_700_000_000,
            "exp": 1_700_000_900.5,
        }));
        assert_eq!(v.issuer(), Some("https://issuer"));
        assert_eq!(v.subject(), Some("svc"));
        assert_eq!(v.audience(), vec!["api".to_string()]);
        assert_eq!(v.issued_at().unwrap().timestamp(), 1_700_000_000);
        assert_eq!(v.expires_at().unwrap().timestamp(), 1_700_000_900);
        assert_eq!(v.payload().len(), 5);
    }

    // --- 権限 テスト ---

    #[test]
    fn test_permissions_missing() {
        let v = view(json!({"iss": "x"}));
        assert_eq!(
            v.permissions(),
            Err(ClaimError::MissingClaim("authorization.permissions".into()))
        );
    }

    #[test]
    fn test_permissions_parsed() {
        let v = with_permissions(json!([
            {"rsid": "1", "rsname": "builds", "scopes": ["read"], "claims": {"build_id": "X"}},
        ]));
        let permissions = v.permissions().unwrap();
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].resource_id, "1");
        assert_eq!(permissions[0].resource_name, "builds");
        assert_eq!(permissions[0].scopes, vec!["read".to_string()]);
    }

    #[test]
    fn test_claim_into_caller_type() {
        let v = with_permissions(json!([
            {"rsname": "apps", "claims": {"build_id": "other"}},
            {"rsname": "builds", "claims": {"build_id": "X"}},
        ]));
        let claim: BuildClaim = v.claim("builds").unwrap();
        assert_eq!(claim, BuildClaim { build_id: "X".into() });
    }

    #[test]
    fn test_claim_not_found_names_resource() {
        let v = with_permissions(json!([{"rsname": "builds", "claims": {"build_id": "X"}}]));
        let err = v.claim::<BuildClaim>("missing").unwrap_err();
        assert_eq!(err, ClaimError::ResourceNotFound("missing".into()));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_claim_shape_mismatch() {
        let v = with_permissions(json!([{"rsname": "builds", "claims": {"other": 1}}]));
        assert!(matches!(
            v.claim::<BuildClaim>("builds"),
            Err(ClaimError::Malformed(_))
        ));
    }

    // --- スコープ テスト ---

    #[test]
    fn test_validate_scopes_ok() {
        let v = view(json!({"scope": "app:read build:write"}));
        assert!(v.validate_scopes(&["app:read", "build:write"]).is_ok());
        // 2 回目はメモ化された集合を使う
        assert!(v.validate_scopes(&["build:write"]).is_ok());
    }

    #[test]
    fn test_validate_scopes_names_first_missing() {
        let v = view(json!({"scope": "app:read"}));
        assert_eq!(
            v.validate_scopes(&["app:read", "build:write", "log:read"]),
            Err(ClaimError::MissingScope("build:write".into()))
        );
    }

    #[test]
    fn test_validate_scopes_without_scope_claim() {
        let v = view(json!({}));
        assert_eq!(
            v.validate_scopes(&["app:read"]),
            Err(ClaimError::MissingClaim("scope".into()))
        );
        assert!(v.validate_scopes(&[]).is_ok());
    }

    // --- 権限スコープ テスト ---

    #[test]
    fn test_validate_permission_scopes_scans_all_entries() {
        let v = with_permissions(json!([
            {"rsname": "apps", "scopes": ["read"]},
            {"rsname": "builds", "scopes": ["read", "write"]},
        ]));
        assert!(v.validate_permission_scopes("builds", &["read", "write"]).is_ok());
        assert!(v.validate_permission_scopes("apps", &["read"]).is_ok());
    }

    #[test]
    fn test_validate_permission_scopes_missing_scope() {
        let v = with_permissions(json!([{"rsname": "builds", "scopes": ["read"]}]));
        assert_eq!(
            v.validate_permission_scopes("builds", &["read", "write"]),
            Err(ClaimError::MissingPermissionScope {
                resource: "builds".into(),
                scope: "write".into(),
            })
        );
    }

    #[test]
    fn test_validate_permission_scopes_resource_not_found() {
        let v = with_permissions(json!([
            {"rsname": "apps", "scopes": ["read"]},
            {"rsname": "logs", "scopes": ["read"]},
        ]));
        assert_eq!(
            v.validate_permission_scopes("builds", &["read"]),
            Err(ClaimError::ResourceNotFound("builds".into()))
        );
    }

    #[test]
    fn test_validate_permission_scopes_without_permissions() {
        let v = view(json!({"scope": "read"}));
        assert_eq!(
            v.validate_permission_scopes("builds", &["read"]),
            Err(ClaimError::ResourceNotFound("builds".into()))
        );
    }

    #[test]
    fn test_validate_permission_scopes_empty_scopes() {
        let v = with_permissions(json!([{"rsname": "builds", "scopes": []}]));
        assert_eq!(
            v.validate_permission_scopes("builds", &["read"]),
            Err(ClaimError::NoPermissionScopes("builds".into()))
        );
    }
}
