use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Map, Value};

const PRIMARY_PEM: &str = include_str!("keys/primary.pem");
const SECONDARY_PEM: &str = include_str!("keys/secondary.pem");

/// テスト用の RSA 署名鍵。
///
/// 鍵は `keys/` に置いた固定の 2048 ビット鍵を使う。
#[derive(Clone)]
pub struct TestSigningKey {
    kid: String,
    encoding_key: EncodingKey,
    n: String,
    e: String,
}

impl TestSigningKey {
    /// 1 つ目の固定鍵を指定 kid で返す。
    pub fn primary(kid: &str) -> Self {
        Self::from_pem(kid, PRIMARY_PEM)
    }

    /// 2 つ目の固定鍵を指定 kid で返す。署名不一致のテストに使う。
    pub fn secondary(kid: &str) -> Self {
        Self::from_pem(kid, SECONDARY_PEM)
    }

    fn from_pem(kid: &str, pem: &str) -> Self {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem).expect("test RSA key");
        let public_key = private_key.to_public_key();
        Self {
            kid: kid.to_string(),
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test RSA key"),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// JWKS に載せる公開鍵 JWK を返す。
    pub fn jwk(&self) -> Value {
        json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.n,
            "e": self.e,
        })
    }

    /// kid 付きの RS256 ヘッダーでクレームを署名する。
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// 任意のヘッダーでクレームを署名する。
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        encode(header, claims, &self.encoding_key).expect("sign test token")
    }
}

/// 鍵の一覧から JWKS ドキュメントを組み立てる。
pub fn jwks(keys: &[&TestSigningKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// 現在時刻の Unix 秒。
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// テスト用 JWT クレームのビルダー。
///
/// 既定では `iat` を現在時刻、`exp` を 15 分後に設定する。
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    claims: Map<String, Value>,
}

impl Default for TokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBuilder {
    pub fn new() -> Self {
        let now = unix_now();
        let mut claims = Map::new();
        claims.insert("sub".into(), json!("service-account-build"));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + 900));
        Self { claims }
    }

    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    /// `aud` を設定する。文字列・配列・その他の型をそのまま入れられる。
    pub fn audience(self, audience: Value) -> Self {
        self.claim("aud", audience)
    }

    pub fn scope(self, scope: &str) -> Self {
        self.claim("scope", json!(scope))
    }

    /// `authorization.permissions` を設定する。
    pub fn permissions(self, permissions: Value) -> Self {
        self.claim("authorization", json!({ "permissions": permissions }))
    }

    /// 有効期限を現在から `secs` 秒後（負なら過去）に設定する。
    pub fn expires_in(self, secs: i64) -> Self {
        self.claim("exp", json!(unix_now() + secs))
    }

    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn test_signed_token_verifies_with_jwk_components() {
        let key = TestSigningKey::primary("kid-1");
        let token = key.sign(&TokenBuilder::new().issuer("iss").build());

        let jwk = key.jwk();
        let decoding_key = DecodingKey::from_rsa_components(
            jwk["n"].as_str().unwrap(),
            jwk["e"].as_str().unwrap(),
        )
        .unwrap();
        let data = decode::<Value>(&token, &decoding_key, &Validation::new(Algorithm::RS256)).unwrap();
        assert_eq!(data.claims["iss"], "iss");
        assert_eq!(
            jsonwebtoken::decode_header(&token).unwrap().kid.as_deref(),
            Some("kid-1")
        );
    }

    #[test]
    fn test_primary_and_secondary_differ() {
        let a = TestSigningKey::primary("a").jwk();
        let b = TestSigningKey::secondary("b").jwk();
        assert_ne!(a["n"], b["n"]);
    }

    #[test]
    fn test_builder_overrides() {
        let claims = TokenBuilder::new()
            .audience(json!(["a", "b"]))
            .without("sub")
            .build();
        assert_eq!(claims["aud"], json!(["a", "b"]));
        assert!(claims.get("sub").is_none());
    }
}
