//! realmauth-test-helper: 認証ライブラリのテスト用ユーティリティ。
//!
//! 固定の RSA 鍵で JWT を署名し、対応する JWKS ドキュメントを生成する。

pub mod jwt;

pub use jwt::{jwks, unix_now, TestSigningKey, TokenBuilder};
