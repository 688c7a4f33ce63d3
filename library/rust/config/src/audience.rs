//! 期待するオーディエンス集合。

use serde::{Deserialize, Serialize};

/// AudienceSet はトークンの `aud` と突き合わせるオーディエンスの集合を表す。
///
/// 構築時の順序を保持し重複も許容するが、判定は集合として扱う。
/// 空文字列は構築時に取り除く。空の集合はオーディエンス検査を行わないことを意味する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AudienceSet {
    audiences: Vec<String>,
}

impl AudienceSet {
    /// 文字列の列から AudienceSet を生成する。
    pub fn new<I, S>(audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            audiences: audiences
                .into_iter()
                .map(Into::into)
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    /// 単一のオーディエンスから生成する。
    pub fn single(audience: &str) -> Self {
        Self::new([audience])
    }

    /// オーディエンスを含むかどうかを返す。
    pub fn contains(&self, audience: &str) -> bool {
        self.audiences.iter().any(|a| a == audience)
    }

    /// 与えられたオーディエンスのいずれかが集合に含まれるかを返す。
    pub fn intersects<'a, I>(&self, others: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        others.into_iter().any(|o| self.contains(o))
    }

    pub fn is_empty(&self) -> bool {
        self.audiences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.audiences.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.audiences.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.audiences
    }

    /// 2 つの集合を結合し、重複を除いた新しい集合を返す。
    ///
    /// 自身の要素が先、`other` の要素が後に並ぶ。
    #[must_use]
    pub fn merged(&self, other: &AudienceSet) -> AudienceSet {
        let mut audiences: Vec<String> = Vec::with_capacity(self.len() + other.len());
        for aud in self.iter().chain(other.iter()) {
            if !audiences.iter().any(|a| a == aud) {
                audiences.push(aud.to_string());
            }
        }
        AudienceSet { audiences }
    }
}

impl From<Vec<String>> for AudienceSet {
    fn from(audiences: Vec<String>) -> Self {
        Self::new(audiences)
    }
}

impl From<AudienceSet> for Vec<String> {
    fn from(set: AudienceSet) -> Self {
        set.audiences
    }
}

impl<S: Into<String>> FromIterator<S> for AudienceSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}
