use prometheus::{IntCounterVec, Opts, Registry};

/// 発行者を特定できなかった場合のラベル値。
pub const UNKNOWN_ISSUER: &str = "unknown";

/// ValidationMetrics は発行者ごとのトークン検証成功・失敗数を記録する。
///
/// カウンタは呼び出し側が用意した Registry に登録される。
pub struct ValidationMetrics {
    succeeded: IntCounterVec,
    failed: IntCounterVec,
}

impl ValidationMetrics {
    /// new はカウンタを生成して registry に登録する。同名のカウンタが登録済みならエラーを返す。
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let succeeded = IntCounterVec::new(
            Opts::new(
                "jwt_auth_validation_succeeded_total",
                "Total number of successfully validated tokens",
            ),
            &["issuer"],
        )?;
        let failed = IntCounterVec::new(
            Opts::new(
                "jwt_auth_validation_failed_total",
                "Total number of rejected tokens",
            ),
            &["issuer"],
        )?;

        registry.register(Box::new(succeeded.clone()))?;
        registry.register(Box::new(failed.clone()))?;

        Ok(Self { succeeded, failed })
    }

    pub fn record_success(&self, issuer: &str) {
        self.succeeded.with_label_values(&[label(issuer)]).inc();
    }

    pub fn record_failure(&self, issuer: &str) {
        self.failed.with_label_values(&[label(issuer)]).inc();
    }

    pub fn succeeded(&self, issuer: &str) -> u64 {
        self.succeeded.with_label_values(&[label(issuer)]).get()
    }

    pub fn failed(&self, issuer: &str) -> u64 {
        self.failed.with_label_values(&[label(issuer)]).get()
    }
}

fn label(issuer: &str) -> &str {
    if issuer.is_empty() {
        UNKNOWN_ISSUER
    } else {
        issuer
    }
}
