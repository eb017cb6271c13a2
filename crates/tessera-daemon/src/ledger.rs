// crates/tessera-daemon/src/ledger.rs
//
// Destinations for committed slots: a remote ledger (`ledger/commit`) or
// the log.

use async_trait::async_trait;

use tessera_core::error::TesseraError;
use tessera_core::traits::LedgerSink;
use tessera_core::types::SlotCommit;
use tessera_rpc::{JsonRpcRequest, JsonRpcResponse};

/// Writes a one-line summary of each commit to the log.
#[derive(Debug, Default)]
pub struct LogLedgerSink;

#[async_trait]
impl LedgerSink for LogLedgerSink {
    async fn commit(&self, commit: &SlotCommit) -> Result<(), TesseraError> {
        let paid: u64 = commit.incentives.iter().map(|i| i.absolute_amount).sum();
        tracing::info!(
            "Ledger: slot {} (params v{}) adjusted={} incentives={} paid={} penalties={}",
            commit.slot_id,
            commit.params_version,
            commit.adjusted.len(),
            commit.incentives.len(),
            paid,
            commit.penalties.len()
        );
        for penalty in &commit.penalties {
            tracing::warn!(
                "Ledger: slot {} validator {} penalized (severity {:.2}, slash {}, jailed {})",
                commit.slot_id,
                penalty.participant_id,
                penalty.severity,
                penalty.slash_amount,
                penalty.jailed
            );
        }
        Ok(())
    }
}

/// Posts each commit to a remote ledger service.
pub struct HttpLedgerSink {
    url: String,
    client: reqwest::Client,
}

impl HttpLedgerSink {
    /// Creates a ledger client posting to `url`.
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl LedgerSink for HttpLedgerSink {
    async fn commit(&self, commit: &SlotCommit) -> Result<(), TesseraError> {
        let envelope = JsonRpcRequest {
            method: "ledger/commit".to_string(),
            params: serde_json::json!({ "commit": commit }),
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| TesseraError::Network(format!("ledger {}: {}", self.url, e)))?;
        if !resp.status().is_success() {
            return Err(TesseraError::Network(format!(
                "ledger {} returned status {}",
                self.url,
                resp.status()
            )));
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| TesseraError::Network(format!("ledger {}: {}", self.url, e)))?;
        if !body.success {
            return Err(TesseraError::Network(format!(
                "ledger rejected slot {}: {}",
                commit.slot_id,
                body.error.unwrap_or_default()
            )));
        }

        tracing::debug!("Ledger accepted slot {}", commit.slot_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_log_sink_accepts_empty_commit() {
        let commit = SlotCommit {
            slot_id: 1,
            params_version: 1,
            adjusted: Vec::new(),
            absent_miners: Vec::new(),
            performances: Vec::new(),
            weights: Vec::new(),
            incentives: Vec::new(),
            trust_deltas: Vec::new(),
            penalties: Vec::new(),
            committed_at: Utc::now(),
        };
        assert!(LogLedgerSink.commit(&commit).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_sink_unreachable_is_network_error() {
        let sink = HttpLedgerSink::new("http://127.0.0.1:9", reqwest::Client::new());
        let commit = SlotCommit {
            slot_id: 2,
            params_version: 1,
            adjusted: Vec::new(),
            absent_miners: Vec::new(),
            performances: Vec::new(),
            weights: Vec::new(),
            incentives: Vec::new(),
            trust_deltas: Vec::new(),
            penalties: Vec::new(),
            committed_at: Utc::now(),
        };
        assert!(matches!(
            sink.commit(&commit).await,
            Err(TesseraError::Network(_))
        ));
    }
}
