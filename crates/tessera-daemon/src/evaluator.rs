// crates/tessera-daemon/src/evaluator.rs
//
// Task content and quality scoring.
//
// `NeutralEvaluator` hands out a bare slot/miner challenge and scores any
// well-formed answer as 1.0. `HttpEvaluator` keeps the same payloads but asks
// a remote scoring service (`evaluator/score`) for the quality score.

use async_trait::async_trait;
use serde::Deserialize;

use tessera_core::error::TesseraError;
use tessera_core::messages::{TaskRequest, TaskResponse};
use tessera_core::traits::TaskEvaluator;
use tessera_core::types::{SlotId, Uid};
use tessera_rpc::{JsonRpcRequest, JsonRpcResponse};

fn challenge(slot_id: SlotId, miner_id: Uid) -> serde_json::Value {
    serde_json::json!({
        "kind": "challenge",
        "slot_id": slot_id,
        "miner_id": miner_id,
    })
}

/// 1.0 for an answer addressed to the request with a non-null result, else 0.0.
fn shape_score(request: &TaskRequest, response: &TaskResponse) -> f64 {
    let addressed = response.task_id == request.task_id
        && response.slot_id == request.slot_id
        && response.miner_id == request.miner_id;
    if addressed && !response.result.is_null() {
        1.0
    } else {
        0.0
    }
}

/// Checks only the shape of the answer. Used when no evaluator URL is configured.
#[derive(Debug, Default)]
pub struct NeutralEvaluator;

#[async_trait]
impl TaskEvaluator for NeutralEvaluator {
    fn build_payload(&self, slot_id: SlotId, miner_id: Uid) -> serde_json::Value {
        challenge(slot_id, miner_id)
    }

    async fn score(
        &self,
        request: &TaskRequest,
        response: &TaskResponse,
    ) -> Result<f64, TesseraError> {
        Ok(shape_score(request, response))
    }
}

#[derive(Debug, Deserialize)]
struct ScoreResult {
    score: f64,
}

/// Delegates evaluation to an external HTTP service.
pub struct HttpEvaluator {
    url: String,
    client: reqwest::Client,
}

impl HttpEvaluator {
    /// Creates an evaluator posting to `url`.
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl TaskEvaluator for HttpEvaluator {
    fn build_payload(&self, slot_id: SlotId, miner_id: Uid) -> serde_json::Value {
        challenge(slot_id, miner_id)
    }

    async fn score(
        &self,
        request: &TaskRequest,
        response: &TaskResponse,
    ) -> Result<f64, TesseraError> {
        // Malformed answers never reach the scoring service.
        if shape_score(request, response) == 0.0 {
            return Ok(0.0);
        }

        let envelope = JsonRpcRequest {
            method: "evaluator/score".to_string(),
            params: serde_json::json!({ "request": request, "response": response }),
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| TesseraError::Network(format!("evaluator: {}", e)))?;
        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| TesseraError::Network(format!("evaluator: {}", e)))?;

        if !body.success {
            return Err(TesseraError::Network(format!(
                "evaluator rejected task {}: {}",
                request.task_id,
                body.error.unwrap_or_default()
            )));
        }
        let result: ScoreResult =
            serde_json::from_value(body.result.unwrap_or(serde_json::Value::Null))?;
        if !result.score.is_finite() || !(0.0..=1.0).contains(&result.score) {
            return Err(TesseraError::Serialization(format!(
                "evaluator score {} for task {} is outside [0, 1]",
                result.score, request.task_id
            )));
        }
        Ok(result.score)
    }
}
