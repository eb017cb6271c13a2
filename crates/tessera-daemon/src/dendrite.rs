// crates/tessera-daemon/src/dendrite.rs
//
// Dendrite: outbound task sender. Posts a `miner/run_task` JSON-RPC
// envelope to the miner's endpoint and decodes its TaskResponse.

use async_trait::async_trait;

use tessera_core::error::TesseraError;
use tessera_core::messages::{TaskRequest, TaskResponse};
use tessera_core::traits::TaskDispatcher;
use tessera_core::types::Participant;
use tessera_rpc::{JsonRpcRequest, JsonRpcResponse};

/// HTTP implementation of [`TaskDispatcher`]. One attempt per call; the
/// coordinator owns retries and the per-call timeout.
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskDispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        miner: &Participant,
        request: TaskRequest,
    ) -> Result<TaskResponse, TesseraError> {
        if miner.endpoint.is_empty() {
            return Err(TesseraError::NotFound(format!(
                "miner {} has no endpoint",
                miner.uid
            )));
        }

        let envelope = JsonRpcRequest {
            method: "miner/run_task".to_string(),
            params: serde_json::to_value(&request)?,
        };

        let resp = self
            .client
            .post(&miner.endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| transport_error(miner, e))?;

        if !resp.status().is_success() {
            return Err(TesseraError::Network(format!(
                "miner {} returned status {}",
                miner.uid,
                resp.status()
            )));
        }

        let body: JsonRpcResponse = resp.json().await.map_err(|e| transport_error(miner, e))?;
        decode_task_response(miner, &request, body)
    }
}

fn transport_error(miner: &Participant, e: reqwest::Error) -> TesseraError {
    if e.is_timeout() {
        TesseraError::Timeout(format!("miner {}: {}", miner.uid, e))
    } else {
        TesseraError::Network(format!("miner {}: {}", miner.uid, e))
    }
}

/// Unwrap the envelope and check that the answer belongs to `request`.
fn decode_task_response(
    miner: &Participant,
    request: &TaskRequest,
    body: JsonRpcResponse,
) -> Result<TaskResponse, TesseraError> {
    if !body.success {
        return Err(TesseraError::Network(format!(
            "miner {} failed task: {}",
            miner.uid,
            body.error.unwrap_or_default()
        )));
    }
    let result = body.result.ok_or_else(|| {
        TesseraError::Serialization(format!("miner {} sent an empty result", miner.uid))
    })?;
    let response: TaskResponse = serde_json::from_value(result)?;

    if response.task_id != request.task_id
        || response.slot_id != request.slot_id
        || response.miner_id != miner.uid
    {
        return Err(TesseraError::Network(format!(
            "miner {} answered a different task",
            miner.uid
        )));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::types::Role;

    fn miner() -> Participant {
        Participant::new(7, Role::Miner, [7; 32], 0, 0.5, 0).with_endpoint("http://m:1")
    }

    fn ok_body(response: &TaskResponse) -> JsonRpcResponse {
        JsonRpcResponse {
            success: true,
            result: Some(serde_json::to_value(response).unwrap()),
            error: None,
        }
    }

    #[test]
    fn test_decode_matching_response() {
        let request = TaskRequest::new(4, 7, serde_json::json!({"q": 1}));
        let response = TaskResponse {
            task_id: request.task_id,
            slot_id: 4,
            miner_id: 7,
            result: serde_json::json!({"a": 2}),
        };
        let decoded = decode_task_response(&miner(), &request, ok_body(&response)).unwrap();
        assert_eq!(decoded.result["a"], 2);
    }

    #[test]
    fn test_decode_rejects_foreign_task() {
        let request = TaskRequest::new(4, 7, serde_json::Value::Null);
        let other = TaskRequest::new(4, 7, serde_json::Value::Null);
        let response = TaskResponse {
            task_id: other.task_id,
            slot_id: 4,
            miner_id: 7,
            result: serde_json::Value::Null,
        };
        assert!(decode_task_response(&miner(), &request, ok_body(&response)).is_err());
    }

    #[test]
    fn test_decode_failure_envelope() {
        let request = TaskRequest::new(4, 7, serde_json::Value::Null);
        let body = JsonRpcResponse {
            success: false,
            result: None,
            error: Some("busy".to_string()),
        };
        let err = decode_task_response(&miner(), &request, body).unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let dispatcher = HttpDispatcher::new(reqwest::Client::new());
        let miner = Participant::new(8, Role::Miner, [8; 32], 0, 0.5, 0);
        let request = TaskRequest::new(1, 8, serde_json::Value::Null);
        assert!(matches!(
            dispatcher.dispatch(&miner, request).await,
            Err(TesseraError::NotFound(_))
        ));
    }
}
