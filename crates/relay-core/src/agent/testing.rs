//! Scripted language model for tests

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::ai::error::{LlmError, LlmErrorKind};
use crate::ai::types::{AiToolCall, LlmRequest, LlmResponse};
use crate::ai::LanguageModel;

/// Answers from a fixed script and records every request.
/// An exhausted script answers with an empty final response.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    always_fail: bool,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedModel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a server error
    pub(crate) fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn then_tool_call(self, id: &str, name: &str, arguments: Value) -> Self {
        self.then(Ok(LlmResponse {
            tool_calls: vec![AiToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
            ..Default::default()
        }))
    }

    /// One response asking for several tools at once
    pub(crate) fn then_tool_calls(self, calls: &[(&str, &str, Value)]) -> Self {
        self.then(Ok(LlmResponse {
            tool_calls: calls
                .iter()
                .map(|(id, name, arguments)| AiToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.clone(),
                })
                .collect(),
            ..Default::default()
        }))
    }

    pub(crate) fn then_text(self, text: &str) -> Self {
        self.then(Ok(LlmResponse {
            text: Some(text.to_string()),
            ..Default::default()
        }))
    }

    pub(crate) fn then(self, response: Result<LlmResponse, LlmError>) -> Self {
        self.script.lock().push_back(response);
        self
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().push(request);
        if self.always_fail {
            return Err(LlmError::new(LlmErrorKind::ServerError, "503 Service Unavailable"));
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(LlmResponse::default()))
    }
}
