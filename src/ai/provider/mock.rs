//! Test provider that replays scripted responses and records every request.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};
use crate::types::Result;

type Handler = Box<dyn Fn(&LlmRequest) -> Result<String> + Send + Sync>;

pub struct MockProvider {
    queue: Mutex<VecDeque<Result<String>>>,
    handler: Option<Handler>,
    requests: Mutex<Vec<LlmRequest>>,
    calls: AtomicU32,
}

impl MockProvider {
    /// Replay `responses` in order; extra calls fail
    pub fn scripted(responses: Vec<Result<String>>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
            handler: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Answer every call with `handler`, after any queued responses run out
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            handler: Some(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose system prompt contains `marker`
    pub fn requests_matching(&self, marker: &str) -> Vec<LlmRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.system_prompt.contains(marker))
            .collect()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let queued = self.queue.lock().unwrap().pop_front();
        let text = match (queued, &self.handler) {
            (Some(result), _) => result?,
            (None, Some(handler)) => handler(request)?,
            (None, None) => {
                return Err(crate::types::NovelError::LlmApi(
                    "mock provider exhausted".to_string(),
                ));
            }
        };

        let mut response = LlmResponse::text_only(text);
        response.usage = TokenUsage::new(10, 20, 0);
        response.metadata.provider = "mock".to_string();
        Ok(response)
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
