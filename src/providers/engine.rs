//! Generation engine: builds the message sequence, drives the bounded
//! tool-use loop, and absorbs tool failures.
//!
//! Provider/transport errors propagate to the caller; tool execution
//! errors never do, they are folded back into the conversation as
//! `{"error": ...}` payloads so the model can recover.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.9.0

use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;
use uuid::Uuid;

use super::request::{ChatTurn, GenerationRequest, ATTACHMENT_NUDGE, SPONTANEOUS_NUDGE};
use super::{Provider, ToolDef};
use crate::features::memory::MemoryStore;
use crate::features::tools::{
    remember_channel_def, remember_user_def, web_search_def, ToolExecutor,
};

/// Upper bound on provider calls within one tool-use loop
pub const MAX_TOOL_ROUNDS: usize = 5;

/// Drives one provider through the request/response/tool-loop contract
pub struct GenerationEngine {
    provider: Arc<dyn Provider>,
    memory: Option<Arc<MemoryStore>>,
    web_search_enabled: bool,
}

impl GenerationEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        memory: Option<Arc<MemoryStore>>,
        web_search_enabled: bool,
    ) -> Self {
        GenerationEngine {
            provider,
            memory,
            web_search_enabled,
        }
    }

    /// Active tool set: configuration toggles filtered by provider-native
    /// capabilities
    pub(crate) fn active_tools(&self) -> Vec<ToolDef> {
        let mut tools = Vec::new();
        if self.web_search_enabled && !self.provider.has_native_web_search() {
            tools.push(web_search_def());
        }
        if self.memory.is_some() {
            tools.push(remember_user_def());
            tools.push(remember_channel_def());
        }
        tools
    }

    /// Generate a response for `request`.
    ///
    /// Returns trimmed text, possibly empty. Adapter errors propagate;
    /// the caller owns logging and user-visible failure handling.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let request_id = Uuid::new_v4();
        let mut turns = request.context.clone();

        if !request.prompt.is_empty() {
            turns.push(ChatTurn::user(request.prompt.clone()));
        } else if !request.attachments.is_empty() {
            turns.push(ChatTurn::user(ATTACHMENT_NUDGE));
        } else {
            turns.push(ChatTurn::user(SPONTANEOUS_NUDGE));
        }

        let tools = self.active_tools();
        debug!(
            "[{request_id}] provider={} turns={} attachments={} tools={}",
            self.provider.name(),
            turns.len(),
            request.attachments.len(),
            tools.len()
        );

        if tools.is_empty() {
            let text = self
                .provider
                .call_single(&request.system_prompt, &turns, &request.attachments)
                .await?;
            return Ok(text.trim().to_string());
        }

        let provider_tools = self.provider.format_tools(&tools);
        let executor = ToolExecutor::new(
            self.memory.clone(),
            request.channel_id,
            request.participants.clone(),
        );

        for round in 0..MAX_TOOL_ROUNDS {
            // Binary payloads go out once; later rounds must not resend them
            let attachments = if round == 0 {
                request.attachments.as_slice()
            } else {
                &[]
            };

            let (text, calls) = self
                .provider
                .call_with_tools(&request.system_prompt, &turns, &provider_tools, attachments)
                .await?;

            if calls.is_empty() {
                return Ok(text.unwrap_or_default().trim().to_string());
            }

            info!(
                "[{request_id}] round {}: executing {} tool call(s)",
                round + 1,
                calls.len()
            );
            // Sequential, in provider order: tool calls may have side
            // effects, so execution order must be deterministic
            for call in &calls {
                let result = executor.execute(call).await;
                self.provider.append_tool_result(&mut turns, call, &result);
            }
        }

        // Round budget exhausted: one last plain call, discarding whatever
        // tool state the exhausted rounds accumulated
        info!("[{request_id}] tool round budget exhausted; falling back to plain call");
        let text = self
            .provider
            .call_single(&request.system_prompt, &turns, &[])
            .await?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::request::{Attachment, ToolCall};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted provider: pops one (text, calls) response per tool round
    struct MockProvider {
        responses: Mutex<Vec<(Option<String>, Vec<ToolCall>)>>,
        single_calls: AtomicUsize,
        tool_calls_made: AtomicUsize,
        attachment_counts: Mutex<Vec<usize>>,
        native_search: bool,
    }

    impl MockProvider {
        fn new(responses: Vec<(Option<String>, Vec<ToolCall>)>) -> Self {
            MockProvider {
                responses: Mutex::new(responses),
                single_calls: AtomicUsize::new(0),
                tool_calls_made: AtomicUsize::new(0),
                attachment_counts: Mutex::new(Vec::new()),
                native_search: false,
            }
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn has_native_web_search(&self) -> bool {
            self.native_search
        }

        async fn call_single(
            &self,
            _system_prompt: &str,
            _turns: &[ChatTurn],
            _attachments: &[Attachment],
        ) -> Result<String> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            Ok("fallback text".to_string())
        }

        fn format_tools(&self, tools: &[ToolDef]) -> Value {
            json!(tools.iter().map(|t| t.name).collect::<Vec<_>>())
        }

        async fn call_with_tools(
            &self,
            _system_prompt: &str,
            _turns: &[ChatTurn],
            _provider_tools: &Value,
            attachments: &[Attachment],
        ) -> Result<(Option<String>, Vec<ToolCall>)> {
            self.tool_calls_made.fetch_add(1, Ordering::SeqCst);
            self.attachment_counts.lock().unwrap().push(attachments.len());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok((Some("done".to_string()), Vec::new()))
            } else {
                Ok(responses.remove(0))
            }
        }

        fn append_tool_result(&self, turns: &mut Vec<ChatTurn>, call: &ToolCall, result: &str) {
            turns.push(ChatTurn::blocks(
                "assistant",
                json!({"call": call.name}),
            ));
            turns.push(ChatTurn::blocks("user", json!({"result": result})));
        }
    }

    fn bogus_call() -> ToolCall {
        ToolCall {
            id: "call_x".to_string(),
            name: "bogus".to_string(),
            arguments: json!({}),
        }
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            system_prompt: "sys".to_string(),
            context: Vec::new(),
            attachments: Vec::new(),
            channel_id: 1,
            guild_id: 0,
            participants: HashMap::new(),
        }
    }

    fn temp_memory() -> (Arc<MemoryStore>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("mimic_engine_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        (Arc::new(MemoryStore::new(&dir).unwrap()), dir)
    }

    #[tokio::test]
    async fn test_no_tools_takes_single_shot_path() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let engine = GenerationEngine::new(provider.clone(), None, false);

        let text = engine.generate(&request("hi")).await.unwrap();
        assert_eq!(text, "fallback text");
        assert_eq!(provider.single_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.tool_calls_made.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tool_loop_stops_when_no_calls_returned() {
        let (memory, dir) = temp_memory();
        let provider = Arc::new(MockProvider::new(vec![
            (None, vec![bogus_call()]),
            (Some("  final answer  ".to_string()), vec![]),
        ]));
        let engine = GenerationEngine::new(provider.clone(), Some(memory), false);

        let text = engine.generate(&request("hi")).await.unwrap();
        assert_eq!(text, "final answer");
        assert_eq!(provider.tool_calls_made.load(Ordering::SeqCst), 2);
        assert_eq!(provider.single_calls.load(Ordering::SeqCst), 0);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_round_budget_exhaustion_falls_back_to_plain_call() {
        let (memory, dir) = temp_memory();
        // Every round returns another tool call; the loop must stop at 5
        // rounds and answer via one final no-tools call
        let responses = (0..10).map(|_| (None, vec![bogus_call()])).collect();
        let provider = Arc::new(MockProvider::new(responses));
        let engine = GenerationEngine::new(provider.clone(), Some(memory), false);

        let text = engine.generate(&request("hi")).await.unwrap();
        assert_eq!(text, "fallback text");
        assert_eq!(
            provider.tool_calls_made.load(Ordering::SeqCst),
            MAX_TOOL_ROUNDS
        );
        assert_eq!(provider.single_calls.load(Ordering::SeqCst), 1);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_attachments_only_sent_on_first_round() {
        let (memory, dir) = temp_memory();
        let provider = Arc::new(MockProvider::new(vec![
            (None, vec![bogus_call()]),
            (None, vec![bogus_call()]),
            (Some("ok".to_string()), vec![]),
        ]));
        let engine = GenerationEngine::new(provider.clone(), Some(memory), false);

        let mut req = request("");
        req.attachments.push(Attachment {
            filename: "pic.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![0xff],
        });
        engine.generate(&req).await.unwrap();

        let counts = provider.attachment_counts.lock().unwrap().clone();
        assert_eq!(counts, vec![1, 0, 0]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_native_search_filters_generic_tool() {
        let mut mock = MockProvider::new(vec![]);
        mock.native_search = true;
        let engine = GenerationEngine::new(Arc::new(mock), None, true);
        assert!(engine.active_tools().is_empty());

        let plain = MockProvider::new(vec![]);
        let engine = GenerationEngine::new(Arc::new(plain), None, true);
        let names: Vec<&str> = engine.active_tools().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["web_search"]);
    }

    #[tokio::test]
    async fn test_memory_enables_remember_tools() {
        let (memory, dir) = temp_memory();
        let engine =
            GenerationEngine::new(Arc::new(MockProvider::new(vec![])), Some(memory), false);
        let names: Vec<&str> = engine.active_tools().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["remember_user", "remember_channel"]);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
