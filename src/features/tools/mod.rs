//! # Feature: Tools
//!
//! Provider-agnostic tool definitions and the executor that dispatches
//! them. Tool execution never raises: every outcome, including failure, is
//! a JSON string fed back to the model so it can recover.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.9.0
//! - **Toggleable**: true (ENABLE_WEB_SEARCH, ENABLE_MEMORY)
//!
//! ## Changelog
//! - 1.1.0: Typed argument records with unknown-tool fallback
//! - 1.0.0: web_search, remember_user, remember_channel

use log::{info, warn};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::features::memory::MemoryStore;
use crate::providers::{ToolCall, ToolDef};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_SEARCH_RESULTS: usize = 5;

pub fn web_search_def() -> ToolDef {
    ToolDef {
        name: "web_search",
        description: "Search the web for current information. Use when the conversation \
                      requires recent or factual information you're unsure about.",
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query."}
            },
            "required": ["query"]
        }),
    }
}

pub fn remember_user_def() -> ToolDef {
    ToolDef {
        name: "remember_user",
        description: "Save a fact about a user for future conversations. Use when someone \
                      shares something memorable about themselves.",
        parameters: json!({
            "type": "object",
            "properties": {
                "user_name": {
                    "type": "string",
                    "description": "The display name of the user (as shown in the conversation)."
                },
                "fact": {"type": "string", "description": "The fact to remember about this user."}
            },
            "required": ["user_name", "fact"]
        }),
    }
}

pub fn remember_channel_def() -> ToolDef {
    ToolDef {
        name: "remember_channel",
        description: "Save a memory about this channel for future reference. Use for \
                      channel-specific context like ongoing topics or running jokes.",
        parameters: json!({
            "type": "object",
            "properties": {
                "memory": {"type": "string", "description": "The thing to remember about this channel."}
            },
            "required": ["memory"]
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct WebSearchArgs {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Default, Deserialize)]
struct RememberUserArgs {
    #[serde(default)]
    user_name: String,
    #[serde(default)]
    fact: String,
}

#[derive(Debug, Default, Deserialize)]
struct RememberChannelArgs {
    #[serde(default)]
    memory: String,
}

/// A tool call decoded into typed arguments, with a fallback for tool names
/// this build does not know about
#[derive(Debug)]
pub enum ToolInvocation {
    WebSearch { query: String },
    RememberUser { user_name: String, fact: String },
    RememberChannel { memory: String },
    Unknown { name: String },
}

impl ToolInvocation {
    pub fn parse(name: &str, arguments: &Value) -> Self {
        match name {
            "web_search" => {
                let args: WebSearchArgs =
                    serde_json::from_value(arguments.clone()).unwrap_or_default();
                ToolInvocation::WebSearch { query: args.query }
            }
            "remember_user" => {
                let args: RememberUserArgs =
                    serde_json::from_value(arguments.clone()).unwrap_or_default();
                ToolInvocation::RememberUser {
                    user_name: args.user_name,
                    fact: args.fact,
                }
            }
            "remember_channel" => {
                let args: RememberChannelArgs =
                    serde_json::from_value(arguments.clone()).unwrap_or_default();
                ToolInvocation::RememberChannel { memory: args.memory }
            }
            other => ToolInvocation::Unknown {
                name: other.to_string(),
            },
        }
    }
}

/// Executes tool calls for one generation. Every path returns a JSON string.
pub struct ToolExecutor {
    http: reqwest::Client,
    memory: Option<Arc<MemoryStore>>,
    channel_id: u64,
    /// Participant user id -> display name
    participants: HashMap<u64, String>,
}

impl ToolExecutor {
    pub fn new(
        memory: Option<Arc<MemoryStore>>,
        channel_id: u64,
        participants: HashMap<u64, String>,
    ) -> Self {
        ToolExecutor {
            http: reqwest::Client::new(),
            memory,
            channel_id,
            participants,
        }
    }

    pub async fn execute(&self, call: &ToolCall) -> String {
        let result = match ToolInvocation::parse(&call.name, &call.arguments) {
            ToolInvocation::WebSearch { query } => self.web_search(&query).await,
            ToolInvocation::RememberUser { user_name, fact } => {
                self.remember_user(&user_name, &fact)
            }
            ToolInvocation::RememberChannel { memory } => self.remember_channel(&memory),
            ToolInvocation::Unknown { name } => {
                warn!("Model requested unknown tool '{name}'");
                json!({"error": format!("Unknown tool: {name}")})
            }
        };
        result.to_string()
    }

    async fn web_search(&self, query: &str) -> Value {
        if query.is_empty() {
            return json!({"error": "Empty search query."});
        }

        info!("Tool web_search: '{query}'");
        let response = match self
            .http
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(r) => r,
            Err(e) => return json!({"error": format!("Search failed: {e}")}),
        };
        let html = match response.text().await {
            Ok(body) => body,
            Err(e) => return json!({"error": format!("Search failed: {e}")}),
        };

        let results = parse_search_results(&html);
        if results.is_empty() {
            json!({"results": [], "note": "No results found."})
        } else {
            json!({"results": results})
        }
    }

    fn remember_user(&self, user_name: &str, fact: &str) -> Value {
        let Some(memory) = &self.memory else {
            return json!({"error": "Memory is not enabled."});
        };
        if user_name.is_empty() || fact.is_empty() {
            return json!({"error": "Both user_name and fact are required."});
        }

        // Reverse-lookup the user id from the display name
        let user_id = self
            .participants
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(user_name))
            .map(|(id, _)| *id);

        let Some(user_id) = user_id else {
            return json!({
                "error": format!("Could not find user '{user_name}' in this conversation.")
            });
        };

        match memory.add_user_fact(user_id, user_name, fact) {
            Ok(()) => json!({
                "status": "ok",
                "message": format!("Remembered about {user_name}: {fact}")
            }),
            Err(e) => json!({"error": e.to_string()}),
        }
    }

    fn remember_channel(&self, text: &str) -> Value {
        let Some(memory) = &self.memory else {
            return json!({"error": "Memory is not enabled."});
        };
        if text.is_empty() {
            return json!({"error": "Memory text is required."});
        }

        match memory.add_channel_fact(self.channel_id, text) {
            Ok(()) => json!({
                "status": "ok",
                "message": format!("Remembered for this channel: {text}")
            }),
            Err(e) => json!({"error": e.to_string()}),
        }
    }
}

/// Extract (title, body, url) triples from a DuckDuckGo HTML results page
fn parse_search_results(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    document
        .select(&result_sel)
        .take(MAX_SEARCH_RESULTS)
        .map(|result| {
            let title = result
                .select(&title_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let url = result
                .select(&title_sel)
                .next()
                .and_then(|e| e.value().attr("href"))
                .unwrap_or_default()
                .to_string();
            let body = result
                .select(&snippet_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            json!({"title": title, "body": body, "url": url})
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_memory() -> (Arc<MemoryStore>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("mimic_tools_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        (Arc::new(MemoryStore::new(&dir).unwrap()), dir)
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_parse_typed_arguments() {
        let inv = ToolInvocation::parse("web_search", &json!({"query": "rust"}));
        assert!(matches!(inv, ToolInvocation::WebSearch { query } if query == "rust"));

        let inv = ToolInvocation::parse("bogus", &json!({}));
        assert!(matches!(inv, ToolInvocation::Unknown { name } if name == "bogus"));
    }

    #[test]
    fn test_parse_missing_fields_default_empty() {
        let inv = ToolInvocation::parse("remember_user", &json!({"user_name": "sam"}));
        match inv {
            ToolInvocation::RememberUser { user_name, fact } => {
                assert_eq!(user_name, "sam");
                assert!(fact.is_empty());
            }
            other => panic!("unexpected invocation: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_error_payload() {
        let executor = ToolExecutor::new(None, 1, HashMap::new());
        let result = executor.execute(&call("bogus", json!({}))).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("bogus"));
    }

    #[tokio::test]
    async fn test_remember_user_without_memory_errors() {
        let executor = ToolExecutor::new(None, 1, HashMap::new());
        let result = executor
            .execute(&call(
                "remember_user",
                json!({"user_name": "sam", "fact": "x"}),
            ))
            .await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["error"], "Memory is not enabled.");
    }

    #[tokio::test]
    async fn test_remember_user_reverse_lookup() {
        let (memory, dir) = temp_memory();
        let participants = HashMap::from([(7_u64, "Sam".to_string())]);
        let executor = ToolExecutor::new(Some(memory.clone()), 1, participants);

        let result = executor
            .execute(&call(
                "remember_user",
                json!({"user_name": "sam", "fact": "races karts"}),
            ))
            .await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(memory.get_user_facts(7).1, vec!["races karts"]);

        let result = executor
            .execute(&call(
                "remember_user",
                json!({"user_name": "nobody", "fact": "x"}),
            ))
            .await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("nobody"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_remember_channel_writes_fact() {
        let (memory, dir) = temp_memory();
        let executor = ToolExecutor::new(Some(memory.clone()), 42, HashMap::new());
        let result = executor
            .execute(&call("remember_channel", json!({"memory": "pizza friday"})))
            .await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(memory.get_channel_facts(42), vec!["pizza friday"]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_empty_query_rejected_without_network() {
        let executor = ToolExecutor::new(None, 1, HashMap::new());
        let result = executor.execute(&call("web_search", json!({"query": ""}))).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["error"], "Empty search query.");
    }

    #[test]
    fn test_parse_search_results_from_html() {
        let html = r#"
            <div class="result">
              <a class="result__a" href="https://example.com">Example Title</a>
              <a class="result__snippet">A snippet of text.</a>
            </div>
        "#;
        let results = parse_search_results(html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["title"], "Example Title");
        assert_eq!(results[0]["url"], "https://example.com");
        assert_eq!(results[0]["body"], "A snippet of text.");
    }
}
