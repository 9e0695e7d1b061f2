use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, BufReader};

use anyhow::Result;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::engine::config::NarratorConfig;
use crate::engine::error::LlmError;
use crate::model::message::{Message, NativeToolCall, Role};

/// One piece of narrator output as it arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum NarratorChunk {
    Text(String),
    ToolCall(NativeToolCall),
}

pub type NarratorStream = Box<dyn Iterator<Item = Result<NarratorChunk, LlmError>> + Send>;

#[derive(Debug, Clone, Default)]
pub struct NarratorRequest {
    pub messages: Vec<Message>,
    /// Tool declarations in OpenAI function format. Empty disables tools.
    pub tools: Vec<Value>,
}

/// The generative backend. Implementations yield text and native tool
/// calls in arrival order; the stream ends when the reply is complete.
pub trait Narrator: Send + Sync {
    fn stream(&self, request: &NarratorRequest) -> Result<NarratorStream, LlmError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn wire_message(message: &Message) -> Value {
    let mut out = json!({
        "role": role_name(message.role),
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        out["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments.to_string() }
                })
            })
            .collect();
    }
    if let Some(id) = &message.tool_call_id {
        out["tool_call_id"] = json!(id);
    }
    out
}

/// OpenAI-compatible chat completions endpoint (LM Studio by default),
/// streamed over server-sent events.
pub struct OpenAiNarrator {
    client: Client,
    config: NarratorConfig,
}

impl OpenAiNarrator {
    pub fn new(config: NarratorConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    pub fn test_connection(&self) -> Result<String> {
        let resp: Value = self.client.get(self.url("models")).send()?.json()?;

        Ok(format!(
            "Connected ({} models available)",
            resp["data"].as_array().map(|a| a.len()).unwrap_or(0)
        ))
    }
}

impl Narrator for OpenAiNarrator {
    fn stream(&self, request: &NarratorRequest) -> Result<NarratorStream, LlmError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: request.messages.iter().map(wire_message).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
            tools: &request.tools,
        };

        debug!(
            messages = body.messages.len(),
            tools = request.tools.len(),
            "narrator request"
        );
        let resp = self
            .client
            .post(self.url("chat/completions"))
            .json(&body)
            .send()?
            .error_for_status()?;

        Ok(Box::new(SseStream::new(BufReader::new(resp))))
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Turns an OpenAI `text/event-stream` body into narrator chunks.
/// Tool-call fragments are collected per index and released whole.
pub struct SseStream<R: BufRead> {
    reader: R,
    calls: BTreeMap<u64, PartialCall>,
    queue: VecDeque<NarratorChunk>,
    done: bool,
}

impl<R: BufRead> SseStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            calls: BTreeMap::new(),
            queue: VecDeque::new(),
            done: false,
        }
    }

    fn flush_calls(&mut self) {
        for (index, call) in std::mem::take(&mut self.calls) {
            let arguments = if call.arguments.trim().is_empty() {
                json!({})
            } else {
                // Left as a string when broken; argument decoding reports it.
                serde_json::from_str(&call.arguments).unwrap_or(Value::String(call.arguments))
            };
            self.queue.push_back(NarratorChunk::ToolCall(NativeToolCall {
                id: call.id.unwrap_or_else(|| format!("call-{}", index)),
                name: call.name,
                arguments,
            }));
        }
    }

    fn handle_event(&mut self, data: &str) -> Result<(), LlmError> {
        if data == "[DONE]" {
            self.flush_calls();
            self.done = true;
            return Ok(());
        }

        let event: Value = serde_json::from_str(data)
            .map_err(|e| LlmError::InvalidResponse(format!("bad stream event: {}", e)))?;
        let Some(choice) = event["choices"].get(0) else {
            return Ok(());
        };
        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str().filter(|t| !t.is_empty()) {
            self.queue.push_back(NarratorChunk::Text(text.to_string()));
        }

        if let Some(fragments) = delta["tool_calls"].as_array() {
            for fragment in fragments {
                let index = fragment["index"].as_u64().unwrap_or(0);
                let call = self.calls.entry(index).or_default();
                if let Some(id) = fragment["id"].as_str() {
                    call.id = Some(id.to_string());
                }
                if let Some(name) = fragment["function"]["name"].as_str() {
                    call.name.push_str(name);
                }
                if let Some(args) = fragment["function"]["arguments"].as_str() {
                    call.arguments.push_str(args);
                }
            }
        }

        if choice["finish_reason"].is_string() {
            self.flush_calls();
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for SseStream<R> {
    type Item = Result<NarratorChunk, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.queue.pop_front() {
                return Some(Ok(chunk));
            }
            if self.done {
                return None;
            }

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.flush_calls();
                    self.done = true;
                }
                Ok(_) => {
                    let Some(data) = line.trim_end().strip_prefix("data:") else {
                        continue;
                    };
                    if let Err(err) = self.handle_event(data.trim()) {
                        warn!(error = %err, "dropping narrator stream");
                        self.done = true;
                        return Some(Err(err));
                    }
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(LlmError::RequestFailed(err.to_string())));
                }
            }
        }
    }
}
