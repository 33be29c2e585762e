//! Conversation message model shared by samples and trajectories.
//!
//! Messages carry either plain text or an ordered sequence of typed parts
//! (text, tool calls, tool results). Each part has a fixed shape; rendering
//! for judge prompts serializes parts verbatim.

use serde::{Deserialize, Serialize};

/// Role of a message sender within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single typed part of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text content.
    Text { text: String },

    /// A tool invocation requested by the assistant.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },

    /// The result of a prior tool invocation.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: serde_json::Value,
    },
}

/// Message content: plain text or an ordered part sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Collects all text content, joining text parts with newlines.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                texts.join("\n")
            }
        }
    }

    /// Iterates the typed parts, treating plain text as a single text part.
    pub fn parts(&self) -> Vec<ContentPart> {
        match self {
            MessageContent::Text(text) => vec![ContentPart::Text { text: text.clone() }],
            MessageContent::Parts(parts) => parts.clone(),
        }
    }
}

/// A message in a sample or generated conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a message carrying typed parts.
    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }

    /// Collected text content of this message.
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// Renders a message history verbatim for inclusion in a judge prompt.
///
/// Text content is emitted as-is; typed parts are emitted as their JSON
/// serialization so the judge sees tool calls and results exactly as
/// recorded.
pub fn render_messages(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&format!("[{}]\n", message.role));
        match &message.content {
            MessageContent::Text(text) => out.push_str(text),
            MessageContent::Parts(parts) => {
                for part in parts {
                    match part {
                        ContentPart::Text { text } => out.push_str(text),
                        other => {
                            // Serialization of a ContentPart cannot fail: all
                            // payloads are already serde_json::Value.
                            let json = serde_json::to_string(other).unwrap_or_default();
                            out.push_str(&json);
                        }
                    }
                    out.push('\n');
                }
            }
        }
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "hello");

        let msg = ChatMessage::assistant("hi there");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), "hi there");
    }

    #[test]
    fn test_content_text_from_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "first".to_string(),
            },
            ContentPart::ToolCall {
                tool_call_id: "call-1".to_string(),
                tool_name: "search".to_string(),
                args: serde_json::json!({"q": "x"}),
            },
            ContentPart::Text {
                text: "second".to_string(),
            },
        ]);
        assert_eq!(content.text(), "first\nsecond");
    }

    #[test]
    fn test_part_serialization_tagged() {
        let part = ContentPart::ToolResult {
            tool_call_id: "call-1".to_string(),
            tool_name: "search".to_string(),
            result: serde_json::json!({"hits": 3}),
        };
        let json = serde_json::to_string(&part).expect("serialization should work");
        assert!(json.contains(r#""type":"tool_result""#));
        assert!(json.contains("call-1"));
    }

    #[test]
    fn test_content_untagged_roundtrip() {
        let text: MessageContent =
            serde_json::from_str(r#""plain""#).expect("text content should parse");
        assert_eq!(text, MessageContent::Text("plain".to_string()));

        let parts: MessageContent = serde_json::from_str(r#"[{"type":"text","text":"p"}]"#)
            .expect("part content should parse");
        assert_eq!(parts.parts().len(), 1);
    }

    #[test]
    fn test_render_messages_verbatim() {
        let messages = vec![
            ChatMessage::user("what is 2+2?"),
            ChatMessage::with_parts(
                Role::Assistant,
                vec![ContentPart::ToolCall {
                    tool_call_id: "c1".to_string(),
                    tool_name: "calc".to_string(),
                    args: serde_json::json!({"expr": "2+2"}),
                }],
            ),
            ChatMessage::assistant("4"),
        ];

        let rendered = render_messages(&messages);
        assert!(rendered.starts_with("[user]\nwhat is 2+2?"));
        assert!(rendered.contains(r#""type":"tool_call""#));
        assert!(rendered.contains("[assistant]\n4"));
    }

    #[test]
    fn test_render_empty_history() {
        assert_eq!(render_messages(&[]), "");
    }
}
