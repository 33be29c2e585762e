//! Trajectory data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{ChatMessage, ContentPart, MessageContent, Role};

/// A generated conversation produced by executing a prompt on a sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// Unique identifier for this trajectory.
    pub id: Uuid,

    /// When the trajectory was generated.
    pub timestamp: DateTime<Utc>,

    /// Conversation messages: the sample's user turns followed by the
    /// generated assistant and tool turns.
    pub messages: Vec<ChatMessage>,
}

impl Trajectory {
    /// Create a trajectory from the given messages, stamped now.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            messages,
        }
    }

    /// Whether the trajectory contains at least one assistant turn.
    pub fn has_assistant_turn(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::Assistant)
    }

    /// Checks that every tool-result part references a tool-call part that
    /// appears earlier in the trajectory.
    pub fn tool_results_paired(&self) -> bool {
        let mut seen_calls = std::collections::HashSet::new();
        for message in &self.messages {
            if let MessageContent::Parts(parts) = &message.content {
                for part in parts {
                    match part {
                        ContentPart::ToolCall { tool_call_id, .. } => {
                            seen_calls.insert(tool_call_id.as_str());
                        }
                        ContentPart::ToolResult { tool_call_id, .. } => {
                            if !seen_calls.contains(tool_call_id.as_str()) {
                                return false;
                            }
                        }
                        ContentPart::Text { .. } => {}
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_assistant_turn() {
        let trajectory = Trajectory::new(vec![
            ChatMessage::user("question"),
            ChatMessage::assistant("answer"),
        ]);
        assert!(trajectory.has_assistant_turn());

        let user_only = Trajectory::new(vec![ChatMessage::user("question")]);
        assert!(!user_only.has_assistant_turn());
    }

    #[test]
    fn test_tool_results_paired() {
        let paired = Trajectory::new(vec![
            ChatMessage::user("question"),
            ChatMessage::with_parts(
                Role::Assistant,
                vec![ContentPart::ToolCall {
                    tool_call_id: "c1".to_string(),
                    tool_name: "search".to_string(),
                    args: serde_json::json!({}),
                }],
            ),
            ChatMessage::with_parts(
                Role::Tool,
                vec![ContentPart::ToolResult {
                    tool_call_id: "c1".to_string(),
                    tool_name: "search".to_string(),
                    result: serde_json::json!({"hits": 1}),
                }],
            ),
        ]);
        assert!(paired.tool_results_paired());
    }

    #[test]
    fn test_orphan_tool_result_detected() {
        let orphan = Trajectory::new(vec![ChatMessage::with_parts(
            Role::Tool,
            vec![ContentPart::ToolResult {
                tool_call_id: "never-called".to_string(),
                tool_name: "search".to_string(),
                result: serde_json::json!({}),
            }],
        )]);
        assert!(!orphan.tool_results_paired());
    }
}
