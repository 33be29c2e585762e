//! Labeled conversational samples used as training signal.
//!
//! Samples are immutable inputs: loaded once at run start, never mutated.
//! A sample without a user turn cannot be executed and is skipped with a
//! logged warning during admission.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::message::{ChatMessage, Role};

/// Human rating attached to a recorded conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Positive,
    Negative,
}

/// Optional human feedback on a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: FeedbackRating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Feedback {
    pub fn positive() -> Self {
        Self {
            rating: FeedbackRating::Positive,
            comment: None,
        }
    }

    pub fn negative() -> Self {
        Self {
            rating: FeedbackRating::Negative,
            comment: None,
        }
    }

    /// Attach a free-form comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A recorded conversation with optional human rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unique identifier within the run.
    pub id: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Optional human feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Sample {
    /// Create a new sample without feedback.
    pub fn new(id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            id: id.into(),
            messages,
            feedback: None,
        }
    }

    /// Attach feedback to this sample.
    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Whether the sample contains at least one user turn.
    pub fn has_user_turn(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    /// The sample's user turns, in order.
    ///
    /// These form the input the task model is executed against; the
    /// sample's assistant turns are reference signal for the judge only.
    pub fn user_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .cloned()
            .collect()
    }

    /// Feedback polarity; absence of feedback falls back to positive.
    pub fn is_positive(&self) -> bool {
        match &self.feedback {
            Some(feedback) => feedback.rating == FeedbackRating::Positive,
            None => true,
        }
    }
}

/// Filters samples down to those that can be executed.
///
/// Samples without a user turn are dropped with a warning; everything else
/// passes through unchanged and in order.
pub fn admit_samples(samples: Vec<Sample>) -> Vec<Sample> {
    samples
        .into_iter()
        .filter(|sample| {
            if sample.has_user_turn() {
                true
            } else {
                warn!(sample_id = %sample.id, "Skipping sample without a user turn");
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_sample(id: &str) -> Sample {
        Sample::new(
            id,
            vec![
                ChatMessage::user("question"),
                ChatMessage::assistant("answer"),
            ],
        )
    }

    #[test]
    fn test_has_user_turn() {
        assert!(user_sample("s1").has_user_turn());

        let no_user = Sample::new("s2", vec![ChatMessage::assistant("only assistant")]);
        assert!(!no_user.has_user_turn());
    }

    #[test]
    fn test_user_messages_filters_roles() {
        let sample = Sample::new(
            "s1",
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
            ],
        );

        let users = sample.user_messages();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].text(), "first");
        assert_eq!(users[1].text(), "second");
    }

    #[test]
    fn test_polarity_defaults_to_positive() {
        assert!(user_sample("s1").is_positive());
        assert!(user_sample("s2")
            .with_feedback(Feedback::positive())
            .is_positive());
        assert!(!user_sample("s3")
            .with_feedback(Feedback::negative().with_comment("too verbose"))
            .is_positive());
    }

    #[test]
    fn test_admit_samples_drops_userless() {
        let samples = vec![
            user_sample("keep-1"),
            Sample::new("drop", vec![ChatMessage::assistant("no user")]),
            user_sample("keep-2"),
        ];

        let admitted = admit_samples(samples);
        assert_eq!(admitted.len(), 2);
        assert_eq!(admitted[0].id, "keep-1");
        assert_eq!(admitted[1].id, "keep-2");
    }

    #[test]
    fn test_feedback_serialization() {
        let feedback = Feedback::negative().with_comment("wrong tone");
        let json = serde_json::to_string(&feedback).expect("serialization should work");
        assert!(json.contains(r#""rating":"negative""#));
        assert!(json.contains("wrong tone"));
    }
}
