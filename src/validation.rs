//! Deterministic classification of generated transcripts
//!
//! The validator decides whether a generation attempt produced a genuinely
//! useful result. It is a pure function over the transcript: no state, no
//! side effects, so it can run once per retry attempt without accumulating
//! anything between attempts.

use serde::{Deserialize, Serialize};

use crate::messages::{GeneratedMessage, Role};

/// Machine-readable verdict reason
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationReason {
    /// The transcript holds no assistant-role messages
    NoAssistantMessages,
    /// Every assistant message carries nothing at all
    AllMessagesEmpty,
    /// Tool invocations with no completed outputs and no text
    ToolCallsWithoutText,
    /// Text below the minimum length, with no tool activity at all
    TextTooShort,
    /// Tool outputs present but the accompanying text is too short
    ToolOutputWithoutExplanation,
    /// Valid: enough text content
    SufficientText,
    /// Valid: tool outputs plus enough follow-up text
    ToolOutputWithFollowUpText,
}

impl ValidationReason {
    /// Whether this reason denotes an acceptable result
    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            Self::SufficientText | Self::ToolOutputWithFollowUpText
        )
    }

    /// Stable string form for logs and observers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAssistantMessages => "no assistant messages",
            Self::AllMessagesEmpty => "all messages empty",
            Self::ToolCallsWithoutText => "tool calls without explanatory text",
            Self::TextTooShort => "text content too short",
            Self::ToolOutputWithoutExplanation => "tool output without sufficient explanation",
            Self::SufficientText => "sufficient text content",
            Self::ToolOutputWithFollowUpText => "tool output with sufficient follow-up text",
        }
    }
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counts gathered while classifying, always populated alongside the verdict
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Assistant-role messages in the transcript
    pub assistant_message_count: usize,
    /// Trimmed text length summed across assistant messages
    pub total_text_length: usize,
    /// Whether any completed tool output is present
    pub has_tool_outputs: bool,
    /// Assistant messages carrying nothing at all
    pub empty_messages: usize,
    /// Assistant messages with tool invocations but no text of their own
    pub tool_calls_without_text: usize,
}

/// Verdict plus metrics for one classified transcript
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the transcript is acceptable
    pub is_valid: bool,
    /// Why
    pub reason: ValidationReason,
    /// Observability counts
    pub metrics: ValidationMetrics,
}

/// Stateless transcript classifier
#[derive(Clone, Copy, Debug)]
pub struct ResponseValidator {
    min_text_length: usize,
}

impl ResponseValidator {
    /// Minimum acceptable text length when no tool activity excuses brevity
    pub const DEFAULT_MIN_TEXT_LENGTH: usize = 10;

    /// Validator with a custom text-length threshold
    pub fn new(min_text_length: usize) -> Self {
        Self { min_text_length }
    }

    /// The configured threshold
    pub fn min_text_length(&self) -> usize {
        self.min_text_length
    }

    /// Classify a transcript. Rules apply in fixed precedence; the first
    /// match decides.
    ///
    /// Text is counted from assistant messages only. Tool invocations and
    /// completed outputs are counted across every role, so a tool result
    /// echoed as a tool-role message still registers.
    pub fn validate(&self, messages: &[GeneratedMessage]) -> ValidationResult {
        let assistant: Vec<&GeneratedMessage> = messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();

        let metrics = ValidationMetrics {
            assistant_message_count: assistant.len(),
            total_text_length: assistant.iter().map(|m| m.text_length()).sum(),
            has_tool_outputs: messages.iter().any(|m| m.has_tool_output()),
            empty_messages: assistant.iter().filter(|m| m.is_empty()).count(),
            tool_calls_without_text: assistant
                .iter()
                .filter(|m| m.has_tool_call() && m.text_length() == 0)
                .count(),
        };
        let has_tool_calls = messages.iter().any(|m| m.has_tool_call());

        let reason = if metrics.assistant_message_count == 0 {
            ValidationReason::NoAssistantMessages
        } else if metrics.empty_messages == metrics.assistant_message_count {
            ValidationReason::AllMessagesEmpty
        } else if has_tool_calls && !metrics.has_tool_outputs && metrics.total_text_length == 0 {
            ValidationReason::ToolCallsWithoutText
        } else if metrics.total_text_length < self.min_text_length
            && !has_tool_calls
            && !metrics.has_tool_outputs
        {
            ValidationReason::TextTooShort
        } else if metrics.has_tool_outputs && metrics.total_text_length < self.min_text_length {
            ValidationReason::ToolOutputWithoutExplanation
        } else if metrics.has_tool_outputs {
            ValidationReason::ToolOutputWithFollowUpText
        } else {
            ValidationReason::SufficientText
        };

        ValidationResult {
            is_valid: reason.is_valid(),
            reason,
            metrics,
        }
    }
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_TEXT_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessagePart;

    fn validate(messages: &[GeneratedMessage]) -> ValidationResult {
        ResponseValidator::default().validate(messages)
    }

    #[test]
    fn test_empty_transcript_is_invalid() {
        let result = validate(&[]);
        assert!(!result.is_valid);
        assert_eq!(result.reason, ValidationReason::NoAssistantMessages);
        assert_eq!(result.metrics.assistant_message_count, 0);
    }

    #[test]
    fn test_user_only_transcript_is_invalid() {
        let messages = [GeneratedMessage {
            role: Role::User,
            parts: vec![MessagePart::text("please do the thing")],
        }];
        let result = validate(&messages);
        assert_eq!(result.reason, ValidationReason::NoAssistantMessages);
    }

    #[test]
    fn test_all_messages_empty() {
        let messages = [
            GeneratedMessage::assistant(vec![]),
            GeneratedMessage::assistant(vec![MessagePart::text("   ")]),
        ];
        let result = validate(&messages);
        assert!(!result.is_valid);
        assert_eq!(result.reason, ValidationReason::AllMessagesEmpty);
        assert_eq!(result.metrics.empty_messages, 2);
    }

    #[test]
    fn test_tool_calls_without_text() {
        let messages = [GeneratedMessage::assistant(vec![MessagePart::tool_call(
            "web_search",
        )])];
        let result = validate(&messages);
        assert!(!result.is_valid);
        assert_eq!(result.reason, ValidationReason::ToolCallsWithoutText);
        assert_eq!(result.metrics.tool_calls_without_text, 1);
    }

    #[test]
    fn test_short_text_is_invalid() {
        let messages = [GeneratedMessage::assistant_text("Hi")];
        let result = validate(&messages);
        assert!(!result.is_valid);
        assert_eq!(result.reason, ValidationReason::TextTooShort);
        assert_eq!(result.metrics.total_text_length, 2);
    }

    #[test]
    fn test_sufficient_text_is_valid() {
        let messages = [GeneratedMessage::assistant_text("Let me help.")];
        let result = validate(&messages);
        assert!(result.is_valid);
        assert_eq!(result.reason, ValidationReason::SufficientText);
        assert_eq!(result.metrics.total_text_length, 12);
    }

    #[test]
    fn test_tool_output_without_text_is_invalid() {
        let messages = [GeneratedMessage::assistant(vec![
            MessagePart::tool_call("web_search"),
            MessagePart::tool_output("web_search", "{\"hits\": 3}"),
        ])];
        let result = validate(&messages);
        assert!(!result.is_valid);
        assert_eq!(
            result.reason,
            ValidationReason::ToolOutputWithoutExplanation
        );
        assert!(result.metrics.has_tool_outputs);
    }

    #[test]
    fn test_tool_output_with_followup_is_valid() {
        let messages = [GeneratedMessage::assistant(vec![
            MessagePart::tool_output("web_search", "{\"hits\": 3}"),
            MessagePart::text("Found 3 results."),
        ])];
        let result = validate(&messages);
        assert!(result.is_valid);
        assert_eq!(result.reason, ValidationReason::ToolOutputWithFollowUpText);
    }

    #[test]
    fn test_tool_role_output_counts() {
        // The completed result lives in a tool-role message; the assistant
        // only carries the short commentary.
        let messages = [
            GeneratedMessage::assistant(vec![MessagePart::text("ok")]),
            GeneratedMessage {
                role: Role::Tool,
                parts: vec![MessagePart::tool_output("calc", "4")],
            },
        ];
        let result = validate(&messages);
        assert_eq!(
            result.reason,
            ValidationReason::ToolOutputWithoutExplanation
        );
    }

    #[test]
    fn test_deterministic() {
        let messages = [GeneratedMessage::assistant_text("Let me help.")];
        let first = validate(&messages);
        let second = validate(&messages);
        assert_eq!(first.reason, second.reason);
        assert_eq!(first.metrics, second.metrics);
    }
}
