//! Generated-message data model consumed by the response validator

use serde::{Deserialize, Serialize};

/// Role of a message in a generated transcript
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// End-user input
    User,
    /// Model output
    Assistant,
    /// Tool result echoed back into the transcript
    Tool,
    /// System/priming content
    System,
}

/// One content block inside a generated message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MessagePart {
    /// Plain text content
    Text {
        /// The text itself
        content: Box<str>,
    },
    /// A tool invocation the model requested
    ToolCall {
        /// Name of the invoked tool
        tool: Box<str>,
    },
    /// A completed tool result
    ToolOutput {
        /// Name of the tool that produced it
        tool: Box<str>,
        /// Result content, if any
        content: Box<str>,
    },
}

impl MessagePart {
    /// Plain text part
    pub fn text(content: impl Into<Box<str>>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Tool invocation part
    pub fn tool_call(tool: impl Into<Box<str>>) -> Self {
        Self::ToolCall { tool: tool.into() }
    }

    /// Completed tool result part
    pub fn tool_output(tool: impl Into<Box<str>>, content: impl Into<Box<str>>) -> Self {
        Self::ToolOutput {
            tool: tool.into(),
            content: content.into(),
        }
    }
}

/// One message of a generated transcript
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratedMessage {
    /// Who produced the message
    pub role: Role,
    /// Ordered content blocks
    pub parts: Vec<MessagePart>,
}

impl GeneratedMessage {
    /// Assistant message from arbitrary parts
    pub fn assistant(parts: Vec<MessagePart>) -> Self {
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    /// Assistant message holding a single text block
    pub fn assistant_text(content: impl Into<Box<str>>) -> Self {
        Self::assistant(vec![MessagePart::text(content)])
    }

    /// Total trimmed text length across this message's text parts
    pub fn text_length(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                MessagePart::Text { content } => content.trim().len(),
                _ => 0,
            })
            .sum()
    }

    /// Whether any part is a tool invocation
    pub fn has_tool_call(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, MessagePart::ToolCall { .. }))
    }

    /// Whether any part is a completed tool result
    pub fn has_tool_output(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, MessagePart::ToolOutput { .. }))
    }

    /// Whether the message carries nothing at all: no text, no tool
    /// invocation, no tool result
    pub fn is_empty(&self) -> bool {
        self.text_length() == 0 && !self.has_tool_call() && !self.has_tool_output()
    }
}

/// What the caller's generation step returns on a normal completion
#[derive(Clone, Debug)]
pub struct GenerationOutput<T> {
    /// The caller-facing result of the generation
    pub payload: T,
    /// Raw transcript the validator classifies
    pub messages: Vec<GeneratedMessage>,
}

impl<T> GenerationOutput<T> {
    /// Bundle a payload with its raw transcript
    pub fn new(payload: T, messages: Vec<GeneratedMessage>) -> Self {
        Self { payload, messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_length_trims_whitespace() {
        let message = GeneratedMessage::assistant(vec![
            MessagePart::text("  \n "),
            MessagePart::text("hello"),
        ]);
        assert_eq!(message.text_length(), 5);
    }

    #[test]
    fn test_emptiness() {
        let empty = GeneratedMessage::assistant(vec![]);
        assert!(empty.is_empty());

        let call_only = GeneratedMessage::assistant(vec![MessagePart::tool_call("search")]);
        assert!(!call_only.is_empty());
        assert!(call_only.has_tool_call());
        assert!(!call_only.has_tool_output());
    }
}
