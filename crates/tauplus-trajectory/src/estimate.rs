//! Deterministic token and timing estimates used when a backend does not
//! report measured values.

use crate::turn::{ToolCallRecord, ToolOutcome};

pub const CHARS_PER_TOKEN: usize = 4;
/// Structural overhead charged per message (role markers, separators).
pub const MESSAGE_OVERHEAD_CHARS: usize = 10;
/// Overhead charged per tool call (function name, call id, framing).
pub const TOOL_CALL_OVERHEAD_CHARS: usize = 50;

/// Estimated tokens for a span of text plus structural overhead.
///
/// Never returns less than one token.
pub fn tokens_for(chars: usize, overhead_chars: usize) -> u32 {
  let tokens = (chars + overhead_chars) / CHARS_PER_TOKEN;
  tokens.max(1) as u32
}

pub fn message_tokens(content: &str) -> u32 {
  tokens_for(content.chars().count(), MESSAGE_OVERHEAD_CHARS)
}

pub fn tool_call_tokens(call: &ToolCallRecord) -> u32 {
  let arguments = serde_json::Value::Object(call.arguments.clone()).to_string();
  let output = match &call.outcome {
    ToolOutcome::Success { output } => output.to_string(),
    ToolOutcome::Failure { message, .. } => message.clone(),
  };
  tokens_for(
    arguments.chars().count() + output.chars().count(),
    TOOL_CALL_OVERHEAD_CHARS,
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_message_still_costs_overhead() {
    assert_eq!(message_tokens(""), 2);
  }

  #[test]
  fn minimum_is_one_token() {
    assert_eq!(tokens_for(0, 0), 1);
  }

  #[test]
  fn four_characters_per_token() {
    assert_eq!(tokens_for(40, 0), 10);
    assert_eq!(tokens_for(43, 0), 10);
    assert_eq!(message_tokens(&"a".repeat(30)), 10);
  }
}
