//! Default prompt texts.

/// Default system instruction given to the model.
pub const DEFAULT_PREPROMPT: &str = "You are a helpful assistant in a multi-agent conversation. Be as concise as possible.";

/// Emote published when the conversation no longer fits the context budget.
pub const DEFAULT_OVERFLOW_NOTICE: &str = "reached prompt token limit";

/// ChatML end-of-turn marker, used as a stop sequence.
pub const DEFAULT_END_OF_TURN_MARKER: &str = "<|im_end|>";
