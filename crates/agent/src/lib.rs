//! The per-turn assistant logic for ShopDesk.
//!
//! A chat turn runs **retrieve → assemble → complete → extract → dispatch**:
//!
//! 1. Fetch knowledge snippets for the user's message (failure is tolerated)
//! 2. Assemble the preamble, context, client history and the message
//! 3. Ask the model for a reply
//! 4. Scan the reply for a `<func_call>` directive
//! 5. If one is present, call the named tool once and splice its result
//!    into the reply
//!
//! [`tool_loop`] is the alternative structured path, where the model calls
//! tools through the completion API and the loop repeats until it stops.

pub mod assembler;
pub mod directive;
pub mod intent;
pub mod orchestrator;
pub mod prompt;
pub mod tool_loop;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assembler::ConversationAssembler;
pub use intent::IntentMatcher;
pub use orchestrator::{ChatTurn, Orchestrator, TurnSettings};
