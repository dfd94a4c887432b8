pub mod backend;
pub mod delete;
pub mod fallback;
pub mod parser;
pub mod sanitize;

pub use backend::{BackendError, ChatRequest, HttpBackend, ScriptedBackend, TextBackend};
pub use delete::{is_delete_instruction, parse_delete_targets, request_delete_targets};
pub use fallback::{fallback_parse, mentions_dry_run};
pub use parser::{IntentParser, ParsedIntent};
pub use sanitize::sanitize_response;
