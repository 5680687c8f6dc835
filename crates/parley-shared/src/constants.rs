/// Language used when a connection is admitted without one.
pub const DEFAULT_LANG: &str = "en";

/// Source language assumed when a message does not declare one.
pub const AUTO_LANG: &str = "auto";

/// Per-connection outbound queue bound.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// How long an enqueue may wait on a full queue before the envelope is dropped.
pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 250;

/// Deadline for resolving a reply sender to a display name.
pub const DISPLAY_NAME_TIMEOUT_MS: u64 = 3_000;

/// Deadline for a single translation provider call.
pub const TRANSLATE_TIMEOUT_MS: u64 = 2_000;

/// Default HTTP / WebSocket port.
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Acknowledgement text sent after `create_group`.
pub const GROUP_CREATED_TEXT: &str = "group created";

/// Acknowledgement text sent after `join_group`.
pub const JOINED_GROUP_TEXT: &str = "joined group";
