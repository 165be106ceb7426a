/// Application name
pub const APP_NAME: &str = "Tandem";

/// Free-tier swipes per profile per UTC day
pub const DAILY_SWIPE_LIMIT: u32 = 20;

/// How long a typing indicator stays lit without a refresh, in milliseconds
pub const TYPING_TTL_MS: u64 = 3_000;
pub const MAX_TYPING_TTL_MS: u64 = 60_000;

/// Days after match creation before an untouched conversation expires
pub const DEFAULT_CONVERSATION_TTL_DAYS: i64 = 7;
pub const MAX_CONVERSATION_TTL_DAYS: i64 = 3_650;

/// Maximum message length in characters (after trimming)
pub const MAX_MESSAGE_CHARS: usize = 1_000;

/// Characters of the last message kept as the conversation preview
pub const MESSAGE_PREVIEW_CHARS: usize = 100;

/// Default and maximum page size for message history
pub const DEFAULT_HISTORY_PAGE: u32 = 50;
pub const MAX_HISTORY_PAGE: u32 = 100;

/// Per-subscriber buffer of realtime events
pub const SUBSCRIBER_BUFFER: usize = 256;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
