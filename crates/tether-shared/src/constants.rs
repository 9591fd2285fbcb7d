/// Application name
pub const APP_NAME: &str = "tether";

/// Server part of alternate (privacy-preserving) identifiers
pub const ALTERNATE_SERVER: &str = "lid";

/// Maximum chat preview length in characters
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Default page size for chat/message/search queries
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Outbox poll interval in milliseconds
pub const OUTBOX_POLL_INTERVAL_MS: u64 = 500;

/// Delay between the upstream "connected" signal and reading the identity map
pub const RECONCILE_SETTLE_DELAY_MS: u64 = 3_000;

/// Queue capacity used by the sync engine's bus subscription
pub const SYNC_QUEUE_CAPACITY: usize = 256;

/// Bus namespaces
pub const NS_UPSTREAM: &str = "upstream.";
pub const NS_SYNC: &str = "sync.";
pub const NS_SESSION: &str = "session.";
pub const NS_MESSAGE: &str = "message.";
