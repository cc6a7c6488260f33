//! Fixed protocol and scheduling constants.
//!
//! Protocol values are defined by the companion protocol and changing them
//! would break interoperability with controllers. Scheduling values are the
//! defaults for [`LoopTiming`](crate::state::LoopTiming).

// ─────────────────────────────────────────────────────────────────────────────
// Companion Loop Scheduling
// ─────────────────────────────────────────────────────────────────────────────

/// Sleep between loop iterations (milliseconds).
pub const LOOP_QUANTUM_MS: u64 = 10;

/// Upper bound on waiting for one HTTP request per iteration (milliseconds).
///
/// Kept below one second so that notify and task dispatch run at least once
/// per second even when no controller is talking to us.
pub const REQUEST_TIMEOUT_MS: u64 = 950;

/// Poll period while the loop is suspended (milliseconds).
pub const SUSPEND_POLL_MS: u64 = 1000;

/// Number of serviced requests between advisory registration checks.
pub const REGISTRATION_CHECK_EVERY: u32 = 100;

/// Upper bound for a single registration check (milliseconds).
pub const REGISTRATION_CHECK_TIMEOUT_MS: u64 = 2000;

/// Bind retries after the first failed attempt.
pub const BIND_RETRY_COUNT: u32 = 3;

/// Delay between bind attempts (milliseconds).
pub const BIND_RETRY_DELAY_MS: u64 = 3000;

/// Maximum number of pending tasks between the HTTP layer and the loop.
pub const TASK_QUEUE_CAPACITY: usize = 100;

/// Capacity of the served-request notice channel.
pub const SERVED_CHANNEL_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Subscriber Notification
// ─────────────────────────────────────────────────────────────────────────────

/// Consecutive failed deliveries before a controller subscriber is dropped.
pub const MAX_SUBSCRIBER_FAILURES: u32 = 3;

/// Minimum delay before retrying a subscriber whose last delivery failed (milliseconds).
pub const NOTIFY_RETRY_DELAY_MS: u64 = 1000;

/// Timeout for timeline and play queue HTTP requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Companion Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Remote time unit per local second (remote offsets are milliseconds).
pub const REMOTE_TIME_FACTOR: i64 = 1000;

/// Path prefix of a remote media item key.
pub const LIBRARY_METADATA_PREFIX: &str = "/library/metadata";

/// Capabilities advertised in `/resources` and over mDNS.
pub const PROTOCOL_CAPABILITIES: &str = "timeline,playback,navigation,playqueues";

/// Companion protocol version.
pub const PROTOCOL_VERSION: &str = "1";

/// Header carrying the sender's machine identifier.
pub const CLIENT_IDENTIFIER_HEADER: &str = "X-Plex-Client-Identifier";

/// Header carrying the server access token.
pub const TOKEN_HEADER: &str = "X-Plex-Token";

/// Default HTTP port for the companion listener.
pub const DEFAULT_COMPANION_PORT: u16 = 3005;

/// Default port of a remote media server.
pub const DEFAULT_SERVER_PORT: u16 = 32400;

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// mDNS service type under which this player is advertised.
pub const CLIENT_SERVICE_TYPE: &str = "_plexclient._tcp.local.";

/// mDNS service type browsed for remote media servers.
pub const SERVER_SERVICE_TYPE: &str = "_plexmediasvr._tcp.local.";

/// Application name used in announcements and `/resources`.
pub const APP_NAME: &str = "Companion Bridge";
