/// Max bytes in a client name.
pub const MAX_NAME_LEN: usize = 100;

/// Max bytes in a client phone number.
pub const MAX_PHONE_LEN: usize = 20;

/// Max reservations held by one ledger (active or not).
pub const MAX_RESERVATIONS: usize = 1_000_000;

/// Max clients held by one ledger.
pub const MAX_CLIENTS: usize = 1_000_000;

/// Max concurrently tracked dialogue sessions.
pub const MAX_SESSIONS: usize = 10_000;

/// Max bytes in one protocol line.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Max bytes in a session user key.
pub const MAX_USER_KEY_LEN: usize = 128;

/// Max rows returned by a single listing.
pub const MAX_LIST_RESULTS: usize = 10_000;
