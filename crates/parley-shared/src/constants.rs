/// Application name
pub const APP_NAME: &str = "Parley";

/// Number of most recent records covered by the live subscription
pub const DEFAULT_LIVE_LIMIT: u32 = 25;

/// Number of records requested per history page
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum display name length in characters
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;
