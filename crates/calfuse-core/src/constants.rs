/// Product identifier emitted in the merged calendar's PRODID property.
pub const PRODID: &str = "-//calfuse//calfuse merger//EN";

/// Display name emitted as X-WR-CALNAME.
pub const CALENDAR_NAME: &str = "Merged Calendar";

/// Default merge interval in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;

/// Default per-source fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default deadline for one whole merge cycle in seconds.
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 300;

/// Default number of source fetches allowed in flight at once.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;
