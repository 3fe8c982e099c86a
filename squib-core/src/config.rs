//! Deployment-wide constants. Every node in a deployment must be built with
//! the same values here, otherwise frames are rejected or timings disagree.

/// Identifies this deployment on the shared band ("SQIB"). Frames carrying any
/// other value are dropped before their contents are looked at.
pub const DEPLOYMENT_MAGIC: u32 = 0x5351_4942;

/// Slots in the radio event queue between the radio task and the dispatcher.
pub const EVENT_QUEUE_DEPTH: usize = 6;

/// Largest radio payload the event queue will copy.
pub const MAX_PAYLOAD_LEN: usize = 250;

/// Period of the silence watchdog tick.
pub const WATCHDOG_TICK_MS: u64 = 1;

/// Watchdog ticks without a validated frame before a receiver forces itself
/// safe. With a 1ms tick this is half a second.
pub const SILENCE_TIMEOUT_TICKS: u32 = 500;

/// Period between frames on a transmitter.
pub const TX_PERIOD_MS: u64 = 50;

/// Period of the link health report.
pub const HEALTH_PERIOD_MS: u64 = 5_000;

// A receiver must be able to lose a few frames in a row without dropping out.
const _: () = assert!(
    SILENCE_TIMEOUT_TICKS as u64 * WATCHDOG_TICK_MS >= 4 * TX_PERIOD_MS,
    "Silence timeout must cover at least four transmit periods!"
);
