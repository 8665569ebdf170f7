/// Peer-to-peer UDP session configuration.
use std::ops::Range;

/// Local UDP ports picked from when the peer does not ask for a specific one.
pub const LOCAL_PORT_RANGE: Range<u16> = 15000..25000;

/// Largest datagram the receive loop accepts.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Number of pings sent by the connectivity self-test.
pub const SELF_TEST_PINGS: u32 = 3;

/// Pause between two self-test pings (in milliseconds).
pub const SELF_TEST_PING_INTERVAL_MS: u64 = 1000;

/// Extra wait after the self-test chat for late pongs (in milliseconds).
pub const SELF_TEST_GRACE_MS: u64 = 1000;

/// Delay between `startP2P` and the self-test, letting the opponent bind first.
pub const SELF_TEST_DELAY_MS: u64 = 2000;

/// Octets of the synthetic private address reported in synthetic fallback mode.
pub const SYNTHETIC_PREFIX: [u8; 3] = [192, 168, 1];
pub const SYNTHETIC_HOST_RANGE: Range<u8> = 100..254;
pub const SYNTHETIC_PORT_RANGE: Range<u16> = 10000..50000;
