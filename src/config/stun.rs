/// STUN discovery configuration.
///
/// Public servers used when the peer configuration does not name its own, plus the
/// per-attempt timeout and retry budget of a single discovery.
pub const DEFAULT_STUN_SERVERS: &[(&str, u16)] = &[
    ("stun.l.google.com", 19302),
    ("stun1.l.google.com", 19302),
    ("stun2.l.google.com", 19302),
    ("stun3.l.google.com", 19302),
    ("stun4.l.google.com", 19302),
];

/// How long to wait for one Binding Success Response (in milliseconds).
pub const RESPONSE_TIMEOUT_MS: u64 = 3000;

/// Binding requests sent per server before discovery against it fails.
pub const ATTEMPTS: u32 = 2;

/// Receive buffer size; STUN messages fit in 576 bytes.
pub const RECV_BUFFER_SIZE: usize = 576;
