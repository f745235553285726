//! Metric helpers for `grapevine`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "grapevine_connections_active";
/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "grapevine_frames_processed_total";
/// Name of the counter tracking scheduled reconnects.
pub const RECONNECTS_TOTAL: &str = "grapevine_reconnects_total";
/// Name of the counter tracking error acknowledgements from the service.
pub const PROTOCOL_ERRORS_TOTAL: &str = "grapevine_protocol_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames received from the directory service.
    Inbound,
    /// Frames sent to the directory service.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

#[cfg(feature = "metrics")]
mod imp {
    use metrics::{counter, gauge};

    use super::{CONNECTIONS_ACTIVE, Direction, FRAMES_PROCESSED, PROTOCOL_ERRORS_TOTAL, RECONNECTS_TOTAL};

    pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

    pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

    pub fn inc_frames(direction: Direction) {
        counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    }

    pub fn inc_reconnects() { counter!(RECONNECTS_TOTAL).increment(1); }

    pub fn inc_protocol_errors(code: &str) {
        counter!(PROTOCOL_ERRORS_TOTAL, "code" => code.to_owned()).increment(1);
    }
}

#[cfg(not(feature = "metrics"))]
mod imp {
    use super::Direction;

    pub fn inc_connections() {}

    pub fn dec_connections() {}

    pub fn inc_frames(_direction: Direction) {}

    pub fn inc_reconnects() {}

    pub fn inc_protocol_errors(_code: &str) {}
}

/// Increment the open connections gauge.
pub fn inc_connections() { imp::inc_connections(); }

/// Decrement the open connections gauge.
pub fn dec_connections() { imp::dec_connections(); }

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) { imp::inc_frames(direction); }

/// Record a scheduled reconnect.
pub fn inc_reconnects() { imp::inc_reconnects(); }

/// Record an error acknowledgement carrying `code`.
pub fn inc_protocol_errors(code: &str) { imp::inc_protocol_errors(code); }
