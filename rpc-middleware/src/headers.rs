//! Header keys forwarded over the wire.

/// Remaining deadline budget in whole milliseconds, base-10.
pub const DEADLINE_BUDGET: &str = "Deadline-Budget";

/// Caller identity; omitted entirely when the client has no name.
pub const USER_AGENT: &str = "User-Agent";

/// Opaque edge request context blob.
pub const EDGE_REQUEST: &str = "Edge-Request";

/// W3C trace context of the span that issued the call.
pub const TRACEPARENT: &str = "traceparent";
