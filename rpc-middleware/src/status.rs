//! Numeric status codes carried by application errors.

/// Known status codes: `(code, name, retryable)`.
const STATUS_TABLE: &[(i32, &str, bool)] = &[
    (400, "BAD_REQUEST", false),
    (401, "UNAUTHORIZED", false),
    (402, "PAYMENT_REQUIRED", false),
    (403, "FORBIDDEN", false),
    (404, "NOT_FOUND", false),
    (409, "CONFLICT", false),
    (410, "GONE", false),
    (412, "PRECONDITION_FAILED", false),
    (413, "PAYLOAD_TOO_LARGE", false),
    (418, "IM_A_TEAPOT", false),
    (421, "MISDIRECTED_REQUEST", false),
    (422, "UNPROCESSABLE_ENTITY", false),
    (425, "TOO_EARLY", true),
    (429, "TOO_MANY_REQUESTS", true),
    (500, "INTERNAL_SERVER_ERROR", false),
    (501, "NOT_IMPLEMENTED", false),
    (502, "BAD_GATEWAY", true),
    (503, "SERVICE_UNAVAILABLE", true),
    (504, "TIMEOUT", true),
    (507, "INSUFFICIENT_STORAGE", false),
    (508, "LOOP_DETECTED", false),
    (1000, "USER_DEFINED", false),
];

fn lookup(code: i32) -> Option<&'static (i32, &'static str, bool)> {
    STATUS_TABLE.iter().find(|(c, _, _)| *c == code)
}

/// Symbolic name of a status code, `None` for codes outside the table.
#[must_use]
pub fn status_name(code: i32) -> Option<&'static str> {
    lookup(code).map(|(_, name, _)| *name)
}

/// Default retryability of a status code, `None` for unknown codes.
#[must_use]
pub fn status_retryable(code: i32) -> Option<bool> {
    lookup(code).map(|(_, _, retryable)| *retryable)
}
