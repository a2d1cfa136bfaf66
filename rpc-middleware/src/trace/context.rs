//! W3C trace context identifiers.

use std::fmt;

/// Identifiers of one span within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    /// 128-bit trace id shared by every span in the trace
    pub trace_id: u128,
    /// 64-bit id of this span
    pub span_id: u64,
    /// Whether the trace is sampled
    pub sampled: bool,
}

impl SpanContext {
    /// Start a new sampled trace.
    #[must_use]
    pub fn new_root() -> Self {
        Self {
            trace_id: non_zero(rand::random),
            span_id: non_zero(rand::random),
            sampled: true,
        }
    }

    /// Context for a child span in the same trace.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: non_zero(rand::random),
            sampled: self.sampled,
        }
    }

    /// Encode as a `traceparent` header value.
    /// Format: version-trace_id-parent_id-flags (00-{32hex}-{16hex}-{2hex})
    #[must_use]
    pub fn to_traceparent(&self) -> String {
        format!(
            "00-{:032x}-{:016x}-{:02x}",
            self.trace_id,
            self.span_id,
            u8::from(self.sampled)
        )
    }

    /// Parse a `traceparent` header value.
    ///
    /// Returns `None` for malformed values and all-zero ids.
    #[must_use]
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.trim().split('-').collect();
        let [version, trace_id, span_id, flags] = parts.as_slice() else {
            return None;
        };
        let well_formed = version.len() == 2
            && trace_id.len() == 32
            && span_id.len() == 16
            && flags.len() == 2
            && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit()));
        if !well_formed || *version == "ff" {
            return None;
        }

        let trace_id = u128::from_str_radix(trace_id, 16).ok()?;
        let span_id = u64::from_str_radix(span_id, 16).ok()?;
        let flags = u8::from_str_radix(flags, 16).ok()?;
        if trace_id == 0 || span_id == 0 {
            return None;
        }
        Some(Self {
            trace_id,
            span_id,
            sampled: flags & 0x01 != 0,
        })
    }

    /// Trace id as 32 lowercase hex digits.
    #[must_use]
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    /// Span id as 16 lowercase hex digits.
    #[must_use]
    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_traceparent())
    }
}

fn non_zero<T: PartialEq + Default>(mut generate: impl FnMut() -> T) -> T {
    loop {
        let value = generate();
        if value != T::default() {
            return value;
        }
    }
}
