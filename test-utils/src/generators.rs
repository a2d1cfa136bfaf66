//! Shared proptest generators for the RPC middleware crates.

use proptest::prelude::*;
use rpc_middleware::{DeclaredException, Response, RpcError};
use std::time::Duration;

/// Generate method names.
pub fn method_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z]{2,20}"
}

/// Generate service slugs.
pub fn service_slug_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{2,20}"
}

/// Generate W3C Trace Context traceparent headers.
pub fn traceparent_strategy() -> impl Strategy<Value = String> {
    (
        Just("00"),
        "[0-9a-f]{32}",
        "[0-9a-f]{16}",
        prop_oneof![Just("00"), Just("01")],
    )
        .prop_map(|(version, trace_id, parent_id, flags)| {
            format!("{version}-{trace_id}-{parent_id}-{flags}")
        })
}

/// Generate status codes, known and unknown.
pub fn status_code_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![
        prop::sample::select(vec![400, 401, 403, 404, 409, 429, 500, 502, 503, 504]),
        100i32..2000,
    ]
}

/// Generate declared exceptions, some carrying a status code.
pub fn declared_exception_strategy() -> impl Strategy<Value = DeclaredException> {
    (
        "[A-Z][a-zA-Z]{2,20}",
        "[a-z ]{0,30}",
        1i16..5,
        prop::option::of(status_code_strategy()),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(type_name, message, slot, code, retryable)| DeclaredException {
            type_name,
            slot,
            message,
            code,
            retryable,
        })
}

/// Generate every kind of call error.
pub fn rpc_error_strategy() -> impl Strategy<Value = RpcError> {
    prop_oneof![
        ("[a-z ]{1,30}", prop::option::of(any::<bool>())).prop_map(|(message, retryable)| {
            RpcError::Transport { message, retryable }
        }),
        (status_code_strategy(), "[a-z ]{1,30}")
            .prop_map(|(code, message)| RpcError::remote(code, message)),
        (status_code_strategy(), "[a-z ]{1,30}", prop::option::of(any::<bool>())).prop_map(
            |(code, message, retryable)| RpcError::Application {
                code,
                message,
                retryable,
            }
        ),
        declared_exception_strategy().prop_map(RpcError::Declared),
        Just(RpcError::Cancelled),
        Just(RpcError::DeadlineExceeded),
        (0u64..60_000).prop_map(|ms| RpcError::circuit_open("svc", Duration::from_millis(ms))),
    ]
}

/// Generate call outcomes: successes, declared exceptions and errors.
pub fn outcome_strategy() -> impl Strategy<Value = Result<Response, RpcError>> {
    prop_oneof![
        "[a-z]{0,16}".prop_map(|body| Ok(Response::success(body))),
        declared_exception_strategy().prop_map(|exc| Ok(Response::exception(exc))),
        rpc_error_strategy().prop_map(Err),
    ]
}

/// Generate remaining deadline budgets, from sub-millisecond to minutes.
pub fn remaining_budget_strategy() -> impl Strategy<Value = Duration> {
    prop_oneof![
        (0u64..1_000_000).prop_map(Duration::from_nanos),
        (1u64..600_000_000).prop_map(Duration::from_micros),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_traceparent_strategy(tp in traceparent_strategy()) {
            let parts: Vec<&str> = tp.split('-').collect();
            prop_assert_eq!(parts.len(), 4);
            prop_assert_eq!(parts[1].len(), 32);
            prop_assert_eq!(parts[2].len(), 16);
        }

        #[test]
        fn test_declared_exception_strategy(exc in declared_exception_strategy()) {
            prop_assert!(!exc.type_name.is_empty());
            prop_assert!(exc.slot >= 1);
        }
    }
}
