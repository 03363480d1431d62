//! Canonical field keys and event names for structured logging
//!
//! Every repository and population boundary logs with these keys so that
//! log pipelines (and the test capture layer) can filter consistently.

// Canonical field keys
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Repository context
pub const FIELD_ENTITY_KEY: &str = "entity_key";
pub const FIELD_BACKEND: &str = "backend";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
/// Emitted when a criteria set short-circuits without touching storage
pub const EVENT_VACUOUS: &str = "vacuous";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_distinct() {
        let names = [EVENT_START, EVENT_END, EVENT_END_ERROR, EVENT_VACUOUS];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_error_keys_are_namespaced() {
        assert!(FIELD_ERR_KIND.starts_with("err."));
        assert!(FIELD_ERR_CODE.starts_with("err."));
    }
}
