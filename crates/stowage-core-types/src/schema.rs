//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names identical across the orchestrator,
//! the SQLite collaborators and the test capture layer.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";

// Persistence identifiers
pub const FIELD_ENTITY: &str = "entity";
pub const FIELD_ROW_ID: &str = "row_id";
pub const FIELD_TICKET: &str = "ticket";
pub const FIELD_SQL: &str = "sql";

// Collection sizes
pub const FIELD_OBJECT_COUNT: &str = "object_count";
pub const FIELD_STATEMENT_COUNT: &str = "statement_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

// Target used for statement text emitted before execution
pub const SQL_TARGET: &str = "stowage::sql";
