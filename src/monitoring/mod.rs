/*!
 * Monitoring
 * Structured tracing for arena operations
 */

mod tracer;

pub use tracer::{init_tracing, OperationSpan, ENV_TRACE_JSON};
