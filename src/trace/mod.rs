//! Execution tracing and report generation.

mod events;
mod report;
mod tracer;

pub use events::{
    AgentExchange, CommandExecution, FileOperation, FileOperationKind, Metrics, TestExecution,
    TraceEventType, TracedEvent,
};
pub use report::{build_timeline, ExecutionReport, ReportSummary, TimelineEntry};
pub use tracer::ExecutionTracer;
