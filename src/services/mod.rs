//! External collaborators
//!
//! Audit persistence and email delivery sit behind traits so the auth flows
//! can dispatch to them without waiting on or failing because of them.

pub mod audit;
pub mod email;

pub use audit::{AuditEvent, AuditLogger, AuditSink, ClientInfo, TracingAuditSink};
pub use email::{EmailSender, LoggingEmailSender, MemoryEmailSender};
