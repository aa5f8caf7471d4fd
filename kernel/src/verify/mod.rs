//! Deterministic acceptance-criterion evaluation and fix-task synthesis, plus meta-auditing.

mod auditor;
mod criteria;

pub use auditor::{AuditEntry, AuditSeverity, AuditType, Auditor};
pub use criteria::{VerifyAllResult, Verifier, generate_fix_task};
