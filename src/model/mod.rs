mod diagnostic;
mod module;
mod report;
mod usage;

pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use module::{Module, ModuleId, ReexportOrigin, Symbol, SymbolId, SymbolKind, Visibility};
pub use report::{Report, ReportStats, SymbolReport, TargetModule, UnattributedSite, UsageSite};
pub use usage::{
    Candidate, Confidence, DynamicAccess, Outcome, Position, RefContext, RefHead, Reference,
    Resolution, ResolutionStatus, Site, UnattributedUsage, UsageKind, UsageRecord,
};
