use crate::analysis::aggregate::UsageSet;
use crate::analysis::corpus::Corpus;
use crate::model::{
    Confidence, Outcome, RefContext, Reference, Resolution, Site, SymbolId, SymbolKind,
    UnattributedUsage, UsageKind, UsageRecord,
};

/// Usage kind of a reference that resolved to a symbol of `kind`, with
/// `trailing` chain attributes left over after the symbol.
pub fn usage_kind(reference: &Reference, kind: SymbolKind, trailing: usize) -> UsageKind {
    if reference
        .dynamic
        .as_ref()
        .is_some_and(|d| d.function == "hasattr")
    {
        return UsageKind::Unknown;
    }

    match reference.context {
        RefContext::ReExport => UsageKind::ReExport,
        RefContext::ImportOnly | RefContext::ClassBase | RefContext::Annotation => UsageKind::Unknown,
        RefContext::Store | RefContext::Delete => {
            if reference.attrs.is_empty() {
                UsageKind::Unknown
            } else {
                UsageKind::AttributeWrite
            }
        }
        RefContext::Call if trailing == 0 => {
            if kind == SymbolKind::Class {
                UsageKind::Instantiate
            } else {
                UsageKind::Call
            }
        }
        RefContext::Call | RefContext::Load => UsageKind::AttributeRead,
    }
}

/// Turn one resolution into usage records for target symbols.
///
/// Ambiguous resolutions yield one record per candidate. A candidate reached
/// through re-exports also credits every target re-export on its route, so a
/// public name stays used when its definition lives elsewhere. Dereferenced
/// instances and computed reflective names cannot be attributed to a symbol's
/// own surface and are kept as unattributed usages.
pub fn classify(reference: &Reference, resolution: &Resolution, corpus: &Corpus) -> UsageSet {
    let mut usage = UsageSet::default();
    let computed = reference.dynamic.as_ref().is_some_and(|d| !d.literal);

    match &resolution.outcome {
        Outcome::Symbols(candidates) => {
            let confidence = if candidates.len() > 1 {
                resolution.confidence.min(Confidence::Possible)
            } else {
                resolution.confidence
            };
            let mut credited: Vec<(SymbolId, UsageKind)> = Vec::new();
            for candidate in candidates {
                let kind = usage_kind(reference, corpus.symbol(candidate.symbol).kind, candidate.trailing);
                for id in candidate.via.iter().chain(std::iter::once(&candidate.symbol)) {
                    if corpus.is_target_symbol(*id) && !credited.iter().any(|(seen, _)| seen == id) {
                        credited.push((*id, kind));
                    }
                }
            }

            if computed {
                if !credited.is_empty() {
                    let via = credited.iter().map(|(id, _)| *id).collect();
                    usage.unattributed.push(unattributed(reference, UsageKind::Unknown, via));
                }
                return usage;
            }

            for (symbol, kind) in credited {
                usage.records.push(UsageRecord {
                    symbol,
                    site: Site::of(reference),
                    kind,
                    confidence,
                });
            }
        }
        Outcome::Instance(constructors) => {
            let via: Vec<SymbolId> = constructors
                .iter()
                .copied()
                .filter(|id| corpus.is_target_symbol(*id))
                .collect();
            if !via.is_empty() {
                let kind = if computed {
                    UsageKind::Unknown
                } else {
                    UsageKind::UnresolvedThroughInstance
                };
                usage.unattributed.push(unattributed(reference, kind, via));
            }
        }
        Outcome::Module(module) => {
            if computed && corpus.is_target_module_name(module) {
                usage
                    .unattributed
                    .push(unattributed(reference, UsageKind::Unknown, Vec::new()));
            }
        }
        Outcome::Unresolved => {}
    }

    usage
}

fn unattributed(reference: &Reference, kind: UsageKind, via: Vec<SymbolId>) -> UnattributedUsage {
    UnattributedUsage {
        site: Site::of(reference),
        kind,
        confidence: Confidence::Possible,
        via,
    }
}
