use crate::analysis::corpus::Corpus;
use crate::analysis::imports::{Binding, FileImports, join_name};
use crate::model::{
    Candidate, Confidence, Diagnostic, ModuleId, Outcome, Position, RefHead, Reference,
    Resolution, ResolutionStatus, SymbolId,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Intermediate value reached while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Symbol(Candidate),
    Module(String),
    /// Result of calling these symbols; `dereferenced` once an attribute of
    /// the result has been taken.
    Instance {
        constructors: Vec<SymbolId>,
        dereferenced: bool,
    },
}

type Paths = Vec<(Value, Confidence)>;

fn downgrade(paths: Paths, confidence: Confidence) -> Paths {
    paths
        .into_iter()
        .map(|(value, c)| (value, c.min(confidence)))
        .collect()
}

/// State of one resolution attempt.
#[derive(Default)]
struct Trace {
    /// `(module, name)` lookups in progress on the current path.
    stack: Vec<(ModuleId, String)>,
    /// Alias names being expanded, guarding `a = a.b` style loops.
    aliases: Vec<String>,
    /// Modules whose wildcard surface is being expanded.
    stars: Vec<ModuleId>,
    cycles: usize,
    diagnostics: Vec<Diagnostic>,
}

/// Resolves references against the frozen corpus.
pub struct Resolver<'c> {
    corpus: &'c Corpus,
}

impl<'c> Resolver<'c> {
    pub fn new(corpus: &'c Corpus) -> Self {
        Self { corpus }
    }

    /// Produce exactly one resolution for `reference`, plus any diagnostics
    /// raised along the way (cycles, ambiguity).
    pub fn resolve(&self, reference: &Reference, imports: &FileImports) -> (Resolution, Vec<Diagnostic>) {
        let mut trace = Trace::default();

        let heads = match &reference.head {
            RefHead::Name(name) => self.resolve_name(name, imports, &mut trace),
            RefHead::CallResult(callee) => called(self.resolve_chain(callee, imports, &mut trace)),
        };
        let paths = self.walk(heads, &reference.attrs, &mut trace);
        let mut resolution = settle(paths);

        if reference.dynamic.is_some() || reference.rebound {
            resolution.confidence = Confidence::Possible;
        }

        if resolution.status() == ResolutionStatus::Ambiguous {
            let names: Vec<String> = resolution
                .candidates()
                .iter()
                .map(|c| self.corpus.symbol(c.symbol).qualified_name.clone())
                .collect();
            trace.diagnostics.push(Diagnostic::ambiguous_resolution(
                reference.file.clone(),
                reference.position,
                &reference.written(),
                &names,
            ));
        }

        trace!(
            "{}:{} {} -> {:?}",
            reference.file.display(),
            reference.position,
            reference.written(),
            resolution.outcome
        );
        (resolution, trace.diagnostics)
    }

    fn resolve_name(&self, name: &str, imports: &FileImports, trace: &mut Trace) -> Paths {
        let bindings = imports.binding(name);
        let mut paths = Vec::new();

        if bindings.is_empty() {
            for module in &imports.wildcards {
                let found = self.lookup_wildcard(module, name, trace);
                paths.extend(downgrade(found, Confidence::Possible));
            }
            return paths;
        }

        for binding in bindings {
            match binding {
                Binding::Module(module) => paths.push((Value::Module(module.clone()), Confidence::Definite)),
                Binding::From { module, name } => paths.extend(self.lookup(module, name, trace)),
                Binding::Alias(chain) | Binding::Instance(chain) => {
                    if trace.aliases.iter().any(|a| a == name) {
                        continue;
                    }
                    trace.aliases.push(name.to_string());
                    let mut found = self.resolve_chain(chain, imports, trace);
                    trace.aliases.pop();
                    if matches!(binding, Binding::Instance(_)) {
                        found = called(found);
                    }
                    paths.extend(downgrade(found, Confidence::Possible));
                }
            }
        }
        paths
    }

    fn resolve_chain(&self, chain: &[String], imports: &FileImports, trace: &mut Trace) -> Paths {
        let Some((head, rest)) = chain.split_first() else {
            return Vec::new();
        };
        let heads = self.resolve_name(head, imports, trace);
        self.walk(heads, rest, trace)
    }

    /// Follow `attrs` from every path.
    fn walk(&self, paths: Paths, attrs: &[String], trace: &mut Trace) -> Paths {
        let mut out = Vec::new();
        for (value, confidence) in paths {
            match value {
                Value::Symbol(mut candidate) => {
                    candidate.trailing += attrs.len();
                    out.push((Value::Symbol(candidate), confidence));
                }
                Value::Instance { constructors, dereferenced } => {
                    out.push((
                        Value::Instance {
                            constructors,
                            dereferenced: dereferenced || !attrs.is_empty(),
                        },
                        confidence,
                    ));
                }
                Value::Module(module) => match attrs.split_first() {
                    None => out.push((Value::Module(module), confidence)),
                    Some((attr, rest)) => {
                        let next = downgrade(self.lookup(&module, attr, trace), confidence);
                        out.extend(self.walk(next, rest, trace));
                    }
                },
            }
        }
        out
    }

    /// `module.name`, following re-exports. Empty when nothing matches or the
    /// path runs into a cycle.
    fn lookup(&self, module: &str, name: &str, trace: &mut Trace) -> Paths {
        let Some(id) = self.corpus.module_id(module) else {
            // Namespace package or external module.
            let submodule = join_name(module, name);
            return if self.corpus.names().is_known(&submodule) {
                vec![(Value::Module(submodule), Confidence::Definite)]
            } else {
                Vec::new()
            };
        };

        if let Some(start) = trace
            .stack
            .iter()
            .position(|(m, n)| *m == id && n == name)
        {
            let cycle = trace.stack[start..].to_vec();
            self.record_cycle(&cycle, trace);
            return Vec::new();
        }

        trace.stack.push((id, name.to_string()));
        let paths = self.lookup_in(id, name, trace);
        trace.stack.pop();
        paths
    }

    fn lookup_in(&self, id: ModuleId, name: &str, trace: &mut Trace) -> Paths {
        let module = self.corpus.module(id);

        if let Some(symbol_id) = module.lookup(name) {
            let symbol = self.corpus.symbol(symbol_id);
            let own = Value::Symbol(Candidate::new(symbol_id));
            let Some(origin) = &symbol.origin else {
                return vec![(own, Confidence::Definite)];
            };

            let cycles_before = trace.cycles;
            let followed = match &origin.name {
                Some(origin_name) => self.lookup(&origin.module, origin_name, trace),
                None if self.corpus.names().is_known(&origin.module) => {
                    vec![(Value::Module(origin.module.clone()), Confidence::Definite)]
                }
                None => Vec::new(),
            };
            if !followed.is_empty() {
                return through(followed, symbol_id);
            }
            if trace.cycles > cycles_before {
                return Vec::new();
            }
            // Origin outside the corpus: the re-export is as far as we get.
            return vec![(own, Confidence::Possible)];
        }

        let submodule = join_name(&module.name, name);
        if self.corpus.names().is_known(&submodule) {
            return vec![(Value::Module(submodule), Confidence::Definite)];
        }

        // Names the module imports without re-exporting them.
        let mut paths = Vec::new();
        for binding in self.corpus.imports(id).binding(name) {
            match binding {
                Binding::Module(target) => {
                    paths.push((Value::Module(target.clone()), Confidence::Possible));
                }
                Binding::From { module, name } => {
                    let found = self.lookup(module, name, trace);
                    paths.extend(downgrade(found, Confidence::Possible));
                }
                Binding::Alias(_) | Binding::Instance(_) => {}
            }
        }
        if !paths.is_empty() {
            return paths;
        }

        for star in &module.star_reexports {
            let found = self.lookup_wildcard(star, name, trace);
            paths.extend(downgrade(found, Confidence::Possible));
        }
        paths
    }

    /// `name` as brought in by `from module import *`: exported names only,
    /// including those the module itself pulls in with wildcards.
    fn lookup_wildcard(&self, module: &str, name: &str, trace: &mut Trace) -> Paths {
        let Some(id) = self.corpus.module_id(module) else {
            return Vec::new();
        };
        let target = self.corpus.module(id);
        if target.exports.contains_key(name) {
            return self.lookup(module, name, trace);
        }
        if target.export_list.is_some() || trace.stars.contains(&id) {
            return Vec::new();
        }

        trace.stars.push(id);
        let mut paths = Vec::new();
        for star in &target.star_reexports {
            paths.extend(self.lookup_wildcard(star, name, trace));
        }
        trace.stars.pop();
        paths
    }

    /// Record a cyclic path. The cycle is rotated to start at its smallest
    /// `(module, name)` entry so every entry point yields the same diagnostic.
    fn record_cycle(&self, cycle: &[(ModuleId, String)], trace: &mut Trace) {
        trace.cycles += 1;
        let Some(start) = (0..cycle.len()).min_by_key(|i| {
            let (id, name) = &cycle[*i];
            (self.corpus.module(*id).name.as_str(), name.as_str())
        }) else {
            return;
        };

        let rotated: Vec<&(ModuleId, String)> =
            cycle[start..].iter().chain(cycle[..start].iter()).collect();
        let (lead_id, lead_name) = rotated[0];
        let lead = self.corpus.module(*lead_id);

        let mut modules: Vec<String> = rotated
            .iter()
            .map(|(id, _)| self.corpus.module(*id).name.clone())
            .collect();
        modules.push(lead.name.clone());

        let position = lead
            .lookup(lead_name)
            .map(|s| Position::new(self.corpus.symbol(s).line, 1));
        trace
            .diagnostics
            .push(Diagnostic::cyclic_reexport(lead.path.clone(), position, &modules));
    }
}

/// Mark every symbol path as reached through the re-export `reexport`.
fn through(paths: Paths, reexport: SymbolId) -> Paths {
    paths
        .into_iter()
        .map(|(value, confidence)| match value {
            Value::Symbol(mut candidate) => {
                candidate.via.insert(0, reexport);
                (Value::Symbol(candidate), confidence)
            }
            other => (other, confidence),
        })
        .collect()
}

/// The values produced by calling each path.
fn called(paths: Paths) -> Paths {
    paths
        .into_iter()
        .filter_map(|(value, confidence)| match value {
            Value::Symbol(candidate) => Some((
                Value::Instance {
                    constructors: vec![candidate.symbol],
                    dereferenced: false,
                },
                confidence,
            )),
            Value::Instance { constructors, .. } => Some((
                Value::Instance {
                    constructors,
                    dereferenced: false,
                },
                confidence,
            )),
            Value::Module(_) => None,
        })
        .collect()
}

/// Collapse every path into one resolution. Symbols win over instances,
/// instances over modules. Each candidate keeps its best confidence; the
/// resolution takes the weakest, and ambiguity makes it `possible`.
fn settle(paths: Paths) -> Resolution {
    let mut symbols: BTreeMap<SymbolId, (usize, Confidence, Vec<SymbolId>)> = BTreeMap::new();
    let mut constructors: BTreeSet<SymbolId> = BTreeSet::new();
    let mut modules: Vec<(String, Confidence)> = Vec::new();

    for (value, confidence) in paths {
        match value {
            Value::Symbol(candidate) => {
                let entry = symbols
                    .entry(candidate.symbol)
                    .or_insert((candidate.trailing, confidence, Vec::new()));
                entry.0 = entry.0.min(candidate.trailing);
                entry.1 = entry.1.max(confidence);
                for reexport in candidate.via {
                    if !entry.2.contains(&reexport) {
                        entry.2.push(reexport);
                    }
                }
            }
            Value::Instance {
                constructors: ctors,
                dereferenced: true,
            } => constructors.extend(ctors),
            Value::Instance { .. } => {}
            Value::Module(module) => modules.push((module, confidence)),
        }
    }

    if !symbols.is_empty() {
        let ambiguous = symbols.len() > 1;
        let mut confidence = symbols
            .values()
            .map(|(_, c, _)| *c)
            .min()
            .unwrap_or(Confidence::Possible);
        if ambiguous {
            confidence = Confidence::Possible;
        }
        let candidates = symbols
            .into_iter()
            .map(|(symbol, (trailing, _, via))| Candidate {
                symbol,
                trailing,
                via,
            })
            .collect();
        return Resolution {
            outcome: Outcome::Symbols(candidates),
            confidence,
        };
    }

    if !constructors.is_empty() {
        return Resolution {
            outcome: Outcome::Instance(constructors.into_iter().collect()),
            confidence: Confidence::Possible,
        };
    }

    match modules.into_iter().next() {
        Some((module, confidence)) => Resolution {
            outcome: Outcome::Module(module),
            confidence,
        },
        None => Resolution::unresolved(),
    }
}
