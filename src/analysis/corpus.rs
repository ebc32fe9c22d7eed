use crate::analysis::exports::ModuleDraft;
use crate::analysis::imports::{FileImports, ModuleNames};
use crate::model::{Module, ModuleId, Symbol, SymbolId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The frozen module and symbol arenas, plus each module's import bindings.
///
/// Built once after every per-file extraction has finished and never mutated
/// afterwards, so resolution can share it across threads without locking.
#[derive(Debug)]
pub struct Corpus {
    modules: Vec<Module>,
    symbols: Vec<Symbol>,
    imports: Vec<FileImports>,
    names: ModuleNames,
    by_name: HashMap<String, ModuleId>,
    by_path: HashMap<PathBuf, ModuleId>,
    targets: BTreeSet<ModuleId>,
}

impl Corpus {
    /// Assign ids in path order and freeze. `files` must be sorted by path so
    /// ids are stable across runs.
    pub fn freeze(
        files: Vec<(ModuleDraft, FileImports)>,
        targets: &HashSet<PathBuf>,
        names: ModuleNames,
    ) -> Self {
        let mut corpus = Self {
            modules: Vec::with_capacity(files.len()),
            symbols: Vec::new(),
            imports: Vec::with_capacity(files.len()),
            names,
            by_name: HashMap::new(),
            by_path: HashMap::new(),
            targets: BTreeSet::new(),
        };

        for (draft, imports) in files {
            let id = ModuleId(corpus.modules.len());
            let mut module = Module::new(id, draft.path.clone(), draft.name.clone());
            module.lines = draft.lines;
            module.export_list = draft.export_list;
            module.star_reexports = draft.star_reexports;

            for symbol in draft.symbols {
                let symbol_id = SymbolId(corpus.symbols.len());
                let visibility = symbol.visibility();
                if symbol.exported {
                    module.exports.insert(symbol.name.clone(), symbol_id);
                } else {
                    module.private.insert(symbol.name.clone(), symbol_id);
                }
                corpus.symbols.push(Symbol {
                    id: symbol_id,
                    qualified_name: format!("{}.{}", draft.name, symbol.name),
                    name: symbol.name,
                    kind: symbol.kind,
                    module: id,
                    visibility,
                    line: symbol.line,
                    docstring: symbol.docstring,
                    origin: symbol.origin,
                });
            }

            if targets.contains(&draft.path) {
                corpus.targets.insert(id);
            }
            // First file (in path order) wins a contested module name.
            corpus.by_name.entry(draft.name).or_insert(id);
            corpus.by_path.insert(draft.path, id);
            corpus.modules.push(module);
            corpus.imports.push(imports);
        }

        corpus
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn module_at(&self, path: &Path) -> Option<&Module> {
        self.by_path.get(path).map(|id| self.module(*id))
    }

    pub fn imports(&self, id: ModuleId) -> &FileImports {
        &self.imports[id.0]
    }

    pub fn names(&self) -> &ModuleNames {
        &self.names
    }

    pub fn is_target(&self, id: ModuleId) -> bool {
        self.targets.contains(&id)
    }

    pub fn is_target_symbol(&self, id: SymbolId) -> bool {
        self.is_target(self.symbol(id).module)
    }

    pub fn is_target_module_name(&self, name: &str) -> bool {
        self.module_id(name).is_some_and(|id| self.is_target(id))
    }

    pub fn target_modules(&self) -> impl Iterator<Item = &Module> {
        self.targets.iter().map(|id| self.module(*id))
    }

    /// Every symbol owned by a target module, in id order.
    pub fn target_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .iter()
            .filter(|symbol| self.targets.contains(&symbol.module))
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::analysis::discover::module_name;
    use crate::analysis::exports::extract;
    use crate::analysis::imports::collect_imports;
    use crate::fs::mock::MockFs;
    use crate::parser::parse_snippet;

    /// Freeze an in-memory corpus. Paths ending in `__init__.py` mark
    /// packages; `targets` lists the target file paths.
    pub fn corpus(files: &[(&str, &str)], targets: &[&str]) -> Corpus {
        let fs = MockFs::with_files(files.iter().copied());
        let mut files: Vec<(&str, &str)> = files.to_vec();
        files.sort();

        let named: Vec<(String, &str, &str)> = files
            .iter()
            .map(|(path, source)| (module_name(Path::new(path), &fs), *path, *source))
            .collect();
        let names = ModuleNames::new(named.iter().map(|(name, _, _)| name.clone()));

        let drafts = named
            .iter()
            .map(|(name, path, source)| {
                let parsed = parse_snippet(path, source);
                let module = Module::new(ModuleId(0), PathBuf::from(path), name.clone());
                let package = module.package().to_string();
                (
                    extract(&parsed, name, &package, &names),
                    collect_imports(&parsed, &package),
                )
            })
            .collect();

        let targets: HashSet<PathBuf> = targets.iter().map(PathBuf::from).collect();
        Corpus::freeze(drafts, &targets, names)
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::corpus;
    use super::*;
    use crate::model::{SymbolKind, Visibility};

    #[test]
    fn test_freeze_assigns_ids_in_path_order() {
        let corpus = corpus(
            &[
                ("/p/zeta.py", "def z(): pass\n"),
                ("/p/alpha.py", "def a(): pass\ndef _b(): pass\n"),
            ],
            &["/p/alpha.py"],
        );
        assert_eq!(corpus.module(ModuleId(0)).name, "alpha");
        assert_eq!(corpus.module(ModuleId(1)).name, "zeta");

        let alpha = corpus.module_at(Path::new("/p/alpha.py")).unwrap();
        let a = corpus.symbol(alpha.exports["a"]);
        assert_eq!(a.qualified_name, "alpha.a");
        assert_eq!(a.kind, SymbolKind::Function);
        let b = corpus.symbol(alpha.private["_b"]);
        assert_eq!(b.visibility, Visibility::Private);

        assert!(corpus.is_target(alpha.id));
        assert!(!corpus.is_target_module_name("zeta"));
        assert_eq!(corpus.target_symbols().count(), 2);
    }
}
