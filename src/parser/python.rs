use crate::define_parser;
use crate::model::Position;
use crate::parser::common::first_error;
use crate::parser::{LanguageParser, ParseError, ParsedSource};
use std::path::Path;

define_parser!(PYTHON_PARSER, tree_sitter_python::LANGUAGE);

pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageParser for PythonParser {
    fn extensions(&self) -> &[&str] {
        &["py", "pyi"]
    }

    fn parse_source(&self, path: &Path, source: String) -> Result<ParsedSource, ParseError> {
        let tree = PYTHON_PARSER
            .with(|parser| parser.borrow_mut().parse(&source, None))
            .ok_or_else(|| ParseError::Parse("Failed to parse file".to_string()))?;

        if let Some(error) = first_error(tree.root_node()) {
            let position = Position::from_point(error.start_position());
            return Err(ParseError::Syntax {
                line: position.line,
                column: position.column,
            });
        }

        Ok(ParsedSource::new(path.to_path_buf(), source, tree))
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}
