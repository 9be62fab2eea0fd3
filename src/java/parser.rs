#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt::Formatter, ops::Range};

use anyhow::{Context, Result, anyhow};
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator, Tree};

use crate::Dict;

#[derive(Clone)]
/// A struct that wraps a tree-sitter parse tree and the source code it came
/// from
pub struct Parser {
    /// the source code being parsed
    code: String,
    /// the parse tree
    tree: Tree,
    /// the tree-sitter java grammar language
    lang: tree_sitter::Language,
}

/// Returns the compiled tree-sitter Java language.
fn java_language() -> tree_sitter::Language {
    tree_sitter_java::LANGUAGE.into()
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("bytes", &self.code.len())
            .finish_non_exhaustive()
    }
}

/// One captured node from a query match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHit {
    /// Name of the capture, without the leading `@`.
    pub name:   String,
    /// Source text of the captured node.
    pub text:   String,
    /// 1-based line of the node start.
    pub line:   usize,
    /// 1-based column of the node start.
    pub column: usize,
    /// Byte range of the node in the source.
    pub bytes:  Range<usize>,
}

/// Location and description of the first syntax problem in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxProblem {
    /// Human readable description.
    pub message: String,
    /// 1-based line.
    pub line:    usize,
    /// 1-based column.
    pub column:  usize,
}

impl Parser {
    /// Returns a new parser object
    ///
    /// * `source_code`: the source code to be parsed
    pub fn new(source_code: String) -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        let language = java_language();

        parser
            .set_language(&language)
            .with_context(|| "Failed to load Java grammar")?;
        let tree = parser
            .parse(source_code.as_str(), None)
            .ok_or_else(|| anyhow!("Error parsing Java code"))?;

        Ok(Self {
            code: source_code,
            tree,
            lang: language,
        })
    }

    /// A getter for parser's source code
    pub fn code(&self) -> &str {
        self.code.as_str()
    }

    /// Root node of the parse tree.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text of `node`, or an empty string when the node does not map
    /// onto valid UTF-8.
    pub fn text_of(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.code.as_bytes()).unwrap_or_default()
    }

    /// Compiles `q` against the Java grammar.
    pub fn compile_query(q: &str) -> Result<Query> {
        Query::new(&java_language(), q)
            .with_context(|| format!("Failed to compile tree-sitter query: {q}"))
    }

    /// Returns the first `ERROR` or `MISSING` node in document order, if any.
    pub fn first_syntax_problem(&self) -> Option<SyntaxProblem> {
        let root = self.tree.root_node();
        if !root.has_error() {
            return None;
        }

        let mut cursor = root.walk();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.is_error() || node.is_missing() {
                let position = node.start_position();
                let message = if node.is_missing() {
                    format!("missing `{}`", node.kind())
                } else {
                    let snippet: String = self.text_of(node).chars().take(40).collect();
                    format!("unexpected `{}`", snippet.trim())
                };
                return Some(SyntaxProblem {
                    message,
                    line: position.row + 1,
                    column: position.column + 1,
                });
            }
            if !node.has_error() {
                continue;
            }
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }

        // has_error was set but no node was flagged; report the root.
        Some(SyntaxProblem {
            message: "unparseable source".to_string(),
            line:    1,
            column:  1,
        })
    }

    /// Applies a tree sitter query and returns the result as a collection of
    /// HashMaps
    ///
    /// * `q`: the tree-sitter query to be applied
    pub fn query(&self, q: &str) -> Result<Vec<Dict>> {
        let mut results = vec![];
        let query = Query::new(&self.lang, q)
            .with_context(|| format!("Failed to compile tree-sitter query: {q}"))?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, self.tree.root_node(), self.code.as_bytes());
        let mut capture_indices = Vec::new();

        for name in query.capture_names() {
            let index = query
                .capture_index_for_name(name)
                .ok_or_else(|| anyhow!("Capture name {name} has no index associated."))?;
            capture_indices.push((index, name.to_string()));
        }

        while let Some(m) = matches.next() {
            let mut result = Dict::new();

            for (index, name) in &capture_indices {
                let value = match m.captures.iter().find(|c| c.index == *index) {
                    Some(v) => v,
                    None => continue,
                };

                let value = value
                    .node
                    .utf8_text(self.code.as_bytes())
                    .with_context(|| {
                        format!(
                            "Cannot match query result indices with source code for capture name: \
                             {name}."
                        )
                    })?;

                result.insert(name.clone(), value.to_string());
            }
            results.push(result);
        }

        Ok(results)
    }

    /// Runs `q` and returns every capture of every match, restricted to
    /// `range` when given. Captures come back in match order.
    pub fn query_hits(&self, q: &str, range: Option<Range<usize>>) -> Result<Vec<CaptureHit>> {
        let query = Query::new(&self.lang, q)
            .with_context(|| format!("Failed to compile tree-sitter query: {q}"))?;
        self.hits_for(&query, range)
    }

    /// Same as [`Parser::query_hits`] for an already compiled query.
    pub fn hits_for(&self, query: &Query, range: Option<Range<usize>>) -> Result<Vec<CaptureHit>> {
        let names = query.capture_names();
        let mut cursor = QueryCursor::new();
        if let Some(range) = range.clone() {
            cursor.set_byte_range(range);
        }

        let mut matches = cursor.matches(query, self.tree.root_node(), self.code.as_bytes());
        let mut results = Vec::new();

        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                // the cursor also yields nodes that merely overlap the range
                if let Some(range) = range.as_ref() {
                    if node.start_byte() < range.start || node.end_byte() > range.end {
                        continue;
                    }
                }
                let text = node
                    .utf8_text(self.code.as_bytes())
                    .context("Cannot map capture to source text")?;
                let name = names
                    .get(capture.index as usize)
                    .ok_or_else(|| anyhow!("Capture index {} has no name", capture.index))?;
                let position = node.start_position();
                results.push(CaptureHit {
                    name:   name.to_string(),
                    text:   text.to_string(),
                    line:   position.row + 1,
                    column: position.column + 1,
                    bytes:  node.byte_range(),
                });
            }
        }

        Ok(results)
    }

    /// Returns the text and 1-based starting line number for each occurrence of
    /// the requested capture in the supplied query.
    pub fn query_capture_positions(
        &self,
        q: &str,
        capture_name: &str,
    ) -> Result<Vec<(String, usize)>> {
        let query = Query::new(&self.lang, q)
            .with_context(|| format!("Failed to compile tree-sitter query: {q}"))?;
        if query.capture_index_for_name(capture_name).is_none() {
            return Err(anyhow!("Capture name {capture_name} not present in query"));
        }

        Ok(self
            .hits_for(&query, None)?
            .into_iter()
            .filter(|hit| hit.name == capture_name)
            .map(|hit| (hit.text, hit.line))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_source_has_no_syntax_problem() {
        let parser = Parser::new("class A { void f() {} }".to_string()).expect("parse");
        assert_eq!(parser.first_syntax_problem(), None);
    }

    #[test]
    fn missing_semicolon_is_located() {
        let code = "class A {\n  void f() {\n    int x = 1\n  }\n}\n";
        let parser = Parser::new(code.to_string()).expect("parse");
        let problem = parser.first_syntax_problem().expect("problem");
        assert!((3..=4).contains(&problem.line), "{problem:?}");
    }

    #[test]
    fn query_hits_honour_byte_range() {
        let code = "class A { void f() { if (true) {} } void g() { if (true) {} } }";
        let parser = Parser::new(code.to_string()).expect("parse");
        let all = parser
            .query_hits("(if_statement) @if", None)
            .expect("query");
        assert_eq!(all.len(), 2);

        let g_start = code.find("void g").expect("g");
        let scoped = parser
            .query_hits("(if_statement) @if", Some(g_start..code.len()))
            .expect("query");
        assert_eq!(scoped.len(), 1);
        assert!(scoped[0].bytes.start > g_start);
    }
}
