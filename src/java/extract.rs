#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;
use tree_sitter::{Node, Query};

use crate::java::{
    model::{
        CodeBlock, Construct, ConstructUsage, MethodDecl, NameRef, Operator, Parameter, SourceModel, TypeDecl, TypeKind,
    },
    parser::Parser,
    queries::{CONSTRUCT_QUERY, DECLARED_NAME_QUERY, FIELD_QUERY, OPERATOR_QUERY, SELF_CALL_QUERY},
};

/// Why a source could not be turned into a [`SourceModel`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// The source does not parse into declarations.
    #[error("syntax error{}: {message}", location(.line, .column))]
    Syntax {
        /// What went wrong.
        message: String,
        /// 1-based line, when known.
        line:    Option<usize>,
        /// 1-based column, when known.
        column:  Option<usize>,
    },
}

impl ExtractionError {
    /// Line of the problem, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ExtractionError::Syntax { line, .. } => *line,
        }
    }
}

/// Formats ` at L:C` for error messages.
fn location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(l), Some(c)) => format!(" at {l}:{c}"),
        (Some(l), None) => format!(" at line {l}"),
        _ => String::new(),
    }
}

/// Removes all whitespace from a type so `Map<String, Integer>` and
/// `Map<String,Integer>` compare equal.
pub fn normalize_type(text: &str) -> String {
    text.split_whitespace().collect()
}

/// Queries run against every method body, compiled once per extraction.
struct UsageQueries {
    /// Control-flow constructs.
    constructs: Query,
    /// Operator tokens.
    operators:  Query,
    /// Unqualified calls, for recursion.
    self_calls: Query,
    /// Names a body can declare.
    declared:   Query,
}

impl UsageQueries {
    /// Compiles the bundled queries.
    fn compile() -> Result<Self> {
        Ok(Self {
            constructs: Parser::compile_query(CONSTRUCT_QUERY)?,
            operators:  Parser::compile_query(OPERATOR_QUERY)?,
            self_calls: Parser::compile_query(SELF_CALL_QUERY)?,
            declared:   Parser::compile_query(DECLARED_NAME_QUERY)?,
        })
    }
}

/// Parses `source` and builds its [`SourceModel`].
///
/// Fails on any `ERROR`/`MISSING` node and on sources that declare no
/// top-level type. The primary type is the public type named
/// `expected_class`; failing that, any type with that name; failing that,
/// the first declared type.
pub fn extract(source: &str, expected_class: Option<&str>) -> Result<SourceModel, ExtractionError> {
    let parser = Parser::new(source.to_owned()).map_err(|e| ExtractionError::Syntax {
        message: format!("{e:#}"),
        line:    None,
        column:  None,
    })?;

    if let Some(problem) = parser.first_syntax_problem() {
        debug!(line = problem.line, column = problem.column, "{}", problem.message);
        return Err(ExtractionError::Syntax {
            message: problem.message,
            line:    Some(problem.line),
            column:  Some(problem.column),
        });
    }

    let (types, fields) = collect_types(&parser)
        .and_then(|types| Ok((types, field_names(&parser)?)))
        .map_err(|e| ExtractionError::Syntax {
            message: format!("{e:#}"),
            line:    None,
            column:  None,
        })?;

    if types.is_empty() {
        return Err(ExtractionError::Syntax {
            message: "no top-level type declaration".to_string(),
            line:    Some(1),
            column:  Some(1),
        });
    }

    let primary = expected_class
        .and_then(|name| {
            types
                .iter()
                .position(|t| t.public && t.name == name)
                .or_else(|| types.iter().position(|t| t.name == name))
        })
        .unwrap_or(0);

    Ok(SourceModel::new(types, primary, fields, parser))
}

/// Collects every top-level type declaration in source order.
fn collect_types(parser: &Parser) -> Result<Vec<TypeDecl>> {
    let queries = UsageQueries::compile()?;
    let root = parser.root();
    let mut cursor = root.walk();
    let mut types = Vec::new();

    for node in root.named_children(&mut cursor) {
        if let Some(kind) = type_kind(node.kind()) {
            types.push(type_decl(parser, &queries, node, kind)?);
        }
    }

    Ok(types)
}

/// Kind of a type declaration node.
fn type_kind(node_kind: &str) -> Option<TypeKind> {
    Some(match node_kind {
        "class_declaration" => TypeKind::Class,
        "interface_declaration" => TypeKind::Interface,
        "enum_declaration" => TypeKind::Enum,
        "record_declaration" => TypeKind::Record,
        _ => return None,
    })
}

/// Every field-like name declared in the file.
fn field_names(parser: &Parser) -> Result<BTreeSet<String>> {
    Ok(parser
        .query_hits(FIELD_QUERY, None)?
        .into_iter()
        .map(|hit| hit.text)
        .collect())
}

/// Builds one [`TypeDecl`].
fn type_decl(parser: &Parser, queries: &UsageQueries, node: Node<'_>, kind: TypeKind) -> Result<TypeDecl> {
    let name = node
        .child_by_field_name("name")
        .map(|n| parser.text_of(n).to_string())
        .context("type declaration without a name")?;
    let public = modifiers(parser, node).iter().any(|m| m == "public");

    let mut methods = Vec::new();
    let mut blocks = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        for member in members(body) {
            let label = match member.kind() {
                "method_declaration" => {
                    methods.push(method_decl(parser, queries, member)?);
                    continue;
                }
                "constructor_declaration" | "compact_constructor_declaration" => {
                    format!("the constructor of `{name}`")
                }
                "static_initializer" => format!("a static initializer of `{name}`"),
                "block" => format!("an instance initializer of `{name}`"),
                "field_declaration" | "constant_declaration" => format!("a field initializer of `{name}`"),
                "enum_constant" => {
                    let constant = member
                        .child_by_field_name("name")
                        .map(|n| parser.text_of(n))
                        .unwrap_or_default();
                    format!("enum constant `{name}.{constant}`")
                }
                other => {
                    let Some(nested_kind) = type_kind(other) else {
                        continue;
                    };
                    let nested = type_decl(parser, queries, member, nested_kind)?;
                    blocks.extend(nested.methods.into_iter().map(|m| CodeBlock {
                        label: format!("`{}.{}`", nested.name, m.name),
                        line:  m.line,
                        usage: m.usage,
                    }));
                    blocks.extend(nested.blocks);
                    continue;
                }
            };

            let usage = usage(parser, queries, "", member.byte_range())?;
            if !usage.is_empty() {
                blocks.push(CodeBlock {
                    label,
                    line: member.start_position().row + 1,
                    usage,
                });
            }
        }
    }

    Ok(TypeDecl {
        name,
        kind,
        public,
        line: node.start_position().row + 1,
        methods,
        blocks,
    })
}

/// Direct members of a type body. Enum bodies keep their members in a
/// nested `enum_body_declarations` node.
fn members(body: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = body.walk();
    let mut out = Vec::new();
    for child in body.named_children(&mut cursor) {
        if child.kind() == "enum_body_declarations" {
            let mut inner = child.walk();
            out.extend(child.named_children(&mut inner));
        } else {
            out.push(child);
        }
    }
    out
}

/// Modifier keywords of a declaration, annotations excluded.
fn modifiers(parser: &Parser, node: Node<'_>) -> Vec<String> {
    let mut cursor = node.walk();
    let Some(mods) = node
        .children(&mut cursor)
        .find(|child| child.kind() == "modifiers")
    else {
        return Vec::new();
    };

    let mut inner = mods.walk();
    mods.children(&mut inner)
        .filter(|child| !child.kind().ends_with("annotation"))
        .map(|child| parser.text_of(child).to_string())
        .collect()
}

/// Builds one [`MethodDecl`], including its usage facts.
fn method_decl(parser: &Parser, queries: &UsageQueries, node: Node<'_>) -> Result<MethodDecl> {
    let name = node
        .child_by_field_name("name")
        .map(|n| parser.text_of(n).to_string())
        .context("method declaration without a name")?;

    let mut return_type = node
        .child_by_field_name("type")
        .map(|n| normalize_type(parser.text_of(n)))
        .unwrap_or_default();
    if let Some(dims) = node.child_by_field_name("dimensions") {
        return_type.push_str(&normalize_type(parser.text_of(dims)));
    }

    let parameters = node
        .child_by_field_name("parameters")
        .map(|params| parameters(parser, params))
        .unwrap_or_default();

    let bytes = node.byte_range();
    let usage = usage(parser, queries, &name, bytes.clone())?;

    let mut declared: BTreeSet<String> = parameters.iter().map(|p| p.name.clone()).collect();
    declared.extend(
        parser
            .hits_for(&queries.declared, Some(bytes.clone()))?
            .into_iter()
            .map(|hit| hit.text),
    );
    let references = node
        .child_by_field_name("body")
        .map(|body| name_references(parser, body))
        .unwrap_or_default();

    Ok(MethodDecl {
        name,
        parameters,
        return_type,
        modifiers: modifiers(parser, node),
        line: node.start_position().row + 1,
        usage,
        declared,
        references,
        bytes,
    })
}

/// Unqualified identifiers read inside `node`, in source order.
fn name_references(parser: &Parser, node: Node<'_>) -> Vec<NameRef> {
    let mut cursor = node.walk();
    let mut stack = vec![node];
    let mut out = Vec::new();

    while let Some(current) = stack.pop() {
        if current.kind() == "identifier" {
            if is_variable_read(current) {
                out.push(NameRef {
                    name: parser.text_of(current).to_string(),
                    line: current.start_position().row + 1,
                });
            }
            continue;
        }
        let children: Vec<Node<'_>> = current.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    out
}

/// Whether an `identifier` node reads a variable. Declared names, labels,
/// member names and qualifiers (`x` in `x.length`, `System` in `System.out`)
/// do not.
fn is_variable_read(identifier: Node<'_>) -> bool {
    let Some(parent) = identifier.parent() else {
        return false;
    };
    if parent.child_by_field_name("name") == Some(identifier) {
        return false;
    }
    if parent.kind() == "lambda_expression" && parent.child_by_field_name("parameters") == Some(identifier) {
        return false;
    }

    !matches!(
        parent.kind(),
        "field_access"
            | "method_invocation"
            | "method_reference"
            | "scoped_identifier"
            | "inferred_parameters"
            | "type_pattern"
            | "record_pattern_component"
            | "labeled_statement"
            | "break_statement"
            | "continue_statement"
            | "switch_label"
            | "element_value_pair"
            | "annotation"
            | "marker_annotation"
    )
}

/// Reads a `formal_parameters` node.
fn parameters(parser: &Parser, params: Node<'_>) -> Vec<Parameter> {
    let mut cursor = params.walk();
    let mut out = Vec::new();

    for param in params.named_children(&mut cursor) {
        let line = param.start_position().row + 1;
        match param.kind() {
            "formal_parameter" => {
                let mut type_name = param
                    .child_by_field_name("type")
                    .map(|n| normalize_type(parser.text_of(n)))
                    .unwrap_or_default();
                if let Some(dims) = param.child_by_field_name("dimensions") {
                    type_name.push_str(&normalize_type(parser.text_of(dims)));
                }
                let name = param
                    .child_by_field_name("name")
                    .map(|n| parser.text_of(n).to_string())
                    .unwrap_or_default();
                out.push(Parameter {
                    type_name,
                    name,
                    line,
                });
            }
            "spread_parameter" => {
                let mut inner = param.walk();
                let children: Vec<Node<'_>> = param.named_children(&mut inner).collect();
                let type_name = children
                    .iter()
                    .find(|c| c.kind() != "modifiers" && c.kind() != "variable_declarator")
                    .map(|n| format!("{}...", normalize_type(parser.text_of(*n))))
                    .unwrap_or_default();
                let name = children
                    .iter()
                    .find(|c| c.kind() == "variable_declarator")
                    .and_then(|d| d.child_by_field_name("name"))
                    .map(|n| parser.text_of(n).to_string())
                    .unwrap_or_default();
                out.push(Parameter {
                    type_name,
                    name,
                    line,
                });
            }
            // receiver parameters (`Foo this`) are not part of the signature
            _ => {}
        }
    }

    out
}

/// Collects the constructs and operators used inside `bytes`.
fn usage(
    parser: &Parser,
    queries: &UsageQueries,
    method_name: &str,
    bytes: std::ops::Range<usize>,
) -> Result<ConstructUsage> {
    let mut usage = ConstructUsage::default();

    for hit in parser.hits_for(&queries.constructs, Some(bytes.clone()))? {
        if let Some(construct) = Construct::from_capture(&hit.name) {
            usage.add_construct(construct, hit.line);
        }
    }

    for hit in parser.hits_for(&queries.operators, Some(bytes.clone()))? {
        let operator = match hit.name.as_str() {
            "binary" | "unary" => hit.text.parse::<Operator>().ok(),
            "assignment" => Operator::from_assignment(&hit.text),
            "update" if hit.text.starts_with("++") || hit.text.ends_with("++") => Some(Operator::Incr),
            "update" if hit.text.starts_with("--") || hit.text.ends_with("--") => Some(Operator::Decr),
            _ => None,
        };
        if let Some(operator) = operator {
            usage.add_operator(operator, hit.line);
        }
    }

    for hit in parser.hits_for(&queries.self_calls, Some(bytes))? {
        if hit.text == method_name {
            usage.add_construct(Construct::Recursion, hit.line);
        }
    }

    Ok(usage)
}
