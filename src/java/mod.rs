#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Builds a [`SourceModel`] from raw source.
pub mod extract;
/// Declarations and usage facts of one submission.
pub mod model;
/// Tree-sitter parser wrapper.
pub mod parser;
/// Parsers for javac and JVM outputs.
pub mod parsers;
/// Tree-sitter query strings used by Java analysis.
pub mod queries;

pub use extract::{ExtractionError, extract, normalize_type};
pub use model::{
    CodeBlock, Construct, ConstructUsage, MethodDecl, NameRef, Operator, OperatorFamily, Parameter, SourceModel, TypeDecl,
    TypeKind,
};
pub use parser::Parser;
