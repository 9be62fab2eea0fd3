#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    ops::Range,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::java::parser::Parser;

/// Control-flow constructs tracked per method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Construct {
    /// `for (init; cond; update)`
    ForLoop,
    /// `for (T x : xs)`
    EnhancedForLoop,
    /// `while (cond)`
    WhileLoop,
    /// `do { } while (cond);`
    DoWhileLoop,
    /// `if` / `else if`
    If,
    /// `switch` statement or expression
    Switch,
    /// `cond ? a : b`
    Ternary,
    /// `try` with or without resources
    TryCatch,
    /// A method calling itself by name
    Recursion,
}

impl Construct {
    /// Maps a capture name of the construct query onto a construct.
    pub fn from_capture(name: &str) -> Option<Self> {
        Some(match name {
            "for" => Construct::ForLoop,
            "enhanced_for" => Construct::EnhancedForLoop,
            "while" => Construct::WhileLoop,
            "do_while" => Construct::DoWhileLoop,
            "if" => Construct::If,
            "switch" => Construct::Switch,
            "ternary" => Construct::Ternary,
            "try" => Construct::TryCatch,
            _ => return None,
        })
    }

    /// Keyword-ish label used in finding details.
    pub fn label(self) -> &'static str {
        match self {
            Construct::ForLoop => "for",
            Construct::EnhancedForLoop => "for-each",
            Construct::WhileLoop => "while",
            Construct::DoWhileLoop => "do-while",
            Construct::If => "if",
            Construct::Switch => "switch",
            Construct::Ternary => "?:",
            Construct::TryCatch => "try",
            Construct::Recursion => "recursion",
        }
    }
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Operators tracked per method, serialized by their Java symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `&&`
    #[serde(rename = "&&")]
    And,
    /// `||`
    #[serde(rename = "||")]
    Or,
    /// `!`
    #[serde(rename = "!")]
    Not,
    /// `+`
    #[serde(rename = "+")]
    Add,
    /// `-`
    #[serde(rename = "-")]
    Sub,
    /// `*`
    #[serde(rename = "*")]
    Mul,
    /// `/`
    #[serde(rename = "/")]
    Div,
    /// `%`
    #[serde(rename = "%")]
    Rem,
    /// `&`
    #[serde(rename = "&")]
    BitAnd,
    /// `|`
    #[serde(rename = "|")]
    BitOr,
    /// `^`
    #[serde(rename = "^")]
    BitXor,
    /// `~`
    #[serde(rename = "~")]
    BitNot,
    /// `<<`
    #[serde(rename = "<<")]
    Shl,
    /// `>>`
    #[serde(rename = ">>")]
    Shr,
    /// `>>>`
    #[serde(rename = ">>>")]
    UShr,
    /// `++`
    #[serde(rename = "++")]
    Incr,
    /// `--`
    #[serde(rename = "--")]
    Decr,
}

/// Coarse grouping of operators, used to scope whitelists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorFamily {
    /// `<` `<=` `>` `>=` `==` `!=`
    Comparison,
    /// `&&` `||` `!`
    Logical,
    /// `+` `-` `*` `/` `%`
    Arithmetic,
    /// `&` `|` `^` `~` `<<` `>>` `>>>`
    Bitwise,
    /// `++` `--`
    Update,
}

impl Operator {
    /// Family the operator belongs to.
    pub fn family(self) -> OperatorFamily {
        match self {
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge | Operator::Eq | Operator::Ne => {
                OperatorFamily::Comparison
            }
            Operator::And | Operator::Or | Operator::Not => OperatorFamily::Logical,
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Rem => {
                OperatorFamily::Arithmetic
            }
            Operator::BitAnd
            | Operator::BitOr
            | Operator::BitXor
            | Operator::BitNot
            | Operator::Shl
            | Operator::Shr
            | Operator::UShr => OperatorFamily::Bitwise,
            Operator::Incr | Operator::Decr => OperatorFamily::Update,
        }
    }

    /// Java spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Not => "!",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Rem => "%",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::BitNot => "~",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::UShr => ">>>",
            Operator::Incr => "++",
            Operator::Decr => "--",
        }
    }

    /// Maps an assignment operator onto the operator it applies. Plain `=`
    /// applies none.
    pub fn from_assignment(token: &str) -> Option<Self> {
        token.strip_suffix('=').filter(|base| !base.is_empty())?.parse().ok()
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "&&" => Operator::And,
            "||" => Operator::Or,
            "!" => Operator::Not,
            "+" => Operator::Add,
            "-" => Operator::Sub,
            "*" => Operator::Mul,
            "/" => Operator::Div,
            "%" => Operator::Rem,
            "&" => Operator::BitAnd,
            "|" => Operator::BitOr,
            "^" => Operator::BitXor,
            "~" => Operator::BitNot,
            "<<" => Operator::Shl,
            ">>" => Operator::Shr,
            ">>>" => Operator::UShr,
            "++" => Operator::Incr,
            "--" => Operator::Decr,
            other => return Err(format!("unknown operator `{other}`")),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Constructs and operators seen in one method body, each with the 1-based
/// line of its first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstructUsage {
    /// Constructs used.
    pub constructs: BTreeMap<Construct, usize>,
    /// Operators used.
    pub operators:  BTreeMap<Operator, usize>,
}

impl ConstructUsage {
    /// Records a construct, keeping the earliest line.
    pub fn add_construct(&mut self, construct: Construct, line: usize) {
        self.constructs
            .entry(construct)
            .and_modify(|first| *first = (*first).min(line))
            .or_insert(line);
    }

    /// Records an operator, keeping the earliest line.
    pub fn add_operator(&mut self, operator: Operator, line: usize) {
        self.operators
            .entry(operator)
            .and_modify(|first| *first = (*first).min(line))
            .or_insert(line);
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.constructs.is_empty() && self.operators.is_empty()
    }

    /// Line of the first use of `construct`, if used.
    pub fn construct_line(&self, construct: Construct) -> Option<usize> {
        self.constructs.get(&construct).copied()
    }

    /// Line of the first use of `operator`, if used.
    pub fn operator_line(&self, operator: Operator) -> Option<usize> {
        self.operators.get(&operator).copied()
    }
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    /// Normalized type text (`int[]`, `String...`).
    #[serde(rename = "type")]
    pub type_name: String,
    /// Declared name.
    pub name:      String,
    /// 1-based line.
    pub line:      usize,
}

/// An unqualified name read inside a method body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameRef {
    /// The identifier.
    pub name: String,
    /// 1-based line.
    pub line: usize,
}

/// A method declared directly in a type body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDecl {
    /// Method name.
    pub name:        String,
    /// Ordered parameters.
    pub parameters:  Vec<Parameter>,
    /// Normalized return type text.
    pub return_type: String,
    /// Modifier keywords (`public`, `static`, ...), annotations excluded.
    pub modifiers:   Vec<String>,
    /// 1-based line of the declaration.
    pub line:        usize,
    /// Constructs and operators used in the body.
    pub usage:       ConstructUsage,
    /// Parameters and every variable declared anywhere in the body.
    #[serde(skip)]
    pub declared:    BTreeSet<String>,
    /// Unqualified names the body reads, in source order.
    #[serde(skip)]
    pub references:  Vec<NameRef>,
    /// Byte range of the whole declaration in the source.
    #[serde(skip)]
    pub bytes:       Range<usize>,
}

impl MethodDecl {
    /// Ordered parameter types.
    pub fn param_types(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .map(|p| p.type_name.as_str())
            .collect()
    }

    /// Renders `name(T1, T2) -> R`.
    pub fn signature(&self) -> String {
        format!("{}({}) -> {}", self.name, self.param_types().join(", "), self.return_type)
    }
}

/// Kind of a top-level type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    /// `class`
    Class,
    /// `interface`
    Interface,
    /// `enum`
    Enum,
    /// `record`
    Record,
}

/// Code of a type that runs outside its own methods: constructors,
/// initializer blocks, field initializers, enum constant bodies and the
/// members of nested types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    /// Where the code is, phrased for finding details.
    pub label: String,
    /// 1-based line of the block.
    pub line:  usize,
    /// Constructs and operators used in the block.
    pub usage: ConstructUsage,
}

/// A top-level type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDecl {
    /// Declared name.
    pub name:      String,
    /// Declaration kind.
    pub kind:      TypeKind,
    /// Whether the type is declared `public`.
    pub public:    bool,
    /// 1-based line of the declaration.
    pub line:      usize,
    /// Methods in declaration order.
    pub methods:   Vec<MethodDecl>,
    /// Other code carrying constructs or operators, in declaration order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks:    Vec<CodeBlock>,
}

impl TypeDecl {
    /// All overloads named `name`, in declaration order.
    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDecl> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }
}

/// Structural view of one submission.
#[derive(Debug, Clone, Serialize)]
pub struct SourceModel {
    /// Top-level types in source order.
    pub types:   Vec<TypeDecl>,
    /// Index of the primary type in `types`.
    pub primary: usize,
    /// Fields, constants, enum constants and record components declared
    /// anywhere in the file.
    pub fields:  BTreeSet<String>,
    /// Parsed source, kept for query criteria.
    #[serde(skip)]
    parser:      Parser,
}

impl SourceModel {
    /// Assembles a model. `primary` must index into `types`.
    pub(crate) fn new(types: Vec<TypeDecl>, primary: usize, fields: BTreeSet<String>, parser: Parser) -> Self {
        Self {
            types,
            primary,
            fields,
            parser,
        }
    }

    /// The primary type.
    pub fn primary_type(&self) -> Option<&TypeDecl> {
        self.types.get(self.primary)
    }

    /// Types in search order: the primary type first, then the others in
    /// source order.
    pub fn types_by_priority(&self) -> impl Iterator<Item = &TypeDecl> {
        self.primary_type().into_iter().chain(
            self.types
                .iter()
                .enumerate()
                .filter(move |(i, _)| *i != self.primary)
                .map(|(_, t)| t),
        )
    }

    /// Every method of every type, in search order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.types_by_priority().flat_map(|t| t.methods.iter())
    }

    /// Every overload named `name`, in search order.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDecl> + 'a {
        self.methods().filter(move |m| m.name == name)
    }

    /// The parsed source.
    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// The raw source text.
    pub fn source(&self) -> &str {
        self.parser.code()
    }
}
