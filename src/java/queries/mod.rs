//! Tree-sitter query strings used by the structural extractor and the
//! sandbox.

/// Tree-sitter query that returns the names of public top-level classes
/// * `name`: name of the class
pub const PUBLIC_CLASS_QUERY: &str = include_str!("public_class.scm");

/// Tree-sitter query that returns the names of all top-level classes
/// * `name`: name of the class
pub const CLASSNAME_QUERY: &str = include_str!("class_name.scm");

/// Tree-sitter query matching control-flow constructs. Each pattern captures
/// the whole statement under one of `for`, `enhanced_for`, `while`,
/// `do_while`, `if`, `switch`, `ternary`, `try`.
pub const CONSTRUCT_QUERY: &str = include_str!("constructs.scm");

/// Tree-sitter query matching operator tokens
/// * `binary`: operator of a binary expression
/// * `unary`: operator of a unary expression
/// * `assignment`: operator of an assignment (`=`, `+=`, ...)
/// * `update`: a whole `++`/`--` expression
pub const OPERATOR_QUERY: &str = include_str!("operators.scm");

/// Tree-sitter query matching unqualified (or `this.`-qualified) method calls
/// * `call`: name of the invoked method
pub const SELF_CALL_QUERY: &str = include_str!("self_calls.scm");

/// Tree-sitter query that returns local variable names
/// * `name`: name of the variable
pub const LOCAL_VARIABLE_QUERY: &str = include_str!("local_variables.scm");

/// Tree-sitter query that returns every name a method body can declare:
/// locals, parameters, catch and for-each variables, resources, lambda
/// parameters and pattern bindings
/// * `name`: the declared name
pub const DECLARED_NAME_QUERY: &str = include_str!("declared_names.scm");

/// Tree-sitter query that returns field, constant, enum constant and record
/// component names
/// * `name`: the declared name
pub const FIELD_QUERY: &str = include_str!("fields.scm");
