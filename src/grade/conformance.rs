#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::cmp::Reverse;

use itertools::Itertools;
use tracing::{debug, instrument};

use super::{
    query::QueryGrader,
    results::{Finding, FindingKind},
};
use crate::{
    java::{
        CodeBlock, Construct, ConstructUsage, MethodDecl, Operator, SourceModel, normalize_type,
        queries::LOCAL_VARIABLE_QUERY,
    },
    rubric::{Criterion, CriterionKind, NamingConvention, NamingTarget, Rubric, Rule, Scope},
};

/// Checks every structural criterion of `rubric` against `model`.
///
/// Returns exactly one finding per structural criterion, in declaration
/// order. Behavioral criteria are skipped.
#[instrument(skip_all, fields(rubric = %rubric.id))]
pub fn check(model: &SourceModel, rubric: &Rubric) -> Vec<Finding> {
    rubric
        .structural()
        .map(|(_, criterion)| check_criterion(model, criterion))
        .collect()
}

/// Checks a single structural criterion.
pub fn check_criterion(model: &SourceModel, criterion: &Criterion) -> Finding {
    let id = criterion.id.as_str();
    let finding = match &criterion.kind {
        CriterionKind::Signature {
            name,
            params,
            return_type,
        } => check_signature(model, id, name, params, return_type),
        CriterionKind::Construct {
            construct,
            rule,
            scope,
        } => check_construct(model, id, *construct, *rule, scope),
        CriterionKind::Operator {
            operator,
            rule,
            scope,
        } => check_operator(model, id, *operator, *rule, scope),
        CriterionKind::AllowedOperators { operators, scope } => {
            check_allowed_operators(model, id, operators, scope)
        }
        CriterionKind::Query {
            query,
            capture,
            constraint,
            scope,
        } => QueryGrader::builder()
            .req_name(id)
            .query(query.as_str())
            .capture(capture.as_str())
            .constraint(*constraint)
            .scope(scope.clone())
            .model(model)
            .build()
            .grade_by_query(),
        CriterionKind::Naming {
            convention,
            targets,
        } => check_naming(model, id, *convention, targets),
        CriterionKind::VariableScope { scope } => check_variable_scope(model, id, scope),
        CriterionKind::Behavior(_) => Finding::error(
            id,
            FindingKind::InvalidCriterion,
            "behavioral criterion cannot be checked statically",
            None,
        ),
    };

    debug!(criterion = id, status = %finding.status, kind = %finding.kind);
    finding
}

/// Exact match on name, parameter types and return type. A name match with
/// another signature is `WrongSignature`; no name match is `MissingMethod`.
fn check_signature(
    model: &SourceModel,
    id: &str,
    name: &str,
    params: &[String],
    return_type: &str,
) -> Finding {
    let want_params: Vec<String> = params.iter().map(|p| normalize_type(p)).collect();
    let want_return = normalize_type(return_type);
    let wanted = format!("{name}({}) -> {want_return}", want_params.join(", "));

    let overloads: Vec<&MethodDecl> = model.methods_named(name).collect();
    if overloads.is_empty() {
        return Finding::fail(
            id,
            FindingKind::MissingMethod,
            format!("no method named `{name}`; expected `{wanted}`"),
            None,
        );
    }

    let exact = overloads
        .iter()
        .find(|m| m.param_types() == want_params && m.return_type == want_return);
    if let Some(method) = exact {
        return Finding::builder()
            .criterion_id(id)
            .status(super::results::Status::Pass)
            .kind(FindingKind::Satisfied)
            .detail(format!("found `{}`", method.signature()))
            .line(method.line)
            .build();
    }

    // closest overload: same arity first, then most matching positions
    let closest = overloads.iter().min_by_key(|m| {
        let types = m.param_types();
        let same_arity = types.len() == want_params.len();
        let matching = types
            .iter()
            .zip(&want_params)
            .filter(|(have, want)| **have == want.as_str())
            .count();
        Reverse((same_arity, matching, m.return_type == want_return))
    });

    match closest {
        Some(method) => Finding::fail(
            id,
            FindingKind::WrongSignature,
            format!("expected `{wanted}`, found `{}`", method.signature()),
            Some(method.line),
        ),
        None => Finding::fail(id, FindingKind::MissingMethod, format!("no method named `{name}`"), None),
    }
}

/// A stretch of code a scoped criterion inspects.
struct Unit<'a> {
    /// Where the code is, for finding details.
    place: String,
    /// 1-based line where it starts.
    line:  usize,
    /// What it uses.
    usage: &'a ConstructUsage,
}

impl<'a> Unit<'a> {
    /// A method, named by its name.
    fn method(method: &'a MethodDecl) -> Self {
        Self {
            place: format!("`{}`", method.name),
            line:  method.line,
            usage: &method.usage,
        }
    }

    /// A constructor, initializer or nested member.
    fn block(block: &'a CodeBlock) -> Self {
        Self {
            place: block.label.clone(),
            line:  block.line,
            usage: &block.usage,
        }
    }
}

/// Methods named by `scope`, in source order, or `None` when the scope names
/// a method that does not exist. The file scope covers every method.
fn methods_in_scope<'a>(model: &'a SourceModel, scope: &Scope) -> Option<Vec<&'a MethodDecl>> {
    let all = model.types.iter().flat_map(|t| t.methods.iter());
    match scope {
        Scope::File => Some(all.collect()),
        Scope::Method(name) => {
            let methods: Vec<&MethodDecl> = all.filter(|m| &m.name == name).collect();
            (!methods.is_empty()).then_some(methods)
        }
    }
}

/// Code a construct or operator criterion looks at, in source order. The
/// file scope also covers constructors, initializers and nested types.
fn units_in_scope<'a>(model: &'a SourceModel, scope: &Scope) -> Option<Vec<Unit<'a>>> {
    let mut units: Vec<Unit<'a>> = methods_in_scope(model, scope)?
        .into_iter()
        .map(Unit::method)
        .collect();
    if *scope == Scope::File {
        units.extend(model.types.iter().flat_map(|t| t.blocks.iter()).map(Unit::block));
        units.sort_by_key(|u| u.line);
    }
    Some(units)
}

/// Human label for a scope.
fn scope_label(scope: &Scope) -> String {
    match scope {
        Scope::File => "the file".to_string(),
        Scope::Method(name) => format!("`{name}`"),
    }
}

/// Error finding for a method scope that names nothing.
fn missing_scope(id: &str, scope: &Scope) -> Finding {
    Finding::error(
        id,
        FindingKind::MissingMethod,
        format!("no method {} to check", scope_label(scope)),
        None,
    )
}

/// Shared required/forbidden logic over a per-unit lookup of the first
/// line a feature is used on.
fn check_rule<F>(id: &str, what: &str, rule: Rule, scope: &Scope, units: &[Unit<'_>], line_of: F) -> Finding
where
    F: Fn(&ConstructUsage) -> Option<usize>,
{
    let first_use = units
        .iter()
        .find_map(|u| line_of(u.usage).map(|line| (u.place.as_str(), line)));

    match (rule, first_use) {
        (Rule::Forbidden, Some((place, line))) => Finding::fail(
            id,
            FindingKind::ConstructViolation,
            format!("`{what}` is forbidden but used in {place}"),
            Some(line),
        ),
        (Rule::Forbidden, None) => Finding::pass(id, format!("`{what}` not used in {}", scope_label(scope))),
        (Rule::Required, Some((place, _))) => Finding::pass(id, format!("`{what}` used in {place}")),
        (Rule::Required, None) => Finding::fail(
            id,
            FindingKind::ConstructViolation,
            format!("`{what}` is required but not used in {}", scope_label(scope)),
            match scope {
                Scope::Method(_) => units.first().map(|u| u.line),
                Scope::File => None,
            },
        ),
    }
}

/// Required/forbidden construct.
fn check_construct(model: &SourceModel, id: &str, construct: Construct, rule: Rule, scope: &Scope) -> Finding {
    match units_in_scope(model, scope) {
        Some(units) => check_rule(id, construct.label(), rule, scope, &units, |usage| {
            usage.construct_line(construct)
        }),
        None => missing_scope(id, scope),
    }
}

/// Required/forbidden operator.
fn check_operator(model: &SourceModel, id: &str, operator: Operator, rule: Rule, scope: &Scope) -> Finding {
    match units_in_scope(model, scope) {
        Some(units) => check_rule(id, operator.symbol(), rule, scope, &units, |usage| {
            usage.operator_line(operator)
        }),
        None => missing_scope(id, scope),
    }
}

/// Whitelist of operators. Only operators of the families the whitelist
/// mentions are restricted, so `[<, ==]` limits comparisons and leaves
/// arithmetic alone.
fn check_allowed_operators(model: &SourceModel, id: &str, allowed: &[Operator], scope: &Scope) -> Finding {
    let Some(units) = units_in_scope(model, scope) else {
        return missing_scope(id, scope);
    };
    let families: Vec<_> = allowed.iter().map(|op| op.family()).unique().collect();

    let offending = units.iter().find_map(|u| {
        u.usage
            .operators
            .iter()
            .filter(|(op, _)| families.contains(&op.family()) && !allowed.contains(*op))
            .min_by_key(|(_, line)| **line)
            .map(|(op, line)| (u.place.as_str(), *op, *line))
    });

    let listed = allowed.iter().map(|op| op.symbol()).join(" ");
    match offending {
        Some((place, op, line)) => Finding::fail(
            id,
            FindingKind::ConstructViolation,
            format!("operator `{op}` used in {place}; only [{listed}] allowed"),
            Some(line),
        ),
        None => Finding::pass(id, format!("only [{listed}] used in {}", scope_label(scope))),
    }
}

/// Every name a method reads must be declared in that method or as a field
/// somewhere in the file. Reports the first stray name in source order.
fn check_variable_scope(model: &SourceModel, id: &str, scope: &Scope) -> Finding {
    let Some(methods) = methods_in_scope(model, scope) else {
        return missing_scope(id, scope);
    };

    let stray = methods
        .iter()
        .flat_map(|m| {
            m.references
                .iter()
                .filter(|r| !m.declared.contains(&r.name) && !model.fields.contains(&r.name))
                .map(move |r| (m.name.as_str(), r))
        })
        .min_by_key(|(_, r)| r.line);

    match stray {
        Some((method, reference)) => Finding::fail(
            id,
            FindingKind::ScopeViolation,
            format!(
                "`{}` is used in `{method}` but declared neither there nor as a field",
                reference.name
            ),
            Some(reference.line),
        ),
        None => Finding::pass(id, format!("every name used in {} is in scope", scope_label(scope))),
    }
}

/// Whether `name` is lower camelCase.
pub fn is_camel_case(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

/// Naming convention over the selected identifiers; reports the violation
/// closest to the top of the file.
fn check_naming(model: &SourceModel, id: &str, convention: NamingConvention, targets: &[NamingTarget]) -> Finding {
    let NamingConvention::CamelCase = convention;
    let mut identifiers: Vec<(usize, &'static str, String)> = Vec::new();

    let methods = model.types.iter().flat_map(|t| t.methods.iter());
    if targets.contains(&NamingTarget::Methods) {
        identifiers.extend(methods.clone().map(|m| (m.line, "method", m.name.clone())));
    }
    if targets.contains(&NamingTarget::Parameters) {
        identifiers.extend(
            methods
                .clone()
                .flat_map(|m| m.parameters.iter())
                .map(|p| (p.line, "parameter", p.name.clone())),
        );
    }
    if targets.contains(&NamingTarget::Locals) {
        match model.parser().query_hits(LOCAL_VARIABLE_QUERY, None) {
            Ok(hits) => identifiers.extend(hits.into_iter().map(|hit| (hit.line, "variable", hit.text))),
            Err(e) => {
                return Finding::error(id, FindingKind::InvalidCriterion, format!("{e:#}"), None);
            }
        }
    }

    let checked = identifiers.len();
    let violation = identifiers
        .into_iter()
        .filter(|(_, _, name)| !is_camel_case(name))
        .min_by_key(|(line, _, _)| *line);

    match violation {
        Some((line, what, name)) => Finding::fail(
            id,
            FindingKind::NamingViolation,
            format!("{what} `{name}` is not camelCase"),
            Some(line),
        ),
        None => Finding::pass(id, format!("{checked} identifier(s) are camelCase")),
    }
}
