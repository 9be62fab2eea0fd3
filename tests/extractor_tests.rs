use javagrader::java::{Construct, ExtractionError, Operator, TypeKind, extract};

use sandbox_support::fixture_source;

#[test]
fn extracts_signatures_from_fixture() {
    let model = extract(&fixture_source("ValidationCorrect.java"), Some("Validation")).expect("model");

    let primary = model.primary_type().expect("primary type");
    assert_eq!(primary.name, "Validation");
    assert_eq!(primary.kind, TypeKind::Class);
    assert!(primary.public);

    let est_majeur = model.methods_named("estMajeur").next().expect("estMajeur");
    assert_eq!(est_majeur.param_types(), vec!["int"]);
    assert_eq!(est_majeur.return_type, "boolean");
    assert_eq!(est_majeur.line, 4);
    assert_eq!(est_majeur.modifiers, vec!["public", "static"]);
    assert_eq!(est_majeur.usage.operator_line(Operator::Ge), Some(5));

    let main = model.methods_named("main").next().expect("main");
    assert_eq!(main.param_types(), vec!["String[]"]);
    assert_eq!(main.usage.construct_line(Construct::If), Some(11));
    assert!(main.usage.operator_line(Operator::Ge).is_none());
}

#[test]
fn usage_is_attributed_per_method() {
    let model = extract(&fixture_source("SequenceNumeriqueWhile.java"), None).expect("model");
    let sequence = model.methods_named("sequence").next().expect("sequence");

    assert_eq!(sequence.usage.construct_line(Construct::WhileLoop), Some(7));
    assert_eq!(sequence.usage.construct_line(Construct::If), Some(9));
    assert_eq!(sequence.usage.operator_line(Operator::Incr), Some(12));
    assert!(sequence.usage.construct_line(Construct::ForLoop).is_none());

    let main = model.methods_named("main").next().expect("main");
    assert!(main.usage.constructs.is_empty());
}

#[test]
fn enhanced_for_and_arrays() {
    let model = extract(&fixture_source("CalculMoyenne.java"), Some("CalculMoyenne")).expect("model");
    let moyenne = model.methods_named("moyenne").next().expect("moyenne");

    assert_eq!(moyenne.param_types(), vec!["int[]"]);
    assert_eq!(moyenne.return_type, "double");
    assert_eq!(moyenne.usage.construct_line(Construct::EnhancedForLoop), Some(6));
    assert!(moyenne.usage.construct_line(Construct::ForLoop).is_none());
    assert_eq!(moyenne.usage.operator_line(Operator::Add), Some(7));
    assert_eq!(moyenne.usage.operator_line(Operator::Div), Some(9));
}

#[test]
fn missing_semicolon_is_a_syntax_error_with_location() {
    let err = extract(&fixture_source("ValidationSyntaxError.java"), Some("Validation")).expect_err("syntax");
    let ExtractionError::Syntax { line, column, .. } = &err;
    let line = line.expect("line");
    assert!((5..=6).contains(&line), "reported line {line}");
    assert!(column.is_some());
    assert!(err.to_string().starts_with("syntax error at"));
}

#[test]
fn primary_type_prefers_expected_public_class() {
    let code = "class Helper {\n  int f() { return 1; }\n}\npublic class Main {\n  void g() {}\n}\n";

    let model = extract(code, Some("Main")).expect("model");
    assert_eq!(model.primary_type().map(|t| t.name.as_str()), Some("Main"));
    assert_eq!(model.methods().next().map(|m| m.name.as_str()), Some("g"));

    let model = extract(code, Some("Absent")).expect("model");
    assert_eq!(model.primary_type().map(|t| t.name.as_str()), Some("Helper"));

    let model = extract(code, None).expect("model");
    assert_eq!(model.primary, 0);
}

#[test]
fn interfaces_enums_and_records_are_types() {
    let code = "interface Shape { double area(); }\n\
                enum Color { RED, GREEN; String lower() { return name().toLowerCase(); } }\n\
                record Point(int x, int y) { int sum() { return x + y; } }\n";
    let model = extract(code, None).expect("model");

    let kinds: Vec<_> = model.types.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TypeKind::Interface, TypeKind::Enum, TypeKind::Record]);
    assert_eq!(model.types[0].methods[0].name, "area");
    assert_eq!(model.types[1].methods[0].name, "lower");
    assert_eq!(model.types[2].methods[0].usage.operator_line(Operator::Add), Some(3));
}

#[test]
fn source_without_types_is_rejected() {
    let err = extract("import java.util.List;\n", None).expect_err("no types");
    assert_eq!(err.line(), Some(1));
}

#[test]
fn extraction_is_pure() {
    let source = fixture_source("SequenceNumerique.java");
    let first = extract(&source, None).expect("model");
    let second = extract(&source, None).expect("model");
    assert_eq!(first.types, second.types);
}
