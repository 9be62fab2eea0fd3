use javagrader::{
    grade::{FindingKind, Status, check},
    java::{Construct, Operator, extract},
    rubric::{Criterion, CriterionKind, NamingConvention, NamingTarget, QueryConstraint, Rubric, Rule, Scope},
};

use sandbox_support::{fixture_rubric, fixture_source};

fn rubric_of(criteria: Vec<Criterion>) -> Rubric {
    Rubric::builder().id("test").criteria(criteria).build()
}

fn construct(id: &str, construct: Construct, rule: Rule, scope: Scope) -> Criterion {
    Criterion::new(
        id,
        CriterionKind::Construct {
            construct,
            rule,
            scope,
        },
    )
}

fn query(id: &str, query: &str, capture: &str, constraint: QueryConstraint, scope: Scope) -> Criterion {
    Criterion::new(
        id,
        CriterionKind::Query {
            query: query.into(),
            capture: capture.into(),
            constraint,
            scope,
        },
    )
}

#[test]
fn correct_submission_passes_every_structural_criterion() {
    let rubric = fixture_rubric("validation.json");
    let model = extract(&fixture_source("ValidationCorrect.java"), rubric.expected_class.as_deref()).expect("model");

    let findings = check(&model, &rubric);
    assert_eq!(findings.len(), rubric.structural().count());
    assert!(findings.iter().all(|f| f.passed()), "{findings:#?}");

    let ids: Vec<_> = findings.iter().map(|f| f.criterion_id.as_str()).collect();
    assert_eq!(ids, vec!["signature-estMajeur", "uses-ge", "no-ternary", "camel-case"]);
    assert_eq!(findings[0].line, Some(4));
}

#[test]
fn wrong_signature_is_not_missing_method() {
    let rubric = fixture_rubric("validation.json");

    let wrong = extract(&fixture_source("ValidationWrongSignature.java"), Some("Validation")).expect("model");
    let finding = &check(&wrong, &rubric)[0];
    assert_eq!((finding.status, finding.kind), (Status::Fail, FindingKind::WrongSignature));
    assert_eq!(finding.line, Some(4));
    assert!(finding.detail.contains("estMajeur(double) -> boolean"), "{}", finding.detail);

    let missing = extract(&fixture_source("ValidationMissingMethod.java"), Some("Validation")).expect("model");
    let findings = check(&missing, &rubric);
    assert_eq!((findings[0].status, findings[0].kind), (Status::Fail, FindingKind::MissingMethod));
    // operator criterion scoped to the absent method
    assert_eq!((findings[1].status, findings[1].kind), (Status::Error, FindingKind::MissingMethod));
}

#[test]
fn closest_overload_is_reported() {
    let code = "public class A {\n  void f(String s) {}\n  int f(int a, int b) { return a; }\n}\n";
    let model = extract(code, Some("A")).expect("model");
    let rubric = rubric_of(vec![Criterion::new(
        "sig",
        CriterionKind::Signature {
            name:        "f".into(),
            params:      vec!["int".into(), "long".into()],
            return_type: "int".into(),
        },
    )]);

    let finding = &check(&model, &rubric)[0];
    assert_eq!(finding.kind, FindingKind::WrongSignature);
    assert_eq!(finding.line, Some(3));
}

#[test]
fn generic_types_compare_without_whitespace() {
    let code = "class A { java.util.Map<String,  Integer> count(java.util.List< String > words) { return null; } }";
    let model = extract(code, None).expect("model");
    let rubric = rubric_of(vec![Criterion::new(
        "sig",
        CriterionKind::Signature {
            name:        "count".into(),
            params:      vec!["java.util.List<String>".into()],
            return_type: "java.util.Map<String, Integer>".into(),
        },
    )]);
    assert!(check(&model, &rubric)[0].passed());
}

#[test]
fn while_instead_of_for_is_a_construct_violation() {
    let rubric = fixture_rubric("sequence.json");
    let model = extract(&fixture_source("SequenceNumeriqueWhile.java"), Some("SequenceNumerique")).expect("model");
    let findings = check(&model, &rubric);

    let signature = &findings[0];
    assert!(signature.passed());

    let uses_for = &findings[1];
    assert_eq!((uses_for.status, uses_for.kind), (Status::Fail, FindingKind::ConstructViolation));

    let no_while = &findings[2];
    assert_eq!((no_while.status, no_while.kind), (Status::Fail, FindingKind::ConstructViolation));
    assert_eq!(no_while.line, Some(7));
    assert!(no_while.detail.contains("sequence"), "{}", no_while.detail);

    // exactly one loop either way
    assert!(findings[3].passed());
}

#[test]
fn for_loop_submission_satisfies_sequence_rubric() {
    let rubric = fixture_rubric("sequence.json");
    let model = extract(&fixture_source("SequenceNumerique.java"), Some("SequenceNumerique")).expect("model");
    assert!(check(&model, &rubric).iter().all(|f| f.passed()));
}

#[test]
fn forbidden_construct_reports_first_method_in_declaration_order() {
    let code = "class A {\n  void a() {}\n  void b() {\n    while (true) { break; }\n  }\n  void c() {\n    while (false) {}\n  }\n}\n";
    let model = extract(code, None).expect("model");
    let rubric = rubric_of(vec![construct("w", Construct::WhileLoop, Rule::Forbidden, Scope::File)]);

    let finding = &check(&model, &rubric)[0];
    assert_eq!(finding.line, Some(4));
    assert!(finding.detail.contains("`b`"), "{}", finding.detail);
}

#[test]
fn recursion_can_be_required() {
    let code = "class A {\n  static int fact(int n) {\n    if (n <= 1) return 1;\n    return n * fact(n - 1);\n  }\n  static int iter(int n) {\n    int r = 1;\n    for (int i = 2; i <= n; i++) r *= i;\n    return r;\n  }\n}\n";
    let model = extract(code, None).expect("model");
    let rubric = rubric_of(vec![
        construct("rec", Construct::Recursion, Rule::Required, Scope::Method("fact".into())),
        construct("no-rec", Construct::Recursion, Rule::Required, Scope::Method("iter".into())),
    ]);

    let findings = check(&model, &rubric);
    assert!(findings[0].passed());
    assert_eq!(findings[1].kind, FindingKind::ConstructViolation);
    assert_eq!(findings[1].line, Some(6));
}

#[test]
fn operator_rules() {
    let code = "class A {\n  boolean f(int a) {\n    return a >= 18 && a != 99;\n  }\n}\n";
    let model = extract(code, None).expect("model");
    let rubric = rubric_of(vec![
        Criterion::new(
            "no-ge",
            CriterionKind::Operator {
                operator: Operator::Ge,
                rule:     Rule::Forbidden,
                scope:    Scope::File,
            },
        ),
        Criterion::new(
            "uses-and",
            CriterionKind::Operator {
                operator: Operator::And,
                rule:     Rule::Required,
                scope:    Scope::Method("f".into()),
            },
        ),
    ]);

    let findings = check(&model, &rubric);
    assert_eq!(findings[0].kind, FindingKind::ConstructViolation);
    assert_eq!(findings[0].line, Some(3));
    assert!(findings[1].passed());
}

#[test]
fn allowed_operators_only_restrict_listed_families() {
    let rubric = fixture_rubric("moyenne.json");

    let model = extract(&fixture_source("CalculMoyenne.java"), Some("CalculMoyenne")).expect("model");
    assert!(check(&model, &rubric)[1].passed());

    let code = "public class CalculMoyenne {\n  public static double moyenne(int[] notes) {\n    int somme = 0;\n    for (int i = 0; i < notes.length; i++) {\n      somme += notes[i] * 1;\n    }\n    return (double) somme / notes.length;\n  }\n}\n";
    let model = extract(code, Some("CalculMoyenne")).expect("model");
    let finding = &check(&model, &rubric)[1];
    assert_eq!(finding.kind, FindingKind::ConstructViolation);
    assert_eq!(finding.line, Some(5));
    assert!(finding.detail.contains("`*`"), "{}", finding.detail);
}

#[test]
fn query_constraints() {
    let model = extract(&fixture_source("SequenceNumerique.java"), None).expect("model");
    let rubric = rubric_of(vec![
        query("at-least", "(if_statement) @if", "if", QueryConstraint::AtLeastOnce, Scope::File),
        query("none", "(while_statement) @w", "w", QueryConstraint::MustNotMatch, Scope::File),
        query("two", "(for_statement) @f", "f", QueryConstraint::Exactly(2), Scope::File),
        query("missing", "(switch_expression) @s", "s", QueryConstraint::AtLeastOnce, Scope::File),
        query(
            "scoped",
            "(method_invocation) @call",
            "call",
            QueryConstraint::MustNotMatch,
            Scope::Method("sequence".into()),
        ),
        query(
            "no-scope",
            "(if_statement) @if",
            "if",
            QueryConstraint::AtLeastOnce,
            Scope::Method("absent".into()),
        ),
        query("broken", "(if_statement", "if", QueryConstraint::AtLeastOnce, Scope::File),
    ]);

    let findings = check(&model, &rubric);
    assert!(findings[0].passed());
    assert!(findings[1].passed());
    assert_eq!((findings[2].kind, findings[2].line), (FindingKind::PatternViolation, Some(6)));
    assert_eq!(findings[3].kind, FindingKind::PatternViolation);
    assert!(findings[4].passed(), "{:?}", findings[4]);
    assert_eq!((findings[5].status, findings[5].kind), (Status::Error, FindingKind::MissingMethod));
    assert_eq!((findings[6].status, findings[6].kind), (Status::Error, FindingKind::InvalidCriterion));
}

#[test]
fn naming_violations_report_their_line() {
    let code = "class A {\n  int total(int[] xs) {\n    int s = 0;\n    int Total_Sum = 0;\n    for (int x : xs) s += x;\n    return s;\n  }\n  void Helper(int BadParam) {}\n}\n";
    let model = extract(code, None).expect("model");

    let naming = |targets: Vec<NamingTarget>| {
        rubric_of(vec![Criterion::new(
            "camel",
            CriterionKind::Naming {
                convention: NamingConvention::CamelCase,
                targets,
            },
        )])
    };

    let all = &check(&model, &naming(vec![NamingTarget::Methods, NamingTarget::Parameters, NamingTarget::Locals]))[0];
    assert_eq!((all.kind, all.line), (FindingKind::NamingViolation, Some(4)));
    assert!(all.detail.contains("Total_Sum"));

    let methods = &check(&model, &naming(vec![NamingTarget::Methods]))[0];
    assert_eq!(methods.line, Some(8));
    assert!(methods.detail.contains("Helper"));

    let correct = extract(&fixture_source("ValidationCorrect.java"), None).expect("model");
    assert!(check(&correct, &naming(vec![NamingTarget::Locals]))[0].passed());
}

#[test]
fn checking_is_deterministic() {
    let rubric = fixture_rubric("sequence.json");
    let model = extract(&fixture_source("SequenceNumeriqueWhile.java"), None).expect("model");
    assert_eq!(check(&model, &rubric), check(&model, &rubric));
}

#[test]
fn behavioral_criteria_are_skipped() {
    let rubric = fixture_rubric("validation.json");
    let model = extract(&fixture_source("ValidationCorrect.java"), None).expect("model");
    let findings = check(&model, &rubric);
    assert!(findings.iter().all(|f| f.criterion_id != "adult" && f.criterion_id != "minor"));
}

#[test]
fn file_scope_covers_code_outside_methods() {
    let code = "public class A {\n  private int n;\n  A() {\n    while (n < 3) n++;\n  }\n  static {\n    int i = 0;\n    while (i < 2) i++;\n  }\n  void f() {}\n  static class Inner {\n    void g() {\n      while (true) { break; }\n    }\n  }\n}\n";
    let model = extract(code, Some("A")).expect("model");
    let rubric = rubric_of(vec![
        construct("no-while", Construct::WhileLoop, Rule::Forbidden, Scope::File),
        construct("f-while", Construct::WhileLoop, Rule::Forbidden, Scope::Method("f".into())),
    ]);

    let findings = check(&model, &rubric);
    assert_eq!((findings[0].status, findings[0].kind), (Status::Fail, FindingKind::ConstructViolation));
    assert_eq!(findings[0].line, Some(4));
    assert!(findings[0].detail.contains("constructor of `A`"), "{}", findings[0].detail);
    // a method scope still means that method only
    assert!(findings[1].passed());
}

#[test]
fn initializers_and_nested_members_are_scanned() {
    let initializer = "class A {\n  static int[] xs = new int[3];\n  static {\n    for (int i = 0; i < xs.length; i++) xs[i] = i;\n  }\n}\n";
    let model = extract(initializer, None).expect("model");
    let rubric = rubric_of(vec![construct("no-for", Construct::ForLoop, Rule::Forbidden, Scope::File)]);
    let finding = &check(&model, &rubric)[0];
    assert_eq!(finding.line, Some(4));
    assert!(finding.detail.contains("static initializer"), "{}", finding.detail);

    let nested = "class A {\n  void f() {}\n  class Inner {\n    int g(int a) {\n      return a > 0 ? a : -a;\n    }\n  }\n}\n";
    let model = extract(nested, None).expect("model");
    let rubric = rubric_of(vec![construct("no-ternary", Construct::Ternary, Rule::Forbidden, Scope::File)]);
    let finding = &check(&model, &rubric)[0];
    assert_eq!(finding.line, Some(5));
    assert!(finding.detail.contains("`Inner.g`"), "{}", finding.detail);

    let field = "class A {\n  int big = 3 > 2 ? 1 : 0;\n}\n";
    let model = extract(field, None).expect("model");
    let finding = &check(&model, &rubric)[0];
    assert_eq!((finding.kind, finding.line), (FindingKind::ConstructViolation, Some(2)));
}

fn variable_scope(id: &str, scope: Scope) -> Criterion {
    Criterion::new(id, CriterionKind::VariableScope { scope })
}

#[test]
fn names_declared_locally_or_as_fields_are_in_scope() {
    let rubric = rubric_of(vec![variable_scope("scope", Scope::File)]);
    for fixture in ["ValidationCorrect.java", "SequenceNumerique.java", "CalculMoyenne.java"] {
        let model = extract(&fixture_source(fixture), None).expect("model");
        let finding = &check(&model, &rubric)[0];
        assert!(finding.passed(), "{fixture}: {finding:?}");
    }

    let code = "import java.util.List;\nclass A {\n  private int total;\n  enum Color { RED }\n  int f(List<Integer> xs, Color c) {\n    outer:\n    for (int x : xs) {\n      try { total += x; } catch (RuntimeException e) { System.out.println(e.getMessage()); }\n      if (c == Color.RED) break outer;\n    }\n    xs.forEach(v -> total += v);\n    Object o = xs;\n    if (o instanceof List<?> l) { return l.size() + Math.max(total, 0); }\n    return this.total;\n  }\n}\n";
    let model = extract(code, None).expect("model");
    assert!(check(&model, &rubric)[0].passed(), "{:?}", check(&model, &rubric)[0]);
}

#[test]
fn stray_names_are_scope_violations() {
    let code = "class A {\n  static int compte;\n  static int f(int a) {\n    int b = a * 2;\n    return b + c;\n  }\n  static void g() {\n    System.out.println(resultat);\n  }\n}\n";
    let model = extract(code, None).expect("model");
    let rubric = rubric_of(vec![
        variable_scope("file", Scope::File),
        variable_scope("only-g", Scope::Method("g".into())),
        variable_scope("absent", Scope::Method("h".into())),
    ]);

    let findings = check(&model, &rubric);
    assert_eq!((findings[0].status, findings[0].kind), (Status::Fail, FindingKind::ScopeViolation));
    assert_eq!(findings[0].line, Some(5));
    assert!(findings[0].detail.contains("`c`") && findings[0].detail.contains("`f`"), "{}", findings[0].detail);

    assert_eq!(findings[1].line, Some(8));
    assert!(findings[1].detail.contains("resultat"), "{}", findings[1].detail);

    assert_eq!((findings[2].status, findings[2].kind), (Status::Error, FindingKind::MissingMethod));
}

#[test]
fn a_name_declared_in_another_method_is_not_in_scope() {
    let code = "class A {\n  void f() {\n    int local = 1;\n  }\n  int g() {\n    return local;\n  }\n}\n";
    let model = extract(code, None).expect("model");
    let finding = &check(&model, &rubric_of(vec![variable_scope("scope", Scope::File)]))[0];
    assert_eq!((finding.kind, finding.line), (FindingKind::ScopeViolation, Some(6)));
}
