use std::{sync::Arc, time::Duration};

use javagrader::{
    config::GraderConfig,
    grade::{FindingKind, Grader, Status},
    rubric::{BehaviorCase, Criterion, CriterionKind, Rubric},
    sandbox::ExecutionResult,
    types::LineRef,
};

use sandbox_support::{ScriptedSandbox, completed, fixture_rubric, submission};

fn validation_sandbox() -> ScriptedSandbox {
    ScriptedSandbox::answering(&[("20\n", "majeur\n"), ("12\n", "mineur\n")])
}

fn grader(sandbox: ScriptedSandbox) -> Grader<ScriptedSandbox> {
    Grader::new(sandbox, GraderConfig::default())
}

fn behavior_rubric(cases: Vec<(&str, BehaviorCase)>) -> Arc<Rubric> {
    Arc::new(
        Rubric::builder()
            .id("behavior")
            .criteria(
                cases
                    .into_iter()
                    .map(|(id, case)| Criterion::new(id, CriterionKind::Behavior(case)))
                    .collect(),
            )
            .build(),
    )
}

#[tokio::test]
async fn correct_submission_scores_full_marks() {
    let rubric = Arc::new(fixture_rubric("validation.json"));
    let grader = grader(validation_sandbox());

    let report = grader
        .grade(&submission("ValidationCorrect.java", "alice"), &rubric)
        .await
        .expect("report");

    assert_eq!(report.findings.len(), rubric.criteria.len());
    assert!(report.findings.iter().all(|f| f.passed()), "{:#?}", report.findings);
    assert_eq!(report.score, 1.0);
    assert_eq!(report.points, 10.0);
    assert_eq!(report.submitter, "alice");

    let ids: Vec<_> = report.findings.iter().map(|f| f.criterion_id.as_str()).collect();
    let expected: Vec<_> = rubric.criteria.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn grading_twice_gives_identical_findings() {
    let rubric = Arc::new(fixture_rubric("validation.json"));
    let grader = grader(validation_sandbox());
    let submission = submission("ValidationWrongSignature.java", "bob");

    let first = grader.grade(&submission, &rubric).await.expect("first");
    let second = grader.grade(&submission, &rubric).await.expect("second");

    assert_eq!(first, second);
    // nothing is shared between two gradings
    assert_eq!(grader.sandbox().compiles(), 2);
}

#[tokio::test]
async fn wrong_signature_and_missing_method_stay_distinct() {
    let rubric = Arc::new(fixture_rubric("validation.json"));
    let grader = grader(validation_sandbox());

    let wrong = grader
        .grade(&submission("ValidationWrongSignature.java", "w"), &rubric)
        .await
        .expect("report");
    assert_eq!(wrong.findings[0].kind, FindingKind::WrongSignature);
    assert_eq!(wrong.findings[0].line, Some(4));

    let missing = grader
        .grade(&submission("ValidationMissingMethod.java", "m"), &rubric)
        .await
        .expect("report");
    assert_eq!(missing.findings[0].kind, FindingKind::MissingMethod);
    assert_eq!(missing.findings[1].status, Status::Error);

    // behavior is graded independently of structure
    assert!(missing.finding("adult").expect("adult").passed());
    assert!((missing.score - 6.0 / 9.0).abs() < 1e-9, "{}", missing.score);
}

#[tokio::test]
async fn while_loop_submission_fails_construct_rules_only() {
    let rubric = Arc::new(fixture_rubric("sequence.json"));
    let grader = grader(ScriptedSandbox::answering(&[("5\n", "1 2 3 4 5\n")]));

    let report = grader
        .grade(&submission("SequenceNumeriqueWhile.java", "carol"), &rubric)
        .await
        .expect("report");

    let no_while = report.finding("no-while").expect("no-while");
    assert_eq!((no_while.status, no_while.kind), (Status::Fail, FindingKind::ConstructViolation));
    assert_eq!(no_while.line, Some(7));
    assert_eq!(report.finding("uses-for").map(|f| f.kind), Some(FindingKind::ConstructViolation));
    assert!(report.finding("one-to-five").expect("behavior").passed());
    assert_eq!(report.count(Status::Fail), 2);
}

#[tokio::test]
async fn syntax_errors_degrade_every_criterion_without_compiling() {
    let rubric = Arc::new(fixture_rubric("validation.json"));
    let grader = grader(validation_sandbox());

    let report = grader
        .grade(&submission("ValidationSyntaxError.java", "dave"), &rubric)
        .await
        .expect("report");

    assert_eq!(report.findings.len(), rubric.criteria.len());
    assert_eq!(report.count(Status::Error), rubric.criteria.len());
    for (criterion, finding) in rubric.criteria.iter().zip(&report.findings) {
        let expected = if criterion.is_behavioral() {
            FindingKind::UnableToCompile
        } else {
            FindingKind::SyntaxError
        };
        assert_eq!(finding.kind, expected, "{}", criterion.id);
    }
    assert_eq!(report.score, 0.0);
    assert_eq!(grader.sandbox().compiles(), 0);
    assert_eq!(grader.sandbox().runs(), 0);
}

#[tokio::test]
async fn compile_errors_short_circuit_behavior() {
    let rubric = Arc::new(fixture_rubric("validation.json"));
    let javac = "Validation.java:5: error: incompatible types: int cannot be converted to boolean\n        \
                 return age;\n               ^\n1 error\n";
    let grader = grader(ScriptedSandbox::rejecting(javac));

    let report = grader
        .grade(&submission("ValidationTypeError.java", "erin"), &rubric)
        .await
        .expect("report");

    for id in ["adult", "minor"] {
        let finding = report.finding(id).expect("behavioral finding");
        assert_eq!((finding.status, finding.kind), (Status::Error, FindingKind::CompileError));
        assert!(finding.detail.contains("incompatible types"), "{}", finding.detail);
        assert_eq!(finding.line, Some(5));
    }
    // the source parses, so structure is still checked
    assert!(report.finding("signature-estMajeur").expect("signature").passed());
    assert_eq!(grader.sandbox().compiles(), 1);
    assert_eq!(grader.sandbox().runs(), 0);
}

#[tokio::test]
async fn cases_of_one_submission_compile_once() {
    let rubric = behavior_rubric(
        (1..=5)
            .map(|n| {
                let id: &'static str = ["c1", "c2", "c3", "c4", "c5"][n - 1];
                (
                    id,
                    BehaviorCase::builder()
                        .input(format!("{n}\n"))
                        .expected(format!("{n}"))
                        .build(),
                )
            })
            .collect(),
    );
    let sandbox = ScriptedSandbox::new(|input, _| completed(input)).with_compile_delay(Duration::from_millis(50));
    let grader = grader(sandbox);
    let submission = submission("ValidationCorrect.java", "frank");

    let report = grader.grade(&submission, &rubric).await.expect("report");
    assert!(report.findings.iter().all(|f| f.passed()));
    assert_eq!(grader.sandbox().compiles(), 1);
    assert_eq!(grader.sandbox().runs(), 5);

    let (a, b) = tokio::join!(grader.grade(&submission, &rubric), grader.grade(&submission, &rubric));
    assert!(a.expect("a").findings.iter().all(|f| f.passed()));
    assert!(b.expect("b").findings.iter().all(|f| f.passed()));
    assert_eq!(grader.sandbox().compiles(), 3);
    assert_eq!(grader.sandbox().runs(), 15);
}

#[tokio::test]
async fn workspaces_are_released_after_each_submission() {
    let rubric = Arc::new(fixture_rubric("validation.json"));
    let grader = grader(validation_sandbox());
    let submissions = vec![
        submission("ValidationCorrect.java", "a"),
        submission("ValidationWrongSignature.java", "b"),
        submission("ValidationMissingMethod.java", "c"),
    ];

    let reports = grader.grade_all(&submissions, &rubric).await.expect("reports");
    assert_eq!(reports.len(), 3);

    let workspaces = grader.sandbox().workspaces();
    assert_eq!(workspaces.len(), 3);
    for dir in workspaces {
        assert!(!dir.exists(), "{} still on disk", dir.display());
    }
}

#[tokio::test]
async fn one_failing_case_does_not_block_the_others() {
    let rubric = behavior_rubric(vec![
        ("loops", BehaviorCase::builder().input("loop").expected("").build()),
        ("crashes", BehaviorCase::builder().input("crash").expected("").build()),
        ("prints", BehaviorCase::builder().input("hello").expected("hello").build()),
        (
            "numeric",
            BehaviorCase::builder()
                .input("pi")
                .expected("3.14")
                .comparison(javagrader::rubric::Comparison::NumericTolerance { epsilon: 0.001 })
                .build(),
        ),
    ]);
    let sandbox = ScriptedSandbox::new(|input, _| match input {
        "loop" => ExecutionResult::Timeout {
            limit: Duration::from_millis(2000),
        },
        "crash" => ExecutionResult::RuntimeFault {
            exit_code:  Some(1),
            diagnostic: "java.lang.ArithmeticException: / by zero".into(),
            line_refs:  vec![LineRef {
                line_number: 3,
                file_name:   "Main.java".into(),
            }],
        },
        "pi" => completed("3.14159\n"),
        other => completed(&format!("{other}\n")),
    });
    let report = grader(sandbox)
        .grade(&submission("ValidationCorrect.java", "gina"), &rubric)
        .await
        .expect("report");

    let kinds: Vec<_> = report.findings.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            FindingKind::Timeout,
            FindingKind::RuntimeFault,
            FindingKind::Satisfied,
            FindingKind::OutputMismatch
        ]
    );
    assert_eq!(report.findings[1].line, Some(3));
    assert_eq!(report.score, 0.25);
}

#[tokio::test]
async fn arguments_reach_the_sandbox() {
    let rubric = behavior_rubric(vec![(
        "args",
        BehaviorCase::builder()
            .args(vec!["a".to_string(), "b".to_string()])
            .expected("a,b")
            .build(),
    )]);
    let sandbox = ScriptedSandbox::new(|_, args| completed(&args.join(",")));
    let report = grader(sandbox)
        .grade(&submission("ValidationCorrect.java", "hugo"), &rubric)
        .await
        .expect("report");
    assert!(report.findings[0].passed());
}

#[tokio::test]
async fn grade_all_keeps_input_order() {
    let rubric = Arc::new(fixture_rubric("validation.json"));
    let grader = grader(validation_sandbox());
    let submissions = vec![
        submission("ValidationCorrect.java", "first"),
        submission("ValidationWrongSignature.java", "second"),
        submission("ValidationSyntaxError.java", "third"),
        submission("ValidationCorrect.java", "fourth"),
    ];

    let reports = grader.grade_all(&submissions, &rubric).await.expect("reports");
    let submitters: Vec<_> = reports.iter().map(|r| r.submitter.as_str()).collect();
    assert_eq!(submitters, vec!["first", "second", "third", "fourth"]);
    assert_eq!(reports[0].score, 1.0);
    assert_eq!(reports[2].score, 0.0);
    // every parsable submission compiles on its own
    assert_eq!(grader.sandbox().compiles(), 3);
}

#[tokio::test]
async fn empty_rubric_scores_zero() {
    let rubric = Arc::new(Rubric::builder().id("empty").build());
    let grader = grader(validation_sandbox());
    let report = grader
        .grade(&submission("ValidationCorrect.java", "ivan"), &rubric)
        .await
        .expect("report");

    assert!(report.findings.is_empty());
    assert_eq!(report.score, 0.0);
    assert_eq!(grader.sandbox().compiles(), 0);
}

#[tokio::test]
async fn zero_weights_score_zero() {
    let rubric = Arc::new(
        Rubric::builder()
            .id("weightless")
            .criteria(vec![
                Criterion::new("out", CriterionKind::Behavior(BehaviorCase::builder().input("20\n").expected("majeur").build()))
                    .with_weight(0.0),
            ])
            .build(),
    );
    let report = grader(validation_sandbox())
        .grade(&submission("ValidationCorrect.java", "jane"), &rubric)
        .await
        .expect("report");

    assert!(report.findings[0].passed());
    assert_eq!(report.total_weight, 0.0);
    assert_eq!(report.score, 0.0);
}
