use std::sync::Arc;

use selrule::catalog::Op;
use selrule::xpt::Expression;
use selrule::{Engine, EngineConfig, ErrorKind, InMemoryEngine, Value};

const DATA: &str = include_str!("fixtures/projects.json");
const RULES: &str = include_str!("fixtures/rules/deliverables.sel");

fn engine() -> Engine {
    engine_with(EngineConfig::default())
}

fn engine_with(config: EngineConfig) -> Engine {
    let engine = Engine::new(config);
    let memory = InMemoryEngine::from_json(DATA).expect("fixture data loads");
    assert!(engine.register_data_engine(Arc::new(memory)));
    engine
}

fn ids(records: &[selrule::repository::Record]) -> Vec<f64> {
    records
        .iter()
        .filter_map(|r| r.get("ID").and_then(Value::as_number))
        .collect()
}

#[test]
fn literal_key_condition() {
    let verification = engine().verify("s1.sel", "selection s1 as deliverables[100];");
    assert!(verification.messages.is_empty(), "{:?}", verification.messages);

    let rule = verification.unit.rule("s1").expect("rule S1");
    assert_eq!(rule.id(), "S1");
    let objects = &rule.header().objects;
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].object.qualified_name().canonical().full_id(), "PROJECTS.DELIVERABLES");

    match objects[0].condition.as_ref().expect("a condition") {
        Expression::Compare(b) => {
            assert_eq!(b.op, Op::Eq);
            match (b.left.as_ref(), b.right.as_ref()) {
                (Expression::Entry(entry), Expression::Literal(literal)) => {
                    assert_eq!(entry.entry(), "ID");
                    assert_eq!(literal.value(), &Value::Number(100.0));
                }
                other => panic!("unexpected operands {:?}", other),
            }
        }
        other => panic!("expected a comparison, got {}", other),
    }
}

#[test]
fn parameter_key_condition() {
    let verification = engine().verify("s2.sel", "selection s2 (p1 as number) as deliverables[p1];");
    assert!(!verification.has_errors(), "{:?}", verification.messages);

    let rule = verification.unit.rule("s2").expect("rule S2");
    assert_eq!(rule.arity(), 1);
    assert_eq!(rule.parameters()[0].name.full_id(), "P1");
    assert!(rule.parameters()[0].data_type.category().is_numeric());

    match rule.header().objects[0].condition.as_ref().expect("a condition") {
        Expression::Compare(b) => match (b.left.as_ref(), b.right.as_ref()) {
            (Expression::Entry(entry), Expression::Variable(variable)) => {
                assert_eq!(entry.entry(), "ID");
                assert_eq!(variable.name().full_id(), "P1");
            }
            other => panic!("unexpected operands {:?}", other),
        },
        other => panic!("expected a comparison, got {}", other),
    }
}

#[test]
fn wrong_argument_count_names_the_rule() {
    let engine = engine();
    engine
        .compile("s3.sel", "selection s3 (p1 as number) as deliverables[p1];")
        .expect("compiles");

    let err = engine
        .invoke("s3", vec![Value::Number(1.0), Value::Number(2.0)])
        .unwrap_err();
    match &err.kind {
        ErrorKind::InvalidArgumentCount { rule, expected, actual } => {
            assert_eq!(rule, "S3");
            assert_eq!((*expected, *actual), (1, 2));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.to_string().contains("S3"));
}

#[test]
fn undeclared_variable_is_reported_but_the_tree_survives() {
    let source = include_str!("fixtures/broken.sel");
    let verification = engine().verify("broken.sel", source);

    assert!(verification.has_errors());
    assert_eq!(verification.unit.rules.len(), 1);
    let texts: Vec<_> = verification.messages.iter().map(|m| m.text.clone()).collect();
    assert!(
        texts.iter().any(|t| t.contains("'MISSING'") && t.contains("LOST.BLOCK1")),
        "{:?}",
        texts
    );
    let message = &verification.messages[0];
    assert_eq!((message.line, message.column), (2, 5));
}

#[test]
fn compiled_rules_select_records() {
    let engine = engine();
    let compilation = engine.compile("deliverables.sel", RULES).expect("compiles");
    assert!(compilation.messages.is_empty(), "{:?}", compilation.messages);

    assert_eq!(ids(&engine.invoke("kickoff", vec![]).unwrap()), vec![100.0]);
    assert_eq!(
        ids(&engine.invoke("reports.by_id", vec![Value::Number(102.0)]).unwrap()),
        vec![102.0]
    );
    assert!(engine.invoke("by_id", vec![Value::Number(7.0)]).unwrap().is_empty());
}

#[test]
fn null_arguments_take_the_default() {
    let engine = engine();
    engine.compile("deliverables.sel", RULES).expect("compiles");

    assert_eq!(
        ids(&engine.invoke("due_after", vec![Value::Null]).unwrap()),
        vec![101.0, 102.0]
    );
    assert_eq!(
        ids(&engine.invoke("due_after", vec![Value::Text("2024-04-01".into())]).unwrap()),
        vec![102.0]
    );
}

#[test]
fn bodies_choose_what_to_return() {
    let engine = engine();
    engine
        .compile(
            "pick.sel",
            "selection pick (all as boolean) as deliverables {
                 var first as number := 100;
                 if all then return deliverables;
                 return deliverables[first];
             }",
        )
        .expect("compiles");

    assert_eq!(ids(&engine.invoke("pick", vec![Value::Boolean(true)]).unwrap()).len(), 3);
    assert_eq!(
        ids(&engine.invoke("pick", vec![Value::Boolean(false)]).unwrap()),
        vec![100.0]
    );
}

#[test]
fn block_variables_do_not_leak_into_outer_bindings() {
    let engine = engine();
    let compilation = engine
        .compile(
            "shadow.sel",
            "selection s (p as number) as deliverables {
                 if true then { var p as number := 999; }
                 return deliverables[p];
             }",
        )
        .expect("compiles");
    assert!(compilation.messages.is_empty(), "{:?}", compilation.messages);

    assert_eq!(ids(&engine.invoke("s", vec![Value::Number(100.0)]).unwrap()), vec![100.0]);
}

#[test]
fn assignments_inside_blocks_reach_the_outer_variable() {
    let engine = engine();
    engine
        .compile(
            "outer.sel",
            "selection s (p as number) as deliverables {
                 var id as number := 100;
                 if p > 0 then { id := p; }
                 return deliverables[id];
             }",
        )
        .expect("compiles");

    assert_eq!(ids(&engine.invoke("s", vec![Value::Number(102.0)]).unwrap()), vec![102.0]);
    assert_eq!(ids(&engine.invoke("s", vec![Value::Number(0.0)]).unwrap()), vec![100.0]);
}

#[test]
fn qualified_names_do_not_reach_another_rules_symbols() {
    let verification = engine().verify(
        "sideways.sel",
        "selection s1 (p as number) as deliverables[p];
         selection s2 as deliverables { s1.p := 5; return deliverables; }",
    );
    assert!(verification.has_errors());
    let texts: Vec<_> = verification.messages.iter().map(|m| m.text.clone()).collect();
    assert!(
        texts.iter().any(|t| t.contains("'S1.P'") && t.contains("S2.BLOCK1")),
        "{:?}",
        texts
    );
}

#[test]
fn modules_keep_rules_apart() {
    let engine = engine();
    engine
        .compile("a.sel", "module one; selection same as deliverables[100];")
        .expect("first module");
    engine
        .compile("b.sel", "module two; selection same as deliverables[101];")
        .expect("second module");

    assert_eq!(engine.selection_rules("same").len(), 2);
    assert_eq!(ids(&engine.invoke("two.same", vec![]).unwrap()), vec![101.0]);
    assert_eq!(ids(&engine.invoke("one.same", vec![]).unwrap()), vec![100.0]);

    let err = engine
        .compile("c.sel", "module one; selection same as deliverables;")
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CompilationFailed { .. }));
    assert_eq!(ids(&engine.invoke("one.same", vec![]).unwrap()), vec![100.0]);
}

#[test]
fn default_module_applies_to_unqualified_rules() {
    let engine = engine_with(EngineConfig {
        default_module: Some("reports".into()),
        ..EngineConfig::default()
    });
    engine
        .compile("d.sel", "selection everything as deliverables;")
        .expect("compiles");
    assert!(engine.has_selection_rule("reports.everything"));
    assert_eq!(ids(&engine.invoke("everything", vec![]).unwrap()).len(), 3);
}
