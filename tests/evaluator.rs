use gelato::{render, Context, Error, ExprError, Value};
use rstest::rstest;
use serde_json::json;

fn ctx(value: serde_json::Value) -> Context {
    Context::from_json(value).unwrap()
}

// ── Blocks ──

#[test]
fn nested_loops_multiply() {
    let out = render(
        "[! for x in [1] !][! for y in [1,2] !]a[! efor !][! efor !]",
        &Context::new(),
    )
    .unwrap();
    assert_eq!(out, "aa");
}

#[test]
fn exactly_one_branch_renders() {
    let template = "[! if x===2 !]A[! else if y===2 !]B[! else !]C[! eif !]";
    assert_eq!(render(template, &ctx(json!({ "x": 1, "y": 2 }))).unwrap(), "B");
    assert_eq!(render(template, &ctx(json!({ "x": 2, "y": 2 }))).unwrap(), "A");
    assert_eq!(render(template, &ctx(json!({ "x": 1, "y": 1 }))).unwrap(), "C");
}

#[test]
fn if_without_matching_branch_renders_nothing() {
    let out = render("<[! if flag !]yes[! eif !]>", &ctx(json!({ "flag": false }))).unwrap();
    assert_eq!(out, "<>");
}

#[test]
fn loop_variable_shadows_and_does_not_leak() {
    let out = render(
        "[! for x in [1, 2] !][[ x ]][! efor !]-[[ x ]]",
        &ctx(json!({ "x": "outer" })),
    )
    .unwrap();
    assert_eq!(out, "12-outer");
}

#[test]
fn loop_body_sees_enclosing_names() {
    let out = render(
        "[! for m in models !][[ prefix ]][[ m.name ]];[! efor !]",
        &ctx(json!({ "prefix": "App\\", "models": [{ "name": "User" }, { "name": "Post" }] })),
    )
    .unwrap();
    assert_eq!(out, "App\\User;App\\Post;");
}

#[rstest]
#[case("5")]
#[case("'abc'")]
#[case("null")]
#[case("{ a: 1 }")]
fn non_array_iterables_run_zero_times(#[case] iterable: &str) {
    let template = format!("[! for x in {} !]a[! efor !]done", iterable);
    assert_eq!(render(&template, &Context::new()).unwrap(), "done");
}

#[test]
fn untaken_branches_are_never_evaluated() {
    let out = render(
        "[! if true !]ok[! else if missing.deep !][[ missing ]][! else !][[ a b ]][! eif !]",
        &Context::new(),
    )
    .unwrap();
    assert_eq!(out, "ok");
}

#[test]
fn empty_array_skips_the_body() {
    let out = render("[! for x in xs !][[ undefined_name ]][! efor !]", &ctx(json!({ "xs": [] })))
        .unwrap();
    assert_eq!(out, "");
}

// ── Expressions ──

#[rstest]
#[case("[[ 1 + 2 * 3 ]]", "7")]
#[case("[[ (1 + 2) * 3 ]]", "9")]
#[case("[[ 7 / 2 ]]", "3.5")]
#[case("[[ 7 % 4 ]]", "3")]
#[case("[[ -n + 1 ]]", "-2")]
#[case("[[ 'a' + 1 ]]", "a1")]
#[case("[[ name + '!' ]]", "Mark!")]
#[case("[[ n > 2 ? 'big' : 'small' ]]", "big")]
#[case("[[ 1 == '1' ]]", "true")]
#[case("[[ 1 === '1' ]]", "false")]
#[case("[[ null == undefined ]]", "true")]
#[case("[[ 'b' > 'a' ]]", "true")]
#[case("[[ !empty ]]", "true")]
#[case("[[ empty || 'fallback' ]]", "fallback")]
#[case("[[ name && n ]]", "3")]
#[case("[[ nothing ]]", "")]
#[case("[[ xs ]]", "1,2,3")]
#[case("[[ xs.length ]]", "3")]
#[case("[[ xs[1] ]]", "2")]
#[case("[[ xs[10] ]]", "")]
#[case("[[ user.name ]]", "Ann")]
#[case("[[ user['name'] ]]", "Ann")]
#[case("[[ user.missing ]]", "")]
#[case("[[ name.length ]]", "4")]
#[case("[[ name[0] ]]", "M")]
#[case("[[ name.toUpperCase() ]]", "MARK")]
#[case("[[ name.toLowerCase().startsWith('ma') ]]", "true")]
#[case("[[ xs.join(' | ') ]]", "1 | 2 | 3")]
#[case("[[ xs.includes(2) ]]", "true")]
#[case("[[ user ]]", r#"{"name":"Ann"}"#)]
#[case("[[ [1, 'two', true] ]]", "1,two,true")]
fn expression_rendering(#[case] template: &str, #[case] expected: &str) {
    let context = ctx(json!({
        "n": 3,
        "name": "Mark",
        "empty": "",
        "nothing": null,
        "xs": [1, 2, 3],
        "user": { "name": "Ann" },
    }));
    assert_eq!(render(template, &context).unwrap(), expected);
}

// ── Host functions ──

#[test]
fn top_level_functions_are_callable() {
    let mut context = Context::new().with_var("name", "user");
    context.set_function("capitalize", |args| {
        let s = match args.first() {
            Some(Value::String(s)) => s.as_str(),
            _ => "",
        };
        let mut chars = s.chars();
        Ok(match chars.next() {
            Some(first) => Value::from(first.to_uppercase().collect::<String>() + chars.as_str()),
            None => Value::from(""),
        })
    });
    assert_eq!(render("[[ capitalize(name) ]]s", &context).unwrap(), "Users");
}

#[test]
fn functions_stored_on_objects_are_callable() {
    let helpers: Value = [(
        "plural",
        Value::function("plural", |args| Ok(Value::from(format!("{}s", args[0])))),
    )]
    .into_iter()
    .collect();
    let context = Context::new().with_var("helpers", helpers);
    assert_eq!(
        render("[[ helpers.plural('post') ]]", &context).unwrap(),
        "posts"
    );
}

#[test]
fn function_errors_carry_the_function_name() {
    let mut context = Context::new();
    context.set_function("fail", |_| Err("boom".to_string()));
    let Err(Error::Evaluator(err)) = render("[[ fail() ]]", &context) else {
        panic!("expected evaluator error");
    };
    assert_eq!(
        err.fault,
        ExprError::Function {
            name: "fail".to_string(),
            message: "boom".to_string()
        }
    );
}

#[test]
fn calling_a_non_function_is_a_type_error() {
    let Err(Error::Evaluator(err)) = render("[[ name() ]]", &ctx(json!({ "name": "x" }))) else {
        panic!("expected evaluator error");
    };
    assert_eq!(err.fault, ExprError::Type("name is not a function".to_string()));
}

// ── Faults ──

#[test]
fn unknown_name_is_a_reference_error() {
    let Err(Error::Evaluator(err)) = render("ab [[ missing ]]", &Context::new()) else {
        panic!("expected evaluator error");
    };
    assert_eq!(err.fault, ExprError::Reference("missing".to_string()));
    assert_eq!(err.location.column, 4);
}

#[test]
fn else_if_fault_points_at_the_else_if_tag() {
    let Err(Error::Evaluator(err)) =
        render("[! if false !]a[! else if missing !]b[! eif !]", &Context::new())
    else {
        panic!("expected evaluator error");
    };
    assert_eq!(err.location.column, 16);
}

#[test]
fn member_of_null_is_a_type_error() {
    let Err(Error::Evaluator(err)) = render("[[ user.a.b ]]", &ctx(json!({ "user": {} }))) else {
        panic!("expected evaluator error");
    };
    assert_eq!(
        err.fault,
        ExprError::Type("cannot read property 'b' of null".to_string())
    );
}

#[test]
fn syntax_errors_surface_when_reached() {
    let Err(Error::Evaluator(err)) = render("[[ a b ]]", &ctx(json!({ "a": 1, "b": 2 }))) else {
        panic!("expected evaluator error");
    };
    assert_eq!(err.fault, ExprError::Syntax("Unexpected token 'b'".to_string()));
}

#[test]
fn deeply_nested_expressions_are_rejected_with_a_location() {
    let nested = |d: usize| format!("x [[ {}1{} ]]", "(".repeat(d), ")".repeat(d));
    assert_eq!(render(&nested(40), &Context::new()).unwrap(), "x 1");

    let Err(Error::Evaluator(err)) = render(&nested(300), &Context::new()) else {
        panic!("expected evaluator error");
    };
    assert_eq!(
        err.fault,
        ExprError::Syntax("expression nested too deeply".to_string())
    );
    assert_eq!(err.location.column, 3);
}
