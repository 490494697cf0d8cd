use gelato::{
    parse, repeat, tokenize, Context, Engine, Error, ExprError, MemoryLoader, RenderedFile,
    RepeatSpec, TagConfig,
};
use serde_json::json;
use std::path::{Path, PathBuf};

fn models() -> Context {
    Context::from_json(json!({
        "namespace": "App",
        "models": [
            { "name": "User", "table": "users" },
            { "name": "Company", "table": "companies" },
            { "name": "Post", "table": "posts" },
        ]
    }))
    .unwrap()
}

fn model_spec() -> RepeatSpec {
    RepeatSpec::new("models", "model", "[[ model.name ]].php.gel")
}

#[test]
fn one_file_per_element() {
    let engine = Engine::default().with_repeat("php/model.php.gel", model_spec());
    let files = engine
        .process(
            Path::new("php/model.php.gel"),
            "namespace [[ namespace ]]; class [[ model.name ]] { $table = '[[ model.table ]]'; }",
            &models(),
        )
        .unwrap();

    assert_eq!(
        files,
        vec![
            RenderedFile {
                path: PathBuf::from("php/User.php.gel"),
                body: "namespace App; class User { $table = 'users'; }".to_string(),
            },
            RenderedFile {
                path: PathBuf::from("php/Company.php.gel"),
                body: "namespace App; class Company { $table = 'companies'; }".to_string(),
            },
            RenderedFile {
                path: PathBuf::from("php/Post.php.gel"),
                body: "namespace App; class Post { $table = 'posts'; }".to_string(),
            },
        ]
    );
}

#[test]
fn template_without_repeat_renders_once_in_place() {
    let engine = Engine::default().with_repeat("php/model.php.gel", model_spec());
    let files = engine
        .process(Path::new("php/index.php.gel"), "[[ models.length ]]", &models())
        .unwrap();
    assert_eq!(
        files,
        vec![RenderedFile {
            path: PathBuf::from("php/index.php.gel"),
            body: "3".to_string(),
        }]
    );
}

#[test]
fn repeat_keys_match_equivalent_paths() {
    let engine = Engine::default().with_repeat("./php/../php/model.php.gel", model_spec());
    assert!(engine.repeat_for(Path::new("php/model.php.gel")).is_some());
}

#[test]
fn repeat_variable_does_not_reach_the_base_context() {
    let context = models();
    let engine = Engine::default().with_repeat("m.gel", model_spec());
    let files = engine
        .process(Path::new("m.gel"), "[[ model.name ]]", &context)
        .unwrap();
    assert_eq!(files.len(), 3);
    assert!(!context.contains("model"));
}

#[test]
fn filename_can_use_base_context_and_expressions() {
    let spec = RepeatSpec::new(
        "models",
        "model",
        "[[ namespace.toLowerCase() ]]_[[ model.table ]].sql",
    );
    let engine = Engine::default().with_repeat("db/schema.gel", spec);
    let files = engine
        .process(Path::new("db/schema.gel"), "", &models())
        .unwrap();
    let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("db/app_users.sql"),
            PathBuf::from("db/app_companies.sql"),
            PathBuf::from("db/app_posts.sql"),
        ]
    );
}

#[test]
fn empty_iterable_produces_no_files() {
    let engine = Engine::default().with_repeat("m.gel", model_spec());
    let context = Context::new().with_var("models", Vec::<i32>::new());
    let files = engine.process(Path::new("m.gel"), "x", &context).unwrap();
    assert!(files.is_empty());
}

// ── Leniency ──

#[test]
fn undefined_iterable_skips_the_template() {
    let engine = Engine::default().with_repeat("m.gel", model_spec());
    let files = engine
        .process(Path::new("m.gel"), "[[ model.name ]]", &Context::new())
        .unwrap();
    assert!(files.is_empty());
}

#[test]
fn unparsable_iterable_skips_the_template() {
    let engine = Engine::default().with_repeat("m.gel", RepeatSpec::new("models +", "model", "x"));
    let files = engine
        .process(Path::new("m.gel"), "body", &models())
        .unwrap();
    assert!(files.is_empty());
}

#[test]
fn non_array_iterable_is_an_error() {
    let engine = Engine::default().with_repeat("php/m.gel", model_spec());
    let context = Context::new().with_var("models", 5);
    let Err(Error::Evaluator(err)) = engine.process(Path::new("php/m.gel"), "x", &context) else {
        panic!("expected evaluator error");
    };
    assert_eq!(
        err.to_string(),
        "Evaluator Error - repeat iterable 'models' is not an array (got number) (php/m.gel (repeat):1:1)\n                models\n                ^"
    );
}

#[test]
fn type_faults_in_the_iterable_are_not_swallowed() {
    let engine = Engine::default().with_repeat("m.gel", RepeatSpec::new("cfg.a.list", "x", "x"));
    let context = Context::from_json(json!({ "cfg": {} })).unwrap();
    let Err(Error::Evaluator(err)) = engine.process(Path::new("m.gel"), "x", &context) else {
        panic!("expected evaluator error");
    };
    assert_eq!(
        err.fault,
        ExprError::Type("cannot read property 'list' of null".to_string())
    );
}

#[test]
fn faults_in_the_body_still_fail_the_run() {
    let engine = Engine::default().with_repeat("m.gel", model_spec());
    let err = engine
        .process(Path::new("m.gel"), "[[ model.name ]][[ missing ]]", &models())
        .unwrap_err();
    assert!(matches!(err, Error::Evaluator(_)));
}

#[test]
fn broken_filename_template_is_a_tokenizer_error() {
    let engine = Engine::default().with_repeat("m.gel", RepeatSpec::new("models", "model", "[[ model.name"));
    let Err(Error::Tokenizer(err)) = engine.process(Path::new("m.gel"), "x", &models()) else {
        panic!("expected tokenizer error");
    };
    assert_eq!(err.location.file, "m.gel (repeat filename)");
}

// ── Direct use ──

#[test]
fn repeat_can_be_driven_without_an_engine() {
    let tags = TagConfig::default();
    let tokens = tokenize("<[[ item ]]>", &tags, "list.gel").unwrap();
    let template = parse(&tokens).unwrap();
    let spec = RepeatSpec::new("[1, 2]", "item", "out/[[ item ]].txt");
    let context = Context::new();

    let files = repeat(
        &spec,
        Path::new("list.gel"),
        &template,
        &context,
        &tags,
        &MemoryLoader::new(),
    )
    .unwrap();
    let outputs: Vec<_> = files
        .iter()
        .map(|f| (f.path.to_string_lossy().into_owned(), f.body.as_str()))
        .collect();
    assert_eq!(
        outputs,
        vec![
            ("out/1.txt".to_string(), "<1>"),
            ("out/2.txt".to_string(), "<2>"),
        ]
    );
}
