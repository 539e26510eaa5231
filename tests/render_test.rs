//! Integration tests for compiling and rendering templates through the public API

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use sigil_template::{Error, Render, RenderConfig, Resolved, Template, Value};
use tempfile::TempDir;

fn write(root: &Path, name: &str, text: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn params(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn render(text: &str, name: &str, pairs: &[(&str, Value)]) -> String {
    Template::compile(text, name)
        .unwrap()
        .invoke(&params(pairs))
        .unwrap()
        .to_string()
}

#[test]
fn test_literal_text_is_unchanged_after_normalization() {
    let text = "<p>plain text, no directives</p>\r\nsecond line";
    assert_eq!(
        render(text, "plain.html", &[]),
        "<p>plain text, no directives</p>\nsecond line\n"
    );
}

#[test]
fn test_substitution_escapes_unless_raw() {
    let nasty = Value::from("<b>&\"'");
    let text = "$def with (name)\n$name\n$:name\n";
    assert_eq!(
        render(text, "x.html", &[("name", nasty)]),
        "&lt;b&gt;&amp;&quot;&#39;\n<b>&\"'\n"
    );
}

#[test]
fn test_double_sigil_is_a_literal_dollar() {
    assert_eq!(render("costs $$5 or $$name\n", "price.txt", &[]), "costs $5 or $name\n");
}

#[test]
fn test_loop_metadata_over_three_items() {
    let text = concat!(
        "$def with (x)\n",
        "$for i in x:\n",
        "    $loop.index $loop.revindex $loop.first $loop.last $loop.parity\n",
    );
    let items = Value::list(vec!["a".into(), "b".into(), "c".into()]);
    assert_eq!(
        render(text, "loop.txt", &[("x", items)]),
        "1 3 True False odd\n2 2 False False even\n3 1 False True odd\n"
    );
}

#[test]
fn test_outer_loop_metadata_survives_inner_loop() {
    let text =
        "$for a in range(2):\n    $for b in range(3):\n        .\n    $loop.index/$loop.length\n";
    assert_eq!(render(text, "nested.txt", &[]), ".\n.\n.\n1/2\n.\n.\n.\n2/2\n");
}

#[test]
fn test_var_sets_attribute_without_touching_body() {
    let template =
        Template::compile("$def with (place)\n$var title: My $place\nbody\n", "page.txt").unwrap();
    let record = template.invoke(&params(&[("place", "World".into())])).unwrap();
    assert_eq!(record.peek("title"), Some(Value::from("My World")));
    assert_eq!(record.to_string(), "body\n");
}

#[test]
fn test_defaults_and_missing_params() {
    let template = Template::compile("$def with (a, b=2)\n$a $b\n", "d.txt").unwrap();
    let out = template.invoke(&params(&[("a", Value::Int(1))])).unwrap();
    assert_eq!(out.to_string(), "1 2\n");
    assert!(matches!(template.invoke(&IndexMap::new()), Err(Error::Eval(_))));
}

#[test]
fn test_elif_else_chain() {
    let text = concat!(
        "$def with (n)\n",
        "$if n < 0:\n",
        "    negative\n",
        "$elif n == 0:\n",
        "    zero\n",
        "$else:\n",
        "    positive\n",
    );
    assert_eq!(render(text, "sign.txt", &[("n", Value::Int(-3))]), "negative\n");
    assert_eq!(render(text, "sign.txt", &[("n", Value::Int(0))]), "zero\n");
    assert_eq!(render(text, "sign.txt", &[("n", Value::Int(7))]), "positive\n");
}

#[test]
fn test_comments_and_line_continuation() {
    let text = "a $# dropped\nb\\\nc\n";
    assert_eq!(render(text, "c.txt", &[]), "a \nbc\n");
}

#[test]
fn test_parse_errors_report_source_line() {
    let err = Template::compile("one\ntwo\n$for x in items\n    $x\n", "bad.txt").unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(err.location(), Some(("bad.txt", 3)));
}

#[test]
fn test_repository_prefers_lexicographically_first_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.html", "html\n");
    write(dir.path(), "a.txt", "text\n");
    write(dir.path(), "b/inner.txt", "inner\n");

    let render = Render::new(dir.path());
    assert_eq!(render.template("a").unwrap().name(), "a.html");

    let Resolved::Directory(child) = render.resolve("b").unwrap() else {
        panic!("expected a nested render");
    };
    assert_eq!(child.root(), dir.path().join("b"));
    assert_eq!(child.render("inner", &IndexMap::new()).unwrap().to_string(), "inner\n");
}

#[test]
fn test_cached_render_compiles_once() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.txt", "page\n");

    let cached = Render::new(dir.path());
    cached.render("page", &IndexMap::new()).unwrap();
    cached.render("page", &IndexMap::new()).unwrap();
    assert_eq!(cached.compilations(), 1);

    let uncached = Render::new(dir.path()).with_cache(false);
    uncached.render("page", &IndexMap::new()).unwrap();
    uncached.render("page", &IndexMap::new()).unwrap();
    assert_eq!(uncached.compilations(), 2);
}

#[test]
fn test_render_from_config_applies_base_and_globals() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "layout.html",
        "$def with (content)\n<title>$content.title - $site</title>\n$:content\n",
    );
    write(dir.path(), "home.html", "$var title: Home\n<p>welcome</p>\n");

    let config = RenderConfig::from_toml(
        "base = \"layout\"\nexpose_as = \"render\"\n[globals]\nsite = \"Demo\"\n",
    )
    .unwrap();
    let render = Render::from_config(dir.path(), &config);
    let out = render.render("home", &IndexMap::new()).unwrap();
    assert_eq!(out.to_string(), "<title>Home - Demo</title>\n<p>welcome</p>\n\n");
}
