use shipwright::template::{compile, substitute_tokens, ScriptCatalog, TemplateError};
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

fn tokens(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn provider_template_wins_over_raw_and_plain() {
    let tmp = tempdir().expect("tempdir");
    fs::write(tmp.path().join("linode-install_wp.sh"), "provider").expect("write");
    fs::write(tmp.path().join("raw-install_wp.sh"), "raw").expect("write");
    fs::write(tmp.path().join("install_wp.sh"), "plain").expect("write");

    let catalog = ScriptCatalog::new(tmp.path());
    let text = compile(
        &catalog,
        Some("linode"),
        "install_wp",
        &BTreeMap::new(),
        &BTreeMap::new(),
    )
    .expect("compile");
    assert_eq!(text, "provider");
}

#[test]
fn raw_override_applies_without_a_provider_match() {
    let tmp = tempdir().expect("tempdir");
    fs::write(tmp.path().join("raw-install_wp.sh"), "raw").expect("write");
    fs::write(tmp.path().join("install_wp.sh"), "plain").expect("write");

    let catalog = ScriptCatalog::new(tmp.path());
    let text = compile(
        &catalog,
        Some("linode"),
        "install_wp",
        &BTreeMap::new(),
        &BTreeMap::new(),
    )
    .expect("compile");
    assert_eq!(text, "raw");
}

#[test]
fn missing_template_is_an_explicit_error() {
    let tmp = tempdir().expect("tempdir");
    let catalog = ScriptCatalog::new(tmp.path());
    let err = compile(
        &catalog,
        None,
        "no_such_script",
        &BTreeMap::new(),
        &BTreeMap::new(),
    )
    .expect_err("missing template");
    assert!(matches!(err, TemplateError::NotFound { .. }));
}

#[test]
fn tokens_substitute_case_insensitively() {
    let rendered = substitute_tokens(
        "curl ##callback_url## --user ##USER##",
        &tokens(&[("CALLBACK_URL", "http://cb/1/"), ("user", "deploy")]),
    );
    assert_eq!(rendered, "curl http://cb/1/ --user deploy");
}

#[test]
fn unresolved_tokens_pass_through_verbatim() {
    let rendered = substitute_tokens(
        "echo ##KNOWN## ##UNKNOWN## ## not-a-token ##",
        &tokens(&[("KNOWN", "yes")]),
    );
    assert_eq!(rendered, "echo yes ##UNKNOWN## ## not-a-token ##");
}

#[test]
fn adjacent_tokens_after_an_unknown_one_still_resolve() {
    let rendered = substitute_tokens("##MISS####HIT##", &tokens(&[("HIT", "x")]));
    assert_eq!(rendered, "##MISS##x");
}

#[test]
fn custom_fields_join_the_export_preamble() {
    let tmp = tempdir().expect("tempdir");
    fs::write(
        tmp.path().join("install_wp.sh"),
        "export A=\"1\"\necho run",
    )
    .expect("write");

    let catalog = ScriptCatalog::new(tmp.path());
    let text = compile(
        &catalog,
        None,
        "install_wp",
        &BTreeMap::new(),
        &tokens(&[("php_version", "8.3")]),
    )
    .expect("compile");
    assert_eq!(text, "export A=\"1\" PHP_VERSION=\"8.3\"\necho run");
}

#[test]
fn custom_fields_get_their_own_export_line_when_none_exists() {
    let tmp = tempdir().expect("tempdir");
    fs::write(tmp.path().join("install_wp.sh"), "echo run").expect("write");

    let catalog = ScriptCatalog::new(tmp.path());
    let text = compile(
        &catalog,
        None,
        "install_wp",
        &BTreeMap::new(),
        &tokens(&[("site", "a \"b\"")]),
    )
    .expect("compile");
    assert_eq!(text, "export SITE=\"a \\\"b\\\"\"\necho run");
}

#[test]
fn windows_line_endings_are_normalized() {
    let tmp = tempdir().expect("tempdir");
    fs::write(tmp.path().join("install_wp.sh"), "line1\r\nline2\r\n").expect("write");

    let catalog = ScriptCatalog::new(tmp.path());
    let text = compile(
        &catalog,
        None,
        "install_wp",
        &BTreeMap::new(),
        &BTreeMap::new(),
    )
    .expect("compile");
    assert_eq!(text, "line1\nline2\n");
}
