//! Loading template groups from directories and group files

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use stencil::{Delimiters, TemplateError, TemplateGroup};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("Should write fixture");
}

fn decl_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decl.st", "<type> <name><init(value)>;\n");
    write(dir.path(), "init.st", "<if(v)> = <v><endif>\n");
    dir
}

#[test]
fn test_raw_templates_with_inferred_params() {
    let dir = decl_dir();
    let group = TemplateGroup::from_dir(dir.path()).unwrap();
    assert_eq!(group.template_names(), vec!["decl", "init"]);

    let decl = group.get("decl").unwrap();
    assert!(decl.inferred);
    assert_eq!(decl.param_names(), vec!["type", "name", "value"]);

    let mut st = group.get_instance_of("decl").unwrap();
    st.bind("type", "int").bind("name", "x").bind("value", 0);
    assert_eq!(st.render().unwrap(), "int x = 0;");
}

#[test]
fn test_inferred_params_do_not_block_dynamic_scope() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "page.st", "<header()>|<title>");
    write(dir.path(), "header.st", "== <title> ==");
    let group = TemplateGroup::from_dir(dir.path()).unwrap();

    let mut page = group.get_instance_of("page").unwrap();
    page.bind("title", "Home");
    assert_eq!(page.render().unwrap(), "== Home ==|Home");
}

#[test]
fn test_manifest_declares_params_and_delimiters() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "group.toml",
        r#"
        [group]
        name = "code"
        delimiters = "$$"

        [templates.assign]
        params = ["lhs", "rhs"]
        "#,
    );
    write(dir.path(), "assign.st", "$lhs$ <- $rhs$\n");
    write(dir.path(), "use.st", "$assign(\"a\", \"b\")$\n");

    let group = TemplateGroup::from_dir(dir.path()).unwrap();
    assert_eq!(group.name(), "code");
    assert_eq!(group.delimiters(), Delimiters::new('$', '$'));

    let assign = group.get("assign").unwrap();
    assert!(!assign.inferred);
    assert_eq!(assign.param_names(), vec!["lhs", "rhs"]);

    let out = group.get_instance_of("use").unwrap().render().unwrap();
    assert_eq!(out, "a <- b");
}

#[test]
fn test_definition_header_file() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "greet.st",
        "greet(name, greeting=\"Hi\") ::= \"<greeting> <name>\"\n",
    );
    let group = TemplateGroup::from_dir(dir.path()).unwrap();
    let mut t = group.get_instance_of("greet").unwrap();
    t.bind("name", "Ter");
    assert_eq!(t.render().unwrap(), "Hi Ter");
}

#[test]
fn test_definition_header_name_must_match_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "greet.st", "hello(name) ::= \"<name>\"\n");
    let err = TemplateGroup::from_dir(dir.path()).unwrap_err();
    assert!(matches!(
        err,
        TemplateError::NameMismatch { expected, found, .. } if expected == "greet" && found == "hello"
    ));
}

#[test]
fn test_non_template_files_are_ignored() {
    let dir = decl_dir();
    write(dir.path(), "README.md", "not a template <oops");
    fs::create_dir(dir.path().join("nested.st")).unwrap();
    let group = TemplateGroup::from_dir(dir.path()).unwrap();
    assert_eq!(group.template_names(), vec!["decl", "init"]);
}

#[test]
fn test_bad_manifest() {
    let dir = decl_dir();
    write(dir.path(), "group.toml", "[group]\ndelimiters = 5\n");
    let err = TemplateGroup::from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, TemplateError::Manifest { .. }));
}

#[test]
fn test_parse_error_in_directory_names_file() {
    let dir = decl_dir();
    write(dir.path(), "broken.st", "<if(x)>never closed");
    let err = TemplateGroup::from_dir(dir.path()).unwrap_err();
    let TemplateError::Parse { origin, .. } = &err else {
        panic!("Expected a parse error, got {:?}", err);
    };
    assert!(origin.ends_with("broken.st"));
}

#[test]
fn test_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = TemplateGroup::from_dir(dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, TemplateError::Io { .. }));
}

#[test]
fn test_group_file_named_after_stem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.stg");
    fs::write(
        &path,
        r#"
        // declarations
        decl(type, name, value) ::= "<type> <name><init(value)>;"
        /* initialiser */
        init(v) ::= "<if(v)> = <v><endif>"
        "#,
    )
    .unwrap();

    let group = TemplateGroup::from_group_file(&path).unwrap();
    assert_eq!(group.name(), "test");

    let mut t = group.get_instance_of("decl").unwrap();
    t.bind("type", "int").bind("name", "x").bind("value", 0);
    assert_eq!(t.render().unwrap(), "int x = 0;");
}

#[test]
fn test_builder_combines_sources() {
    let dir = decl_dir();
    let mut builder = TemplateGroup::builder("combined");
    builder.load_dir(dir.path()).unwrap();
    builder
        .load_group_str("extra", r#"stmt(type, name) ::= "  <decl()>""#)
        .unwrap();
    let group = builder.build().unwrap();

    let mut t = group.get_instance_of("stmt").unwrap();
    t.bind("type", "bool").bind("name", "ok");
    assert_eq!(t.render().unwrap(), "  bool ok;");
}
