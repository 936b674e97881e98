use shipwright::shared::{validate_command_name, CommandName, ResourceId};

#[test]
fn resource_id_parses_numeric_input_only() {
    assert_eq!(ResourceId::parse("42").expect("numeric"), ResourceId::new(42));
    assert_eq!(ResourceId::parse(" 7 ").expect("trimmed"), ResourceId::new(7));
    assert!(ResourceId::parse("").is_err());
    assert!(ResourceId::parse("4two").is_err());
}

#[test]
fn command_names_accept_the_dispatch_alphabet() {
    for name in [
        "prepare_server",
        "install_wp_1608639174",
        "replace_domain---badvix05.wpvix.com---547",
    ] {
        // `---` is three hyphens, well inside the allowed set.
        assert!(validate_command_name(name).is_ok(), "{name}");
    }
    assert!(validate_command_name("").is_err());
    assert!(validate_command_name("rm -rf /").is_err());
    assert!(validate_command_name("name/with/slash").is_err());
}

#[test]
fn command_name_deserialization_rejects_invalid_input() {
    let ok: CommandName = serde_json::from_str("\"install_wp_1\"").expect("valid");
    assert_eq!(ok.as_str(), "install_wp_1");
    assert!(serde_json::from_str::<CommandName>("\"bad name\"").is_err());
}
