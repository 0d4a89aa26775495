#[test]
fn help_lists_commands_and_output_flags() {
    let output = std::process::Command::new(assert_cmd::cargo::cargo_bin!("quota"))
        .arg("--help")
        .output()
        .expect("run help");
    assert!(output.status.success(), "--help should succeed");
    let text = String::from_utf8_lossy(&output.stdout);

    for needle in ["check", "list", "replay", "--json", "--pretty", "--log-level"] {
        assert!(
            text.contains(needle),
            "help output should contain '{needle}'"
        );
    }
}
