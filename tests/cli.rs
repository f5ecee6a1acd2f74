// CLI integration tests for nagare

use std::process::Command;

const GREETER: &str = r#"
package = "helloworld"
name = "Greeter"

[[methods]]
name = "SayHello"
request = "HelloRequest"
response = "HelloReply"

[[methods]]
name = "Chat"
request = "Line"
response = "Line"
client_streaming = true
server_streaming = true
"#;

/// Test that --help lists the generate subcommand
#[test]
fn test_help_shows_generate_subcommand() {
    let output = Command::new(env!("CARGO_BIN_EXE_nagare"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Help should exit with success");
    assert!(
        stdout.contains("generate"),
        "Help should list generate. Got: {}",
        stdout
    );
}

/// Test that generate prints source to stdout
#[test]
fn test_generate_prints_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let service = dir.path().join("greeter.toml");
    std::fs::write(&service, GREETER).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_nagare"))
        .arg("generate")
        .arg(&service)
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("pub struct GreeterClient<C> {"), "Got: {}", stdout);
    assert!(stdout.contains("pub fn chat<S>(&self, requests: S)"), "Got: {}", stdout);
}

/// Test that --out writes the file instead of stdout
#[test]
fn test_generate_writes_out_file() {
    let dir = tempfile::tempdir().unwrap();
    let service = dir.path().join("greeter.toml");
    let out = dir.path().join("greeter.rs");
    std::fs::write(&service, GREETER).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_nagare"))
        .arg("generate")
        .arg(&service)
        .arg("--out")
        .arg(&out)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(output.stdout.is_empty());
    let source = std::fs::read_to_string(&out).unwrap();
    assert!(source.contains("pub fn greeter_service_definition<T: Greeter>("));
}

/// Test that an invalid description fails with a message
#[test]
fn test_generate_rejects_invalid_description() {
    let dir = tempfile::tempdir().unwrap();
    let service = dir.path().join("bad.toml");
    std::fs::write(&service, "package = \"helloworld\"\nname = \"1Greeter\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_nagare"))
        .arg("generate")
        .arg(&service)
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("not an identifier"), "Got: {}", stderr);
}
