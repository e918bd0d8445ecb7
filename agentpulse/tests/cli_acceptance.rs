use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("agentpulse");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("agentpulse"));

    let mut command = Command::new(bin_path);

    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute agentpulse: {e}"))
}

/// `run_bin` for async tests: the process blocks, and the mock collector
/// must keep serving while it runs.
async fn run_bin_async(env: &CliTestEnv, args: &[&str]) -> Output {
    let home = env.home.clone();
    let xdg_config = env.xdg_config.clone();
    let xdg_state = env.xdg_state.clone();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();

    tokio::task::spawn_blocking(move || {
        let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("agentpulse"));
        Command::new(bin_path)
            .args(&args)
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &xdg_config)
            .env("XDG_STATE_HOME", &xdg_state)
            .output()
            .unwrap_or_else(|e| panic!("failed to execute agentpulse: {e}"))
    })
    .await
    .expect("command task panicked")
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "agentpulse {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn collector_config(server_url: &str) -> String {
    format!(
        "[collector]\n\
         enabled = true\n\
         server_url = \"{server_url}\"\n\
         agent_id = \"cli-agent\"\n\
         timeout_secs = 2\n\
         max_retries = 0\n"
    )
}

#[test]
fn status_without_config_reports_disabled() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Pulseboard Collector Configuration"));
    assert!(stdout.contains("Enabled:         false"));
    assert!(
        stdout.contains("Collector is disabled"),
        "expected setup instructions in stdout, got:\n{stdout}"
    );
}

#[test]
fn status_with_config_reports_ready() {
    let env = CliTestEnv::new();
    env.write_config(&collector_config("https://pulseboard.example.com"));

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Enabled:         true"));
    assert!(stdout.contains("Server URL:      https://pulseboard.example.com"));
    assert!(stdout.contains("Agent ID:        cli-agent"));
    // Defaults fill in what the config file leaves out
    assert!(stdout.contains("Batch Size:      100"));
    assert!(stdout.contains("Queue Capacity:  10000"));
    assert!(stdout.contains("Status: Ready to deliver"));
}

#[test]
fn invalid_config_fails_fast() {
    let env = CliTestEnv::new();
    env.write_config(
        "[collector]\n\
         enabled = true\n\
         server_url = \"https://pulseboard.example.com\"\n\
         batch_size = 0\n",
    );

    let output = run_bin(&env, &["status"]);
    assert!(
        !output.status.success(),
        "status should fail on invalid config"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("batch_size"),
        "expected validation detail in stderr, got:\n{stderr}"
    );
}

#[test]
fn send_without_config_is_graceful() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["send"]);
    assert_success(&["send"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Collector is not configured"));
}

#[tokio::test]
async fn send_delivers_through_running_collector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accepted": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let env = CliTestEnv::new();
    env.write_config(&collector_config(&server.uri()));

    let args = [
        "send",
        "--task-id",
        "cli-smoke",
        "--duration-ms",
        "42",
        "--metrics",
        r#"{"tokens_in": 120, "tokens_out": 80}"#,
    ];
    let output = run_bin_async(&env, &args).await;
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Sending task event 'cli-smoke' as agent 'cli-agent'"));
    assert!(stdout.contains("Delivered 1 event(s)"));

    // The collector saw the metrics passed on the command line
    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("body should be JSON");
    assert_eq!(body["events"][0]["task_id"], "cli-smoke");
    assert_eq!(body["events"][0]["metrics"]["tokens_in"], 120);
}

#[tokio::test]
async fn send_fails_when_collector_rejects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/events"))
        .respond_with(ResponseTemplate::new(422).set_body_string("schema mismatch"))
        .mount(&server)
        .await;

    let env = CliTestEnv::new();
    env.write_config(&collector_config(&server.uri()));

    let output = run_bin_async(&env, &["send", "--failed", "--error", "oom"]).await;
    assert!(
        !output.status.success(),
        "send should surface a permanent collector rejection"
    );
}

#[tokio::test]
async fn ping_reports_reachable_collector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let env = CliTestEnv::new();
    env.write_config(&collector_config(&server.uri()));

    let output = run_bin_async(&env, &["ping"]).await;
    assert_success(&["ping"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Collector is reachable"));
}

#[tokio::test]
async fn ping_fails_against_dead_collector() {
    let env = CliTestEnv::new();
    // Port 1 is never listening
    env.write_config(&collector_config("http://127.0.0.1:1"));

    let output = run_bin_async(&env, &["ping"]).await;
    assert!(
        !output.status.success(),
        "ping should fail when nothing answers"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("did not answer"),
        "expected ping failure detail in stderr, got:\n{stderr}"
    );
}

#[tokio::test]
async fn score_prints_collector_answer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agents/cli-agent/score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "agent_id": "cli-agent",
            "score": 91.25,
            "events_counted": 1307
        })))
        .mount(&server)
        .await;

    let env = CliTestEnv::new();
    env.write_config(&collector_config(&server.uri()));

    let output = run_bin_async(&env, &["score"]).await;
    assert_success(&["score"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Agent:           cli-agent"));
    assert!(stdout.contains("Score:           91.25"));
    assert!(stdout.contains("Events counted:  1307"));
}
