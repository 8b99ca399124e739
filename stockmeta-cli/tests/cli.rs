use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs::write;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// The binary with an isolated settings directory and no fallback key.
fn stockmeta(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stockmeta").expect("Binary exists");
    cmd.env("STOCKMETA_CONFIG_DIR", config_dir.path())
        .env_remove("STOCKMETA_FALLBACK_API_KEY")
        .env_remove("GEMINI_API_KEY");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let dir = tempdir().unwrap();
    stockmeta(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("batch")
                .and(predicate::str::contains("prompts"))
                .and(predicate::str::contains("keys"))
                .and(predicate::str::contains("settings")),
        );
}

#[test]
fn prompts_rejects_an_empty_idea_before_any_request() {
    let dir = tempdir().unwrap();
    stockmeta(&dir)
        .args(["prompts", "--idea", "   ", "--count", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Idea is missing."));
}

#[test]
fn quick_prompts_validate_before_any_request() {
    let dir = tempdir().unwrap();
    stockmeta(&dir)
        .args(["prompts", "--quick", "--idea", "mosque", "--count", "201"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at most 200"));
    stockmeta(&dir)
        .args(["prompts", "--quick", "--negative", "--idea", "mosque"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn keys_round_trip_through_the_settings_file() {
    let dir = tempdir().unwrap();

    stockmeta(&dir)
        .args(["keys", "add", "AIzaSyFIRSTKEY00001", "--label", "work"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AIza...0001"));
    stockmeta(&dir)
        .args(["keys", "add", "AIzaSySECONDKEY0002"])
        .assert()
        .success();
    stockmeta(&dir)
        .args(["keys", "add", "AIzaSySECONDKEY0002"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already configured"));

    stockmeta(&dir)
        .args(["keys", "list"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("1. work (AIza...0001)")
                .and(predicate::str::contains("2. AIza...0002"))
                .and(predicate::str::contains("FIRSTKEY").not()),
        );

    stockmeta(&dir)
        .args(["keys", "remove", "AIzaSyFIRSTKEY00001"])
        .assert()
        .success();
    stockmeta(&dir)
        .args(["keys", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. AIza...0002"));
}

#[test]
fn settings_set_then_show() {
    let dir = tempdir().unwrap();

    stockmeta(&dir)
        .args([
            "settings",
            "set",
            "--creativity",
            "precise",
            "--title-length",
            "9",
        ])
        .assert()
        .success();

    stockmeta(&dir)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"titleLength\": 9")
                .and(predicate::str::contains("\"creativityLevel\": \"precise\"")),
        );
}

#[test]
fn batch_fails_for_missing_config() {
    let dir = tempdir().unwrap();
    stockmeta(&dir)
        .args(["batch", "--config", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn batch_reports_unreadable_images_and_exports_nothing() {
    let dir = tempdir().unwrap();
    let work = tempdir().unwrap();
    write(work.path().join("photo.jpg"), b"not really a jpeg").unwrap();
    let job = work.path().join("job.yaml");
    write(
        &job,
        "files:\n  - photo.jpg\npolicy: halt-on-error\ncsv_output: out.csv\n",
    )
    .unwrap();

    stockmeta(&dir)
        .args(["keys", "add", "AIzaSyFIRSTKEY00001"])
        .assert()
        .success();
    stockmeta(&dir)
        .arg("batch")
        .arg("--config")
        .arg(&job)
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "[error] photo.jpg: Could not read image photo.jpg",
        ))
        .stderr(predicate::str::contains("1 of 1 images failed"));

    let csv = std::fs::read_to_string(work.path().join("out.csv")).unwrap();
    assert_eq!(csv, "Filename,Title,Description,Keywords,Rating\r\n");
}

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
#[serial]
async fn emits_trace_initialised_event() {
    let dir = tempdir().unwrap();
    std::env::set_var("STOCKMETA_CONFIG_DIR", dir.path());

    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use stockmeta_cli::cli::{run, Cli, Commands, KeyAction};

    let cli = Cli {
        command: Commands::Keys {
            action: KeyAction::List,
        },
    };

    let result = run(cli).await;
    std::env::remove_var("STOCKMETA_CONFIG_DIR");

    assert!(result.is_ok(), "keys list should succeed: {result:?}");
    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
