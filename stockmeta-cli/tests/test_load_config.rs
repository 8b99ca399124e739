use std::fs::write;
use std::path::PathBuf;
use stockmeta::metadata::{Creativity, GenerationConfig};
use stockmeta::queue::QueuePolicy;
use stockmeta_cli::load_config::load_config;
use tempfile::tempdir;

/// A full batch job: paths are resolved against the job file's directory.
#[test]
fn test_load_config_resolves_paths_and_overrides() {
    let dir = tempdir().unwrap();
    let config_yaml = r#"
files:
  - photos/a.jpg
  - /absolute/b.png
policy: halt-on-error
csv_output: out/metadata.csv
write_tags: true
overrides:
  model: googleai/gemini-1.5-flash-latest
  creativity: precise
  keyword_count: 40
"#;
    let path = dir.path().join("job.yaml");
    write(&path, config_yaml).unwrap();

    let job = load_config(&path).expect("Config should load");

    assert_eq!(
        job.files,
        vec![dir.path().join("photos/a.jpg"), PathBuf::from("/absolute/b.png")]
    );
    assert_eq!(job.policy, QueuePolicy::HaltOnError);
    assert_eq!(job.csv_output, Some(dir.path().join("out/metadata.csv")));
    assert!(job.write_tags);

    let config = job.overrides.apply(GenerationConfig::default());
    assert_eq!(config.model, "googleai/gemini-1.5-flash-latest");
    assert_eq!(config.creativity, Creativity::Precise);
    assert_eq!(config.keyword_count, 40);
    assert_eq!(config.title_length, GenerationConfig::default().title_length);
}

/// Minimal job: defaults for everything but the input directory.
#[test]
fn test_load_config_directory_inputs() {
    let dir = tempdir().unwrap();
    let photos = dir.path().join("photos");
    std::fs::create_dir(&photos).unwrap();
    for name in ["b.JPG", "a.png", "notes.txt", "c.webp"] {
        write(photos.join(name), b"x").unwrap();
    }
    let path = dir.path().join("job.yaml");
    write(&path, "directory: photos\n").unwrap();

    let job = load_config(&path).expect("Config should load");
    assert_eq!(job.policy, QueuePolicy::ContinueOnError);
    assert!(!job.write_tags);
    assert_eq!(job.csv_output, None);

    let inputs = job.resolve_inputs().unwrap();
    assert_eq!(
        inputs,
        vec![photos.join("a.png"), photos.join("b.JPG"), photos.join("c.webp")]
    );
}

#[test]
fn test_load_config_rejects_empty_job_and_bad_yaml() {
    let dir = tempdir().unwrap();

    let empty = dir.path().join("empty.yaml");
    write(&empty, "policy: continue-on-error\n").unwrap();
    let err = load_config(&empty).unwrap().resolve_inputs().unwrap_err();
    assert!(err.to_string().contains("Batch job lists no input images"));

    let bad = dir.path().join("bad.yaml");
    write(&bad, "policy: sometimes\n").unwrap();
    let err = load_config(&bad).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}
