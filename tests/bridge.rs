use stockmeta::bridge::save_metadata;
use stockmeta::contract::MockMetadataWriter;
use stockmeta::exif::ExifError;
use stockmeta::metadata::{GenerationResult, Keywords};

fn metadata() -> GenerationResult {
    GenerationResult {
        title: "Golden dome".to_string(),
        description: "A dome at sunset".to_string(),
        keywords: Keywords::Joined("mosque, dome".to_string()),
        rating: 5,
    }
}

#[tokio::test]
async fn successful_write_reports_success() {
    let mut writer = MockMetadataWriter::new();
    writer
        .expect_write_tags()
        .withf(|path, tags| {
            path.to_str() == Some("/photos/a.jpg")
                && tags.keywords == vec!["mosque".to_string(), "dome".to_string()]
                && tags.rating == 5
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let outcome = save_metadata(&writer, "/photos/a.jpg", &metadata()).await;

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        serde_json::json!({ "success": true })
    );
}

#[tokio::test]
async fn writer_failure_becomes_an_outcome() {
    let mut writer = MockMetadataWriter::new();
    writer
        .expect_write_tags()
        .times(1)
        .returning(|_, _| Err(ExifError::WriteFailed("0 image files updated".to_string())));

    let outcome = save_metadata(&writer, "/photos/a.jpg", &metadata()).await;

    assert!(!outcome.success);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .starts_with("Failed to write metadata"));
}

#[tokio::test]
async fn empty_path_never_reaches_the_writer() {
    let mut writer = MockMetadataWriter::new();
    writer.expect_write_tags().never();

    let outcome = save_metadata(&writer, "  ", &metadata()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("File path is missing."));
}
