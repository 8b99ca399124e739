use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use stockmeta::contract::{
    ItemProcessor, MockGenerativeModel, MockModelFactory, ResponseFormat,
};
use stockmeta::error::{ModelErrorKind, RotationError};
use stockmeta::metadata::{generate_metadata, Creativity, GenerationConfig, MetadataGenerator};
use stockmeta::payload::ImagePayload;
use stockmeta::queue::QueuedFile;
use tempfile::tempdir;
use uuid::Uuid;

const ANSWER: &str = r#"```json
{"title": "Golden dome at sunset", "description": "A mosque dome in warm light.", "keywords": "mosque, dome, sunset", "rating": 4}
```"#;

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 8, Rgb([10, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn factory_answering(answer: &'static str) -> MockModelFactory {
    let mut factory = MockModelFactory::new();
    factory.expect_connect().times(1).returning(move |_, _| {
        let mut model = MockGenerativeModel::new();
        model
            .expect_generate()
            .withf(|call| {
                call.format == ResponseFormat::Json
                    && call.image.is_some()
                    && (call.temperature - Creativity::Creative.temperature()).abs() < f32::EPSILON
                    && call.prompt.contains("exactly 30 comma-separated keywords")
            })
            .times(1)
            .returning(move |_| Ok(answer.to_string()));
        Ok(Box::new(model))
    });
    factory
}

fn config() -> GenerationConfig {
    GenerationConfig {
        keyword_count: 30,
        creativity: Creativity::Creative,
        ..GenerationConfig::default()
    }
}

#[tokio::test]
async fn generates_validated_metadata_from_an_image() {
    let image = ImagePayload::from_bytes(&png_bytes()).unwrap();
    let factory = factory_answering(ANSWER);

    let result = generate_metadata(&image, &config(), &["k1".to_string()], &factory)
        .await
        .unwrap();

    assert_eq!(result.title, "Golden dome at sunset");
    assert_eq!(result.keywords.terms(), vec!["mosque", "dome", "sunset"]);
    assert_eq!(result.rating, 4);
}

#[tokio::test]
async fn unusable_answer_fails_without_trying_other_keys() {
    let image = ImagePayload::from_bytes(&png_bytes()).unwrap();
    // Only one connection is expected even though two keys are available.
    let factory = factory_answering(r#"{"title": "", "description": "d", "keywords": "k", "rating": 3}"#);

    let err = generate_metadata(
        &image,
        &config(),
        &["k1".to_string(), "k2".to_string()],
        &factory,
    )
    .await
    .unwrap_err();

    match err {
        RotationError::Fatal(e) => assert_eq!(e.kind, ModelErrorKind::InvalidResponse),
        other => panic!("expected fatal invalid response, got {other:?}"),
    }
}

#[tokio::test]
async fn generator_reads_the_file_and_reports_friendly_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dome.png");
    std::fs::write(&path, png_bytes()).unwrap();

    let generator = MetadataGenerator::new(
        config(),
        vec!["k1".to_string()],
        Arc::new(factory_answering(ANSWER)),
    );
    let result = generator
        .process(QueuedFile {
            id: Uuid::new_v4(),
            path: path.clone(),
            name: "dome.png".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(result.rating, 4);

    let mut no_calls = MockModelFactory::new();
    no_calls.expect_connect().never();
    let generator = MetadataGenerator::new(config(), Vec::new(), Arc::new(no_calls));
    let missing = generator
        .process(QueuedFile {
            id: Uuid::new_v4(),
            path: dir.path().join("missing.png"),
            name: "missing.png".to_string(),
        })
        .await
        .unwrap_err();
    assert!(missing.starts_with("Could not read image missing.png"));

    let no_keys = generator
        .process(QueuedFile {
            id: Uuid::new_v4(),
            path,
            name: "dome.png".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(no_keys, "No API key is configured. Please add one in settings.");
}
