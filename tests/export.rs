use stockmeta::export::{parse_csv, rows_from_items, to_csv, write_csv, ExportRow};
use stockmeta::metadata::{GenerationResult, Keywords};
use stockmeta::queue::{QueuePolicy, UploadQueue};
use tempfile::tempdir;

fn tricky_row() -> ExportRow {
    ExportRow {
        filename: "dome, sunset.jpg".to_string(),
        title: "The \"golden\" dome".to_string(),
        description: "First line,\nsecond line".to_string(),
        keywords: "mosque, dome, islamic architecture".to_string(),
        rating: 5,
    }
}

#[test]
fn csv_round_trips_quotes_commas_and_newlines() {
    let rows = vec![
        tricky_row(),
        ExportRow {
            filename: "plain.jpg".to_string(),
            title: "Plain".to_string(),
            description: "Nothing special".to_string(),
            keywords: "one".to_string(),
            rating: 1,
        },
    ];

    let csv = to_csv(&rows);

    assert!(csv.starts_with("Filename,Title,Description,Keywords,Rating\r\n"));
    assert!(csv.contains("\"The \"\"golden\"\" dome\""));
    assert_eq!(parse_csv(&csv).unwrap(), rows);
}

#[test]
fn parser_accepts_lf_line_endings() {
    let csv = "Filename,Title,Description,Keywords,Rating\na.jpg,T,D,\"k1, k2\",3\n";
    let rows = parse_csv(csv).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].keywords, "k1, k2");
    assert_eq!(rows[0].rating, 3);
}

#[test]
fn only_successful_items_are_exported() {
    let mut queue = UploadQueue::new(QueuePolicy::ContinueOnError);
    let a = queue.enqueue("a.jpg".into());
    let b = queue.enqueue("b.jpg".into());
    queue.enqueue("c.jpg".into());

    queue.start_next();
    queue.complete(
        a,
        Ok(GenerationResult {
            title: "Title A".to_string(),
            description: "Desc A".to_string(),
            keywords: Keywords::List(vec!["x".to_string(), "y".to_string()]),
            rating: 2,
        }),
    );
    queue.start_next();
    queue.complete(b, Err("boom".to_string()));

    let rows = rows_from_items(queue.items());

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].filename, "a.jpg");
    assert_eq!(rows[0].keywords, "x, y");
}

#[tokio::test]
async fn writes_csv_to_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.csv");

    write_csv(&path, &[tricky_row()]).await.unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(parse_csv(&written).unwrap(), vec![tricky_row()]);
}
