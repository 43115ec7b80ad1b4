//! Basic processing integration tests

use super::*;
use crate::models::TableName;
use crate::processor::writer::SUCCESS_MARKER;

#[tokio::test]
async fn test_basic_processing_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    create_reference_dataset(&temp_dir);

    let report = pipeline_for(&temp_dir).run().await.unwrap();

    assert_eq!(report.rows_written(TableName::Songs), Some(2));
    assert_eq!(report.rows_written(TableName::Artists), Some(2));
    assert_eq!(report.rows_written(TableName::Users), Some(1));
    assert_eq!(report.rows_written(TableName::Time), Some(2));
    assert_eq!(report.rows_written(TableName::Songplays), Some(2));
    assert_eq!(report.facts.matched, 1);
    assert_eq!(report.facts.unmatched, 1);
    assert_eq!(report.logs.filtered_out, 1);
    assert_eq!(report.songs.read.objects, 2);
    assert_eq!(report.output_prefix, "analytics");

    for table in TableName::ALL {
        let marker = temp_dir.path().join("analytics").join(table.as_str()).join(SUCCESS_MARKER);
        assert!(marker.exists(), "missing marker for {}", table);
    }
}

#[tokio::test]
async fn test_reference_event_is_joined_and_decomposed() {
    let temp_dir = TempDir::new().unwrap();
    create_reference_dataset(&temp_dir);

    pipeline_for(&temp_dir).run().await.unwrap();

    let songplays = read_table(temp_dir.path(), "analytics/songplays");
    assert_eq!(songplays.len(), 1);
    let (partition, df) = &songplays[0];
    assert_eq!(partition, "year=2018/month=11/part-00000.parquet");
    assert!(df.column("year").is_err());

    let ids = df.column("songplay_id").unwrap().i64().unwrap();
    let song_ids = df.column("song_id").unwrap().str().unwrap();
    let artist_ids = df.column("artist_id").unwrap().str().unwrap();
    assert_eq!(ids.get(0), Some(1));
    assert_eq!(song_ids.get(0), Some("SONRWUU12AF72A4283"));
    assert_eq!(artist_ids.get(0), Some("ARPDVPJ1187B9ADBE9"));
    assert_eq!(ids.get(1), Some(2));
    assert_eq!(song_ids.get(1), None);
    assert_eq!(artist_ids.get(1), None);

    let time = read_table(temp_dir.path(), "analytics/time");
    let (partition, df) = &time[0];
    assert_eq!(partition, "year=2018/month=11/part-00000.parquet");
    assert_eq!(df.column("hour").unwrap().i32().unwrap().get(0), Some(21));
    assert_eq!(df.column("day").unwrap().i32().unwrap().get(0), Some(1));
    assert_eq!(df.column("week").unwrap().i32().unwrap().get(0), Some(44));
    assert_eq!(df.column("weekday").unwrap().str().unwrap().get(0), Some("Thu"));
}

#[tokio::test]
async fn test_songs_partitioned_by_year_and_artist() {
    let temp_dir = TempDir::new().unwrap();
    create_reference_dataset(&temp_dir);

    pipeline_for(&temp_dir).run().await.unwrap();

    let songs = read_table(temp_dir.path(), "analytics/songs");
    let partitions: Vec<&str> = songs.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(
        partitions,
        vec![
            "year=1994/artist_id=ARKFYS91187B98E58F/part-00000.parquet",
            "year=1994/artist_id=ARPDVPJ1187B9ADBE9/part-00000.parquet",
        ]
    );
    let columns: Vec<&str> = songs[0].1.get_column_names().into_iter().map(|c| c.as_str()).collect();
    assert_eq!(columns, vec!["song_id", "title", "duration"]);

    let artists = read_table(temp_dir.path(), "analytics/artists");
    assert_eq!(artists.len(), 1);
    assert_eq!(artists[0].0, "part-00000.parquet");
    assert_eq!(total_rows(&artists), 2);
}

#[tokio::test]
async fn test_user_keeps_latest_level() {
    let temp_dir = TempDir::new().unwrap();
    create_reference_dataset(&temp_dir);

    pipeline_for(&temp_dir).run().await.unwrap();

    let users = read_table(temp_dir.path(), "analytics/users");
    let df = &users[0].1;
    assert_eq!(df.height(), 1);
    assert_eq!(df.column("user_id").unwrap().str().unwrap().get(0), Some("8"));
    assert_eq!(df.column("level").unwrap().str().unwrap().get(0), Some("paid"));
}

#[tokio::test]
async fn test_transform_without_writing() {
    let temp_dir = TempDir::new().unwrap();
    create_reference_dataset(&temp_dir);

    let transformed = pipeline_for(&temp_dir).transform().await.unwrap();

    assert_eq!(transformed.schema.row_count(TableName::Songplays), 2);
    assert!(transformed.report.tables.is_empty());
    assert!(!temp_dir.path().join("analytics").exists());
}
