//! Playback progress classification against the duration margins.

mod common;

use curator::db::media::MediaRecord;
use curator::ProgressResult;

const HOUR_MS: i64 = 60 * 60 * 1000;

async fn seeded_media(duration_ms: i64) -> (curator::db::Database, MediaRecord, tempfile::TempDir) {
    let (db, dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "progress.flac").await;
    if duration_ms > 0 {
        db.media().set_duration(media.id_media, duration_ms).await.unwrap();
    }
    let media = db.media().by_id(media.id_media).await.unwrap().unwrap();
    (db, media, dir)
}

#[tokio::test]
async fn position_zero_and_one_classify_as_begin_and_end() {
    let (db, media, _dir) = seeded_media(HOUR_MS).await;

    let result = db.media().set_last_position(&media, 0.0).await.unwrap();
    assert_eq!(result, ProgressResult::Begin);
    let after = db.media().by_id(media.id_media).await.unwrap().unwrap();
    assert_eq!(after.last_position, -1.0);
    assert_eq!(after.last_time, -1);
    assert!(after.last_played_date.is_some());
    assert_eq!(after.play_count, 0);

    let result = db.media().set_last_position(&media, 1.0).await.unwrap();
    assert_eq!(result, ProgressResult::End);
    let after = db.media().by_id(media.id_media).await.unwrap().unwrap();
    assert_eq!(after.play_count, 1);
    assert_eq!(after.last_position, -1.0);
}

#[tokio::test]
async fn midway_position_stores_position_and_derived_time() {
    let (db, media, _dir) = seeded_media(HOUR_MS).await;

    let result = db.media().set_last_position(&media, 0.5).await.unwrap();
    assert_eq!(result, ProgressResult::AsIs);
    let after = db.media().by_id(media.id_media).await.unwrap().unwrap();
    assert!((after.last_position - 0.5).abs() < 1e-9);
    assert_eq!(after.last_time, (0.5 * HOUR_MS as f64).round() as i64);
}

#[tokio::test]
async fn classification_is_strict_at_the_margin() {
    // One-hour media sits in the 4% band.
    let (db, media, _dir) = seeded_media(HOUR_MS).await;

    // Exactly at the margin: not Begin.
    let result = db.media().set_last_position(&media, 0.04).await.unwrap();
    assert_eq!(result, ProgressResult::AsIs);
    // Exactly at 1 - margin: not End.
    let result = db.media().set_last_position(&media, 0.96).await.unwrap();
    assert_eq!(result, ProgressResult::AsIs);
    // Just inside.
    let result = db.media().set_last_position(&media, 0.039).await.unwrap();
    assert_eq!(result, ProgressResult::Begin);
    let result = db.media().set_last_position(&media, 0.961).await.unwrap();
    assert_eq!(result, ProgressResult::End);
}

#[tokio::test]
async fn thirty_minute_media_uses_the_five_percent_margin() {
    let (db, media, _dir) = seeded_media(30 * 60 * 1000).await;
    assert_eq!(
        db.media().set_last_position(&media, 0.049).await.unwrap(),
        ProgressResult::Begin
    );
    assert_eq!(
        db.media().set_last_position(&media, 0.06).await.unwrap(),
        ProgressResult::AsIs
    );
}

#[tokio::test]
async fn unknown_duration_stores_raw_value_with_sibling_reset() {
    let (db, media, _dir) = seeded_media(0).await;

    let result = db.media().set_last_position(&media, 0.99).await.unwrap();
    assert_eq!(result, ProgressResult::AsIs);
    let after = db.media().by_id(media.id_media).await.unwrap().unwrap();
    assert!((after.last_position - 0.99).abs() < 1e-9);
    assert_eq!(after.last_time, -1);

    let result = db.media().set_last_time(&media, 42_000).await.unwrap();
    assert_eq!(result, ProgressResult::AsIs);
    let after = db.media().by_id(media.id_media).await.unwrap().unwrap();
    assert_eq!(after.last_time, 42_000);
    assert_eq!(after.last_position, -1.0);
}

#[tokio::test]
async fn set_last_time_derives_the_position() {
    let (db, media, _dir) = seeded_media(2 * HOUR_MS).await;

    // Two-hour media: 3% margin. 30 minutes in is 25%.
    let result = db.media().set_last_time(&media, 30 * 60 * 1000).await.unwrap();
    assert_eq!(result, ProgressResult::AsIs);
    let after = db.media().by_id(media.id_media).await.unwrap().unwrap();
    assert!((after.last_position - 0.25).abs() < 1e-9);

    // One minute in is under the margin.
    let result = db.media().set_last_time(&media, 60 * 1000).await.unwrap();
    assert_eq!(result, ProgressResult::Begin);
}

#[tokio::test]
async fn history_lists_played_media_most_recent_first() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let first = common::seed_media(&db, folder_id, device_id, "h1.flac").await;
    let second = common::seed_media(&db, folder_id, device_id, "h2.flac").await;
    db.media().set_duration(first.id_media, HOUR_MS).await.unwrap();
    db.media().set_duration(second.id_media, HOUR_MS).await.unwrap();

    let first = db.media().by_id(first.id_media).await.unwrap().unwrap();
    let second = db.media().by_id(second.id_media).await.unwrap().unwrap();
    db.media().set_last_position(&first, 0.5).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    db.media().set_last_position(&second, 0.5).await.unwrap();

    let history = db.media().history(false).all().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id_media, second.id_media);

    db.media().clear_history().await.unwrap();
    assert!(db.media().history(false).all().await.unwrap().is_empty());
}
