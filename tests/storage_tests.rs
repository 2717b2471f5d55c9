//! Storage-layer invariants: presence propagation, playlist contiguity,
//! FTS consistency, aggregate counters, task uniqueness and cascades.

mod common;

use assert_matches::assert_matches;
use curator::db::files::FileType;
use curator::db::media::MediaType;
use curator::db::tasks::{step, LinkType};
use curator::Error;

// ============================================================================
// Presence propagation
// ============================================================================

#[tokio::test]
async fn device_presence_propagates_to_media_atomically() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    for i in 0..3 {
        common::seed_media(&db, folder_id, device_id, &format!("t{i}.flac")).await;
    }

    db.devices().set_present(device_id, false).await.unwrap();
    let media = db.media().on_device(device_id).await.unwrap();
    assert_eq!(media.len(), 3);
    assert!(media.iter().all(|m| !m.is_present));

    db.devices().set_present(device_id, true).await.unwrap();
    let media = db.media().on_device(device_id).await.unwrap();
    assert!(media.iter().all(|m| m.is_present));
}

// ============================================================================
// Playlist contiguity
// ============================================================================

#[tokio::test]
async fn playlist_positions_stay_contiguous() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let mut media_ids = Vec::new();
    for i in 1..=5 {
        let media = common::seed_media(&db, folder_id, device_id, &format!("m{i}.flac")).await;
        media_ids.push(media.id_media);
    }
    let playlist = db.playlists().create("list").await.unwrap();

    // Insert every media at position 0: final order is reversed.
    for media_id in &media_ids {
        db.playlists()
            .add_at(playlist.id_playlist, *media_id, 0)
            .await
            .unwrap();
    }
    let items = db.playlists().items(playlist.id_playlist).await.unwrap();
    let positions: Vec<i64> = items.iter().map(|i| i.position).collect();
    assert_eq!(positions, vec![0, 1, 2, 3, 4]);
    let order: Vec<i64> = items.iter().map(|i| i.media_id).collect();
    let expected: Vec<i64> = media_ids.iter().rev().copied().collect();
    assert_eq!(order, expected);

    // Removing the middle closes the gap.
    db.playlists()
        .remove_at(playlist.id_playlist, 2)
        .await
        .unwrap();
    let items = db.playlists().items(playlist.id_playlist).await.unwrap();
    let positions: Vec<i64> = items.iter().map(|i| i.position).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn playlist_move_clamps_to_last_position() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let mut media_ids = Vec::new();
    for i in 0..3 {
        let media = common::seed_media(&db, folder_id, device_id, &format!("c{i}.flac")).await;
        media_ids.push(media.id_media);
    }
    let playlist = db.playlists().create("clamp").await.unwrap();
    for media_id in &media_ids {
        db.playlists()
            .append(playlist.id_playlist, *media_id)
            .await
            .unwrap();
    }

    // Move position 0 far beyond the end: it lands at N-1.
    db.playlists()
        .move_media(playlist.id_playlist, 0, 100)
        .await
        .unwrap();
    let items = db.playlists().items(playlist.id_playlist).await.unwrap();
    let positions: Vec<i64> = items.iter().map(|i| i.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert_eq!(items[2].media_id, media_ids[0]);
}

#[tokio::test]
async fn same_media_can_appear_twice_in_a_playlist() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "dup.flac").await;
    let playlist = db.playlists().create("dups").await.unwrap();

    db.playlists().append(playlist.id_playlist, media.id_media).await.unwrap();
    db.playlists().append(playlist.id_playlist, media.id_media).await.unwrap();
    let items = db.playlists().items(playlist.id_playlist).await.unwrap();
    assert_eq!(items.len(), 2);

    let refreshed = db.media().by_id(media.id_media).await.unwrap().unwrap();
    assert_eq!(refreshed.nb_playlists, 2);
}

// ============================================================================
// FTS consistency
// ============================================================================

#[tokio::test]
async fn media_fts_row_follows_media_lifecycle() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "Daydream.flac").await;
    db.media()
        .set_title(media.id_media, "Daydream Nation", false)
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM MediaFts WHERE rowid = ?")
        .bind(media.id_media)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    let found = db
        .media()
        .search("daydream", &curator::QueryParameters::default())
        .all()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    db.media().delete(media.id_media).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM MediaFts WHERE rowid = ?")
        .bind(media.id_media)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn labels_reach_media_search() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "track.flac").await;

    let label = db.labels().create("favorites").await.unwrap();
    db.labels().attach(label.id_label, media.id_media).await.unwrap();

    let found = db
        .media()
        .search("favorites", &curator::QueryParameters::default())
        .all()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    db.labels().detach(label.id_label, media.id_media).await.unwrap();
    let found = db
        .media()
        .search("favorites", &curator::QueryParameters::default())
        .all()
        .await
        .unwrap();
    assert!(found.is_empty());
}

// ============================================================================
// Aggregate counters
// ============================================================================

#[tokio::test]
async fn album_counters_track_members() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let artist = db.artists().obtain("A").await.unwrap();
    let album = db.albums().create("Alb", Some(artist.id_artist)).await.unwrap();

    let mut tracks = Vec::new();
    for i in 1..=3 {
        let media = common::seed_media(&db, folder_id, device_id, &format!("a{i}.flac")).await;
        db.media().set_duration(media.id_media, 60_000).await.unwrap();
        db.media()
            .link_album_track(
                media.id_media,
                album.id_album,
                artist.id_artist,
                None,
                Some(i),
                Some(1),
            )
            .await
            .unwrap();
        tracks.push(media.id_media);
    }

    let album = db.albums().by_id(album.id_album).await.unwrap().unwrap();
    assert_eq!(album.nb_tracks, 3);
    assert_eq!(album.nb_present_tracks, 3);
    let artist = db.artists().by_id(artist.id_artist).await.unwrap().unwrap();
    assert_eq!(artist.nb_albums, 1);
    assert_eq!(artist.nb_tracks, 3);

    // Unplugging the device drops present counts, not totals.
    db.devices().set_present(device_id, false).await.unwrap();
    let album = db.albums().by_id(album.id_album).await.unwrap().unwrap();
    assert_eq!(album.nb_tracks, 3);
    assert_eq!(album.nb_present_tracks, 0);

    db.devices().set_present(device_id, true).await.unwrap();
    db.media().delete(tracks[0]).await.unwrap();
    let album = db.albums().by_id(album.id_album).await.unwrap().unwrap();
    assert_eq!(album.nb_tracks, 2);
}

#[tokio::test]
async fn empty_album_is_collected() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let artist = db.artists().obtain("B").await.unwrap();
    let album = db.albums().create("OneShot", Some(artist.id_artist)).await.unwrap();
    let media = common::seed_media(&db, folder_id, device_id, "only.flac").await;
    db.media()
        .link_album_track(media.id_media, album.id_album, artist.id_artist, None, None, None)
        .await
        .unwrap();

    db.media().delete(media.id_media).await.unwrap();
    assert!(db.albums().by_id(album.id_album).await.unwrap().is_none());
}

#[tokio::test]
async fn folder_media_counters() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let audio = common::seed_media(&db, folder_id, device_id, "one.flac").await;
    let video = common::seed_media(&db, folder_id, device_id, "two.mkv").await;
    db.media().set_type(video.id_media, MediaType::Video).await.unwrap();

    let folder = db.folders().by_id(folder_id).await.unwrap().unwrap();
    assert_eq!(folder.nb_audio, 1);
    assert_eq!(folder.nb_video, 1);
    db.media().delete(audio.id_media).await.unwrap();
    let folder = db.folders().by_id(folder_id).await.unwrap().unwrap();
    assert_eq!(folder.nb_audio, 0);
    assert_eq!(folder.nb_video, 1);
}

// ============================================================================
// Tasks
// ============================================================================

#[tokio::test]
async fn duplicate_tasks_are_rejected() {
    let (db, _dir) = common::test_db().await;
    let (_device_id, folder_id) = common::seed_folder(&db).await;

    db.tasks()
        .create("file:///m/t.flac", FileType::Main, folder_id)
        .await
        .unwrap();
    let second = db
        .tasks()
        .create("file:///m/t.flac", FileType::Main, folder_id)
        .await;
    assert_matches!(second, Err(e) if e.is_unique_violation());

    // A link task with the same MRL but different link target is distinct.
    db.tasks()
        .create_link("file:///m/t.flac", FileType::Main, 1, LinkType::Playlist, 0)
        .await
        .unwrap();
    let dup = db
        .tasks()
        .create_link("file:///m/t.flac", FileType::Main, 1, LinkType::Playlist, 0)
        .await;
    assert_matches!(dup, Err(e) if e.is_unique_violation());
}

#[tokio::test]
async fn restore_query_skips_absent_devices_and_exhausted_retries() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "r.flac").await;
    let file = db.files().main_file(media.id_media).await.unwrap().unwrap();

    let task = db
        .tasks()
        .create_refresh("file:///music/r.flac", file.id_file, FileType::Main, folder_id)
        .await
        .unwrap();

    let restorable = db.tasks().fetch_uncompleted().await.unwrap();
    assert_eq!(restorable.len(), 1);

    // Device away: the task is excluded until it reappears.
    db.devices().set_present(device_id, false).await.unwrap();
    assert!(db.tasks().fetch_uncompleted().await.unwrap().is_empty());
    db.devices().set_present(device_id, true).await.unwrap();

    // Exhausted retries exclude it for good.
    db.tasks().increment_retry_count(task.id_task).await.unwrap();
    db.tasks().increment_retry_count(task.id_task).await.unwrap();
    assert!(db.tasks().fetch_uncompleted().await.unwrap().is_empty());
}

#[tokio::test]
async fn completed_tasks_are_not_restored() {
    let (db, _dir) = common::test_db().await;
    let (_device_id, folder_id) = common::seed_folder(&db).await;
    let task = db
        .tasks()
        .create("file:///m/done.flac", FileType::Main, folder_id)
        .await
        .unwrap();
    db.tasks().save_step(task.id_task, step::COMPLETED).await.unwrap();
    assert!(db.tasks().fetch_uncompleted().await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_playlist_deletes_its_pending_link_tasks() {
    let (db, _dir) = common::test_db().await;
    let playlist = db.playlists().create("doomed").await.unwrap();
    for i in 0..2 {
        db.tasks()
            .create_link(
                &format!("file:///m/e{i}.flac"),
                FileType::Main,
                playlist.id_playlist,
                LinkType::Playlist,
                i,
            )
            .await
            .unwrap();
    }
    assert_eq!(
        db.tasks()
            .pending_for_playlist(playlist.id_playlist)
            .await
            .unwrap()
            .len(),
        2
    );

    db.playlists().delete(playlist.id_playlist).await.unwrap();
    assert!(db
        .tasks()
        .pending_for_playlist(playlist.id_playlist)
        .await
        .unwrap()
        .is_empty());
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Task")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(total, 0);
}

// ============================================================================
// File / media lifecycle
// ============================================================================

#[tokio::test]
async fn deleting_the_main_file_deletes_the_media() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "gone.flac").await;
    let file = db.files().main_file(media.id_media).await.unwrap().unwrap();

    db.files().delete(file.id_file).await.unwrap();
    assert!(db.media().by_id(media.id_media).await.unwrap().is_none());
}

#[tokio::test]
async fn converting_to_external_detaches_everything() {
    let (db, _dir) = common::test_db().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "ext.flac").await;
    let artist = db.artists().obtain("X").await.unwrap();
    let album = db.albums().create("XA", Some(artist.id_artist)).await.unwrap();
    db.media()
        .link_album_track(media.id_media, album.id_album, artist.id_artist, None, None, None)
        .await
        .unwrap();

    db.media().convert_to_external(media.id_media).await.unwrap();
    let converted = db.media().by_id(media.id_media).await.unwrap().unwrap();
    assert!(converted.folder_id.is_none());
    assert!(converted.device_id.is_none());
    assert!(converted.album_id.is_none());
    assert_eq!(converted.import_type, curator::ImportType::External);
    assert_eq!(converted.subtype, curator::MediaSubtype::Unknown);
}

#[tokio::test]
async fn unsupported_newer_model_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");
    {
        let db = curator::db::Database::open(&path).await.unwrap();
        db.prepare().await.unwrap();
        db.settings().set_db_model_version(9000).await.unwrap();
        db.close().await;
    }
    let db = curator::db::Database::open(&path).await.unwrap();
    assert_matches!(db.prepare().await, Err(Error::UnsupportedModel { .. }));
}

#[tokio::test]
async fn banned_folders_live_in_a_parallel_table() {
    let (db, _dir) = common::test_db().await;
    let (device_id, _folder_id) = common::seed_folder(&db).await;

    assert!(db.folders().ban(device_id, "music/").await.unwrap());
    assert!(db.folders().is_banned(device_id, "music/").await.unwrap());
    // The discoverable row is gone.
    assert!(db.folders().by_path(device_id, "music/").await.unwrap().is_none());

    // Unban only restores eligibility; rows come back on reload.
    assert!(db.folders().unban(device_id, "music/").await.unwrap());
    assert!(!db.folders().is_banned(device_id, "music/").await.unwrap());
    assert!(db.folders().by_path(device_id, "music/").await.unwrap().is_none());
}
