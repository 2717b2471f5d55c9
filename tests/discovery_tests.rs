//! End-to-end discovery scenarios: scan a folder through the full
//! pipeline, unplug its device, import a playlist file.

mod common;

use std::sync::Arc;

use curator::db::media_meta::MetadataKey;
use curator::{QueryParameters, SortingCriteria};

use common::{FakeProbe, TestLibrary};

fn write_file(dir: &std::path::Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("write sample");
}

#[tokio::test]
async fn discover_parse_and_list_an_album() {
    let probe = FakeProbe::new(180_000)
        .tag(
            "01.flac",
            &[
                (MetadataKey::Artist, "A"),
                (MetadataKey::Album, "Alb"),
                (MetadataKey::TrackNumber, "1"),
                (MetadataKey::Title, "First"),
            ],
        )
        .tag(
            "02.flac",
            &[
                (MetadataKey::Artist, "A"),
                (MetadataKey::Album, "Alb"),
                (MetadataKey::TrackNumber, "2"),
                (MetadataKey::Title, "Second"),
            ],
        )
        .tag(
            "03.flac",
            &[
                (MetadataKey::Artist, "A"),
                (MetadataKey::Album, "Alb"),
                (MetadataKey::TrackNumber, "3"),
                (MetadataKey::Title, "Third"),
            ],
        );
    let env = TestLibrary::start(Arc::new(probe)).await;
    let dir = env.media_dir();
    for name in ["01.flac", "02.flac", "03.flac"] {
        write_file(&dir, name, "fake audio");
    }

    env.library.discover(&env.entry_point());
    env.wait_idle().await;

    let params = QueryParameters::default();
    assert_eq!(env.library.audio_files(&params).count().await.unwrap(), 3);
    assert_eq!(env.library.albums(&params).count().await.unwrap(), 1);
    assert_eq!(env.library.artists(&params).count().await.unwrap(), 1);

    let albums = env.library.albums(&params).all().await.unwrap();
    let tracks = env
        .library
        .album_tracks(albums[0].id_album, &QueryParameters::sorted(SortingCriteria::TrackNumber))
        .all()
        .await
        .unwrap();
    let numbers: Vec<Option<i64>> = tracks.iter().map(|t| t.track_number).collect();
    assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
    let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second", "Third"]);

    env.library.stop().await;
}

#[tokio::test]
async fn unplugging_a_device_hides_its_media_without_deleting_it() {
    let probe = FakeProbe::new(60_000);
    let env = TestLibrary::start(Arc::new(probe)).await;
    let dir = env.media_dir();
    for name in ["u1.mp3", "u2.mp3", "u3.mp3"] {
        write_file(&dir, name, "fake audio");
    }
    // The media folder is a removable device of its own.
    let mountpoint = curator::mrl::from_path(&dir) + "/";
    env.library
        .local_fs_factory()
        .add_device("test-usb", &mountpoint, true);

    env.library.discover(&env.entry_point());
    env.wait_idle().await;

    let present_only = QueryParameters::default();
    let with_missing = QueryParameters {
        include_missing: true,
        ..Default::default()
    };
    assert_eq!(env.library.audio_files(&present_only).count().await.unwrap(), 3);

    env.library
        .local_fs_factory()
        .set_device_present("test-usb", false)
        .await;
    env.wait_idle().await;

    assert_eq!(env.library.audio_files(&present_only).count().await.unwrap(), 0);
    assert_eq!(env.library.audio_files(&with_missing).count().await.unwrap(), 3);

    env.library
        .local_fs_factory()
        .set_device_present("test-usb", true)
        .await;
    env.wait_idle().await;

    assert_eq!(env.library.audio_files(&present_only).count().await.unwrap(), 3);

    env.library.stop().await;
}

#[tokio::test]
async fn importing_an_m3u_creates_a_read_only_playlist() {
    let probe = FakeProbe::new(60_000);
    let env = TestLibrary::start(Arc::new(probe)).await;
    let dir = env.media_dir();
    write_file(&dir, "a.mp3", "fake audio");
    write_file(&dir, "b.mp3", "fake audio");
    write_file(&dir, "list.m3u", "#EXTM3U\na.mp3\nb.mp3\n");

    env.library.discover(&env.entry_point());
    env.wait_idle().await;

    let params = QueryParameters::default();
    let playlists = env.library.playlists(&params).all().await.unwrap();
    assert_eq!(playlists.len(), 1);
    let playlist = &playlists[0];
    assert!(playlist.is_read_only);
    assert!(playlist.file_id.is_some());

    let members = env
        .library
        .playlist_media(playlist.id_playlist, &params)
        .all()
        .await
        .unwrap();
    assert_eq!(members.len(), 2);

    // Read-only: direct mutation is refused.
    let denied = env
        .library
        .playlist_append(playlist.id_playlist, members[0].id_media)
        .await;
    assert!(denied.is_err());

    // No pending link task survives completion.
    let leftovers = env
        .library
        .database()
        .tasks()
        .pending_for_playlist(playlist.id_playlist)
        .await
        .unwrap();
    assert!(leftovers.is_empty());

    env.library.stop().await;
}

#[tokio::test]
async fn reload_picks_up_new_files_and_prunes_deleted_ones() {
    let probe = FakeProbe::new(60_000);
    let env = TestLibrary::start(Arc::new(probe)).await;
    let dir = env.media_dir();
    write_file(&dir, "keep.mp3", "fake audio");
    write_file(&dir, "drop.mp3", "fake audio");

    env.library.discover(&env.entry_point());
    env.wait_idle().await;
    let params = QueryParameters::default();
    assert_eq!(env.library.audio_files(&params).count().await.unwrap(), 2);

    std::fs::remove_file(dir.join("drop.mp3")).unwrap();
    write_file(&dir, "new.mp3", "fake audio");

    env.library.reload();
    env.wait_idle().await;

    let names: Vec<String> = env
        .library
        .audio_files(&params)
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.filename)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"keep.mp3".to_string()));
    assert!(names.contains(&"new.mp3".to_string()));

    env.library.stop().await;
}

#[tokio::test]
async fn playlist_backup_survives_a_database_wipe() {
    let probe = FakeProbe::new(60_000);
    let env = TestLibrary::start(Arc::new(probe)).await;

    let first = env
        .library
        .add_external_media("file:///elsewhere/one.mp3")
        .await
        .unwrap();
    let second = env
        .library
        .add_external_media("file:///elsewhere/two.mp3")
        .await
        .unwrap();
    let playlist = env.library.create_playlist("mixtape").await.unwrap();
    env.library
        .playlist_append(playlist.id_playlist, first.id_media)
        .await
        .unwrap();
    env.library
        .playlist_append(playlist.id_playlist, second.id_media)
        .await
        .unwrap();

    env.library.backup_playlists().await.unwrap();
    env.library.clear_database().await.unwrap();
    let params = QueryParameters::default();
    assert_eq!(env.library.playlists(&params).count().await.unwrap(), 0);

    env.library.restore_playlists().await.unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(15);
    loop {
        let playlists = env.library.playlists(&params).all().await.unwrap();
        if playlists.len() == 1 {
            assert_eq!(playlists[0].name, "mixtape");
            let members = env
                .library
                .database()
                .playlists()
                .items(playlists[0].id_playlist)
                .await
                .unwrap();
            if members.len() == 2 {
                break;
            }
        }
        assert!(
            std::time::Instant::now() < deadline,
            "playlist was not restored"
        );
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    env.library.stop().await;
}

#[tokio::test]
async fn restart_resumes_uncompleted_tasks() {
    let probe = FakeProbe::new(60_000).tag("late.mp3", &[(MetadataKey::Title, "Late")]);
    let probe = Arc::new(probe);
    let env = TestLibrary::start(probe.clone()).await;
    let dir = env.media_dir();
    write_file(&dir, "first.mp3", "fake audio");

    env.library.discover(&env.entry_point());
    env.wait_idle().await;

    // Simulate a crash between extraction and analysis: a file exists on
    // disk with its task persisted at step zero (extraction completion is
    // never persisted).
    write_file(&dir, "late.mp3", "fake audio");
    let root = env
        .library
        .database()
        .folders()
        .roots()
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    let late_mrl = curator::mrl::from_path(&dir.join("late.mp3"));
    env.library
        .database()
        .tasks()
        .create(&late_mrl, curator::db::files::FileType::Main, root.id_folder)
        .await
        .unwrap();
    let config = env.config();
    env.library.stop().await;

    // A fresh library over the same database resumes the task.
    let reopened = curator::MediaLibrary::with_probe(
        config,
        Arc::new(curator::callbacks::NoopCallbacks),
        probe,
    )
    .await
    .unwrap();
    reopened.start(None, None).await.unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(15);
    loop {
        let found = reopened.media_by_mrl(&late_mrl).await.unwrap();
        if let Some(media) = found {
            assert_eq!(media.title, "Late");
            break;
        }
        assert!(std::time::Instant::now() < deadline, "task was not resumed");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    // Exactly one media row, task completed with no retries burned.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Media WHERE filename = 'late.mp3'")
        .fetch_one(reopened.database().pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
    let (step, retries): (i64, i64) =
        sqlx::query_as("SELECT step, retry_count FROM Task WHERE mrl = ?")
            .bind(&late_mrl)
            .fetch_one(reopened.database().pool())
            .await
            .unwrap();
    assert_eq!(step & 6, 6);
    assert_eq!(retries, 0);

    reopened.stop().await;
}

#[tokio::test]
async fn banned_folders_are_skipped_until_unbanned() {
    let probe = FakeProbe::new(60_000);
    let env = TestLibrary::start(Arc::new(probe)).await;
    let dir = env.media_dir();
    let sub = dir.join("hidden");
    std::fs::create_dir_all(&sub).unwrap();
    write_file(&dir, "visible.mp3", "fake audio");
    write_file(&sub, "secret.mp3", "fake audio");

    env.library.discover(&env.entry_point());
    env.wait_idle().await;
    let params = QueryParameters::default();
    assert_eq!(env.library.audio_files(&params).count().await.unwrap(), 2);

    // Banning prunes the subtree; its media go away with the folder rows.
    let sub_mrl = curator::mrl::from_path(&sub) + "/";
    env.library.ban_folder(&sub_mrl);
    env.library.reload();
    env.wait_idle().await;
    assert_eq!(env.library.audio_files(&params).count().await.unwrap(), 1);

    // Unbanning restores eligibility; the reload rediscovers the content.
    env.library.unban_folder(&sub_mrl);
    env.library.reload();
    env.wait_idle().await;
    assert_eq!(env.library.audio_files(&params).count().await.unwrap(), 2);

    env.library.stop().await;
}
