//! Shared-thumbnail semantics: sharing, copy-on-write, refcount-driven
//! collection, and the user-provided flush.

mod common;

use curator::db::thumbnails::{ThumbnailOrigin, ThumbnailSizeType, ThumbnailedEntity};
use curator::thumbnails::ThumbnailManager;

async fn manager() -> (ThumbnailManager, curator::db::Database, tempfile::TempDir) {
    let (db, dir) = common::test_db().await;
    let manager = ThumbnailManager::new(db.clone(), dir.path().join("thumbnails"));
    (manager, db, dir)
}

#[tokio::test]
async fn copy_on_write_leaves_the_other_referrer_untouched() {
    let (manager, db, _dir) = manager().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "cow.flac").await;
    let artist = db.artists().obtain("Cow Artist").await.unwrap();

    // Artist and media share one thumbnail row.
    let shared = manager
        .set_thumbnail(
            ThumbnailedEntity::Artist,
            artist.id_artist,
            ThumbnailSizeType::Thumbnail,
            "file:///t.jpg",
            ThumbnailOrigin::UserProvided,
        )
        .await
        .unwrap();
    let reused = manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media.id_media,
            ThumbnailSizeType::Thumbnail,
            "file:///t.jpg",
            ThumbnailOrigin::UserProvided,
        )
        .await
        .unwrap();
    assert_eq!(shared.id_thumbnail, reused.id_thumbnail);
    let row = db.thumbnails().by_id(shared.id_thumbnail).await.unwrap().unwrap();
    assert_eq!(row.shared_counter, 2);
    assert!(row.is_shared());

    // Updating the media's thumbnail must not mutate the shared row.
    let private = manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media.id_media,
            ThumbnailSizeType::Thumbnail,
            "file:///t2.jpg",
            ThumbnailOrigin::UserProvided,
        )
        .await
        .unwrap();
    assert_ne!(private.id_thumbnail, shared.id_thumbnail);

    let artist_thumb = manager
        .thumbnail(ThumbnailedEntity::Artist, artist.id_artist, ThumbnailSizeType::Thumbnail)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artist_thumb.mrl, "file:///t.jpg");
    let media_thumb = manager
        .thumbnail(ThumbnailedEntity::Media, media.id_media, ThumbnailSizeType::Thumbnail)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(media_thumb.mrl, "file:///t2.jpg");

    // The old row kept exactly one referrer.
    let row = db.thumbnails().by_id(shared.id_thumbnail).await.unwrap().unwrap();
    assert_eq!(row.shared_counter, 1);
}

#[tokio::test]
async fn unshared_thumbnail_is_updated_in_place() {
    let (manager, db, _dir) = manager().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "inplace.flac").await;

    let first = manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media.id_media,
            ThumbnailSizeType::Thumbnail,
            "file:///a.jpg",
            ThumbnailOrigin::CoverFile,
        )
        .await
        .unwrap();
    let second = manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media.id_media,
            ThumbnailSizeType::Thumbnail,
            "file:///b.jpg",
            ThumbnailOrigin::CoverFile,
        )
        .await
        .unwrap();
    assert_eq!(first.id_thumbnail, second.id_thumbnail);
    assert_eq!(second.mrl, "file:///b.jpg");
}

#[tokio::test]
async fn last_unlink_collects_the_row() {
    let (manager, db, _dir) = manager().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "collect.flac").await;

    let row = manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media.id_media,
            ThumbnailSizeType::Thumbnail,
            "file:///c.jpg",
            ThumbnailOrigin::Media,
        )
        .await
        .unwrap();
    assert!(manager
        .remove_thumbnail(ThumbnailedEntity::Media, media.id_media, ThumbnailSizeType::Thumbnail)
        .await
        .unwrap());
    assert!(db.thumbnails().by_id(row.id_thumbnail).await.unwrap().is_none());
}

#[tokio::test]
async fn banner_and_thumbnail_links_are_independent() {
    let (manager, db, _dir) = manager().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media = common::seed_media(&db, folder_id, device_id, "sizes.flac").await;

    manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media.id_media,
            ThumbnailSizeType::Thumbnail,
            "file:///small.jpg",
            ThumbnailOrigin::Media,
        )
        .await
        .unwrap();
    manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media.id_media,
            ThumbnailSizeType::Banner,
            "file:///wide.jpg",
            ThumbnailOrigin::Media,
        )
        .await
        .unwrap();

    let small = manager
        .thumbnail(ThumbnailedEntity::Media, media.id_media, ThumbnailSizeType::Thumbnail)
        .await
        .unwrap()
        .unwrap();
    let wide = manager
        .thumbnail(ThumbnailedEntity::Media, media.id_media, ThumbnailSizeType::Banner)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(small.id_thumbnail, wide.id_thumbnail);
    let _ = db;
}

#[tokio::test]
async fn flush_user_provided_only_touches_user_thumbnails() {
    let (manager, db, _dir) = manager().await;
    let (device_id, folder_id) = common::seed_folder(&db).await;
    let media_a = common::seed_media(&db, folder_id, device_id, "ua.flac").await;
    let media_b = common::seed_media(&db, folder_id, device_id, "ub.flac").await;

    manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media_a.id_media,
            ThumbnailSizeType::Thumbnail,
            "file:///user.jpg",
            ThumbnailOrigin::UserProvided,
        )
        .await
        .unwrap();
    manager
        .set_thumbnail(
            ThumbnailedEntity::Media,
            media_b.id_media,
            ThumbnailSizeType::Thumbnail,
            "file:///cover.jpg",
            ThumbnailOrigin::CoverFile,
        )
        .await
        .unwrap();

    manager.flush_user_provided().await.unwrap();

    assert!(manager
        .thumbnail(ThumbnailedEntity::Media, media_a.id_media, ThumbnailSizeType::Thumbnail)
        .await
        .unwrap()
        .is_none());
    assert!(manager
        .thumbnail(ThumbnailedEntity::Media, media_b.id_media, ThumbnailSizeType::Thumbnail)
        .await
        .unwrap()
        .is_some());
}
