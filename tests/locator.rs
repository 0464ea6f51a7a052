use std::path::Path;

use pdfharvest::fetch::ArchiveLocator;
use proptest::prelude::*;

#[test]
fn resolves_bucketed_urls() {
    let locator = ArchiveLocator::new("https://store.example/corpus", "/tmp/staging");

    let first = locator.locate(0);
    assert_eq!(first.remote_url, "https://store.example/corpus/zipfiles/0000-0999/0000.zip");
    assert_eq!(first.local_path, Path::new("/tmp/staging/0000.zip"));

    let later = locator.locate(1234);
    assert_eq!(later.remote_url, "https://store.example/corpus/zipfiles/1000-1999/1234.zip");
    assert_eq!(later.local_path, Path::new("/tmp/staging/1234.zip"));

    assert_eq!(
        locator.locate(7932).remote_url,
        "https://store.example/corpus/zipfiles/7000-7999/7932.zip"
    );
}

#[test]
fn trailing_slash_is_not_doubled() {
    let with = ArchiveLocator::new("https://store.example/corpus/", "s");
    let without = ArchiveLocator::new("https://store.example/corpus", "s");
    assert_eq!(with.locate(5), without.locate(5));
}

proptest! {
    #[test]
    fn locate_is_pure_and_partitioned(a in 0u32..10_000, b in 0u32..10_000) {
        let locator = ArchiveLocator::new("https://store.example/", "staging");

        prop_assert_eq!(locator.locate(a), locator.locate(a));
        if a != b {
            prop_assert_ne!(locator.locate(a).local_path, locator.locate(b).local_path);
            prop_assert_ne!(locator.locate(a).remote_url, locator.locate(b).remote_url);
        }

        let handle = locator.locate(a);
        let bucket = (a / 1000) * 1000;
        let expected_dir = format!("zipfiles/{:04}-{:04}/", bucket, bucket + 999);
        prop_assert!(handle.remote_url.contains(&expected_dir));
        prop_assert_eq!(handle.index, a);
    }
}
