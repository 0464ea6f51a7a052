use std::time::Duration;

use pdfharvest::pipeline::cancel::{CancelToken, StopLevel};

#[test]
fn levels_only_escalate() {
    let token = CancelToken::default();
    assert_eq!(token.level(), StopLevel::Running);
    assert!(!token.is_draining());

    assert!(token.drain());
    assert!(!token.drain(), "second drain is a no-op");
    assert!(token.is_draining());
    assert!(!token.is_cancelled());

    token.cancel();
    assert!(token.is_cancelled());
    assert!(token.is_draining(), "cancelled implies draining");

    assert!(!token.drain());
    assert_eq!(token.level(), StopLevel::Cancelled);
}

#[test]
fn clones_share_state() {
    let token = CancelToken::default();
    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn draining_resolves_on_cancel() {
    let token = CancelToken::default();
    let waiter = {
        let token = token.clone();
        tokio::spawn(async move { token.draining().await })
    };

    tokio::task::yield_now().await;
    token.cancel();

    tokio::time::timeout(Duration::from_millis(500), waiter)
        .await
        .expect("draining() should resolve")
        .unwrap();
}

#[tokio::test]
async fn cancelled_does_not_resolve_on_drain() {
    let token = CancelToken::default();
    token.drain();

    let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
    assert!(waited.is_err());
}
