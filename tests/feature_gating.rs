use std::time::Duration;

use pdfharvest::error::{Error, Result};
use pdfharvest::pipeline::cancel::CancelToken;
use pdfharvest::pipeline::retry::{RetryOutcome, RetryPolicy};

/// One transient failure, then success on the second attempt.
async fn retry_once() -> Result<u32> {
    let policy = RetryPolicy::new(3)
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(2));

    let outcome = policy
        .run("fetch", &CancelToken::default(), |attempt| async move {
            if attempt < 2 {
                Err(Error::Status {
                    url: "http://store/0000.zip".to_string(),
                    status: 503,
                })
            } else {
                Ok(attempt)
            }
        })
        .await?;

    match outcome {
        RetryOutcome::Done(done) => Ok(done.attempts),
        RetryOutcome::Cancelled => panic!("not cancelled"),
    }
}

#[cfg(feature = "tracing")]
mod with_tracing {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::*;

    /// Collects the `event` field of every event.
    struct EventNames(Arc<Mutex<Vec<String>>>);

    struct EventField(Option<String>);

    impl Visit for EventField {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "event" {
                self.0 = Some(value.to_string());
            }
        }

        fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
    }

    impl<S: Subscriber> Layer<S> for EventNames {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut field = EventField(None);
            event.record(&mut field);
            if let Some(name) = field.0 {
                self.0.lock().expect("mutex poisoned").push(name);
            }
        }
    }

    #[tokio::test]
    async fn retry_emits_named_events() -> Result<()> {
        let names = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(EventNames(names.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        assert_eq!(retry_once().await?, 2);

        let names = names.lock().expect("mutex poisoned").clone();
        assert!(names.iter().any(|n| n == "pdfharvest.retry.attempt_failed"), "{names:?}");
        assert!(names.iter().any(|n| n == "pdfharvest.retry.sleep"), "{names:?}");
        assert!(!names.iter().any(|n| n == "pdfharvest.retry.exhausted"));
        assert!(names.iter().all(|n| n.starts_with("pdfharvest.")));
        Ok(())
    }
}

#[cfg(not(feature = "tracing"))]
#[tokio::test]
async fn retry_works_without_tracing() -> Result<()> {
    assert_eq!(retry_once().await?, 2);
    Ok(())
}
