use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use discovery::static_config::StaticArguments;
use discovery::{
    Arguments, Component, ConfigError, Discoverer, Filter, Phase, PollError, Target, TargetGroup,
    UpdateError,
};
use pretty_assertions::assert_eq;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Arguments of the scripted backend below.
#[derive(Clone, Debug, Default, PartialEq)]
struct TestArguments {
    backend: String,
    refresh_interval: Option<Duration>,
    filters: Vec<Filter>,
    label_filters: Vec<Filter>,
}

impl TestArguments {
    fn new(backend: &str, interval: Duration) -> Self {
        Self {
            backend: backend.to_string(),
            refresh_interval: Some(interval),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Arguments for TestArguments {
    type Request = String;

    fn apply_defaults(&self) -> Self {
        Self {
            refresh_interval: Some(self.refresh_interval.unwrap_or(Duration::from_secs(60))),
            ..self.clone()
        }
    }

    async fn validate(&self) -> Result<Self, ConfigError> {
        for filter in self.filters.iter().chain(&self.label_filters) {
            filter.validate()?;
        }
        if self.refresh_interval == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroRefreshInterval);
        }

        Ok(self.clone())
    }

    fn convert(&self) -> String {
        self.backend.clone()
    }

    fn refresh_interval(&self) -> Duration {
        self.refresh_interval.unwrap_or(Duration::from_secs(60))
    }

    fn label_filters(&self) -> Vec<Filter> {
        self.label_filters.clone()
    }
}

/// Knobs shared by every discoverer a test factory builds.
#[derive(Default)]
struct Script {
    fail: AtomicBool,
    hang: AtomicBool,
    hold: AtomicBool,
    release: Notify,
    polls: Mutex<Vec<(String, Instant)>>,
    count: AtomicUsize,
}

impl Script {
    fn polls(&self) -> Vec<(String, Instant)> {
        self.polls.lock().unwrap().clone()
    }
}

struct Scripted {
    backend: String,
    script: Arc<Script>,
}

#[async_trait]
impl Discoverer for Scripted {
    async fn targets(&self) -> discovery::Result<Vec<TargetGroup>> {
        let n = self.script.count.fetch_add(1, Ordering::SeqCst);
        self.script
            .polls
            .lock()
            .unwrap()
            .push((self.backend.clone(), Instant::now()));

        if self.script.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.script.hold.load(Ordering::SeqCst) {
            self.script.release.notified().await;
        }
        if self.script.fail.load(Ordering::SeqCst) {
            return Err("backend unavailable".into());
        }

        // every group carries the poll number, so a torn read would be visible
        let groups = (0..3)
            .map(|i| {
                TargetGroup::new(
                    vec![Target::new(format!("10.0.0.{i}:9100"))],
                    [
                        ("backend".to_string(), self.backend.clone()),
                        ("poll".to_string(), n.to_string()),
                    ]
                    .into(),
                    Some(format!("{}/{i}", self.backend)),
                )
            })
            .collect();

        Ok(groups)
    }
}

fn factory(
    script: &Arc<Script>,
) -> impl Fn(String) -> discovery::Result<Arc<dyn Discoverer>> + Send + Sync + 'static {
    let script = Arc::clone(script);

    move |backend: String| -> discovery::Result<Arc<dyn Discoverer>> {
        if backend.is_empty() {
            return Err("backend is required".into());
        }

        Ok(Arc::new(Scripted {
            backend,
            script: Arc::clone(&script),
        }))
    }
}

async fn first_publish(component: &Component<TestArguments>) {
    let mut rx = component.subscribe();
    rx.wait_for(|snapshot| !snapshot.is_empty()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stale_snapshot_survives_failed_poll() {
    let script = Arc::new(Script::default());
    let component = Component::new(
        TestArguments::new("a", Duration::from_secs(60)),
        factory(&script),
    )
    .await
    .unwrap();

    first_publish(&component).await;
    let published = component.export();
    assert_eq!(published.len(), 3);
    assert_eq!(component.status().phase, Phase::Published);

    script.fail.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(61)).await;

    let status = component.status();
    assert_eq!(status.phase, Phase::Failed);
    assert!(matches!(
        status.last_error.as_deref(),
        Some(PollError::Discover(_))
    ));
    assert!(status.last_success.is_some());
    assert_eq!(script.polls().len(), 2);
    assert!(Arc::ptr_eq(&published, &component.export()));

    // the next good poll clears the error again
    script.fail.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;

    let status = component.status();
    assert_eq!(status.phase, Phase::Published);
    assert!(status.last_error.is_none());
    assert!(!Arc::ptr_eq(&published, &component.export()));

    component.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn export_is_stable_between_polls() {
    let script = Arc::new(Script::default());
    let component = Component::new(
        TestArguments::new("a", Duration::from_secs(60)),
        factory(&script),
    )
    .await
    .unwrap();

    first_publish(&component).await;
    let first = component.export();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(Arc::ptr_eq(&first, &component.export()));

    component.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_update_changes_nothing() {
    let script = Arc::new(Script::default());
    let arguments = TestArguments::new("a", Duration::from_secs(60));
    let component = Component::new(arguments.clone(), factory(&script))
        .await
        .unwrap();

    first_publish(&component).await;
    let snapshot = component.export();

    let invalid = TestArguments {
        filters: vec![Filter::new("tag:env", Vec::<String>::new())],
        ..TestArguments::new("b", Duration::from_secs(10))
    };
    let err = component.update(invalid).await.unwrap_err();
    assert!(matches!(
        err,
        UpdateError::Config(ConfigError::EmptyFilterValues { .. })
    ));

    // the factory refusing the request is just as harmless
    let err = component
        .update(TestArguments::new("", Duration::from_secs(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::Build(_)));

    assert_eq!(component.arguments(), arguments);
    assert_eq!(component.status().refresh_interval, Duration::from_secs(60));
    assert!(Arc::ptr_eq(&snapshot, &component.export()));

    // still polling the old backend at the old cadence
    tokio::time::sleep(Duration::from_secs(61)).await;
    let polls = script.polls();
    assert_eq!(polls.len(), 2);
    assert!(polls.iter().all(|(backend, _)| backend == "a"));

    component.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shorter_interval_applies_from_next_tick() {
    let script = Arc::new(Script::default());
    let start = Instant::now();
    let component = Component::new(
        TestArguments::new("a", Duration::from_secs(60)),
        factory(&script),
    )
    .await
    .unwrap();

    first_publish(&component).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    component
        .update(TestArguments::new("b", Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(component.status().refresh_interval, Duration::from_secs(10));

    tokio::time::sleep_until(start + Duration::from_secs(85)).await;

    let polls = script
        .polls()
        .into_iter()
        .map(|(backend, at)| (backend, (at - start).as_secs()))
        .collect::<Vec<_>>();
    assert_eq!(
        polls,
        vec![
            ("a".to_string(), 0),
            ("b".to_string(), 60),
            ("b".to_string(), 70),
            ("b".to_string(), 80),
        ]
    );

    component.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn update_during_poll_publishes_old_backend_first() {
    let script = Arc::new(Script::default());
    script.hold.store(true, Ordering::SeqCst);

    let start = Instant::now();
    let component = Component::new(
        TestArguments::new("a", Duration::from_secs(60)),
        factory(&script),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(component.status().phase, Phase::Polling);

    component
        .update(TestArguments::new("b", Duration::from_secs(60)))
        .await
        .unwrap();

    // the in-flight poll finishes against the old backend and is published
    script.hold.store(false, Ordering::SeqCst);
    script.release.notify_one();
    first_publish(&component).await;

    let exported = component.export();
    assert!(
        exported
            .iter()
            .all(|group| group.labels.get("backend").map(String::as_str) == Some("a"))
    );

    tokio::time::sleep_until(start + Duration::from_secs(61)).await;

    let polls = script
        .polls()
        .into_iter()
        .map(|(backend, at)| (backend, (at - start).as_secs()))
        .collect::<Vec<_>>();
    assert_eq!(polls, vec![("a".to_string(), 0), ("b".to_string(), 60)]);
    assert!(
        component
            .export()
            .iter()
            .all(|group| group.labels.get("backend").map(String::as_str) == Some("b"))
    );

    component.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hung_poll_times_out() {
    let script = Arc::new(Script::default());
    script.hang.store(true, Ordering::SeqCst);

    let component = Component::new(
        TestArguments::new("a", Duration::from_secs(60)),
        factory(&script),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(55)).await;

    let status = component.status();
    assert_eq!(status.phase, Phase::Failed);
    assert!(matches!(
        status.last_error.as_deref(),
        Some(PollError::Timeout(limit)) if *limit == Duration::from_secs(54)
    ));
    assert!(component.export().is_empty());

    component.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_blocked_poll() {
    let script = Arc::new(Script::default());
    script.hang.store(true, Ordering::SeqCst);

    let component = Component::new(
        TestArguments::new("a", Duration::from_secs(60)),
        factory(&script),
    )
    .await
    .unwrap();
    let rx = component.subscribe();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(component.status().phase, Phase::Polling);

    let start = Instant::now();
    component.shutdown().await;

    assert!(start.elapsed() < Duration::from_secs(54));
    // the loop is gone, and the state with it
    assert!(rx.has_changed().is_err());
    assert_eq!(script.polls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn arguments_are_kept_as_supplied() {
    let script = Arc::new(Script::default());
    let arguments = TestArguments {
        backend: "a".into(),
        ..Default::default()
    };
    let component = Component::new(arguments.clone(), factory(&script))
        .await
        .unwrap();

    assert_eq!(component.arguments(), arguments);
    assert_eq!(component.arguments().refresh_interval, None);
    assert_eq!(component.status().refresh_interval, Duration::from_secs(60));

    component.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn label_filters_narrow_export() {
    let arguments = StaticArguments {
        targets: vec![
            TargetGroup::new(
                vec![
                    Target::new("10.0.0.1:9100").with_label("env", "prod"),
                    Target::new("10.0.0.2:9100").with_label("env", "dev"),
                ],
                Default::default(),
                Some("mixed".into()),
            ),
            TargetGroup::new(
                vec![Target::new("10.0.1.1:9100")],
                [("env".to_string(), "dev".to_string())].into(),
                Some("dev".into()),
            ),
        ],
        refresh_interval: None,
        filters: vec![Filter::new("env", ["prod"])],
    };

    let component = Component::new(arguments.clone(), discovery::static_config::build)
        .await
        .unwrap();
    let mut rx = component.subscribe();
    rx.wait_for(|snapshot| !snapshot.is_empty()).await.unwrap();

    let exported = component.export();
    assert_eq!(exported.len(), 2);
    assert_eq!(exported[0].targets, vec![Target::new("10.0.0.1:9100").with_label("env", "prod")]);
    // emptied groups are kept
    assert!(exported[1].targets.is_empty());

    // new filters apply right away, without waiting for the next poll
    component
        .update(StaticArguments {
            filters: vec![Filter::new("env", ["dev"])],
            ..arguments
        })
        .await
        .unwrap();

    let exported = component.export();
    assert_eq!(exported[0].targets, vec![Target::new("10.0.0.2:9100").with_label("env", "dev")]);
    assert_eq!(exported[1].targets, vec![Target::new("10.0.1.1:9100")]);

    component.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_exports_never_tear() {
    let script = Arc::new(Script::default());
    let component = Arc::new(
        Component::new(
            TestArguments::new("a", Duration::from_millis(2)),
            factory(&script),
        )
        .await
        .unwrap(),
    );

    let readers = (0..4)
        .map(|_| {
            let component = Arc::clone(&component);

            tokio::spawn(async move {
                let deadline = Instant::now() + Duration::from_millis(300);
                let mut seen = 0;

                while Instant::now() < deadline {
                    let snapshot = component.export();
                    let polls = snapshot
                        .iter()
                        .map(|group| group.labels.get("poll").cloned())
                        .collect::<Vec<_>>();
                    if let Some(first) = polls.first() {
                        assert!(polls.iter().all(|poll| poll == first), "{polls:?}");
                        seen += 1;
                    }

                    tokio::task::yield_now().await;
                }

                seen
            })
        })
        .collect::<Vec<_>>();

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert!(script.count.load(Ordering::SeqCst) > 1);
}
