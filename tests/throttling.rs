use stack_throttle::infrastructure::mocks::MockClock;
use stack_throttle::{
    DecisionCache, DenyListPredicate, DuplicateDecisionFilter, ExceptionProxy, LineSkipPredicate,
    LogEvent, Metrics, RenderOptions, StackTraceRenderer,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FRAMES: [&str; 5] = [
    "com.acme.orders.Repository.load(Repository.java:88)",
    "com.acme.orders.Service.find(Service.java:41)",
    "org.springframework.aop.framework.ReflectiveMethodInvocation.proceed(ReflectiveMethodInvocation.java:186)",
    "org.springframework.aop.framework.JdkDynamicAopProxy.invoke(JdkDynamicAopProxy.java:215)",
    "com.acme.orders.Controller.get(Controller.java:19)",
];

fn occurrence() -> ExceptionProxy {
    ExceptionProxy::builder("java.lang.IllegalStateException")
        .message("order not found")
        .frames(FRAMES)
        .build()
}

fn event(exception: ExceptionProxy) -> LogEvent {
    LogEvent::new("ERROR", "com.acme.orders.Controller", "lookup failed").with_exception(exception)
}

fn throttled_renderer(budget: u32, window: Duration, clock: Arc<MockClock>) -> StackTraceRenderer {
    let metrics = Metrics::new();
    let filter = DuplicateDecisionFilter::builder(window)
        .with_budget(budget)
        .with_clock(clock)
        .with_metrics(metrics.clone())
        .build(Arc::new(DenyListPredicate::parse("org.springframework.")))
        .unwrap();
    StackTraceRenderer::with_predicate_and_metrics(RenderOptions::new(), Arc::new(filter), metrics)
}

fn is_full(text: &str) -> bool {
    text.contains("org.springframework") && !text.contains("skipped")
}

#[test]
fn test_second_occurrence_within_window_is_suppressed() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let renderer = throttled_renderer(1, Duration::from_secs(60), clock.clone());

    let first = renderer.render(&event(occurrence()));
    clock.advance(Duration::from_secs(10));
    let second = renderer.render(&event(occurrence()));

    assert!(is_full(&first));
    assert!(!second.contains("org.springframework"));
    assert!(second.contains("\tat com.acme.orders.Controller.get(Controller.java:19) [2 skipped]"));
}

#[test]
fn test_occurrence_after_window_prints_in_full_again() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let renderer = throttled_renderer(1, Duration::from_secs(60), clock.clone());

    assert!(is_full(&renderer.render(&event(occurrence()))));
    assert!(!is_full(&renderer.render(&event(occurrence()))));

    clock.advance(Duration::from_secs(61));
    assert!(is_full(&renderer.render(&event(occurrence()))));
    assert_eq!(renderer.metrics().filter_rotations(), 1);
}

#[test]
fn test_budget_of_ten_spans_two_sub_windows() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let renderer = throttled_renderer(10, Duration::from_secs(60), clock.clone());

    let mut full = 0;
    for _ in 0..12 {
        if is_full(&renderer.render(&event(occurrence()))) {
            full += 1;
        }
    }
    assert_eq!(full, 7, "first sub-window permits 7");

    // Occurrences 8 to 10 land in the second sub-window.
    clock.advance(Duration::from_secs(30));
    let second: Vec<bool> = (0..5)
        .map(|_| is_full(&renderer.render(&event(occurrence()))))
        .collect();
    assert_eq!(second, vec![true, true, true, false, false]);
}

#[test]
fn test_each_sink_sees_the_same_decision() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let renderer = throttled_renderer(1, Duration::from_secs(60), clock);

    let first = event(occurrence());
    let second = event(occurrence());

    // Three sinks render each event.
    let first_outputs: Vec<String> = (0..3).map(|_| renderer.render(&first)).collect();
    let second_outputs: Vec<String> = (0..3).map(|_| renderer.render(&second)).collect();

    assert!(first_outputs.iter().all(|t| is_full(t)));
    assert!(second_outputs.iter().all(|t| !is_full(t)));
    assert_eq!(renderer.metrics().cache_hits(), 4);
    assert_eq!(renderer.metrics().snapshot().total_decisions(), 2);
}

#[test]
fn test_distinct_stacks_are_tracked_independently() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let renderer = throttled_renderer(1, Duration::from_secs(60), clock);

    let other = || {
        ExceptionProxy::builder("java.io.UncheckedIOException")
            .frames([
                "com.acme.files.Reader.read(Reader.java:12)",
                "org.springframework.core.io.Resource.open(Resource.java:3)",
            ])
            .build()
    };

    assert!(is_full(&renderer.render(&event(occurrence()))));
    assert!(renderer.render(&event(other())).contains("org.springframework"));
    assert!(!is_full(&renderer.render(&event(occurrence()))));
    assert!(!renderer.render(&event(other())).contains("org.springframework"));
}

#[test]
fn test_shared_decision_cache() {
    let cache = Arc::new(DecisionCache::new());
    let filter = DuplicateDecisionFilter::builder(Duration::from_secs(60))
        .with_cache(cache.clone())
        .build(Arc::new(DenyListPredicate::parse("org.springframework.")))
        .unwrap();

    let exception = occurrence();
    assert!(!filter.should_enable_skip(&exception));
    assert_eq!(cache.get(exception.id()), Some(false));
}

#[test]
fn test_concurrent_renders_agree_per_occurrence() {
    use std::thread;

    let clock = Arc::new(MockClock::new(Instant::now()));
    let renderer = Arc::new(throttled_renderer(1, Duration::from_secs(60), clock));
    let shared = Arc::new(event(occurrence()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let renderer = Arc::clone(&renderer);
            let shared = Arc::clone(&shared);
            thread::spawn(move || renderer.render(&shared))
        })
        .collect();

    let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(outputs.iter().all(|o| o == &outputs[0]));
}
