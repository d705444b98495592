use stack_throttle::infrastructure::mocks::MockCaptureLayer;
use stack_throttle::{
    AllowListPredicate, DenyListPredicate, EvaluationError, EvaluatorRegistry, EventEvaluator,
    ExceptionProxy, FnPredicate, LengthOption, LogEvent, RenderOptions, StackTraceRenderer,
};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn event(exception: ExceptionProxy) -> LogEvent {
    LogEvent::new("ERROR", "com.acme.App", "request failed").with_exception(exception)
}

#[test]
fn test_deny_list_skip_runs() {
    let renderer = StackTraceRenderer::with_predicate(
        RenderOptions::new(),
        Arc::new(DenyListPredicate::parse("com.foo.")),
    );
    let exception = ExceptionProxy::builder("java.lang.RuntimeException")
        .message("boom")
        .frames([
            "com.foo.Outer.a(Outer.java:1)",
            "com.acme.First.run(First.java:10)",
            "com.foo.Inner.b(Inner.java:2)",
            "com.foo.Inner.c(Inner.java:3)",
            "com.foo.Inner.d(Inner.java:4)",
            "com.acme.Second.run(Second.java:20)",
            "com.foo.Tail.e(Tail.java:5)",
        ])
        .build();

    let text = renderer.render(&event(exception));
    assert_eq!(
        text,
        [
            "",
            "java.lang.RuntimeException: boom",
            "\tat com.acme.First.run(First.java:10) [1 skipped]",
            "\tat com.acme.Second.run(Second.java:20) [3 skipped]",
            " [1 skipped]",
            "",
            "",
        ]
        .join("\n")
    );
    assert!(!text.contains("at com.foo."));
}

#[test]
fn test_allow_list_keeps_only_application_frames() {
    let renderer = StackTraceRenderer::with_predicate(
        RenderOptions::new(),
        Arc::new(AllowListPredicate::parse("com.acme.")),
    );
    let exception = ExceptionProxy::builder("E")
        .frames([
            "com.acme.A.a(A.java:1)",
            "java.lang.Thread.run(Thread.java:833)",
        ])
        .build();

    assert_eq!(
        renderer.render(&event(exception)),
        "\nE\n\tat com.acme.A.a(A.java:1)\n [1 skipped]\n\n"
    );
}

#[test]
fn test_short_length_with_many_frames() {
    let renderer = StackTraceRenderer::new(RenderOptions::new().with_length(LengthOption::Short));
    let frames: Vec<String> = (0..50).map(|i| format!("com.acme.F{i}.f(F{i}.java:{i})")).collect();
    let exception = ExceptionProxy::builder("E").frames(frames).build();

    let text = renderer.render(&event(exception));
    assert_eq!(text.matches("\tat ").count(), 1);
    assert!(text.contains("at com.acme.F0.f(F0.java:0)"));
}

#[test]
fn test_common_frames_elided_in_cause_chain() {
    let cause = ExceptionProxy::builder("java.sql.SQLException")
        .message("connection reset")
        .frames([
            "org.db.Driver.send(Driver.java:1)",
            "com.acme.Dao.save(Dao.java:2)",
            "com.acme.Service.save(Service.java:3)",
            "com.acme.Main.main(Main.java:4)",
        ])
        .common_frames(2)
        .build();
    let root = ExceptionProxy::builder("com.acme.SaveFailed")
        .frames(["com.acme.Service.save(Service.java:3)", "com.acme.Main.main(Main.java:4)"])
        .cause(cause)
        .build();

    let text = StackTraceRenderer::new(RenderOptions::new()).render(&event(root));
    assert_eq!(
        text,
        "\n\
         com.acme.SaveFailed\n\
         \tat com.acme.Service.save(Service.java:3)\n\
         \tat com.acme.Main.main(Main.java:4)\n\
         Caused by: java.sql.SQLException: connection reset\n\
         \tat org.db.Driver.send(Driver.java:1)\n\
         \tat com.acme.Dao.save(Dao.java:2)\n\
         \t... 2 common frames omitted\n\
         \n"
    );
}

#[test]
fn test_nested_suppressed_indentation() {
    let inner = ExceptionProxy::builder("Inner").frames(["i.I.i(I.java:1)"]).build();
    let middle = ExceptionProxy::builder("Middle")
        .frames(["m.M.m(M.java:1)"])
        .suppressed(inner)
        .build();
    let root = ExceptionProxy::builder("Root")
        .frames(["r.R.r(R.java:1)"])
        .suppressed(middle)
        .build();

    let text = StackTraceRenderer::new(RenderOptions::new()).render(&event(root));
    assert_eq!(
        text,
        "\n\
         Root\n\
         \tat r.R.r(R.java:1)\n\
         \tSuppressed: Middle\n\
         \t\tat m.M.m(M.java:1)\n\
         \t\tSuppressed: Inner\n\
         \t\t\tat i.I.i(I.java:1)\n\
         \n"
    );
}

#[test]
fn test_converter_tokens() {
    #[derive(Debug)]
    struct HealthCheck;

    impl EventEvaluator for HealthCheck {
        fn name(&self) -> &str {
            "healthCheck"
        }

        fn evaluate(&self, event: &LogEvent) -> Result<bool, EvaluationError> {
            Ok(event.message.contains("health"))
        }
    }

    let mut registry = EvaluatorRegistry::new();
    registry.insert("healthCheck".to_string(), Arc::new(HealthCheck));

    let options = RenderOptions::from_tokens(&["full", "healthCheck", "$$Lambda"], &registry);
    let renderer = StackTraceRenderer::new(options);

    let exception = ExceptionProxy::builder("E")
        .frames(["com.acme.A$$Lambda$1.run(Unknown Source)", "com.acme.B.b(B.java:2)"])
        .build();

    let health = LogEvent::new("WARN", "probe", "health check failed").with_exception(exception.clone());
    assert_eq!(renderer.render(&health), "");

    let text = renderer.render(&event(exception));
    assert_eq!(text, "\nE\n\tat com.acme.B.b(B.java:2) [1 skipped]\n\n");
}

#[test]
fn test_panicking_predicate_falls_back_once() {
    let predicate = FnPredicate::new("fragile", |line: &str| {
        if line.contains("Poison") {
            panic!("cannot classify {}", line);
        }
        line.contains("com.foo.")
    });
    let renderer = StackTraceRenderer::with_predicate(
        RenderOptions::new().with_deny_substring("Generated"),
        Arc::new(predicate),
    );

    let poisoned = ExceptionProxy::builder("E")
        .frames([
            "com.foo.A.a(A.java:1)",
            "com.acme.Poison.p(Poison.java:2)",
            "com.acme.Generated.g(Generated.java:3)",
            "com.acme.B.b(B.java:4)",
        ])
        .build();

    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let (first, second) = tracing::subscriber::with_default(subscriber, || {
        let first = renderer.render(&event(poisoned.clone()));
        let second = renderer.render(&event(poisoned.clone()));
        (first, second)
    });

    // After the failure the deny substrings take over; output is never lost.
    assert_eq!(
        first,
        "\nE\n\tat com.acme.Poison.p(Poison.java:2) [1 skipped]\n\tat com.acme.B.b(B.java:4) [1 skipped]\n\n"
    );
    assert_eq!(
        second,
        "\nE\n\tat com.foo.A.a(A.java:1)\n\tat com.acme.Poison.p(Poison.java:2)\n\tat com.acme.B.b(B.java:4) [1 skipped]\n\n"
    );
    assert!(renderer.is_predicate_disabled());
    assert_eq!(capture.at_level(Level::WARN).len(), 1);
    assert_eq!(renderer.metrics().predicate_failures(), 1);
}
