//! End-to-end tests driving the public API only.

use armature::{
    invoke, module, nop_logger, options, provide, provide_private, stop_timeout, supply,
    try_provide, validate_app, App, ArmatureError, BoxError, Event, EventLogger, Hook, Lifecycle,
    StartStop,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Trace = Arc<Mutex<Vec<String>>>;

fn tracing_hook(name: &str, trace: &Trace) -> Hook {
    let start_trace = trace.clone();
    let stop_trace = trace.clone();
    let start_entry = format!("{name}.start");
    let stop_entry = format!("{name}.stop");
    Hook::named(name)
        .on_start(move |_ctx| {
            let trace = start_trace.clone();
            let entry = start_entry.clone();
            async move {
                trace.lock().unwrap().push(entry);
                Ok(())
            }
        })
        .on_stop(move |_ctx| {
            let trace = stop_trace.clone();
            let entry = stop_entry.clone();
            async move {
                trace.lock().unwrap().push(entry);
                Ok(())
            }
        })
}

/// Hooks register as constructors run, so hook order follows dependency
/// order: a value's hooks start after its dependencies' hooks and stop
/// before them.
#[tokio::test]
async fn hooks_follow_construction_order() {
    struct Database;
    struct Server;

    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let db_trace = trace.clone();
    let server_trace = trace.clone();

    let mut app = App::new([
        nop_logger(),
        provide(move |lc: Arc<Lifecycle>| {
            lc.append(tracing_hook("database", &db_trace)).unwrap();
            Database
        }),
        provide(move |_db: Arc<Database>, lc: Arc<Lifecycle>| {
            lc.append(tracing_hook("server", &server_trace)).unwrap();
            Server
        }),
        invoke(|_server: Arc<Server>| {}),
    ]);
    assert!(app.err().is_none());

    app.start().await.unwrap();
    app.stop().await.unwrap();

    assert_eq!(
        *trace.lock().unwrap(),
        vec![
            "database.start",
            "server.start",
            "server.stop",
            "database.stop"
        ]
    );
}

/// `options(a, options(b, c))` behaves exactly like passing a, b, c flat.
#[tokio::test]
async fn nested_option_groups_are_equivalent_to_flat_options() {
    fn collect(opts: Vec<armature::DynOption>) -> (i32, String) {
        let result = Arc::new(Mutex::new((0, String::new())));
        let probe = result.clone();
        let app = App::new(opts.into_iter().chain([invoke(
            move |n: Arc<i32>, s: Arc<String>| {
                *probe.lock().unwrap() = (*n, s.as_str().to_string());
            },
        )]));
        assert!(app.err().is_none());
        let out = result.lock().unwrap().clone();
        out
    }

    let nested = collect(vec![
        nop_logger(),
        options([supply(3i32), options([supply("three".to_string())])]),
    ]);
    let flat = collect(vec![nop_logger(), supply(3i32), supply("three".to_string())]);

    assert_eq!(nested, flat);
    assert_eq!(nested, (3, "three".to_string()));
}

#[tokio::test]
async fn wait_replays_shutdowns_to_late_subscribers() {
    let shutdowner: Arc<Mutex<Option<armature::Shutdowner>>> = Arc::new(Mutex::new(None));
    let probe = shutdowner.clone();

    let mut app = App::new([
        nop_logger(),
        invoke(move |s: Arc<armature::Shutdowner>| {
            *probe.lock().unwrap() = Some((*s).clone());
        }),
    ]);
    app.start().await.unwrap();

    // Broadcast before anyone subscribes.
    shutdowner
        .lock()
        .unwrap()
        .as_ref()
        .unwrap()
        .shutdown([armature::exit_code(9)])
        .unwrap();

    let mut rx = app.wait();
    let signal = rx.recv().await.unwrap();
    assert_eq!(signal.signal, "user");
    assert_eq!(signal.exit_code, 9);

    app.stop().await.unwrap();
}

/// Once the stop deadline expires, remaining stop hooks are skipped, but the
/// hooks before the deadline all ran.
#[tokio::test(start_paused = true)]
async fn stop_deadline_ends_the_walk_early() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let fast_trace = trace.clone();

    let mut app = App::new([
        nop_logger(),
        stop_timeout(Duration::from_millis(50)),
        invoke(move |lc: Arc<Lifecycle>| {
            lc.append(tracing_hook("first", &fast_trace)).unwrap();
            lc.append(Hook::named("slow").on_stop(|_ctx| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }))
            .unwrap();
        }),
    ]);

    app.start().await.unwrap();
    let err = app.stop().await.unwrap_err();
    assert!(err.to_string().contains("deadline exceeded"));

    // The slow hook burned the deadline; the earlier hook never got to stop.
    let entries = trace.lock().unwrap().clone();
    assert_eq!(entries, vec!["first.start"]);
}

#[tokio::test]
async fn start_stop_trait_resources_participate() {
    struct Worker {
        trace: Trace,
    }

    #[async_trait]
    impl StartStop for Worker {
        async fn on_start(&self, _ctx: &armature::Context) -> Result<(), BoxError> {
            self.trace.lock().unwrap().push("worker.start".to_string());
            Ok(())
        }

        async fn on_stop(&self, _ctx: &armature::Context) -> Result<(), BoxError> {
            self.trace.lock().unwrap().push("worker.stop".to_string());
            Ok(())
        }
    }

    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let worker_trace = trace.clone();

    let mut app = App::new([
        nop_logger(),
        invoke(move |lc: Arc<Lifecycle>| {
            lc.register(Arc::new(Worker {
                trace: worker_trace.clone(),
            }))
            .unwrap();
        }),
    ]);

    app.start().await.unwrap();
    app.stop().await.unwrap();
    assert_eq!(*trace.lock().unwrap(), vec!["worker.start", "worker.stop"]);
}

#[tokio::test]
async fn decorated_values_reach_consumers() {
    struct Greeting(String);

    let seen = Arc::new(Mutex::new(String::new()));
    let probe = seen.clone();

    let app = App::new([
        nop_logger(),
        provide(|| Greeting("hello".to_string())),
        armature::decorate(|g: Arc<Greeting>| Greeting(format!("{}, world", g.0))),
        invoke(move |g: Arc<Greeting>| {
            *probe.lock().unwrap() = g.0.clone();
        }),
    ]);
    assert!(app.err().is_none());
    assert_eq!(*seen.lock().unwrap(), "hello, world");
}

#[tokio::test]
async fn private_provides_stay_inside_their_module() {
    struct Secret;

    let app = App::new([
        nop_logger(),
        module("vault", [provide_private(|| Secret)]),
        invoke(|_s: Arc<Secret>| {}),
    ]);

    let err = app.err().expect("secret is not visible at the root");
    assert!(err.to_string().contains("missing dependency"));
    assert!(err.to_string().contains("Secret"));
}

#[tokio::test]
async fn failing_constructors_surface_through_err() {
    struct Flaky;

    let app = App::new([
        nop_logger(),
        try_provide(|| -> Result<Flaky, std::io::Error> {
            Err(std::io::Error::other("disk on fire"))
        }),
        invoke(|_f: Arc<Flaky>| {}),
    ]);

    let err = app.err().expect("constructor failure propagates");
    assert!(err.to_string().contains("disk on fire"));
}

#[tokio::test]
async fn validate_accepts_a_complete_graph() {
    struct A;
    struct B;

    validate_app([
        nop_logger(),
        provide(|| A),
        provide(|_a: Arc<A>| B),
        invoke(|_b: Arc<B>| {}),
    ])
    .unwrap();
}

#[tokio::test]
async fn validate_rejects_dependency_cycles() {
    struct A;
    struct B;

    let err = validate_app([
        nop_logger(),
        provide(|_b: Arc<B>| A),
        provide(|_a: Arc<A>| B),
        invoke(|_a: Arc<A>| {}),
    ])
    .unwrap_err();

    assert!(matches!(
        err,
        ArmatureError::WithGraph { .. } | ArmatureError::DependencyCycle { .. }
    ));
    assert!(err.to_string().contains("cycle"));
}

/// Events stream to a user-built logger, including the buffered ones emitted
/// before the logger existed.
#[tokio::test]
async fn user_logger_receives_buffered_and_live_events() {
    struct Collector {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl EventLogger for Collector {
        fn log_event(&self, event: &Event) {
            self.events.lock().unwrap().push(event.name().to_string());
        }
    }

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let mut app = App::new([
        armature::with_logger(move || Collector {
            events: sink.clone(),
        }),
        supply(5u64),
        invoke(|_n: Arc<u64>| {}),
    ]);
    assert!(app.err().is_none());

    app.start().await.unwrap();
    app.stop().await.unwrap();

    let seen = events.lock().unwrap().clone();
    assert!(seen.contains(&"Provided".to_string()), "buffered events flushed: {seen:?}");
    assert!(seen.contains(&"LoggerInitialized".to_string()));
    assert!(seen.contains(&"Invoked".to_string()));
    assert!(seen.contains(&"Started".to_string()));
    assert!(seen.contains(&"Stopped".to_string()));
}
