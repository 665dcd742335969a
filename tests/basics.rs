use keel::{Container, key_of};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Config {
    url: String,
}

#[derive(Debug)]
struct Repo {
    cfg: Arc<Config>,
}

#[test]
fn instance_registration_resolves_verbatim() {
    let c = Container::new();
    c.bind::<Config>()
        .instance(Config {
            url: "postgres://localhost".into(),
        })
        .unwrap();

    let a = c.resolve::<Config>().unwrap();
    let b = c.resolve::<Config>().unwrap();
    assert_eq!(a.url, "postgres://localhost");
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn lazy_singleton_runs_factory_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();

    let c = Container::new();
    c.bind::<Config>()
        .provider_fn(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
            Config { url: "x".into() }
        })
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let a = c.resolve::<Config>().unwrap();
    let b = c.resolve::<Config>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn eager_singleton_runs_at_build() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();

    let c = Container::new();
    c.bind::<Config>()
        .eager()
        .provider_fn(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
            Config { url: "x".into() }
        })
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    c.build().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let _ = c.resolve::<Config>().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn build_is_idempotent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();

    let c = Container::new();
    c.bind::<Config>()
        .eager()
        .provider_fn(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
            Config { url: "x".into() }
        })
        .unwrap();

    c.build().unwrap();
    c.build().unwrap();
    c.build().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn empty_container_builds() {
    let c = Container::new();
    c.build().unwrap();
    assert!(c.list().is_empty());
}

#[test]
fn missing_service_is_not_found() {
    let c = Container::new();
    let err = c.resolve::<Config>().unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn duplicate_registration_is_refused() {
    let c = Container::new();
    c.bind::<Config>()
        .provider_fn(|_| Config { url: "a".into() })
        .unwrap();
    let err = c
        .bind::<Config>()
        .provider_fn(|_| Config { url: "b".into() })
        .unwrap_err();
    assert!(err.is_duplicate());
}

#[test]
fn replace_overwrites_before_build() {
    let c = Container::new();
    c.bind::<Config>()
        .provider_fn(|_| Config { url: "old".into() })
        .unwrap();
    c.bind::<Config>()
        .replace()
        .provider_fn(|_| Config { url: "new".into() })
        .unwrap();

    assert_eq!(c.resolve::<Config>().unwrap().url, "new");
}

#[test]
fn replace_after_build_is_refused() {
    let c = Container::new();
    c.bind::<Config>()
        .provider_fn(|_| Config { url: "old".into() })
        .unwrap();
    c.build().unwrap();

    let err = c
        .bind::<Config>()
        .replace()
        .provider_fn(|_| Config { url: "new".into() })
        .unwrap_err();
    assert!(err.is_already_built());
}

#[test]
fn registration_after_build_stays_legal() {
    let c = Container::new();
    c.build().unwrap();
    c.bind::<Config>()
        .provider_fn(|_| Config { url: "late".into() })
        .unwrap();
    assert_eq!(c.resolve::<Config>().unwrap().url, "late");
}

#[test]
fn factory_error_is_attributed_and_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();

    let c = Container::new();
    c.bind::<Config>()
        .provider(move |_| {
            if calls2.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("connection refused");
            }
            Ok(Config { url: "up".into() })
        })
        .unwrap();

    let err = c.resolve::<Config>().unwrap_err();
    assert!(err.to_string().contains("resolving"));
    // A failed factory does not latch; the next resolve retries.
    assert_eq!(c.resolve::<Config>().unwrap().url, "up");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn dependency_errors_keep_their_identity_through_factories() {
    let c = Container::new();
    c.bind::<Repo>()
        .provider(|c| Ok(Repo { cfg: c.resolve::<Config>()? }))
        .unwrap();

    let err = c.resolve::<Repo>().unwrap_err();
    assert!(err.is_not_found());
    let rendered = err.to_string();
    assert!(rendered.contains("Repo"), "missing parent context: {rendered}");
    assert!(rendered.contains("Config"), "missing child key: {rendered}");
}

#[test]
fn must_resolve_panics_with_the_error() {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    let c = Container::new();
    let panicked = catch_unwind(AssertUnwindSafe(|| {
        let _ = c.must_resolve::<Config>();
    }));
    assert!(panicked.is_err());
}

#[test]
fn invalid_alias_is_refused() {
    let c = Container::new();
    let err = c
        .bind::<Config>()
        .named("not a valid alias!")
        .provider_fn(|_| Config { url: "x".into() })
        .unwrap_err();
    assert!(err.is_invalid_provider());
}

#[test]
fn eager_transient_is_refused() {
    let c = Container::new();
    let err = c
        .bind::<Config>()
        .transient()
        .eager()
        .provider_fn(|_| Config { url: "x".into() })
        .unwrap_err();
    assert!(err.is_invalid_provider());
}

#[test]
fn list_is_sorted_and_has_reports_registrations() {
    let c = Container::new();
    c.bind::<Config>()
        .provider_fn(|_| Config { url: "x".into() })
        .unwrap();
    c.bind::<u16>().named("port").instance(8080).unwrap();

    assert!(c.has::<Config>());
    assert!(!c.has::<Repo>());
    assert!(c.has_named("port"));
    assert!(c.has_key(&key_of::<Config>()));

    let keys = c.list();
    assert_eq!(keys.len(), 2);
    let names: Vec<_> = keys.iter().map(|k| k.display_name()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn transient_child_of_singleton_parent_records_the_edge() {
    struct Request {
        n: usize,
    }
    struct Pool {
        #[allow(dead_code)]
        warmup: Arc<Request>,
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();

    let c = Container::new();
    c.bind::<Request>()
        .transient()
        .provider_fn(move |_| Request {
            n: calls2.fetch_add(1, Ordering::SeqCst),
        })
        .unwrap();
    c.bind::<Pool>()
        .provider(|c| Ok(Pool { warmup: c.resolve::<Request>()? }))
        .unwrap();

    let p1 = c.resolve::<Pool>().unwrap();
    let p2 = c.resolve::<Pool>().unwrap();
    assert!(Arc::ptr_eq(&p1, &p2));

    let r1 = c.resolve::<Request>().unwrap();
    let r2 = c.resolve::<Request>().unwrap();
    assert_ne!(r1.n, r2.n);

    let graph = c.graph();
    assert!(graph[&key_of::<Pool>()].contains(&key_of::<Request>()));
}

#[test]
fn repeated_singleton_resolution_does_not_grow_the_graph() {
    let c = Container::new();
    c.bind::<Config>()
        .provider_fn(|_| Config { url: "x".into() })
        .unwrap();
    c.bind::<Repo>()
        .provider(|c| Ok(Repo { cfg: c.resolve::<Config>()? }))
        .unwrap();

    let repo = c.resolve::<Repo>().unwrap();
    let after_first = c.graph();
    let again = c.resolve::<Repo>().unwrap();
    assert!(Arc::ptr_eq(&repo, &again));
    assert_eq!(c.graph(), after_first);
    assert_eq!(after_first[&key_of::<Repo>()], vec![key_of::<Config>()]);
}
