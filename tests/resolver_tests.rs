//! Integration tests for request resolution through the public API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use redirect_engine::{
    MemoryRuleStore, NewRule, RedirectDirective, RedirectError, RedirectRule, RequestInfo,
    Resolver, ResolverOptions, Result, RulePage, RuleStore, RuleUpdate, TrackingMode,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn resolve(resolver: &Resolver, uri: &str) -> Option<RedirectDirective> {
    resolver.resolve(&RequestInfo::new(uri, "example.com"))
}

/// Store that is always unreachable
struct DownStore {
    lookups: AtomicUsize,
}

impl RuleStore for DownStore {
    fn insert(&self, _rule: NewRule) -> Result<u64> {
        Err(RedirectError::unavailable("connection refused"))
    }
    fn update(&self, _id: u64, _fields: RuleUpdate) -> Result<bool> {
        Err(RedirectError::unavailable("connection refused"))
    }
    fn delete(&self, _id: u64) -> Result<bool> {
        Err(RedirectError::unavailable("connection refused"))
    }
    fn bulk_delete(&self, _ids: &[u64]) -> Result<usize> {
        Err(RedirectError::unavailable("connection refused"))
    }
    fn get(&self, _id: u64) -> Result<Option<RedirectRule>> {
        Err(RedirectError::unavailable("connection refused"))
    }
    fn list(&self, _page: usize, _per_page: usize) -> Result<RulePage> {
        Err(RedirectError::unavailable("connection refused"))
    }
    fn candidates_for(&self, _request: &str) -> Result<Vec<RedirectRule>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Err(RedirectError::unavailable("connection refused"))
    }
    fn record_hit(&self, _id: u64, _at: SystemTime) -> Result<bool> {
        Err(RedirectError::unavailable("connection refused"))
    }
}

#[test]
fn test_precedence_independent_of_insertion_order() {
    init_tracing();

    let exact = NewRule::new("/a/b", "/exact");
    let prefix = NewRule::new("/a/*", "/prefix").with_match_type("prefix");
    let regex = NewRule::new("#^/a/.*$#", "/regex").with_match_type("regex");

    let orders = [
        vec![exact.clone(), prefix.clone(), regex.clone()],
        vec![regex.clone(), prefix.clone(), exact.clone()],
        vec![prefix.clone(), regex.clone(), exact.clone()],
    ];

    for order in orders {
        let store = Arc::new(MemoryRuleStore::new());
        for rule in order {
            store.insert(rule).unwrap();
        }
        let resolver = Resolver::new(store, ResolverOptions::new());

        assert_eq!(resolve(&resolver, "/a/b").unwrap().target, "/exact");
        assert_eq!(resolve(&resolver, "/a/c").unwrap().target, "/prefix");
    }
}

#[test]
fn test_regex_fallback_after_prefix_miss() {
    let store = Arc::new(MemoryRuleStore::new());
    store
        .insert(NewRule::new("/shop", "/store").with_match_type("prefix"))
        .unwrap();
    store
        .insert(NewRule::new("~^/p/[0-9]+$~", "/products").with_match_type("regex"))
        .unwrap();
    let resolver = Resolver::new(store, ResolverOptions::new());

    assert_eq!(resolve(&resolver, "/p/7").unwrap().target, "/products");
    assert_eq!(resolve(&resolver, "/shopping").unwrap().target, "/store");
    assert!(resolve(&resolver, "/p/x").is_none());
}

#[test]
fn test_newest_rule_wins_within_type() {
    let store = Arc::new(MemoryRuleStore::new());
    store.insert(NewRule::new("/dup", "/first")).unwrap();
    let newer = store.insert(NewRule::new("/dup/", "/second")).unwrap();
    let resolver = Resolver::new(store.clone(), ResolverOptions::new());

    let directive = resolve(&resolver, "/DUP").unwrap();
    assert_eq!(directive.target, "/second");
    assert_eq!(directive.rule_id, newer);

    store.delete(newer).unwrap();
    assert_eq!(resolve(&resolver, "/dup").unwrap().target, "/first");
}

#[test]
fn test_query_string_is_part_of_exact_match() {
    let store = Arc::new(MemoryRuleStore::new());
    store.insert(NewRule::new("/search?q=Shoes", "/shoes")).unwrap();
    let resolver = Resolver::new(store, ResolverOptions::new());

    assert!(resolve(&resolver, "/Search/?q=Shoes").is_some());
    assert!(resolve(&resolver, "/search?q=shoes").is_none());
    assert!(resolve(&resolver, "/search").is_none());
}

#[test]
fn test_loop_guard() {
    let store = Arc::new(MemoryRuleStore::new());
    let id = store
        .insert(NewRule::new("/docs", "/docs/").with_match_type("prefix"))
        .unwrap();
    let resolver = Resolver::new(store.clone(), ResolverOptions::new());

    assert!(resolve(&resolver, "/docs").is_none());
    assert!(resolve(&resolver, "/docs/").is_none());
    assert_eq!(store.get(id).unwrap().unwrap().hits, 0);

    // Other requests under the prefix still redirect
    assert_eq!(resolve(&resolver, "/docs/intro").unwrap().target, "/docs/");
    assert_eq!(store.get(id).unwrap().unwrap().hits, 1);
}

#[test]
fn test_case_fixing_redirect_is_not_a_loop() {
    let store = Arc::new(MemoryRuleStore::new());
    let id = store.insert(NewRule::new("/Old-Page", "/old-page")).unwrap();
    let resolver = Resolver::new(store.clone(), ResolverOptions::new());

    let directive = resolve(&resolver, "/Old-Page").unwrap();
    assert_eq!(directive.target, "/old-page");
    assert_eq!(store.get(id).unwrap().unwrap().hits, 1);

    // The follow-up request lands on the target itself and stops there.
    assert!(resolve(&resolver, "/old-page").is_none());
    assert!(resolve(&resolver, "/old-page/").is_none());
    assert_eq!(store.get(id).unwrap().unwrap().hits, 1);
}

#[test]
fn test_store_failure_fails_open() {
    init_tracing();

    let store = Arc::new(DownStore {
        lookups: AtomicUsize::new(0),
    });
    let resolver = Resolver::new(store.clone(), ResolverOptions::new());

    assert!(resolve(&resolver, "/anything").is_none());
    assert_eq!(
        resolver.resolve_uri("/anything", "example.com", false),
        (String::new(), 0, false)
    );
    assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
}

#[test]
fn test_skip_does_not_touch_store() {
    let store = Arc::new(DownStore {
        lookups: AtomicUsize::new(0),
    });
    let resolver = Resolver::new(store.clone(), ResolverOptions::new());

    assert!(resolver
        .resolve(&RequestInfo::new("/admin", "example.com").with_skip(true))
        .is_none());
    assert!(resolve(&resolver, "/robots.txt").is_none());
    assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
}

#[test]
fn test_invalid_regex_is_skipped() {
    let store = Arc::new(MemoryRuleStore::new());
    store
        .insert(NewRule::new("#^/broken(#", "/never").with_match_type("regex"))
        .unwrap();
    store
        .insert(NewRule::new("#^/broken#", "/fixed").with_match_type("regex"))
        .unwrap();
    store
        .insert(NewRule::new("/", "/never").with_match_type("regex"))
        .unwrap();
    let resolver = Resolver::new(store, ResolverOptions::new());

    assert_eq!(resolve(&resolver, "/broken").unwrap().target, "/fixed");
    assert!(resolve(&resolver, "/other").is_none());
}

#[test]
fn test_rule_edits_take_effect_immediately() {
    let store = Arc::new(MemoryRuleStore::new());
    let id = store.insert(NewRule::new("/old", "/v1")).unwrap();
    let resolver = Resolver::new(store.clone(), ResolverOptions::new());
    assert_eq!(resolve(&resolver, "/old").unwrap().target, "/v1");

    store
        .update(id, RuleUpdate::new().source("/older").target("/v2").status(302))
        .unwrap();
    assert!(resolve(&resolver, "/old").is_none());
    let directive = resolve(&resolver, "/older").unwrap();
    assert_eq!((directive.target.as_str(), directive.status.code()), ("/v2", 302));
}

#[test]
fn test_concurrent_resolves_count_every_hit() {
    let store = Arc::new(MemoryRuleStore::new());
    let id = store
        .insert(NewRule::new("/hot/*", "/cold").with_match_type("prefix"))
        .unwrap();
    let resolver = Resolver::new(store.clone(), ResolverOptions::new());

    std::thread::scope(|s| {
        for t in 0..8 {
            let resolver = &resolver;
            s.spawn(move || {
                for i in 0..100 {
                    let uri = format!("/hot/{}/{}", t, i);
                    assert!(resolve(resolver, &uri).is_some());
                }
            });
        }
    });

    assert_eq!(store.get(id).unwrap().unwrap().hits, 800);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_detached_tracking_inside_runtime() {
    let store = Arc::new(MemoryRuleStore::new());
    let id = store.insert(NewRule::new("/a", "/b")).unwrap();
    let resolver = Resolver::new(
        store.clone(),
        ResolverOptions::new().with_tracking(TrackingMode::Detached),
    );

    for _ in 0..10 {
        assert!(resolve(&resolver, "/a").is_some());
    }

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while store.get(id).unwrap().unwrap().hits < 10 {
        assert!(tokio::time::Instant::now() < deadline, "hits never landed");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(store.get(id).unwrap().unwrap().hits, 10);
}
