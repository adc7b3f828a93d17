use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_memo::{
    CacheStore, ConfigError, KeyPrefixes, LruStore, MemoizeConfig, Memoizer, MemoizerBuilder,
    Outcome, TokioScheduler, canonical_json, from_fn, with_context,
};

use crate::{Calls, adder, setup, value};

#[tokio::test]
async fn test_no_arguments() {
    setup();

    let calls = Calls::default();
    let counter = calls.clone();
    let memo = Memoizer::builder(from_fn(move |(): ()| {
        let call = counter.bump();
        async move { Ok::<_, Infallible>(call) }
    }))
    .build()
    .unwrap();

    let first = memo.call(()).await.unwrap();
    let second = memo.call(()).await.unwrap();

    assert_eq!(*first, Ok(1));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_memoize_and_purge() {
    setup();

    let calls = Calls::default();
    let memo = Memoizer::builder(adder(&calls)).build().unwrap();

    assert_eq!(value(&memo, (10, 10)).await, 21);
    assert_eq!(memo.peek(&(10, 10)).as_deref(), Some(&Ok(21)));
    assert_eq!(value(&memo, (10, 10)).await, 21);
    assert_eq!(calls.get(), 1);

    // different arguments are a different key
    assert_eq!(memo.peek(&(10, 20)), None);
    assert_eq!(value(&memo, (10, 20)).await, 32);

    memo.purge(&(10, 20));
    assert_eq!(memo.peek(&(10, 20)), None);
    assert_eq!(value(&memo, (10, 20)).await, 33);
    assert_eq!(value(&memo, (10, 10)).await, 21);
    assert_eq!(calls.get(), 3);

    memo.purge_all();
    assert!(memo.store().is_empty());
    assert_eq!(value(&memo, (10, 20)).await, 34);
    assert_eq!(value(&memo, (10, 10)).await, 25);
}

#[tokio::test]
async fn test_with_context() {
    setup();

    struct Settings {
        foo: u32,
    }

    let computation = with_context(Settings { foo: 4 }, |settings: &Settings, (x,): (u32,)| {
        let foo = settings.foo;
        async move { Ok::<_, Infallible>(foo + x) }
    });
    let memo = Memoizer::builder(computation).build().unwrap();

    assert_eq!(value(&memo, (8,)).await, 12);
    assert_eq!(memo.computation().context().foo, 4);
}

#[tokio::test]
async fn test_canonical_json() {
    setup();

    let calls = Calls::default();
    let counter = calls.clone();
    let computation = from_fn(move |(map,): (HashMap<String, u32>,)| {
        counter.bump();
        async move { Ok::<_, Infallible>(map.values().sum::<u32>()) }
    });
    let memo = MemoizerBuilder::with_canonicalizer(computation, canonical_json)
        .build()
        .unwrap();

    let mut first = HashMap::new();
    first.insert("foo".to_owned(), 1);
    first.insert("bar".to_owned(), 2);
    first.insert("baz".to_owned(), 3);
    let mut second = HashMap::new();
    second.insert("baz".to_owned(), 3);
    second.insert("foo".to_owned(), 1);
    second.insert("bar".to_owned(), 2);

    assert_eq!(value(&memo, (first.clone(),)).await, 6);
    assert_eq!(value(&memo, (second,)).await, 6);
    assert_eq!(calls.get(), 1);

    let key = memo.cache_key(&(first,)).unwrap();
    assert_eq!(
        key,
        format!(r#"{}{{"bar":2,"baz":3,"foo":1}}"#, memo.key_prefix())
    );
}

#[tokio::test]
async fn test_bypass() {
    setup();

    let calls = Calls::default();
    let memo = Memoizer::builder(adder(&calls))
        .canonicalizer(|_: &(u32, u32)| None)
        .build()
        .unwrap();

    assert_eq!(value(&memo, (10, 10)).await, 21);
    assert_eq!(value(&memo, (10, 10)).await, 22);
    assert_eq!(calls.get(), 2);

    assert!(memo.store().is_empty());
    assert_eq!(memo.peek(&(10, 10)), None);
    assert_eq!(memo.cache_key(&(10, 10)), None);
    assert!(!memo.is_computing(&(10, 10)));
}

#[tokio::test]
async fn test_explicit_key_prefix() {
    setup();

    let calls = Calls::default();
    let memo = Memoizer::builder(adder(&calls))
        .key_prefix("999")
        .build()
        .unwrap();

    assert_eq!(memo.key_prefix(), "999");
    assert_eq!(memo.cache_key(&(1, 2)).as_deref(), Some("9991\x1d2"));

    value(&memo, (1, 2)).await;
    assert_eq!(memo.store().keys(), vec!["9991\x1d2".to_owned()]);
}

#[tokio::test]
async fn test_allocated_key_prefixes() {
    setup();

    let prefixes = KeyPrefixes::new();
    let calls = Calls::default();
    let first = Memoizer::builder(adder(&calls))
        .key_prefixes(&prefixes)
        .build()
        .unwrap();
    let second = Memoizer::builder(adder(&calls))
        .key_prefixes(&prefixes)
        .build()
        .unwrap();

    assert_eq!(first.key_prefix(), "1\x1d");
    assert_eq!(second.key_prefix(), "2\x1d");

    // memoizers without any explicit prefix get distinct prefixes as well
    let third = Memoizer::builder(adder(&calls)).build().unwrap();
    let fourth = Memoizer::builder(adder(&calls)).build().unwrap();
    assert_ne!(third.key_prefix(), fourth.key_prefix());
}

#[tokio::test]
async fn test_shared_store() {
    setup();

    let store: Arc<LruStore<Outcome<u32, Infallible>>> = Arc::new(LruStore::unbounded());
    store.set("foo", Arc::new(Ok(0)));

    let calls = Calls::default();
    let first = Memoizer::builder(adder(&calls))
        .store(store.clone())
        .build()
        .unwrap();
    let second = Memoizer::builder(adder(&calls))
        .store(store.clone())
        .build()
        .unwrap();

    assert_eq!(value(&first, (1, 1)).await, 3);
    assert_eq!(value(&second, (1, 1)).await, 4);
    assert_eq!(value(&first, (1, 1)).await, 3);
    assert_eq!(store.len(), 3);

    first.purge_all();
    let mut keys = store.keys();
    keys.sort();
    let mut expected = vec!["foo".to_owned(), second.cache_key(&(1, 1)).unwrap()];
    expected.sort();
    assert_eq!(keys, expected);
    assert_eq!(first.peek(&(1, 1)), None);
    assert_eq!(second.peek(&(1, 1)).as_deref(), Some(&Ok(4)));
}

#[tokio::test]
async fn test_shared_store_rejects_limits() {
    setup();

    let store: Arc<LruStore<Outcome<u32, Infallible>>> = Arc::new(LruStore::unbounded());
    let calls = Calls::default();
    let result = Memoizer::builder(adder(&calls))
        .store(store)
        .max_entries(3)
        .build();

    assert_eq!(result.unwrap_err(), ConfigError::SharedStoreLimits);
}

#[tokio::test]
async fn test_from_config() {
    setup();

    let yaml = r#"
        name: adder
        max_entries: 1
        key_prefix: "adder:"
    "#;
    let config = MemoizeConfig::from_reader(yaml.as_bytes()).unwrap();

    let calls = Calls::default();
    let memo = Memoizer::builder(adder(&calls))
        .config(config)
        .scheduler(TokioScheduler::new(tokio::runtime::Handle::current()))
        .build()
        .unwrap();
    assert_eq!(memo.name(), "adder");

    assert_eq!(value(&memo, (1, 1)).await, 3);
    assert_eq!(value(&memo, (2, 2)).await, 6);
    assert_eq!(memo.store().keys(), vec!["adder:2\x1d2".to_owned()]);
}

#[test]
fn test_no_runtime() {
    let calls = Calls::default();
    let result = Memoizer::builder(adder(&calls)).build();
    assert_eq!(result.unwrap_err(), ConfigError::NoRuntime);
}
