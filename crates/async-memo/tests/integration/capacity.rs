use std::convert::Infallible;

use async_memo::{CacheStore, ConfigError, MemoizeConfig, Memoizer, from_fn};
use tokio::time::Instant;

use crate::{Calls, adder, advance_to, ms, setup, value};

#[tokio::test(start_paused = true)]
async fn test_max_age() {
    setup();
    let start = Instant::now();

    let calls = Calls::default();
    let memo = Memoizer::builder(adder(&calls))
        .max_age(ms(10))
        .build()
        .unwrap();

    assert_eq!(value(&memo, (1, 1)).await, 3);

    advance_to(start, 5).await;
    assert_eq!(value(&memo, (1, 1)).await, 3);
    assert_eq!(calls.get(), 1);

    advance_to(start, 15).await;
    assert_eq!(memo.peek(&(1, 1)), None);
    assert_eq!(value(&memo, (1, 1)).await, 4);
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_max_entries() {
    setup();

    let calls = Calls::default();
    let memo = Memoizer::builder(adder(&calls))
        .max_entries(2)
        .build()
        .unwrap();

    value(&memo, (1, 0)).await;
    value(&memo, (2, 0)).await;
    value(&memo, (1, 0)).await;
    assert_eq!(calls.get(), 2);

    // `(2, 0)` is the least recently used entry
    value(&memo, (3, 0)).await;
    assert_eq!(calls.get(), 3);
    assert_eq!(memo.peek(&(2, 0)), None);
    assert!(memo.peek(&(1, 0)).is_some());

    // peeking did not make `(1, 0)` more recent
    value(&memo, (2, 0)).await;
    assert_eq!(calls.get(), 4);
    assert_eq!(memo.peek(&(1, 0)), None);
    assert!(memo.peek(&(3, 0)).is_some());
    assert_eq!(memo.store().len(), 2);
}

#[tokio::test]
async fn test_max_weight() {
    setup();

    let calls = Calls::default();
    let counter = calls.clone();
    let computation = from_fn(move |(text,): (String,)| {
        counter.bump();
        async move {
            if text.is_empty() {
                Err("empty".to_owned())
            } else {
                Ok(text)
            }
        }
    });
    let memo = Memoizer::builder(computation)
        .max_weight(10, |outcome: &Result<String, String>| match outcome {
            Ok(text) => text.len() as u64,
            Err(error) => error.len() as u64,
        })
        .cache_errors(true)
        .build()
        .unwrap();

    memo.call(("1234".to_owned(),)).await.unwrap();
    memo.call(("12345".to_owned(),)).await.unwrap();
    assert_eq!(memo.store().weight(), 9);

    // errors count towards the weight when they are cached
    let error = memo.call((String::new(),)).await.unwrap();
    assert_eq!(*error, Err("empty".to_owned()));
    assert_eq!(memo.store().weight(), 10);
    assert_eq!(memo.peek(&("1234".to_owned(),)), None);
    assert!(memo.peek(&(String::new(),)).is_some());

    // an entry that can never fit is delivered, but not stored
    let long = "this is way too long".to_owned();
    memo.call((long.clone(),)).await.unwrap();
    assert_eq!(memo.peek(&(long,)), None);
    assert_eq!(memo.store().weight(), 10);
    assert_eq!(calls.get(), 4);
}

#[tokio::test]
async fn test_invalid_capacity() {
    setup();
    let calls = Calls::default();

    let result = Memoizer::builder(adder(&calls))
        .config(MemoizeConfig {
            max_weight: Some(10),
            ..Default::default()
        })
        .build();
    assert_eq!(result.unwrap_err(), ConfigError::MissingWeigher);

    let result = Memoizer::builder(adder(&calls)).max_entries(0).build();
    assert_eq!(result.unwrap_err(), ConfigError::ZeroCapacity);
}

#[tokio::test]
async fn test_weigher_without_max_weight() {
    setup();

    let memo = Memoizer::builder(from_fn(|(n,): (u64,)| async move {
        Ok::<_, Infallible>(n)
    }))
    .weigher(|outcome| *outcome.as_ref().unwrap_or(&0))
    .build()
    .unwrap();

    memo.call((3,)).await.unwrap();
    memo.call((4,)).await.unwrap();
    assert_eq!(memo.store().weight(), 7);
    assert_eq!(memo.store().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_weigher_panics() {
    setup();

    let calls = Calls::default();
    let counter = calls.clone();
    let memo = Memoizer::builder(from_fn(move |(n,): (u64,)| {
        counter.bump();
        async move { Ok::<_, Infallible>(n) }
    }))
    .weigher(|outcome| match outcome {
        Ok(13) => panic!("unlucky number"),
        _ => 1,
    })
    .build()
    .unwrap();

    assert_eq!(memo.call((13,)).await.unwrap_err(), async_memo::Abandoned);
    assert!(!memo.is_computing(&(13,)));
    assert_eq!(memo.refresh_age(), None);

    // the memoizer is still usable afterwards
    assert_eq!(*memo.call((1,)).await.unwrap(), Ok(1));
    assert_eq!(*memo.call((1,)).await.unwrap(), Ok(1));
    assert_eq!(calls.get(), 2);
    assert_eq!(memo.store().len(), 1);
}
