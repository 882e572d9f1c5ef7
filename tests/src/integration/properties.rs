//! # Dispatcher Properties
//!
//! - **FIFO correlation**: N calls on one key, N messages on that key,
//!   message i resolves call i
//! - **Single resolution**: match and deadline race, every call completes
//!   exactly once
//! - **Timer hygiene**: a matched call's deadline never fires
//! - **Observer independence**: one-shot traffic on a key leaves its observer
//!   in place
//! - **Disconnected submission**: immediate `Connection`, no bookkeeping
//! - **Shutdown race**: submissions racing `shutdown()` each complete exactly
//!   once with `Closed`, and nothing is left registered or armed

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;
    use rand::Rng;
    use tokio::time::sleep;

    use mqtt_rr_core::{DispatchError, DispatchResult, Response};

    use crate::fixtures::{data, recording_callback, request, Harness};

    // =========================================================================
    // FIFO CORRELATION
    // =========================================================================

    fn fifo_round(calls: usize) -> Vec<String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = Harness::connected().await;
            let mut receivers = Vec::with_capacity(calls);
            for _ in 0..calls {
                let (callback, rx) = recording_callback();
                h.client
                    .new_call(request("shared", Duration::from_secs(30)))
                    .enqueue(callback)
                    .unwrap();
                receivers.push(rx);
            }

            for i in 0..calls {
                h.dispatcher
                    .on_inbound_message("shared", format!("m{i}").into_bytes())
                    .unwrap();
            }

            let mut resolved = Vec::with_capacity(calls);
            for rx in &mut receivers {
                resolved.push(data(rx.recv().await.unwrap()));
            }
            assert_eq!(h.dispatcher.pending_count(), 0);
            assert_eq!(h.dispatcher.armed_count(), 0);
            resolved
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_fifo_correlation(calls in 1usize..40) {
            let resolved = fifo_round(calls);
            let expected: Vec<String> = (0..calls).map(|i| format!("m{i}")).collect();
            prop_assert_eq!(resolved, expected);
        }
    }

    /// Matching is by arrival order only: a reply meant for the second caller
    /// that arrives first is handed to the first caller.
    #[tokio::test(start_paused = true)]
    async fn test_fifo_matching_ignores_payload_content() {
        let h = Harness::connected().await;
        let (first, mut first_rx) = recording_callback();
        let (second, mut second_rx) = recording_callback();

        h.client
            .new_call(request("A", Duration::from_secs(5)))
            .enqueue(first)
            .unwrap();
        h.client
            .new_call(request("A", Duration::from_secs(5)))
            .enqueue(second)
            .unwrap();

        h.dispatcher
            .on_inbound_message("A", b"for-second".to_vec())
            .unwrap();
        h.dispatcher
            .on_inbound_message("A", b"for-first".to_vec())
            .unwrap();

        assert_eq!(data(first_rx.recv().await.unwrap()), "for-second");
        assert_eq!(data(second_rx.recv().await.unwrap()), "for-first");
    }

    // =========================================================================
    // SINGLE RESOLUTION
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_match_and_deadline_race_completes_once() {
        const CALLS: usize = 200;

        let h = Harness::connected().await;
        let completions: Arc<Vec<AtomicUsize>> =
            Arc::new((0..CALLS).map(|_| AtomicUsize::new(0)).collect());
        let matched = Arc::new(AtomicUsize::new(0));
        let expired = Arc::new(AtomicUsize::new(0));

        // Deadlines and reply delays overlap so both paths win some races.
        let (timeouts, delays): (Vec<u64>, Vec<u64>) = {
            let mut rng = rand::thread_rng();
            (0..CALLS)
                .map(|_| (rng.gen_range(5..30), rng.gen_range(0..40)))
                .unzip()
        };

        for (i, timeout) in timeouts.iter().enumerate() {
            let completions = completions.clone();
            let matched = matched.clone();
            let expired = expired.clone();
            h.client
                .new_call(request(&format!("k{i}"), Duration::from_millis(*timeout)))
                .enqueue(move |outcome: DispatchResult<Response>| {
                    completions[i].fetch_add(1, Ordering::SeqCst);
                    match outcome {
                        Ok(_) => matched.fetch_add(1, Ordering::SeqCst),
                        Err(DispatchError::Timeout { .. }) => expired.fetch_add(1, Ordering::SeqCst),
                        Err(other) => panic!("unexpected failure: {other}"),
                    };
                })
                .unwrap();
        }

        let mut replies = Vec::with_capacity(CALLS);
        for (i, delay) in delays.into_iter().enumerate() {
            let dispatcher = h.dispatcher.clone();
            replies.push(tokio::spawn(async move {
                sleep(Duration::from_millis(delay)).await;
                dispatcher
                    .on_inbound_message(&format!("k{i}"), b"reply".to_vec())
                    .unwrap();
            }));
        }
        for reply in replies {
            reply.await.unwrap();
        }

        // Past every deadline, with room for the delivery tasks to run.
        sleep(Duration::from_millis(300)).await;

        for (i, count) in completions.iter().enumerate() {
            assert_eq!(count.load(Ordering::SeqCst), 1, "call k{i}");
        }
        assert_eq!(
            matched.load(Ordering::SeqCst) + expired.load(Ordering::SeqCst),
            CALLS
        );
        assert_eq!(h.dispatcher.pending_count(), 0);
        assert_eq!(h.dispatcher.armed_count(), 0);

        let stats = h.dispatcher.stats();
        assert_eq!(stats.resolved as usize, matched.load(Ordering::SeqCst));
        assert_eq!(stats.timed_out as usize, expired.load(Ordering::SeqCst));
    }

    // =========================================================================
    // TIMER HYGIENE
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_matched_call_deadline_never_fires() {
        let h = Harness::connected().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        h.client
            .new_call(request("quick", Duration::from_millis(500)))
            .enqueue(move |outcome: DispatchResult<Response>| {
                assert!(outcome.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(h.dispatcher.armed_count(), 1);

        sleep(Duration::from_millis(100)).await;
        h.dispatcher
            .on_inbound_message("quick", b"ok".to_vec())
            .unwrap();
        assert_eq!(h.dispatcher.armed_count(), 0);

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.dispatcher.stats().timed_out, 0);
    }

    // =========================================================================
    // OBSERVER INDEPENDENCE
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_observer_outlives_one_shot_calls() {
        const ROUNDS: usize = 10;

        let h = Harness::connected().await;
        let observable = h.client.new_observable(request("k", Duration::ZERO));
        let (observer, mut observed) = recording_callback();
        observable.subscribe(observer).unwrap();

        for round in 0..ROUNDS {
            let (callback, mut outcome) = recording_callback();
            h.client
                .new_call(request("k", Duration::from_secs(5)))
                .enqueue(callback)
                .unwrap();
            h.dispatcher
                .on_inbound_message("k", format!("r{round}").into_bytes())
                .unwrap();
            assert_eq!(data(outcome.recv().await.unwrap()), format!("r{round}"));
        }

        let mut seen = Vec::with_capacity(ROUNDS);
        for _ in 0..ROUNDS {
            seen.push(data(observed.recv().await.unwrap()));
        }
        let expected: Vec<String> = (0..ROUNDS).map(|r| format!("r{r}")).collect();
        assert_eq!(seen, expected);

        assert_eq!(h.dispatcher.pending_count(), 0);
        assert_eq!(h.dispatcher.observer_count(), 1);
        assert!(observable.is_subscribed());
    }

    // =========================================================================
    // DISCONNECTED SUBMISSION
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_submission_fails_immediately() {
        let h = Harness::disconnected();
        let (callback, mut outcomes) = recording_callback();

        h.client
            .new_call(request("get_list", Duration::from_millis(500)))
            .enqueue(callback)
            .unwrap();

        // Delivered before enqueue returned.
        assert_eq!(
            outcomes.try_recv().unwrap().unwrap_err(),
            DispatchError::Connection
        );
        assert_eq!(h.dispatcher.pending_count(), 0);
        assert_eq!(h.dispatcher.armed_count(), 0);
        assert!(h.transport.published().is_empty());
        assert_eq!(h.dispatcher.stats().rejected_disconnected, 1);
    }

    // =========================================================================
    // SHUTDOWN RACE
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_racing_submissions_completes_every_call() {
        const SUBMITTERS: usize = 8;
        const PER_SUBMITTER: usize = 250;
        const CALLS: usize = SUBMITTERS * PER_SUBMITTER;

        let h = Harness::connected().await;
        let completions: Arc<Vec<AtomicUsize>> =
            Arc::new((0..CALLS).map(|_| AtomicUsize::new(0)).collect());
        let closed = Arc::new(AtomicUsize::new(0));

        let mut submitters = Vec::with_capacity(SUBMITTERS);
        for s in 0..SUBMITTERS {
            let client = h.client.clone();
            let completions = completions.clone();
            let closed = closed.clone();
            submitters.push(tokio::spawn(async move {
                for j in 0..PER_SUBMITTER {
                    let i = s * PER_SUBMITTER + j;
                    let completions = completions.clone();
                    let closed = closed.clone();
                    client
                        .new_call(request(&format!("k{i}"), Duration::from_secs(60)))
                        .enqueue(move |outcome: DispatchResult<Response>| {
                            completions[i].fetch_add(1, Ordering::SeqCst);
                            match outcome {
                                Err(DispatchError::Closed) => closed.fetch_add(1, Ordering::SeqCst),
                                other => panic!("unexpected outcome: {other:?}"),
                            };
                        })
                        .unwrap();
                    if j % 16 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        let head_start = rand::thread_rng().gen_range(0..3);
        sleep(Duration::from_millis(head_start)).await;
        h.dispatcher.shutdown();
        for submitter in submitters {
            submitter.await.unwrap();
        }

        let started = tokio::time::Instant::now();
        while closed.load(Ordering::SeqCst) < CALLS && started.elapsed() < Duration::from_secs(10) {
            sleep(Duration::from_millis(5)).await;
        }

        for (i, count) in completions.iter().enumerate() {
            assert_eq!(count.load(Ordering::SeqCst), 1, "call k{i}");
        }
        assert_eq!(closed.load(Ordering::SeqCst), CALLS);
        assert_eq!(h.dispatcher.pending_count(), 0);
        assert_eq!(h.dispatcher.armed_count(), 0);
    }
}
