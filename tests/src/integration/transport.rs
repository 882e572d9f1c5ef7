//! # Transport Interplay
//!
//! Subscription bookkeeping, reconnect handling and the failure paths that
//! originate at the transport: rejected publishes, lost connections,
//! unresolvable inbound traffic and shutdown.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use mqtt_rr_core::{
        DispatchError, Dispatcher, DispatcherConfig, JsonFieldResolver, MemoryTransport,
        Request, TopicFilter, TopicFilterResolver, TopicResolver, TopicSubscription, Transport,
        TransportError,
    };

    use crate::fixtures::{recording_callback, request, Harness};

    fn sub(filter: &str, qos: u8) -> TopicSubscription {
        TopicSubscription::new(filter, qos).unwrap()
    }

    fn filter(filter: &str) -> TopicFilter {
        TopicFilter::new(filter).unwrap()
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_wildcard_subscription_shadows_narrower_filter() {
        let h = Harness::connected().await;

        let delta = h.client.subscribe(vec![sub("a/#", 1)]).await.unwrap();
        assert_eq!(delta.subscribe, vec![("a/#".to_string(), 1)]);

        let delta = h.client.subscribe(vec![sub("a/b", 0)]).await.unwrap();
        assert!(delta.is_empty());
        assert_eq!(h.transport.subscribed_filters(), ["a/#"]);
        assert_eq!(h.dispatcher.active_subscriptions(), ["a/#"]);

        let delta = h.client.unsubscribe(vec![filter("a/#")]).await.unwrap();
        assert_eq!(delta.unsubscribe, ["a/#"]);
        assert_eq!(delta.subscribe, vec![("a/b".to_string(), 0)]);
        assert_eq!(h.transport.subscribed_filters(), ["a/b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_while_disconnected_fails() {
        let h = Harness::disconnected();
        assert_eq!(
            h.client.subscribe(vec![sub("a/#", 0)]).await.unwrap_err(),
            DispatchError::Connection
        );
        assert!(h.dispatcher.active_subscriptions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_subscriptions_installed_on_connect() {
        let config = DispatcherConfig {
            subscriptions: vec![sub("status/#", 1), sub("tmp/#", 0).transient()],
            ..Default::default()
        };
        let h = Harness::with_config(config).await;
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.transport.subscribed_filters(), ["status/#"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_wildcard_does_not_hide_recorded_filter_on_connect() {
        let config = DispatcherConfig {
            subscriptions: vec![sub("a/b/c", 1), sub("a/#", 0).transient()],
            ..Default::default()
        };
        let h = Harness::with_config(config).await;
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.transport.subscribed_filters(), ["a/b/c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_subscription_leaves_book_and_transport() {
        let h = Harness::connected().await;
        h.client.subscribe(vec![sub("a/b/c", 1)]).await.unwrap();

        h.transport.fail_next_subscribes(1);
        assert!(matches!(
            h.client.subscribe(vec![sub("a/b/#", 1)]).await,
            Err(DispatchError::Transport(TransportError::Rejected(_)))
        ));
        assert_eq!(h.transport.subscribed_filters(), ["a/b/c"]);
        assert_eq!(h.dispatcher.active_subscriptions(), ["a/b/c"]);

        h.transport.fail_next_unsubscribes(1);
        assert!(h.client.subscribe(vec![sub("a/b/#", 1)]).await.is_err());
        assert_eq!(h.transport.subscribed_filters(), ["a/b/c"]);
        assert_eq!(h.dispatcher.active_subscriptions(), ["a/b/c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_replay_without_auto_subscribe() {
        let config = DispatcherConfig {
            subscriptions: vec![sub("status/#", 1)],
            auto_subscribe: false,
            ..Default::default()
        };
        let h = Harness::with_config(config).await;
        sleep(Duration::from_millis(10)).await;

        assert!(h.transport.subscribed_filters().is_empty());
        assert_eq!(h.dispatcher.active_subscriptions(), ["status/#"]);
    }

    // =========================================================================
    // CONNECTION
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_throttled_inside_window() {
        let h = Harness::connected().await;

        h.client.reconnect().await.unwrap();
        match h.client.reconnect().await {
            Err(DispatchError::ReconnectThrottled { retry_in }) => {
                assert!(retry_in <= Duration::from_secs(5));
            }
            other => panic!("expected throttle, got {other:?}"),
        }

        sleep(Duration::from_secs(5)).await;
        assert!(h.client.reconnect().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_after_connection_lost() {
        let h = Harness::connected().await;
        h.transport.drop_connection("broker went away").await.unwrap();
        assert!(!h.client.is_connected());

        let (callback, mut outcomes) = recording_callback();
        h.client
            .new_call(request("late", Duration::from_secs(1)))
            .enqueue(callback)
            .unwrap();
        assert_eq!(
            outcomes.try_recv().unwrap().unwrap_err(),
            DispatchError::Connection
        );
        assert_eq!(h.dispatcher.pending_count(), 0);
    }

    // =========================================================================
    // FAILURE PATHS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_rejected_publish_tears_down_call() {
        let h = Harness::connected().await;
        h.transport.fail_next_publishes(1);

        let (callback, mut outcomes) = recording_callback();
        h.client
            .new_call(request("doomed", Duration::from_secs(10)))
            .enqueue(callback)
            .unwrap();

        match outcomes.recv().await.unwrap() {
            Err(DispatchError::Publish { cause }) => {
                assert!(matches!(cause, TransportError::Rejected(_)));
            }
            other => panic!("expected publish failure, got {other:?}"),
        }
        assert_eq!(h.dispatcher.pending_count(), 0);
        assert_eq!(h.dispatcher.armed_count(), 0);
        assert_eq!(h.dispatcher.stats().publish_failures, 1);

        // The deadline is gone with the task.
        sleep(Duration::from_secs(15)).await;
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_message_leaves_call_to_time_out() {
        let (transport, events) = MemoryTransport::new();
        transport.connect().await.unwrap();
        let dispatcher = Dispatcher::builder(DispatcherConfig::default())
            .resolver(TopicFilterResolver::new(filter("x/#")))
            .build(transport.clone(), events)
            .unwrap();

        let (callback, mut outcomes) = recording_callback();
        dispatcher.submit(
            request("y/1", Duration::from_millis(300)),
            Some(std::sync::Arc::new(callback)),
        );

        let err = dispatcher
            .on_inbound_message("y/1", b"lost".to_vec())
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::NoResolverMatched {
                topic: "y/1".into(),
                tried: vec!["topic-filter(x/#)".into()],
            }
        );
        assert_eq!(dispatcher.stats().unmatched, 1);

        assert!(outcomes.recv().await.unwrap().unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_pending_and_rejects_new_calls() {
        let h = Harness::connected().await;
        let (pending, mut pending_outcome) = recording_callback();
        h.client
            .new_call(request("slow", Duration::from_secs(60)))
            .enqueue(pending)
            .unwrap();

        h.dispatcher.shutdown();
        assert!(h.dispatcher.is_closed());
        assert_eq!(
            pending_outcome.recv().await.unwrap().unwrap_err(),
            DispatchError::Closed
        );
        assert_eq!(h.dispatcher.armed_count(), 0);

        let (late, mut late_outcome) = recording_callback();
        h.client
            .new_call(request("after", Duration::from_secs(1)))
            .enqueue(late)
            .unwrap();
        assert_eq!(
            late_outcome.try_recv().unwrap().unwrap_err(),
            DispatchError::Closed
        );
    }

    // =========================================================================
    // PAYLOAD RESOLUTION OVER LOOPBACK
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_json_field_resolution_over_loopback() {
        let (transport, events) = MemoryTransport::new();
        transport.set_loopback(true);
        transport.connect().await.unwrap();
        let dispatcher = Dispatcher::builder(DispatcherConfig::default())
            .resolver(JsonFieldResolver::new("type"))
            .resolver(TopicResolver)
            .build(transport.clone(), events)
            .unwrap();
        let client = mqtt_rr_core::RrClient::new(dispatcher);
        client.subscribe(vec![sub("dev/#", 1)]).await.unwrap();

        let payload = r#"{"type":"get_list","items":[1,2]}"#;
        let response = client
            .new_call(
                Request::builder()
                    .topic("dev/1/cmd")
                    .payload(payload)
                    .back_name("get_list")
                    .timeout(Duration::from_secs(1))
                    .build(),
            )
            .execute()
            .await
            .unwrap();

        assert_eq!(response.data(), Some(payload));
        let json = response.body().unwrap().json().unwrap();
        assert_eq!(json["items"][1], 2);
    }
}
