//! # Correlation Scenarios
//!
//! Every correlated request is completed exactly once, by whichever of
//! {matching response, timeout sweep, disconnect drain} gets to it first.

#[cfg(test)]
mod tests {
    use crate::fixtures::{fast_config, messaging_client, rpc_client, settle, Recorder};
    use flow_rpc::{ClientConfig, CorrelationId, Invocation, RpcError};
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::sleep;

    // =========================================================================
    // TIMEOUT VS RESPONSE
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_call_times_out() -> anyhow::Result<()> {
        let (client, mut peer) = rpc_client(fast_config()).await?;
        let recorder = Recorder::new();

        client.call("echo", json!({"x": 1}), recorder.callback());
        let frame = peer.next_frame().await.expect("request frame");
        assert_eq!(frame.kind, "rpc.req");

        sleep(Duration::from_millis(1500)).await;

        assert_eq!(
            recorder.results(),
            vec![Err(RpcError::Timeout(Duration::from_secs(1)))]
        );
        assert!(client.connection().pending().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_sweep_meets_one_second_timeout() -> anyhow::Result<()> {
        let config = ClientConfig::new("mem://node").with_timeout_secs(1);
        let (client, mut peer) = rpc_client(config).await?;
        let recorder = Recorder::new();

        client.call("echo", json!({"x": 1}), recorder.callback());
        peer.next_frame().await.expect("request frame");

        sleep(Duration::from_millis(1500)).await;

        assert_eq!(
            recorder.results(),
            vec![Err(RpcError::Timeout(Duration::from_secs(1)))]
        );
        assert!(client.connection().pending().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_call_is_not_swept_later() -> anyhow::Result<()> {
        let (client, mut peer) = rpc_client(fast_config()).await?;
        let recorder = Recorder::new();

        client.call("echo", json!({"x": 1}), recorder.callback());
        let frame = peer.next_frame().await.expect("request frame");

        sleep(Duration::from_millis(200)).await;
        peer.respond("rpc::response", frame.rid().expect("rid"), json!({"x": 1}));
        settle().await;
        assert_eq!(recorder.results(), vec![Ok(json!({"x": 1}))]);

        sleep(Duration::from_millis(1300)).await;
        assert_eq!(recorder.count(), 1);
        assert!(client.connection().pending().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_after_timeout_is_ignored() -> anyhow::Result<()> {
        let (client, mut peer) = rpc_client(fast_config()).await?;
        let recorder = Recorder::new();

        client.call("slow", Value::Null, recorder.callback());
        let frame = peer.next_frame().await.expect("request frame");

        sleep(Duration::from_millis(1500)).await;
        peer.respond("rpc::response", frame.rid().expect("rid"), json!("late"));
        settle().await;

        assert_eq!(recorder.count(), 1);
        assert!(recorder.results()[0].as_ref().unwrap_err().is_timeout());
        let stats = client.connection().pending().stats();
        assert_eq!(stats.total_unknown.load(std::sync::atomic::Ordering::Relaxed), 1);
        Ok(())
    }

    // =========================================================================
    // DISCONNECT
    // =========================================================================

    #[tokio::test]
    async fn test_disconnect_fails_every_pending_call() -> anyhow::Result<()> {
        let (client, peer) = rpc_client(fast_config()).await?;
        let recorders: Vec<Recorder> = (0..3).map(|_| Recorder::new()).collect();

        for recorder in &recorders {
            client.call("echo", json!({"x": 1}), recorder.callback());
        }
        assert_eq!(client.connection().pending().len(), 3);

        peer.disconnect("transport close");
        settle().await;

        for recorder in &recorders {
            assert_eq!(recorder.results(), vec![Err(RpcError::ConnectionClosed)]);
        }
        assert!(client.connection().pending().is_empty());
        assert!(!client.connection().is_online());
        Ok(())
    }

    // =========================================================================
    // UNCORRELATED AND REJECTED VERBS
    // =========================================================================

    #[tokio::test]
    async fn test_publish_without_ack_registers_nothing() -> anyhow::Result<()> {
        let (client, mut peer) = messaging_client(fast_config()).await?;

        assert_eq!(client.publish("topic", json!({"v": 1}), None)?, None);
        assert!(client.connection().pending().is_empty());

        let frame = peer.next_frame().await.expect("publish frame");
        assert_eq!(frame.kind, "publish");
        assert_eq!(frame.payload["ack"], json!(false));
        assert_eq!(frame.rid(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_request_without_reply_fails_synchronously() -> anyhow::Result<()> {
        let (client, mut peer) = messaging_client(fast_config()).await?;

        let result = client.request_invocation(Invocation::new("topic").with_data(json!({"v": 1})));

        assert_eq!(result, Err(RpcError::MissingCallback { verb: "request" }));
        assert!(peer.try_frame().is_none());
        assert!(client.connection().pending().is_empty());
        Ok(())
    }

    // =========================================================================
    // ANOMALIES
    // =========================================================================

    #[tokio::test]
    async fn test_unknown_response_is_tolerated() -> anyhow::Result<()> {
        let (client, mut peer) = rpc_client(fast_config()).await?;
        let recorder = Recorder::new();

        client.call("echo", Value::Null, recorder.callback());
        let frame = peer.next_frame().await.expect("request frame");

        peer.respond("rpc::response", &json!(CorrelationId::new()), json!("stray"));
        peer.respond("rpc::response", &json!(42), json!("garbage rid"));
        settle().await;
        assert_eq!(recorder.count(), 0);
        assert!(client.connection().is_online());

        peer.respond("rpc::response", frame.rid().expect("rid"), json!("mine"));
        settle().await;
        assert_eq!(recorder.results(), vec![Ok(json!("mine"))]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_get_distinct_ids() -> anyhow::Result<()> {
        let (client, _peer) = rpc_client(ClientConfig::new("mem://node")).await?;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    (0..100)
                        .map(|_| client.call("echo", Value::Null, |_| {}))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await? {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(client.connection().pending().len(), 800);
        Ok(())
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Whatever subset of calls is answered before the link drops, every
        /// callback fires once: answered ones with data, the rest closed.
        #[test]
        fn prop_response_or_drain_exactly_once(answered in prop::collection::vec(any::<bool>(), 1..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async {
                let (client, mut peer) = rpc_client(fast_config()).await.expect("client");
                let recorders: Vec<Recorder> = answered.iter().map(|_| Recorder::new()).collect();

                for (i, recorder) in recorders.iter().enumerate() {
                    client.call("echo", json!(i), recorder.callback());
                }
                for (i, answer) in answered.iter().enumerate() {
                    let frame = peer.next_frame().await.expect("request frame");
                    if *answer {
                        peer.respond("rpc::response", frame.rid().expect("rid"), json!(i));
                    }
                }
                peer.disconnect("transport close");
                settle().await;

                for (i, (recorder, answer)) in recorders.iter().zip(&answered).enumerate() {
                    let expected = if *answer { Ok(json!(i)) } else { Err(RpcError::ConnectionClosed) };
                    assert_eq!(recorder.results(), vec![expected]);
                }
                assert!(client.connection().pending().is_empty());
            });
        }
    }
}
