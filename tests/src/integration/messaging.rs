//! # Messaging Flows
//!
//! Acknowledged publish/subscribe, broadcasts from the remote side, and
//! requests answered by locally registered handlers.

#[cfg(test)]
mod tests {
    use crate::fixtures::{fast_config, messaging_client, settle, Recorder};
    use flow_rpc::{Invocation, Reply, RpcError, TraceLevel};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_acked_publish_round_trip() -> anyhow::Result<()> {
        let (client, mut peer) = messaging_client(fast_config()).await?;

        let publish = tokio::spawn({
            let client = client.clone();
            async move { client.publish_acked("orders", json!({"id": 7})).await }
        });

        let frame = peer.next_frame().await.expect("publish frame");
        assert_eq!(frame.kind, "publish");
        assert_eq!(frame.payload["req"], json!({"subject": "orders", "data": {"id": 7}}));
        assert_eq!(frame.payload["ack"], json!(true));

        peer.respond("publish::response", frame.rid().expect("rid"), Value::Null);
        publish.await??;
        assert!(client.connection().pending().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_publish_ack_callback_sees_remote_error() -> anyhow::Result<()> {
        let (client, mut peer) = messaging_client(fast_config()).await?;
        let recorder = Recorder::new();

        let id = client
            .publish("orders", json!(1), Some(Reply::callback(recorder.callback())))?
            .expect("acked publish is correlated");
        let frame = peer.next_frame().await.expect("publish frame");
        assert_eq!(frame.rid(), Some(&json!(id)));

        peer.respond_error("publish::response", &json!(id), json!({"code": 403}));
        settle().await;
        assert_eq!(
            recorder.results(),
            vec![Err(RpcError::Remote(json!({"code": 403})))]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribe_then_receive_broadcasts() -> anyhow::Result<()> {
        let (client, mut peer) = messaging_client(fast_config()).await?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.on("prices", move |data| {
            let _ = tx.send(data.clone());
        });

        let subscribe = tokio::spawn({
            let client = client.clone();
            async move { client.subscribe_acked("prices").await }
        });
        let frame = peer.next_frame().await.expect("subscribe frame");
        assert_eq!(frame.kind, "subscribe");
        peer.respond("response", frame.rid().expect("rid"), Value::Null);
        subscribe.await??;

        peer.deliver("publish", json!({"req": {"subject": "prices", "data": 101.5}}));
        peer.deliver("publish", json!({"req": {"subject": "prices", "data": 99.0}}));

        assert_eq!(timeout(Duration::from_secs(1), rx.recv()).await?, Some(json!(101.5)));
        assert_eq!(timeout(Duration::from_secs(1), rx.recv()).await?, Some(json!(99.0)));
        assert!(client.connection().pending().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_request_with_callback() -> anyhow::Result<()> {
        let (client, mut peer) = messaging_client(fast_config()).await?;
        let recorder = Recorder::new();

        let id = client.request_invocation(
            Invocation::new("inventory")
                .with_data(json!({"sku": "a1"}))
                .on_result(recorder.callback()),
        )?;

        let frame = peer.next_frame().await.expect("request frame");
        assert_eq!(frame.kind, "rpc.req");
        assert_eq!(frame.rid(), Some(&json!(id)));

        peer.respond("response", &json!(id), json!({"count": 3}));
        settle().await;
        assert_eq!(recorder.results(), vec![Ok(json!({"count": 3}))]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out() -> anyhow::Result<()> {
        let (client, _peer) = messaging_client(fast_config()).await?;
        let recorder = Recorder::new();

        client.request("inventory", Value::Null, recorder.callback());
        sleep(Duration::from_millis(1500)).await;

        assert_eq!(
            recorder.results(),
            vec![Err(RpcError::Timeout(Duration::from_secs(1)))]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_inbound_request_answered_by_handler() -> anyhow::Result<()> {
        let (client, mut peer) = messaging_client(fast_config()).await?;
        client.on_request("health", |_| Ok(json!({"status": "ok"})));
        client.on_request("fail", |data| Err(json!({"rejected": data})));

        peer.deliver("request", json!({"req": {"subject": "health"}, "rid": "a"}));
        let frame = peer.next_frame().await.expect("response frame");
        assert_eq!(frame.kind, "response");
        assert_eq!(
            frame.payload,
            json!({"rid": "a", "error": null, "data": {"status": "ok"}})
        );

        peer.deliver("request", json!({"req": {"subject": "fail", "data": 5}, "rid": "b"}));
        let frame = peer.next_frame().await.expect("response frame");
        assert_eq!(
            frame.payload,
            json!({"rid": "b", "error": {"rejected": 5}, "data": null})
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_tracing_does_not_change_delivery() -> anyhow::Result<()> {
        let (client, peer) = messaging_client(fast_config().with_trace(TraceLevel::Full)).await?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.on("news", move |data| {
            let _ = tx.send(data.clone());
        });

        peer.message("news", json!("first"));
        client.set_trace(TraceLevel::Subjects);
        peer.message("news", json!("second"));

        assert_eq!(timeout(Duration::from_secs(1), rx.recv()).await?, Some(json!("first")));
        assert_eq!(timeout(Duration::from_secs(1), rx.recv()).await?, Some(json!("second")));
        Ok(())
    }
}
