//! # Lifecycle Flows
//!
//! Notification ordering around connect, disconnect and close, and the
//! registry side effects each transition is allowed to have.

#[cfg(test)]
mod tests {
    use crate::fixtures::{fast_config, rpc_client, settle, Recorder, Timeline};
    use flow_events::{ConnectionEvent, EventFilter, EventTopic, Subscription};
    use flow_rpc::{channel_pair, ClientBuilder, ConnectionState, RpcError, TransportEvent};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn names_until(sub: &mut Subscription, last: &str) -> Vec<&'static str> {
        let mut names = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(1), sub.recv())
                .await
                .expect("lifecycle event")
                .expect("bus open");
            names.push(event.name());
            if event.name() == last {
                return names;
            }
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_order() -> anyhow::Result<()> {
        let (transport, _peer) = channel_pair();
        let client = ClientBuilder::new(fast_config(), Arc::new(transport)).build_rpc()?;
        let mut sub = client.lifecycle(EventFilter::all());

        client.connect().await?;
        assert_eq!(
            names_until(&mut sub, "rpc-ready").await,
            vec!["rpc-connecting", "rpc-connect", "rpc-ready"]
        );

        client.close().await;
        assert_eq!(
            names_until(&mut sub, "rpc-closed").await,
            vec!["rpc-disconnect", "rpc-closed"]
        );
        assert_eq!(client.connection().state(), ConnectionState::Closed);
        Ok(())
    }

    #[tokio::test]
    async fn test_disconnect_notification_precedes_drain() -> anyhow::Result<()> {
        let (client, peer) = rpc_client(fast_config()).await?;
        let timeline = Timeline::default();

        let seen = timeline.clone();
        client.on("rpc-disconnect", move |_| seen.push("rpc-disconnect"));

        let seen = timeline.clone();
        client.call("echo", Value::Null, move |result| {
            assert_eq!(result, Err(RpcError::ConnectionClosed));
            seen.push("reply");
        });

        peer.disconnect("transport close");
        settle().await;

        assert_eq!(timeline.entries(), vec!["rpc-disconnect", "reply"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_disconnect_payload_carries_reason() -> anyhow::Result<()> {
        let (client, peer) = rpc_client(fast_config()).await?;
        let mut sub = client.lifecycle(EventFilter::names(vec!["rpc-disconnect"]));

        peer.disconnect("ping timeout");
        let event = timeout(Duration::from_secs(1), sub.recv()).await?.expect("event");
        assert_eq!(
            event,
            ConnectionEvent::Disconnected {
                client_id: "scenario".into(),
                reason: "ping timeout".into(),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_close_drains_through_transport_disconnect() -> anyhow::Result<()> {
        let (client, _peer) = rpc_client(fast_config()).await?;
        let recorder = Recorder::new();
        client.call("echo", Value::Null, recorder.callback());

        client.close().await;
        settle().await;

        assert_eq!(recorder.results(), vec![Err(RpcError::ConnectionClosed)]);
        assert!(client.connection().pending().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_errors_only_notify() -> anyhow::Result<()> {
        let (client, peer) = rpc_client(fast_config()).await?;
        let mut faults = client.lifecycle(EventFilter::topics(vec![EventTopic::Fault]));
        let recorder = Recorder::new();
        client.call("echo", Value::Null, recorder.callback());

        peer.signal(TransportEvent::ConnectError("xhr poll error".into()));
        peer.signal(TransportEvent::Error("parse error".into()));
        assert_eq!(
            names_until(&mut faults, "rpc-error").await,
            vec!["rpc-connect-error", "rpc-error"]
        );

        assert_eq!(recorder.count(), 0);
        assert_eq!(client.connection().pending().len(), 1);
        assert!(client.connection().is_online());
        Ok(())
    }

    #[tokio::test]
    async fn test_reconnect_fails_previous_generation_requests() -> anyhow::Result<()> {
        let (client, peer) = rpc_client(fast_config()).await?;
        let recorder = Recorder::new();

        peer.disconnect("transport close");
        peer.signal(TransportEvent::Connect);
        peer.signal(TransportEvent::Ready);
        settle().await;

        assert_eq!(client.connection().generation(), 2);
        assert_eq!(client.connection().state(), ConnectionState::Online);

        client.call("echo", Value::Null, recorder.callback());
        assert_eq!(client.connection().pending().len(), 1);

        peer.signal(TransportEvent::Connect);
        settle().await;

        assert_eq!(client.connection().generation(), 3);
        assert_eq!(recorder.results(), vec![Err(RpcError::ConnectionClosed)]);
        assert!(client.connection().pending().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_is_forwarded() -> anyhow::Result<()> {
        let (client, peer) = rpc_client(fast_config()).await?;
        let mut sub = client.lifecycle(EventFilter::names(vec!["offline"]));

        peer.signal(TransportEvent::Offline);
        let event = timeout(Duration::from_secs(1), sub.recv()).await?.expect("event");
        assert_eq!(event.name(), "offline");
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_failure_can_be_retried() -> anyhow::Result<()> {
        let (transport, _peer) = channel_pair();
        let client = ClientBuilder::new(fast_config(), Arc::new(transport.refusing("ECONNREFUSED")))
            .build_rpc()?;
        let errors = Timeline::default();
        let seen = errors.clone();
        client.on("rpc-connect-error", move |payload| {
            seen.push(payload["reason"].as_str().unwrap_or_default().to_string());
        });

        let first = client.connect().await;
        let second = client.connect().await;

        assert!(matches!(first, Err(RpcError::TransportConnect(_))));
        assert!(matches!(second, Err(RpcError::TransportConnect(_))));
        assert_eq!(errors.entries().len(), 2);
        assert!(errors.entries()[0].contains("ECONNREFUSED"));
        assert_eq!(client.connection().state(), ConnectionState::Idle);
        Ok(())
    }
}
