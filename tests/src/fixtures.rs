//! Shared setup for the scenario suite.

use flow_rpc::{
    channel_pair, ChannelPeer, ClientBuilder, ClientConfig, MessagingClient, RpcClient, RpcResult,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Config used by the timing scenarios: 1s timeout, 250ms sweep.
pub fn fast_config() -> ClientConfig {
    ClientConfig::new("mem://node")
        .with_id("scenario")
        .with_timeout_secs(1)
        .with_sweep_interval(Duration::from_millis(250))
}

/// Connected RPC client and the peer playing the server.
pub async fn rpc_client(config: ClientConfig) -> anyhow::Result<(RpcClient, ChannelPeer)> {
    let (transport, peer) = channel_pair();
    let client = ClientBuilder::new(config, Arc::new(transport)).build_rpc()?;
    client.connect().await?;
    Ok((client, peer))
}

/// Connected messaging client and the peer playing the server.
pub async fn messaging_client(
    config: ClientConfig,
) -> anyhow::Result<(MessagingClient, ChannelPeer)> {
    let (transport, peer) = channel_pair();
    let client = ClientBuilder::new(config, Arc::new(transport)).build_messaging()?;
    client.connect().await?;
    Ok((client, peer))
}

/// Records every result a callback receives.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<RpcResult<Value>>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback pushing into this recorder.
    pub fn callback(&self) -> impl FnOnce(RpcResult<Value>) + Send + 'static {
        let sink = Arc::clone(&self.0);
        move |result| sink.lock().push(result)
    }

    pub fn results(&self) -> Vec<RpcResult<Value>> {
        self.0.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().len()
    }
}

/// Ordered log of labelled observations across handlers and callbacks.
#[derive(Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<String>>>);

impl Timeline {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Let the pump task catch up with already delivered frames.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
