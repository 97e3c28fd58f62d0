use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use crate::config::StreamConfig;

// Events are small JSON payloads; anything this long means the server is not framing lines.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Lifecycle of one subscription. There is no way back to `Connecting`: a client that ends in
/// `Closed` or `Error` stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Streaming,
    Closed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionReport {
    pub client_id: usize,
    pub lines: usize,
    pub state: ClientState,
}

/// A single long-lived GET against the price stream.
pub struct StreamClient {
    id: usize,
    http: reqwest::Client,
    url: String,
    state: ClientState,
    lines: usize,
}

impl StreamClient {
    pub fn new(id: usize, http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            id,
            http,
            url: url.into(),
            state: ClientState::Connecting,
            lines: 0,
        }
    }

    /// Reads the stream until the server closes it or it fails. Failures stay local to this
    /// client: they are logged and folded into the returned report.
    pub async fn subscribe(mut self) -> SubscriptionReport {
        self.state = match self.stream().await {
            Ok(()) => ClientState::Closed,
            Err(err) => {
                tracing::warn!("Client {} failed: {:#}", self.id, err);
                ClientState::Error
            }
        };
        tracing::info!(
            "Client {} finished [lines={}, state={:?}]",
            self.id,
            self.lines,
            self.state
        );
        SubscriptionReport {
            client_id: self.id,
            lines: self.lines,
            state: self.state,
        }
    }

    async fn stream(&mut self) -> anyhow::Result<()> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Error connecting to {}", self.url))?;
        self.state = ClientState::Streaming;
        tracing::info!("Client {} connected", self.id);
        tracing::debug!("Client {} response [status={}]", self.id, response.status());

        // Turn the chunked body into something that reads like a socket, then split it into
        // lines the same way regardless of how the server happened to chunk it.
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let lines = FramedRead::new(
            StreamReader::new(body),
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        );
        tokio::pin!(lines);

        while let Some(line) = lines.next().await {
            let line = line.with_context(|| format!("Error reading stream from {}", self.url))?;
            if line.is_empty() {
                continue;
            }
            tracing::info!("Client {}: {}", self.id, line);
            self.lines += 1;
        }
        Ok(())
    }
}

/// Fans out `clients` subscriptions against the same URL.
pub struct Subscriber {
    config: StreamConfig,
    http: reqwest::Client,
}

impl Subscriber {
    pub fn new(config: StreamConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Error building HTTP client")?;
        Ok(Self { config, http })
    }

    /// Spawns one task per client, sleeping `stagger` after each spawn so the server does not
    /// see every connection at once. A client failing early never holds up the ones after it.
    pub async fn spawn_clients(&self) -> Vec<JoinHandle<SubscriptionReport>> {
        let mut handles = Vec::with_capacity(self.config.clients);
        // We spawn before sleeping and never await the task here, so the stagger is paced by
        // the clock alone: a client whose connection is refused or dropped right away finishes
        // on its own task while we are already sleeping towards the next spawn. Cloning the
        // reqwest client only clones a handle to the shared pool, and since every streaming GET
        // keeps its connection busy, each client still ends up on its own socket.
        for id in 0..self.config.clients {
            let client = StreamClient::new(id, self.http.clone(), self.config.url.as_str());
            handles.push(tokio::spawn(client.subscribe()));
            tokio::time::sleep(self.config.stagger()).await;
        }
        handles
    }

    // The observation window is a plain sleep: there is no cancellation token and the clients
    // are never joined, as there is nothing for them to flush. Once the window is over we only
    // peek at the handles to log how many connections survived, then return. Returning from
    // `main` drops the runtime, which cancels the remaining tasks and closes their sockets.
    // Dropping a `JoinHandle` detaches the task rather than aborting it, so the handles going
    // out of scope here does not end the clients early.
    pub async fn run(&self) {
        tracing::info!(
            "Starting {} clients against {}",
            self.config.clients,
            self.config.url
        );
        let handles = self.spawn_clients().await;
        tokio::time::sleep(self.config.run_duration()).await;
        let streaming = handles.iter().filter(|handle| !handle.is_finished()).count();
        tracing::info!(
            "Run window elapsed, {} of {} clients still streaming",
            streaming,
            handles.len()
        );
    }
}
