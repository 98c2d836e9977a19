//! TCP front end.
//!
//! Masters connect, authenticate with the shared token, and submit builds as
//! newline-delimited JSON frames. Each build runs as its own task; output
//! lines and the terminal result flow back over the same connection. When a
//! master disconnects, its in-flight builds are cancelled - a build with
//! nobody listening has no requester left.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use bosun_core::{BuildError, BuildRequest, BuildResult, Builder, OutputSink};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{AgentFrame, HostFrame};
use crate::service::ServiceMap;

/// Listening agent endpoint.
pub struct AgentServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    token: String,
    builder: Arc<Builder>,
    services: Arc<ServiceMap>,
}

impl AgentServer {
    pub async fn bind(
        addr: SocketAddr,
        token: String,
        builder: Arc<Builder>,
        services: Arc<ServiceMap>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        let local_addr = listener.local_addr().context("reading bound address")?;
        Ok(AgentServer {
            listener,
            local_addr,
            token,
            builder,
            services,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept master connections until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.context("accepting connection")?;
                    info!(%peer, "master connected");
                    let conn = Connection {
                        token: self.token.clone(),
                        builder: Arc::clone(&self.builder),
                        services: Arc::clone(&self.services),
                    };
                    tokio::spawn(async move {
                        if let Err(err) = conn.run(stream).await {
                            warn!(%peer, %err, "connection closed with error");
                        } else {
                            info!(%peer, "master disconnected");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("stopped accepting connections");
                    return Ok(());
                }
            }
        }
    }
}

struct Connection {
    token: String,
    builder: Arc<Builder>,
    services: Arc<ServiceMap>,
}

impl Connection {
    async fn run(self, stream: TcpStream) -> anyhow::Result<()> {
        let (reader, writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        // All frames funnel through one writer task so concurrent builds
        // cannot interleave partial lines.
        let (out_tx, out_rx) = mpsc::unbounded_channel::<AgentFrame>();
        let writer_task = tokio::spawn(write_frames(writer, out_rx));

        let authed = self.handshake(&mut lines, &out_tx).await?;
        let inflight: Arc<Mutex<HashMap<Uuid, CancellationToken>>> =
            Arc::new(Mutex::new(HashMap::new()));

        if authed {
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<HostFrame>(&line) {
                    Ok(HostFrame::Build { id, method, args }) => {
                        self.spawn_build(id, method, args, &out_tx, &inflight);
                    }
                    Ok(HostFrame::Cancel { id }) => {
                        let token = inflight.lock().expect("inflight poisoned").get(&id).cloned();
                        match token {
                            Some(token) => {
                                info!(%id, "cancel requested");
                                token.cancel();
                            }
                            None => debug!(%id, "cancel for unknown build"),
                        }
                    }
                    Ok(HostFrame::Ping) => {
                        let _ = out_tx.send(AgentFrame::Pong);
                    }
                    Ok(HostFrame::Hello { .. }) => {
                        // Already greeted; harmless.
                    }
                    Err(err) => {
                        let _ = out_tx.send(AgentFrame::Error {
                            message: format!("undecodable frame: {err}"),
                        });
                    }
                }
            }
        }

        // The requester is gone; abort whatever is still running.
        for (_, token) in inflight.lock().expect("inflight poisoned").drain() {
            token.cancel();
        }

        drop(out_tx);
        writer_task.await??;
        Ok(())
    }

    /// First frame must be a `Hello` with the right token.
    async fn handshake(
        &self,
        lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
        out_tx: &mpsc::UnboundedSender<AgentFrame>,
    ) -> anyhow::Result<bool> {
        let Some(line) = lines.next_line().await? else {
            return Ok(false);
        };
        match serde_json::from_str::<HostFrame>(&line) {
            Ok(HostFrame::Hello { token }) if token == self.token => {
                let _ = out_tx.send(AgentFrame::Ready {
                    methods: self.services.methods(),
                });
                Ok(true)
            }
            Ok(HostFrame::Hello { .. }) => {
                warn!("master presented a bad token");
                let _ = out_tx.send(AgentFrame::Error {
                    message: "access denied".to_string(),
                });
                Ok(false)
            }
            _ => {
                let _ = out_tx.send(AgentFrame::Error {
                    message: "expected hello".to_string(),
                });
                Ok(false)
            }
        }
    }

    fn spawn_build(
        &self,
        id: Uuid,
        method: String,
        args: serde_json::Value,
        out_tx: &mpsc::UnboundedSender<AgentFrame>,
        inflight: &Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
    ) {
        let Some(runner) = self.services.runner_for(&method) else {
            let err = BuildError::InvalidArgs(format!("unknown method: {method}"));
            let result = BuildResult::from_error(&err, Duration::ZERO);
            let _ = out_tx.send(AgentFrame::resolved(id, &result));
            return;
        };

        let cancel = CancellationToken::new();
        inflight
            .lock()
            .expect("inflight poisoned")
            .insert(id, cancel.clone());

        let builder = Arc::clone(&self.builder);
        let out_tx = out_tx.clone();
        let inflight = Arc::clone(inflight);
        tokio::spawn(async move {
            let (sink, mut output) = OutputSink::channel();

            let forwarder = {
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    while let Some(line) = output.recv().await {
                        let _ = out_tx.send(AgentFrame::Output {
                            id,
                            stream: line.stream,
                            line: line.line,
                        });
                    }
                })
            };

            let request = BuildRequest::with_id(id, args, sink, cancel);
            let result = builder.build(request, runner.as_ref()).await;

            // The request (and with it the sink) is gone, so the forwarder
            // drains the remaining lines and exits before we resolve.
            let _ = forwarder.await;
            let _ = out_tx.send(AgentFrame::resolved(id, &result));
            inflight.lock().expect("inflight poisoned").remove(&id);
        });
    }
}

async fn write_frames(
    mut writer: OwnedWriteHalf,
    mut out_rx: mpsc::UnboundedReceiver<AgentFrame>,
) -> anyhow::Result<()> {
    while let Some(frame) = out_rx.recv().await {
        let mut line = serde_json::to_string(&frame).context("encoding frame")?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .context("writing frame")?;
    }
    Ok(())
}
