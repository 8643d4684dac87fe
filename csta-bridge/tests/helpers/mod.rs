//! Fake CSTA provider listening on a real TCP port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use csta_api::xml_utils::root_element_name;
use csta_bridge::{Args, Config};
use parking_lot::Mutex;
use provider_client::{encode_frame, read_frame, Frame, InvokeId};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const SESSION_REJECTED: &str = "<CSTAErrorCode xmlns=\"http://www.ecma-international.org/standards/ecma-323/csta/ed3\">\
<operation>invalidApplicationID</operation></CSTAErrorCode>";

#[derive(Default)]
struct Shared {
    received: Vec<String>,
    overrides: HashMap<String, String>,
    monitor_starts: u32,
}

/// Accepts one connection and answers requests by root element.
pub struct TcpProvider {
    addr: SocketAddr,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<String>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TcpProvider {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (events, events_rx) = mpsc::unbounded_channel();
        let tasks = Arc::new(Mutex::new(Vec::new()));

        let accept = {
            let shared = shared.clone();
            let tasks = tasks.clone();
            tokio::spawn(async move {
                let Ok((socket, _)) = listener.accept().await else { return };
                let (mut reader, writer) = socket.into_split();
                let (frames_tx, frames_rx) = mpsc::unbounded_channel();

                let read_task = tokio::spawn(async move {
                    while let Ok(frame) = read_frame(&mut reader).await {
                        if frames_tx.send(frame).is_err() {
                            break;
                        }
                    }
                });
                let serve_task = tokio::spawn(serve(writer, frames_rx, events_rx, shared));
                tasks.lock().extend([read_task, serve_task]);
            })
        };
        tasks.lock().push(accept);

        Self {
            addr,
            shared,
            events,
            tasks,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Replace the answer to one request type.
    pub fn respond(&self, root: &str, reply: &str) {
        self.shared
            .lock()
            .overrides
            .insert(root.to_string(), reply.to_string());
    }

    pub fn send_event(&self, xml: &str) {
        let _ = self.events.send(xml.to_string());
    }

    pub fn received(&self) -> Vec<String> {
        self.shared.lock().received.clone()
    }

    pub fn count(&self, root: &str) -> usize {
        self.shared.lock().received.iter().filter(|r| *r == root).count()
    }

    /// Drop the connection from the provider side.
    pub fn disconnect(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Wait until `count(root)` reaches `n`.
    pub async fn wait_for(&self, root: &str, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(root) < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("provider never received {} x{}", root, n));
    }
}

impl Drop for TcpProvider {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn serve(
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    mut events: mpsc::UnboundedReceiver<String>,
    shared: Arc<Mutex<Shared>>,
) {
    loop {
        let (invoke_id, reply) = tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                let root = root_element_name(&frame.payload).unwrap_or_default();
                let reply = {
                    let mut shared = shared.lock();
                    shared.received.push(root.clone());
                    if root == "MonitorStart" {
                        shared.monitor_starts += 1;
                    }
                    shared
                        .overrides
                        .get(&root)
                        .cloned()
                        .or_else(|| default_reply(&root, shared.monitor_starts))
                };
                match reply {
                    Some(reply) => (frame.invoke_id, reply),
                    None => continue,
                }
            }
            Some(event) = events.recv() => (InvokeId::UNSOLICITED, event),
        };

        let frame = encode_frame(invoke_id, &reply).unwrap();
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
}

fn default_reply(root: &str, monitor_starts: u32) -> Option<String> {
    match root {
        "StartApplicationSession" => Some(
            "<StartApplicationSessionPosResponse><sessionID>B7</sessionID>\
<actualSessionDuration>180</actualSessionDuration></StartApplicationSessionPosResponse>"
                .to_string(),
        ),
        "ResetApplicationSessionTimer" => Some(
            "<ResetApplicationSessionTimerPosResponse><actualSessionDuration>180</actualSessionDuration>\
</ResetApplicationSessionTimerPosResponse>"
                .to_string(),
        ),
        "StopApplicationSession" => Some("<StopApplicationSessionPosResponse/>".to_string()),
        "GetDeviceId" => Some(
            "<GetDeviceIdResponse><device typeOfNumber=\"other\">N&lt;1001&gt;</device></GetDeviceIdResponse>"
                .to_string(),
        ),
        "MonitorStart" => Some(format!(
            "<MonitorStartResponse><monitorCrossRefID>{}</monitorCrossRefID></MonitorStartResponse>",
            500 + monitor_starts
        )),
        "MonitorStop" => Some("<MonitorStopResponse/>".to_string()),
        _ => None,
    }
}

/// Bridge configuration pointing at `provider`, HTTP on an ephemeral port.
pub fn bridge_config(provider: &TcpProvider, extensions: &str) -> Config {
    let args = Args::try_parse_from([
        "csta-bridge",
        "--provider-host",
        &provider.addr().to_string(),
        "--app-name",
        "bridge-it",
        "--http-addr",
        "127.0.0.1:0",
        "--extensions",
        extensions,
        "--poll-interval-ms",
        "10",
        "--response-timeout-secs",
        "2",
        "--connect-attempts",
        "1",
    ])
    .unwrap();
    Config::try_from(args).unwrap()
}
