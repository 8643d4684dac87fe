//! Fake CSTA provider speaking the frame protocol over an in-memory stream.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use correlation_store::{CorrelationStore, MemoryStore};
use csta_api::xml_utils::root_element_name;
use csta_stream::{Broker, Engine, EngineConfig, EventDemultiplexer, FanoutBroker};
use parking_lot::Mutex;
use provider_client::{encode_frame, read_frame, Frame, InvokeId, ProviderConnection};
use tokio::io::{AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type SharedWriter = Arc<tokio::sync::Mutex<WriteHalf<DuplexStream>>>;

#[derive(Default)]
struct Script {
    overrides: HashMap<String, Option<String>>,
    delays: HashMap<String, Duration>,
    monitor_starts: u32,
}

/// Answers requests by root element, like a well-behaved provider.
pub struct FakeProvider {
    events: mpsc::UnboundedSender<String>,
    received: Arc<Mutex<Vec<(String, String)>>>,
    script: Arc<Mutex<Script>>,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeProvider {
    pub fn spawn(stream: DuplexStream) -> Self {
        let (mut reader, writer) = tokio::io::split(stream);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let received = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(Script::default()));

        let read_task = tokio::spawn(async move {
            while let Ok(frame) = read_frame(&mut reader).await {
                if frames_tx.send(frame).is_err() {
                    break;
                }
            }
        });
        let serve_task = tokio::spawn(Self::serve(
            Arc::new(tokio::sync::Mutex::new(writer)),
            frames_rx,
            events_rx,
            received.clone(),
            script.clone(),
        ));

        Self {
            events,
            received,
            script,
            tasks: vec![read_task, serve_task],
        }
    }

    /// Replace the answer to a request; `None` never answers it.
    pub fn respond(&self, root: &str, reply: Option<&str>) {
        self.script
            .lock()
            .overrides
            .insert(root.to_string(), reply.map(str::to_string));
    }

    /// Answer a request only after `delay`.
    pub fn delay(&self, root: &str, delay: Duration) {
        self.script.lock().delays.insert(root.to_string(), delay);
    }

    /// Push an unsolicited event.
    pub fn send_event(&self, xml: &str) {
        let _ = self.events.send(xml.to_string());
    }

    /// Root elements of every request received, in order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().iter().map(|(root, _)| root.clone()).collect()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.received.lock().iter().map(|(_, payload)| payload.clone()).collect()
    }

    pub fn count(&self, root: &str) -> usize {
        self.received.lock().iter().filter(|(r, _)| r == root).count()
    }

    /// Drop the provider side of the stream.
    pub fn disconnect(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    async fn serve(
        writer: SharedWriter,
        mut frames: mpsc::UnboundedReceiver<Frame>,
        mut events: mpsc::UnboundedReceiver<String>,
        received: Arc<Mutex<Vec<(String, String)>>>,
        script: Arc<Mutex<Script>>,
    ) {
        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    let root = root_element_name(&frame.payload).unwrap_or_default();
                    received.lock().push((root.clone(), frame.payload.clone()));

                    let (reply, delay) = {
                        let mut script = script.lock();
                        if root == "MonitorStart" {
                            script.monitor_starts += 1;
                        }
                        let reply = match script.overrides.get(&root) {
                            Some(reply) => reply.clone(),
                            None => default_reply(&root, &frame.payload, script.monitor_starts),
                        };
                        (reply, script.delays.get(&root).copied())
                    };

                    if let Some(reply) = reply {
                        let invoke_id = frame.invoke_id;
                        match delay {
                            Some(delay) => {
                                let writer = writer.clone();
                                tokio::spawn(async move {
                                    tokio::time::sleep(delay).await;
                                    write(&writer, invoke_id, &reply).await;
                                });
                            }
                            None => write(&writer, invoke_id, &reply).await,
                        }
                    }
                }
                Some(event) = events.recv() => {
                    write(&writer, InvokeId::UNSOLICITED, &event).await;
                }
            }
        }
    }
}

impl Drop for FakeProvider {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn write(writer: &SharedWriter, invoke_id: InvokeId, payload: &str) {
    let frame = encode_frame(invoke_id, payload).unwrap();
    let _ = writer.lock().await.write_all(&frame).await;
}

fn element_text<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}>", name);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&format!("</{}>", name))? + start;
    Some(&xml[start..end])
}

fn default_reply(root: &str, payload: &str, monitor_starts: u32) -> Option<String> {
    match root {
        "StartApplicationSession" => Some(
            "<StartApplicationSessionPosResponse xmlns=\"http://www.ecma-international.org/standards/ecma-354/appl_session\">\
<sessionID>A1B2C3</sessionID><actualSessionDuration>180</actualSessionDuration>\
</StartApplicationSessionPosResponse>"
                .to_string(),
        ),
        "ResetApplicationSessionTimer" => Some(
            "<ResetApplicationSessionTimerPosResponse><actualSessionDuration>180</actualSessionDuration>\
</ResetApplicationSessionTimerPosResponse>"
                .to_string(),
        ),
        "StopApplicationSession" => Some("<StopApplicationSessionPosResponse/>".to_string()),
        "GetDeviceId" => element_text(payload, "extension").map(|extension| {
            format!(
                "<GetDeviceIdResponse xmlns=\"http://www.pbxnsip.com/schemas/csta\">\
<device typeOfNumber=\"other\" mediaClass=\"notKnown\">N&lt;{}&gt;</device></GetDeviceIdResponse>",
                extension
            )
        }),
        "MonitorStart" => Some(format!(
            "<MonitorStartResponse xmlns=\"http://www.ecma-international.org/standards/ecma-323/csta/ed3\">\
<monitorCrossRefID>{}</monitorCrossRefID></MonitorStartResponse>",
            40 + monitor_starts
        )),
        "MonitorStop" => Some("<MonitorStopResponse/>".to_string()),
        _ => None,
    }
}

/// Engine settings scaled down for tests.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        pbx_host: "pbx.local".to_string(),
        poll_interval: Duration::from_millis(10),
        response_timeout: Duration::from_secs(2),
        long_running_timeout: Duration::from_secs(3),
        ..EngineConfig::new("it")
    }
}

pub struct TestBed {
    pub engine: Engine,
    pub provider: FakeProvider,
    pub store: Arc<MemoryStore>,
}

impl TestBed {
    pub fn new() -> Self {
        Self::with(test_config(), Arc::new(FanoutBroker::new()))
    }

    pub fn with(config: EngineConfig, broker: Arc<dyn Broker>) -> Self {
        Self::wrapping_store(config, broker, |store| store)
    }

    /// Like [`TestBed::with`], but the engine sees the store through `wrap`.
    /// The connection reader still writes to the plain store.
    pub fn wrapping_store(
        config: EngineConfig,
        broker: Arc<dyn Broker>,
        wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn CorrelationStore>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let demux = Arc::new(EventDemultiplexer::new(&config, store.clone(), broker.clone()));
        let connection = Arc::new(ProviderConnection::from_stream(local, demux));
        let provider = FakeProvider::spawn(remote);
        let engine = Engine::new(config, connection, wrap(store.clone()), broker).unwrap();
        Self {
            engine,
            provider,
            store,
        }
    }
}

pub fn credentials() -> csta_stream::SessionCredentials {
    csta_stream::SessionCredentials {
        user: "ctiuser".to_string(),
        password: "ctipassword".to_string(),
    }
}
