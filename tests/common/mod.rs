//! Shared fixtures for the integration suites: a scripted transport and a
//! recording host.

#![allow(dead_code)]

use camino::Utf8PathBuf;
use futures_util::future::BoxFuture;
use futures_util::stream;
use futures_util::{FutureExt, StreamExt};
use shadersync::services::{Connector, Frame, FrameStream, TransportError};
use shadersync::{
    EngineSettings, HostServices, LogLevel, Notification, NotificationSink, SyncEngine,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// What the next connection attempt gets
pub enum Session {
    /// The attempt fails
    Refuse,
    /// Connects, delivers these frames, then the stream ends
    Frames(Vec<Frame>),
    /// Connects and stays open until the sender is dropped
    Live(mpsc::UnboundedReceiver<Frame>),
    /// Connects, then the stream panics on its first poll
    Panic,
}

/// Connector that replays queued sessions; refuses once the queue is empty
#[derive(Default)]
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<Session>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, session: Session) {
        self.sessions.lock().unwrap().push_back(session);
    }

    /// Queue a live session and return the handle that feeds it
    pub fn live(&self) -> mpsc::UnboundedSender<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Session::Live(rx));
        tx
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _endpoint: &str) -> BoxFuture<'static, Result<FrameStream, TransportError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Session::Refuse);

        async move {
            let frames: FrameStream = match session {
                Session::Refuse => return Err(TransportError::Connect("refused".to_string())),
                Session::Frames(frames) => stream::iter(frames.into_iter().map(Ok)).boxed(),
                Session::Live(rx) => stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|frame| (Ok(frame), rx))
                })
                .boxed(),
                Session::Panic => {
                    stream::poll_fn(|_| -> Poll<Option<Result<Frame, TransportError>>> {
                        panic!("transport crashed")
                    })
                    .boxed()
                }
            };
            Ok(frames)
        }
        .boxed()
    }
}

/// Host that records everything the engine asks of it
#[derive(Default)]
pub struct RecordingHost {
    pub logs: Mutex<Vec<(LogLevel, String)>>,
    pub refreshes: AtomicUsize,
    pub updating: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log_lines(&self) -> Vec<(LogLevel, String)> {
        self.logs.lock().unwrap().clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl HostServices for RecordingHost {
    fn emit_log(&self, level: LogLevel, message: &str) {
        self.logs.lock().unwrap().push((level, message.to_string()));
    }

    fn refresh_asset_index(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }
}

/// Notification sink that keeps what it was shown
#[derive(Default)]
pub struct RecordingSink {
    pub shown: Mutex<Vec<Notification>>,
}

impl NotificationSink for RecordingSink {
    fn show(&self, notifications: &[Notification]) {
        self.shown.lock().unwrap().extend_from_slice(notifications);
    }
}

pub struct TestEngine {
    pub engine: SyncEngine,
    pub connector: Arc<ScriptedConnector>,
    pub host: Arc<RecordingHost>,
    pub sink: Arc<RecordingSink>,
    pub backing_file: Utf8PathBuf,
    _temp_dir: TempDir,
}

/// Settings pointing at a fresh temp dir
pub fn test_settings(temp_dir: &TempDir) -> EngineSettings {
    EngineSettings {
        endpoint: "ws://scripted.invalid/config".to_string(),
        backing_file: Utf8PathBuf::try_from(temp_dir.path().join("ShaderSync").join("config.json"))
            .unwrap(),
        ..EngineSettings::default()
    }
}

/// Build an engine on the current runtime. `customize` can adjust the settings.
pub fn create_engine(customize: impl FnOnce(&mut EngineSettings)) -> TestEngine {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = test_settings(&temp_dir);
    customize(&mut settings);

    let connector = ScriptedConnector::new();
    let host = RecordingHost::new();
    let sink = Arc::new(RecordingSink::default());
    let backing_file = settings.backing_file.clone();

    let engine = SyncEngine::with_connector(
        settings,
        connector.clone(),
        tokio::runtime::Handle::current(),
        host.clone(),
        sink.clone(),
    );

    TestEngine {
        engine,
        connector,
        host,
        sink,
        backing_file,
        _temp_dir: temp_dir,
    }
}

/// Let spawned tasks run without advancing the clock
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
