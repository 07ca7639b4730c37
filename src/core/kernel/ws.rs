use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, instrument, trace, warn};

pub type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
pub type WsSource = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Invoked once per inbound text frame. Errors are logged and the session stays up.
pub type MessageCallback = Arc<dyn Fn(&str) -> Result<(), ExchangeError> + Send + Sync>;

/// Stream session configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Interval between keepalive pings
    pub ping_interval: Duration,
    /// Deadline for a single ping write
    pub ping_timeout: Duration,
    /// Pause after a failed dial
    pub redial_wait: Duration,
    /// Consecutive dial failures before giving up; 0 means never give up
    pub retry: u32,
    /// How long `stop` waits for the session task
    pub stop_timeout: Duration,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(30),
            redial_wait: Duration::from_secs(1),
            retry: 0,
            stop_timeout: Duration::from_secs(1),
            read_buffer_size: 2 * 1024 * 1024,
            write_buffer_size: 2 * 1024 * 1024,
        }
    }
}

impl WsConfig {
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_redial_wait(mut self, redial_wait: Duration) -> Self {
        self.redial_wait = redial_wait;
        self
    }

    pub fn with_buffers(mut self, read_buffer_size: usize, write_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self.write_buffer_size = write_buffer_size;
        self
    }
}

/// Opens one WebSocket connection and hands back its two halves
#[async_trait]
pub trait WsDialer: Send + Sync {
    async fn dial(&self, url: &str) -> Result<(WsSink, WsSource), ExchangeError>;
}

/// Dialer backed by tokio-tungstenite
#[derive(Debug, Clone)]
pub struct TungsteniteDialer {
    config: WebSocketConfig,
    connect_timeout: Duration,
}

impl TungsteniteDialer {
    pub fn new(read_buffer_size: usize, write_buffer_size: usize) -> Self {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(read_buffer_size);
        config.write_buffer_size = write_buffer_size;
        config.max_write_buffer_size = write_buffer_size.saturating_mul(2).max(1);
        Self {
            config,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &WsConfig) -> Self {
        Self::new(config.read_buffer_size, config.write_buffer_size)
    }
}

#[async_trait]
impl WsDialer for TungsteniteDialer {
    async fn dial(&self, url: &str) -> Result<(WsSink, WsSource), ExchangeError> {
        let connect =
            tokio_tungstenite::connect_async_with_config(url, Some(self.config), false);
        let (stream, _) = timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| ExchangeError::NetworkError(format!("Timed out connecting to {}", url)))?
            .map_err(|e| {
                ExchangeError::WebSocketError(format!("Failed to connect to {}: {}", url, e))
            })?;
        let (sink, source) = stream.split();
        Ok((Box::pin(sink), Box::pin(source)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Redialing,
    Stopped,
}

struct SessionShared {
    url: String,
    name: String,
    config: WsConfig,
    dialer: Arc<dyn WsDialer>,
    finished: AtomicBool,
    shutdown: Notify,
    state: watch::Sender<SessionState>,
    writer: Mutex<Option<WsSink>>,
    dials: AtomicUsize,
}

/// A managed WebSocket subscription that redials until stopped.
///
/// `start` blocks until the first connection is up (or the dial budget is
/// spent). From then on a background task owns the socket: it reads frames
/// into the callback, pings every `ping_interval`, and redials after any read
/// error or close. `stop` is cooperative and bounded by `stop_timeout`; once
/// the timeout expires the task is aborted and the caller proceeds. A `start`
/// still waiting for its first connection fails when `stop` is called, and a
/// stopped session can not be started again.
pub struct StreamSession {
    shared: Arc<SessionShared>,
    state_rx: watch::Receiver<SessionState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    pub fn new(url: impl Into<String>, name: impl Into<String>, config: WsConfig) -> Self {
        let dialer = Arc::new(TungsteniteDialer::from_config(&config));
        Self::with_dialer(url, name, config, dialer)
    }

    pub fn with_dialer(
        url: impl Into<String>,
        name: impl Into<String>,
        config: WsConfig,
        dialer: Arc<dyn WsDialer>,
    ) -> Self {
        let (state, state_rx) = watch::channel(SessionState::Idle);
        Self {
            shared: Arc::new(SessionShared {
                url: url.into(),
                name: name.into(),
                config,
                dialer,
                finished: AtomicBool::new(false),
                shutdown: Notify::new(),
                state,
                writer: Mutex::new(None),
                dials: AtomicUsize::new(0),
            }),
            state_rx,
            task: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Number of dial attempts made so far
    pub fn dial_attempts(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, on_message, initial_payload), fields(session = %self.shared.name, url = %self.shared.url))]
    pub async fn start(
        &self,
        on_message: MessageCallback,
        initial_payload: Option<String>,
    ) -> Result<(), ExchangeError> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(ExchangeError::InvalidParameters(format!(
                "Stream session {} is already started",
                self.shared.name
            )));
        }
        if self.shared.finished.load(Ordering::SeqCst) {
            return Err(ExchangeError::InvalidParameters(format!(
                "Stream session {} is stopped",
                self.shared.name
            )));
        }

        let (first_tx, first_rx) = oneshot::channel();
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(run_session(
            shared,
            on_message,
            initial_payload,
            first_tx,
        )));
        drop(task);

        let result = match first_rx.await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::WebSocketError(format!(
                "Stream session {} ended before connecting",
                self.shared.name
            ))),
        };
        if result.is_err() {
            self.task.lock().await.take();
        }
        result
    }

    /// Stop the session. Safe to call more than once.
    #[instrument(skip(self), fields(session = %self.shared.name))]
    pub async fn stop(&self) {
        self.shared.finished.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_one();

        let handle = self.task.lock().await.take();
        if let Some(mut handle) = handle {
            if timeout(self.shared.config.stop_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!("stream session did not stop in time, aborting");
                handle.abort();
                if let Ok(mut writer) = self.shared.writer.try_lock() {
                    writer.take();
                }
                self.shared.state.send_replace(SessionState::Stopped);
            }
        }
    }

    /// Send a text frame on the live connection
    pub async fn send(&self, message: &str) -> Result<(), ExchangeError> {
        send_text(&self.shared, message).await
    }

    /// Serialize `value` as JSON and send it
    pub async fn send_json<T: serde::Serialize + Sync>(
        &self,
        value: &T,
    ) -> Result<(), ExchangeError> {
        let text = serde_json::to_string(value)?;
        self.send(&text).await
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.shared.finished.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_one();
    }
}

async fn send_text(shared: &SessionShared, message: &str) -> Result<(), ExchangeError> {
    let mut writer = shared.writer.lock().await;
    let sink = writer.as_mut().ok_or_else(|| {
        ExchangeError::WebSocketError(format!("Stream session {} is not connected", shared.name))
    })?;
    sink.send(Message::Text(message.to_string()))
        .await
        .map_err(|e| ExchangeError::WebSocketError(format!("Failed to send message: {}", e)))
}

async fn run_session(
    shared: Arc<SessionShared>,
    on_message: MessageCallback,
    initial_payload: Option<String>,
    first_tx: oneshot::Sender<Result<(), ExchangeError>>,
) {
    let mut first = Some(first_tx);
    let mut failures = 0u32;

    while !shared.finished.load(Ordering::SeqCst) {
        if first.is_some() {
            shared.state.send_replace(SessionState::Connecting);
        }
        shared.dials.fetch_add(1, Ordering::SeqCst);
        let dialed = tokio::select! {
            dialed = shared.dialer.dial(&shared.url) => dialed,
            _ = shared.shutdown.notified() => break,
        };

        let (sink, source) = match dialed {
            Ok(halves) => halves,
            Err(e) => {
                failures += 1;
                if shared.config.retry > 0 && failures >= shared.config.retry {
                    error!(session = %shared.name, url = %shared.url, failures, error = %e, "giving up on stream");
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Err(e));
                    }
                    break;
                }
                warn!(session = %shared.name, url = %shared.url, failures, error = %e, "dial failed, redialing");
                shared.state.send_replace(SessionState::Redialing);
                tokio::select! {
                    _ = sleep(shared.config.redial_wait) => {}
                    _ = shared.shutdown.notified() => {}
                }
                continue;
            }
        };
        failures = 0;

        if shared.finished.load(Ordering::SeqCst) {
            break;
        }
        *shared.writer.lock().await = Some(sink);

        if let Some(payload) = &initial_payload {
            if let Err(e) = send_text(&shared, payload).await {
                warn!(session = %shared.name, error = %e, "failed to send initial payload, redialing");
                close_writer(&shared).await;
                shared.state.send_replace(SessionState::Redialing);
                continue;
            }
        }

        shared.state.send_replace(SessionState::Connected);
        info!(session = %shared.name, url = %shared.url, "stream connected");
        if let Some(tx) = first.take() {
            let _ = tx.send(Ok(()));
        }

        let ping = tokio::spawn(ping_loop(shared.clone()));
        read_loop(&shared, source, &on_message).await;
        ping.abort();
        close_writer(&shared).await;

        if shared.finished.load(Ordering::SeqCst) {
            break;
        }
        info!(session = %shared.name, url = %shared.url, "stream lost, redialing");
        shared.state.send_replace(SessionState::Redialing);
    }

    shared.state.send_replace(SessionState::Stopped);
    debug!(session = %shared.name, "stream session finished");
}

async fn read_loop(shared: &SessionShared, mut source: WsSource, on_message: &MessageCallback) {
    loop {
        let next = tokio::select! {
            _ = shared.shutdown.notified() => break,
            next = source.next() => next,
        };
        if shared.finished.load(Ordering::SeqCst) {
            break;
        }

        match next {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = on_message(&text) {
                    warn!(session = %shared.name, error = %e, "stream callback failed");
                }
            }
            Some(Ok(Message::Close(frame))) => {
                info!(session = %shared.name, ?frame, "stream closed by peer");
                break;
            }
            Some(Ok(other)) => {
                trace!(session = %shared.name, kind = frame_kind(&other), "ignoring non-text frame");
            }
            Some(Err(e)) => {
                warn!(session = %shared.name, error = %e, "stream read failed");
                break;
            }
            None => {
                info!(session = %shared.name, "stream ended");
                break;
            }
        }
    }
}

async fn ping_loop(shared: Arc<SessionShared>) {
    let period = shared.config.ping_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let mut writer = shared.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            break;
        };
        match timeout(
            shared.config.ping_timeout,
            sink.send(Message::Ping(b"ping".to_vec())),
        )
        .await
        {
            Ok(Ok(())) => trace!(session = %shared.name, "ping sent"),
            Ok(Err(e)) => {
                warn!(session = %shared.name, error = %e, "ping failed");
                break;
            }
            Err(_) => {
                warn!(session = %shared.name, "ping timed out");
                break;
            }
        }
    }
}

async fn close_writer(shared: &SessionShared) {
    let sink = shared.writer.lock().await.take();
    if let Some(mut sink) = sink {
        let _ = timeout(shared.config.stop_timeout, sink.close()).await;
    }
}

fn frame_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    type Feed = mpsc::UnboundedSender<Result<Message, WsError>>;

    enum Dial {
        Fail,
        /// Never completes
        Hang,
        Connect(mpsc::UnboundedReceiver<Result<Message, WsError>>),
        /// Connects, but every write fails
        BrokenSink(mpsc::UnboundedReceiver<Result<Message, WsError>>),
    }

    struct ScriptedDialer {
        script: StdMutex<VecDeque<Dial>>,
        written: Arc<StdMutex<Vec<Message>>>,
    }

    impl ScriptedDialer {
        fn new(script: Vec<Dial>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into()),
                written: Arc::new(StdMutex::new(Vec::new())),
            })
        }

        /// Text frames written on any connection, in order
        fn sent_texts(&self) -> Vec<String> {
            self.written
                .lock()
                .unwrap()
                .iter()
                .filter_map(|message| match message {
                    Message::Text(text) => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl WsDialer for ScriptedDialer {
        async fn dial(&self, url: &str) -> Result<(WsSink, WsSource), ExchangeError> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Dial::Connect(rx)) => {
                    let sink = futures::sink::unfold(
                        self.written.clone(),
                        |written, message: Message| async move {
                            written.lock().unwrap().push(message);
                            Ok::<_, WsError>(written)
                        },
                    );
                    Ok((Box::pin(sink), Box::pin(rx)))
                }
                Some(Dial::BrokenSink(rx)) => {
                    let sink = futures::sink::unfold((), |(), _message: Message| async {
                        Err::<(), _>(WsError::ConnectionClosed)
                    });
                    Ok((Box::pin(sink), Box::pin(rx)))
                }
                Some(Dial::Hang) => futures::future::pending().await,
                Some(Dial::Fail) | None => Err(ExchangeError::NetworkError(format!(
                    "connection refused: {}",
                    url
                ))),
            }
        }
    }

    fn feed() -> (Feed, Dial) {
        let (tx, rx) = mpsc::unbounded();
        (tx, Dial::Connect(rx))
    }

    fn broken_feed() -> (Feed, Dial) {
        let (tx, rx) = mpsc::unbounded();
        (tx, Dial::BrokenSink(rx))
    }

    fn text(s: &str) -> Result<Message, WsError> {
        Ok(Message::Text(s.to_string()))
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_redial_until_connected_without_early_callbacks() {
        let (tx, connect) = feed();
        tx.unbounded_send(text("first")).unwrap();
        let dialer = ScriptedDialer::new(vec![Dial::Fail, Dial::Fail, Dial::Fail, connect]);
        let session = StreamSession::with_dialer(
            "wss://example.invalid/stream",
            "test",
            WsConfig::default(),
            dialer,
        );

        let state = session.state_watch();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let early = Arc::new(AtomicBool::new(false));
        let (seen_cb, early_cb) = (seen.clone(), early.clone());
        let callback: MessageCallback = Arc::new(move |msg: &str| {
            if *state.borrow() != SessionState::Connected {
                early_cb.store(true, Ordering::SeqCst);
            }
            seen_cb.lock().unwrap().push(msg.to_string());
            Ok(())
        });

        session.start(callback, None).await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.dial_attempts(), 4);

        wait_for(|| seen.lock().unwrap().len() == 1).await;
        assert!(!early.load(Ordering::SeqCst));
        assert_eq!(seen.lock().unwrap()[0], "first");

        session.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_triggers_exactly_one_redial() {
        let (tx1, connect1) = feed();
        let (tx2, connect2) = feed();
        let dialer = ScriptedDialer::new(vec![connect1, connect2]);
        let session = StreamSession::with_dialer(
            "wss://example.invalid/stream",
            "test",
            WsConfig::default(),
            dialer,
        );
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: MessageCallback = Arc::new(move |_msg: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        session.start(callback, None).await.unwrap();
        assert_eq!(session.dial_attempts(), 1);

        tx1.unbounded_send(Err(WsError::ConnectionClosed)).unwrap();
        wait_for(|| session.dial_attempts() == 2).await;
        wait_for(|| session.state() == SessionState::Connected).await;

        // well past several ping intervals and redial waits
        sleep(Duration::from_secs(30)).await;
        assert_eq!(session.dial_attempts(), 2);
        assert_eq!(session.state(), SessionState::Connected);

        tx2.unbounded_send(text("after redial")).unwrap();
        wait_for(|| count.load(Ordering::SeqCst) == 1).await;

        session.stop().await;
        session.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_error_keeps_connection() {
        let (tx, connect) = feed();
        let dialer = ScriptedDialer::new(vec![connect]);
        let session =
            StreamSession::with_dialer("wss://example.invalid", "test", WsConfig::default(), dialer);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: MessageCallback = Arc::new(move |msg: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            if msg == "bad" {
                Err(ExchangeError::DeserializationError("bad frame".to_string()))
            } else {
                Ok(())
            }
        });

        session.start(callback, None).await.unwrap();
        tx.unbounded_send(text("bad")).unwrap();
        tx.unbounded_send(Ok(Message::Binary(vec![1, 2, 3]))).unwrap();
        tx.unbounded_send(text("good")).unwrap();
        wait_for(|| count.load(Ordering::SeqCst) == 2).await;

        assert_eq!(session.dial_attempts(), 1);
        assert_eq!(session.state(), SessionState::Connected);
        session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fails_when_dial_budget_is_spent() {
        let dialer = ScriptedDialer::new(vec![Dial::Fail, Dial::Fail, Dial::Fail]);
        let session = StreamSession::with_dialer(
            "wss://example.invalid",
            "test",
            WsConfig::default().with_retry(3),
            dialer,
        );
        let callback: MessageCallback = Arc::new(|_msg: &str| Ok(()));
        let result = session.start(callback, None).await;
        assert!(result.is_err());
        assert_eq!(session.dial_attempts(), 3);
        wait_for(|| session.state() == SessionState::Stopped).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_connection() {
        let session = StreamSession::with_dialer(
            "wss://example.invalid",
            "test",
            WsConfig::default(),
            ScriptedDialer::new(Vec::new()),
        );
        assert!(matches!(
            session.send("hello").await,
            Err(ExchangeError::WebSocketError(_))
        ));
    }

    const SUBSCRIBE: &str = r#"{"type":"subscribe","channel":"btc_jpy-trades"}"#;

    #[tokio::test(start_paused = true)]
    async fn test_initial_payload_sent_on_every_connection() {
        let (tx1, connect1) = feed();
        let (_tx2, connect2) = feed();
        let dialer = ScriptedDialer::new(vec![connect1, connect2]);
        let session = StreamSession::with_dialer(
            "wss://example.invalid/stream",
            "test",
            WsConfig::default(),
            dialer.clone(),
        );

        session
            .start(Arc::new(|_msg: &str| Ok(())), Some(SUBSCRIBE.to_string()))
            .await
            .unwrap();
        assert_eq!(dialer.sent_texts(), [SUBSCRIBE]);

        tx1.unbounded_send(Err(WsError::ConnectionClosed)).unwrap();
        wait_for(|| session.dial_attempts() == 2).await;
        wait_for(|| session.state() == SessionState::Connected).await;
        assert_eq!(dialer.sent_texts(), [SUBSCRIBE, SUBSCRIBE]);

        session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_initial_payload_triggers_redial() {
        let (_tx1, broken) = broken_feed();
        let (_tx2, connect) = feed();
        let dialer = ScriptedDialer::new(vec![broken, connect]);
        let session = StreamSession::with_dialer(
            "wss://example.invalid/stream",
            "test",
            WsConfig::default(),
            dialer.clone(),
        );

        session
            .start(Arc::new(|_msg: &str| Ok(())), Some(SUBSCRIBE.to_string()))
            .await
            .unwrap();
        assert_eq!(session.dial_attempts(), 2);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(dialer.sent_texts(), [SUBSCRIBE]);

        session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_pending_start() {
        let dialer = ScriptedDialer::new(vec![Dial::Fail, Dial::Hang]);
        let session = Arc::new(StreamSession::with_dialer(
            "wss://example.invalid/stream",
            "test",
            WsConfig::default(),
            dialer,
        ));

        let starting = tokio::spawn({
            let session = session.clone();
            async move { session.start(Arc::new(|_msg: &str| Ok(())), None).await }
        });
        wait_for(|| session.dial_attempts() == 2).await;

        session.stop().await;
        let result = timeout(Duration::from_secs(5), starting).await.unwrap().unwrap();
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Stopped);

        // a stopped session stays stopped
        assert!(session.start(Arc::new(|_msg: &str| Ok(())), None).await.is_err());
        assert_eq!(session.dial_attempts(), 2);
    }
}
