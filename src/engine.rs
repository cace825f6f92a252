use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use opencode_api::{ApiConfig, ApiError, ServerClient, SseFrameParser};
use session_state::{ServerEvent, StateStore};

use crate::supervisor::{ConnectionPhase, ReconnectPolicy, ReconnectSupervisor};

/// Fan-out buffer for decoded events. Slow subscribers that fall further
/// behind than this observe a lag error, not back-pressure on the stream.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Tunables for one engine instance.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub api: ApiConfig,
    pub reconnect: ReconnectPolicy,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig::new(base_url),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// The streaming state-synchronization engine.
///
/// Owns the push-stream pump, the reconciliation store, and the typed event
/// fan-out. Engines are explicitly constructed and independent: tests can run
/// several against different endpoints without shared state.
///
/// Consumers read the store through [`SyncEngine::store`]; reads always see
/// the latest fully-merged snapshot and never wait on the network. Connection
/// phase is published on a watch channel, so late subscribers observe the
/// current phase immediately; per-part deltas are deliberately not replayed.
pub struct SyncEngine {
    client: Arc<ServerClient>,
    store: Arc<Mutex<StateStore>>,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    events: broadcast::Sender<ServerEvent>,
    policy: ReconnectPolicy,
    pump: Mutex<TaskSlot>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ApiError> {
        let client = Arc::new(ServerClient::new(config.api)?);
        let (phase, _) = watch::channel(ConnectionPhase::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            store: Arc::new(Mutex::new(StateStore::new())),
            phase: Arc::new(phase),
            events,
            policy: config.reconnect,
            pump: Mutex::new(TaskSlot::default()),
        })
    }

    /// Shared handle to the reconciliation store.
    pub fn store(&self) -> Arc<Mutex<StateStore>> {
        Arc::clone(&self.store)
    }

    /// The snapshot/command client, for callers issuing commands directly.
    pub fn client(&self) -> &ServerClient {
        &self.client
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// True while the pump task is alive (connected or retrying).
    pub fn is_running(&self) -> bool {
        lock(&self.pump).is_active()
    }

    /// Start consuming the event stream. A no-op while a pump is already
    /// open or opening; there is never more than one live stream per engine.
    ///
    /// Calling this while the phase is parked at `Error` implies a reset:
    /// the new pump starts with a fresh attempt budget, exactly as if
    /// `reset` had been called first.
    pub fn connect(&self) {
        let mut pump = lock(&self.pump);
        if pump.is_active() {
            debug!("event stream already running");
            return;
        }

        let task = PumpTask {
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            phase: Arc::clone(&self.phase),
            events: self.events.clone(),
            supervisor: ReconnectSupervisor::new(self.policy.clone()),
        };
        pump.replace(tokio::spawn(task.run()));
    }

    /// Stop the stream and cancel any pending reconnect timer.
    pub fn disconnect(&self) {
        lock(&self.pump).cancel();
        self.phase.send_replace(ConnectionPhase::Disconnected);
        debug!("event stream disconnected");
    }

    /// Recover from the terminal error phase: tear everything down and clear
    /// the attempt budget so the next `connect` starts fresh.
    pub fn reset(&self) {
        info!("resetting connection");
        self.disconnect();
    }

    // ---- snapshot seeding ----

    /// Load the session list into the store, replacing what is there. Run
    /// before `connect` so the stream's deltas land on current state.
    pub async fn load_sessions(&self) -> Result<(), ApiError> {
        let sessions = self.client.list_sessions().await?;
        lock(&self.store).set_sessions(sessions);
        Ok(())
    }

    /// Load a session's message history into the store.
    pub async fn load_messages(&self, session_id: &str) -> Result<(), ApiError> {
        let messages = self.client.list_messages(session_id).await?;
        lock(&self.store).set_messages(session_id, messages);
        Ok(())
    }

    /// Load a session's todo list into the store.
    pub async fn load_todos(&self, session_id: &str) -> Result<(), ApiError> {
        let todos = self.client.list_todos(session_id).await?;
        lock(&self.store).set_todos(session_id, todos);
        Ok(())
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        lock(&self.pump).cancel();
    }
}

/// Single-slot holder for the pump task: replacing or cancelling always
/// aborts the previous task first, so at most one timer or stream is ever
/// in flight.
#[derive(Debug, Default)]
struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    fn replace(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.handle = Some(handle);
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

struct PumpTask {
    client: Arc<ServerClient>,
    store: Arc<Mutex<StateStore>>,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    events: broadcast::Sender<ServerEvent>,
    supervisor: ReconnectSupervisor,
}

impl PumpTask {
    async fn run(mut self) {
        loop {
            self.phase.send_replace(ConnectionPhase::Connecting);

            match self.pump_stream().await {
                Ok(()) => info!("event stream closed by server"),
                Err(error) => warn!(%error, "event stream failed"),
            }
            self.phase.send_replace(ConnectionPhase::Error);

            match self.supervisor.next_delay() {
                Some(delay) => {
                    self.phase.send_replace(ConnectionPhase::Reconnecting);
                    debug!(
                        attempt = self.supervisor.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        attempts = self.supervisor.attempts(),
                        "reconnect ceiling reached; staying in error phase until reset"
                    );
                    return;
                }
            }
        }
    }

    async fn pump_stream(&mut self) -> Result<(), ApiError> {
        let response = self.client.open_event_stream().await?;
        self.phase.send_replace(ConnectionPhase::Connected);
        self.supervisor.confirm_connected();
        info!("event stream connected");

        let mut bytes = response.bytes_stream();
        let mut parser = SseFrameParser::default();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(ApiError::from)?;
            for event in parser.feed(&chunk) {
                self.apply_and_publish(event);
            }
        }

        Ok(())
    }

    /// One event is merged to completion before the next is examined. The
    /// store lock is released before fan-out so subscribers woken by the
    /// event read the already-merged snapshot.
    fn apply_and_publish(&self, event: ServerEvent) {
        {
            lock(&self.store).apply(&event);
        }
        let _ = self.events.send(event);
    }
}

/// Lock that survives a poisoned mutex: a panicked consumer must not make
/// the store permanently unreadable for the pump or other readers.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
