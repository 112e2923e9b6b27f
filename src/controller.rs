//! Async driver around the synchronous [`Engine`].
//!
//! Each submitted run gets one reader task that opens the upstream stream,
//! decodes frames and applies them under the engine lock. Events are forwarded
//! to the sink channel and store writes to the persistence writer while that
//! lock is held, so both channels observe engine order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::StreamExt;
use stream_protocol::{
    ByteStream, CancellationSignal, Frame, FrameReader, QueryRequest, StreamApiClient,
    StreamApiError,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use turn_model::RunId;
use turn_store::{replay, TurnStore, TurnStoreError};

use crate::engine::{Engine, Submission, TransportEnd};
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::outbox::{spawn_writer, PersistOp};

/// The upstream agent service as the controller sees it.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Opens the push stream for one query. `cancel` only aborts connecting.
    async fn open(
        &self,
        request: &QueryRequest,
        cancel: &CancellationSignal,
    ) -> Result<ByteStream, StreamApiError>;

    /// Asks the upstream to stop the current turn.
    async fn interrupt(&self) -> Result<(), StreamApiError>;
}

#[async_trait]
impl Upstream for StreamApiClient {
    async fn open(
        &self,
        request: &QueryRequest,
        cancel: &CancellationSignal,
    ) -> Result<ByteStream, StreamApiError> {
        self.open_stream(request, Some(cancel)).await
    }

    async fn interrupt(&self) -> Result<(), StreamApiError> {
        StreamApiClient::interrupt(self).await
    }
}

struct Shared {
    engine: Mutex<Engine>,
    events: mpsc::UnboundedSender<EngineEvent>,
    persist: mpsc::UnboundedSender<PersistOp>,
}

impl Shared {
    /// Forwards events, then hands queued store writes to the writer.
    fn publish(&self, engine: &mut Engine, events: Vec<EngineEvent>) {
        for event in events {
            if self.events.send(event).is_err() {
                debug!("event sink closed; dropping engine event");
            }
        }
        for op in engine.drain_persistence() {
            if self.persist.send(op).is_err() {
                warn!("persistence writer stopped; dropping session record");
            }
        }
    }
}

struct ReaderHandle {
    cancel: CancellationSignal,
    task: JoinHandle<()>,
}

pub struct StreamController {
    shared: Arc<Shared>,
    upstream: Arc<dyn Upstream>,
    store: Arc<dyn TurnStore>,
    readers: Mutex<HashMap<RunId, ReaderHandle>>,
}

impl StreamController {
    /// Must be called inside a tokio runtime; the store writer starts immediately.
    pub fn new(
        engine: Engine,
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn TurnStore>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (persist, _writer) = spawn_writer(Arc::clone(&store));

        let controller = Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                events,
                persist,
            }),
            upstream,
            store,
            readers: Mutex::new(HashMap::new()),
        };
        (controller, receiver)
    }

    /// Read access to engine state, e.g. for cost or session display.
    pub fn with_engine<R>(&self, f: impl FnOnce(&Engine) -> R) -> R {
        let engine = lock_unpoisoned(&self.shared.engine);
        f(&*engine)
    }

    pub fn is_run_active(&self) -> bool {
        self.with_engine(Engine::is_run_active)
    }

    /// Starts a run and its reader task. Fails fast while another run is active.
    pub fn submit(&self, prompt: &str) -> Result<RunId, EngineError> {
        let (run_id, request) = {
            let mut engine = lock_unpoisoned(&self.shared.engine);
            let Submission {
                run_id,
                request,
                events,
            } = engine.submit(prompt)?;
            self.shared.publish(&mut engine, events);
            (run_id, request)
        };

        let cancel: CancellationSignal = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(pump(
            Arc::clone(&self.shared),
            Arc::clone(&self.upstream),
            run_id,
            request,
            Arc::clone(&cancel),
        ));

        let mut readers = lock_unpoisoned(&self.readers);
        readers.retain(|_, reader| !reader.task.is_finished());
        readers.insert(run_id, ReaderHandle { cancel, task });
        Ok(run_id)
    }

    /// Closes the active run locally, then signals the upstream.
    ///
    /// A failed upstream signal is reported as a transport notice; the local
    /// interrupt stands either way.
    pub async fn interrupt(&self) -> Result<RunId, EngineError> {
        let run_id = {
            let mut engine = lock_unpoisoned(&self.shared.engine);
            let (run_id, events) = engine.request_interrupt()?;
            self.shared.publish(&mut engine, events);
            run_id
        };

        {
            let readers = lock_unpoisoned(&self.readers);
            if let Some(reader) = readers.get(&run_id) {
                reader.cancel.store(true, Ordering::Release);
            }
        }

        if let Err(error) = self.upstream.interrupt().await {
            warn!(run_id, %error, "upstream interrupt request failed");
            let notice = EngineEvent::TransportNotice {
                message: format!("interrupt request failed: {error}"),
            };
            if self.shared.events.send(notice).is_err() {
                debug!("event sink closed; dropping interrupt notice");
            }
        }
        Ok(run_id)
    }

    pub fn reset(&self) -> Result<(), EngineError> {
        let mut engine = lock_unpoisoned(&self.shared.engine);
        let events = engine.reset()?;
        self.shared.publish(&mut engine, events);
        Ok(())
    }

    /// Resumes the session named by the store's active pointer, replaying its turns.
    ///
    /// Returns the restored session id, or `None` when the store has no pointer.
    pub fn restore_active_session(&self) -> Result<Option<String>, TurnStoreError> {
        let Some(session_id) = self.store.active_session()? else {
            return Ok(None);
        };
        let turns = replay(self.store.as_ref(), &session_id)?;

        let mut engine = lock_unpoisoned(&self.shared.engine);
        let events = engine.restore(&session_id, turns);
        let restored = !events.is_empty();
        self.shared.publish(&mut engine, events);
        Ok(restored.then_some(session_id))
    }

    /// Resolves once every store write queued so far has been applied.
    pub async fn flush_persistence(&self) {
        let (ack, done) = oneshot::channel();
        if self.shared.persist.send(PersistOp::Flush(ack)).is_err() {
            warn!("persistence writer stopped before flush");
            return;
        }
        if done.await.is_err() {
            warn!("persistence writer dropped a flush request");
        }
    }

    /// Waits until every reader task, including interrupted ones, has drained.
    pub async fn wait_for_readers(&self) {
        let tasks: Vec<(RunId, JoinHandle<()>)> = lock_unpoisoned(&self.readers)
            .drain()
            .map(|(run_id, reader)| (run_id, reader.task))
            .collect();

        for (run_id, task) in tasks {
            if let Err(error) = task.await {
                warn!(run_id, %error, "stream reader task failed");
            }
        }
    }
}

async fn pump(
    shared: Arc<Shared>,
    upstream: Arc<dyn Upstream>,
    run_id: RunId,
    request: QueryRequest,
    cancel: CancellationSignal,
) {
    let end = match upstream.open(&request, &cancel).await {
        Ok(stream) => read_stream(&shared, run_id, stream).await,
        Err(error) if error.is_cancelled() => {
            debug!(run_id, "connect abandoned after interrupt");
            TransportEnd::Closed
        }
        Err(error) => {
            warn!(run_id, %error, "failed to open query stream");
            TransportEnd::Failed(error.to_string())
        }
    };

    let mut engine = lock_unpoisoned(&shared.engine);
    let events = engine.finish_transport(run_id, end);
    shared.publish(&mut engine, events);
}

async fn read_stream(shared: &Shared, run_id: RunId, mut stream: ByteStream) -> TransportEnd {
    let mut reader = FrameReader::default();

    let end = loop {
        let Some(chunk) = stream.next().await else {
            break TransportEnd::Closed;
        };
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(error) => break TransportEnd::Failed(error.to_string()),
        };

        let frames = reader.feed(&bytes);
        if frames.is_empty() {
            continue;
        }
        let done = frames.iter().any(|frame| matches!(frame, Frame::Done));

        {
            let mut engine = lock_unpoisoned(&shared.engine);
            for frame in frames {
                let events = engine.apply(run_id, frame);
                shared.publish(&mut engine, events);
            }
        }

        if done {
            break TransportEnd::Closed;
        }
    };

    reader.finish();
    if reader.malformed_count() > 0 {
        info!(run_id, dropped = reader.malformed_count(), "stream contained malformed records");
    }
    end
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
