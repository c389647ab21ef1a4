//! Scripted in-memory [`Driver`] for exercising the lifecycle without a server.
//!
//! ```rust
//! use sql_txn_middleware::test_utils::{Call, FakeDriver};
//!
//! let driver = FakeDriver::new().with_result(Default::default());
//! assert!(driver.calls().is_empty());
//! # let _ = Call::Begin;
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::binder::BoundRequest;
use crate::driver::{Driver, RawDriverResult, RowEventStream, StreamEvent, StreamSummary};
use crate::error::DriverError;
use crate::types::ConnectionMode;

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(ConnectionMode),
    Begin,
    Execute(String),
    ExecuteStream(String),
    Commit,
    Rollback,
    Release,
    CloseAll,
}

/// Connection handed out by [`FakeDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeConnection {
    pub id: usize,
    pub mode: ConnectionMode,
}

type ScriptedStream = Vec<Result<StreamEvent, DriverError>>;

#[derive(Default)]
struct Failures {
    connect: Option<DriverError>,
    begin: Option<DriverError>,
    execute: Option<DriverError>,
    commit: Option<DriverError>,
    rollback: Option<DriverError>,
}

/// Driver double. Results and streams are served in the order they were
/// queued; each injected failure fires once.
#[derive(Default)]
pub struct FakeDriver {
    calls: Mutex<Vec<Call>>,
    requests: Mutex<Vec<BoundRequest>>,
    results: Mutex<VecDeque<RawDriverResult>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    failures: Mutex<Failures>,
    next_id: Mutex<usize>,
}

impl std::fmt::Debug for FakeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDriver")
            .field("calls", &*lock(&self.calls))
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `execute`.
    #[must_use]
    pub fn with_result(self, result: RawDriverResult) -> Self {
        lock(&self.results).push_back(result);
        self
    }

    /// Queue the events of the next `execute_stream`.
    #[must_use]
    pub fn with_stream(self, events: Vec<StreamEvent>) -> Self {
        lock(&self.streams).push_back(events.into_iter().map(Ok).collect());
        self
    }

    /// Queue raw stream items, errors included.
    #[must_use]
    pub fn with_stream_items(self, items: Vec<Result<StreamEvent, DriverError>>) -> Self {
        lock(&self.streams).push_back(items);
        self
    }

    #[must_use]
    pub fn fail_connect(self, err: DriverError) -> Self {
        lock(&self.failures).connect = Some(err);
        self
    }

    #[must_use]
    pub fn fail_begin(self, err: DriverError) -> Self {
        lock(&self.failures).begin = Some(err);
        self
    }

    /// Fail the next `execute` or `execute_stream`.
    #[must_use]
    pub fn fail_execute(self, err: DriverError) -> Self {
        lock(&self.failures).execute = Some(err);
        self
    }

    #[must_use]
    pub fn fail_commit(self, err: DriverError) -> Self {
        lock(&self.failures).commit = Some(err);
        self
    }

    #[must_use]
    pub fn fail_rollback(self, err: DriverError) -> Self {
        lock(&self.failures).rollback = Some(err);
        self
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Every request passed to `execute` or `execute_stream`.
    #[must_use]
    pub fn requests(&self) -> Vec<BoundRequest> {
        lock(&self.requests).clone()
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    fn take_failure(
        &self,
        pick: impl FnOnce(&mut Failures) -> &mut Option<DriverError>,
    ) -> Result<(), DriverError> {
        let mut failures = lock(&self.failures);
        match pick(&mut *failures).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Driver for FakeDriver {
    type Connection = FakeConnection;

    async fn connect(&self, mode: ConnectionMode) -> Result<FakeConnection, DriverError> {
        self.record(Call::Connect(mode));
        self.take_failure(|f| &mut f.connect)?;
        let mut next = lock(&self.next_id);
        *next += 1;
        Ok(FakeConnection { id: *next, mode })
    }

    async fn begin(&self, _conn: &mut FakeConnection) -> Result<(), DriverError> {
        self.record(Call::Begin);
        self.take_failure(|f| &mut f.begin)
    }

    async fn commit(&self, _conn: &mut FakeConnection) -> Result<(), DriverError> {
        self.record(Call::Commit);
        self.take_failure(|f| &mut f.commit)
    }

    async fn rollback(&self, _conn: &mut FakeConnection) -> Result<(), DriverError> {
        self.record(Call::Rollback);
        self.take_failure(|f| &mut f.rollback)
    }

    async fn execute(
        &self,
        _conn: &mut FakeConnection,
        request: &BoundRequest,
    ) -> Result<RawDriverResult, DriverError> {
        self.record(Call::Execute(request.text.clone()));
        lock(&self.requests).push(request.clone());
        self.take_failure(|f| &mut f.execute)?;
        Ok(lock(&self.results).pop_front().unwrap_or_default())
    }

    async fn execute_stream<'a>(
        &'a self,
        _conn: &'a mut FakeConnection,
        request: &'a BoundRequest,
    ) -> Result<RowEventStream<'a>, DriverError> {
        self.record(Call::ExecuteStream(request.text.clone()));
        lock(&self.requests).push(request.clone());
        self.take_failure(|f| &mut f.execute)?;
        let items = lock(&self.streams)
            .pop_front()
            .unwrap_or_else(|| vec![Ok(StreamEvent::Done(StreamSummary::default()))]);
        Ok(futures_util::stream::iter(items).boxed())
    }

    async fn release(&self, _conn: FakeConnection) {
        self.record(Call::Release);
    }

    async fn close_all(&self) {
        self.record(Call::CloseAll);
    }
}
