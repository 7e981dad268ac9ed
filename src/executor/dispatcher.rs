//! 调度器：单一工作线程串行执行全部引擎调用
//!
//! 任意多个生产者线程通过 `Dispatcher` 句柄提交命令，命令进入同一条队列，
//! 由调度线程按提交顺序逐条派发给引擎。调度线程独占引擎与会话状态：
//! - 派发需要会话的命令前先确保会话存在，并为命令盖上会话 ID（生成新值，不修改调用方的请求）
//! - 会话（重新）创建后立即重新下发活动配置，再执行后续命令
//! - 异步结果交给结果投递线程，同步结果经 oneshot 交还阻塞 / 等待中的调用方

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use super::envelope::{
    AsyncEnvelope, Callback, Classification, Envelope, PendingCallback, SinkItem, SyncEnvelope,
};
use super::lookahead::SuggestionLookahead;
use super::sink::ResultSink;
use crate::core::{
    BackendError, CancelMark, DispatchError, LogicalClock, RecoveryAction, RecoveryEngine,
    SessionState,
};
use crate::engine::{EngineBackend, StartupContext};
use crate::protocol::{
    CommandKind, ErrorCode, Input, Output, Request, SessionId, TriggeringKeyEvent,
    INVALID_SESSION_ID,
};

/// 调度器运行参数
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// 跳过 suggestion 时的队列前瞻深度，0 表示关闭
    pub suggestion_lookahead: usize,
    /// 是否合并可覆盖的异步结果
    pub squash_results: bool,
    /// 会话过期时是否自动重建
    pub recover_session: bool,
    pub worker_thread_name: String,
    pub sink_thread_name: String,
    pub startup: StartupContext,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            suggestion_lookahead: 1,
            squash_results: true,
            recover_session: true,
            worker_thread_name: "ime-dispatcher".to_string(),
            sink_thread_name: "ime-result-sink".to_string(),
            startup: StartupContext::default(),
        }
    }
}

struct Workers {
    dispatcher: JoinHandle<()>,
    sink: JoinHandle<()>,
}

impl Workers {
    /// 等待两个线程退出；在工作线程自身上调用时跳过对自己的 join
    fn join(self) {
        let current = thread::current().id();
        for handle in [self.dispatcher, self.sink] {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::error!("Worker thread {} panicked", name);
            }
        }
    }
}

struct Shared {
    tx: mpsc::UnboundedSender<Envelope>,
    clock: LogicalClock,
    cancel: CancelMark,
    workers: Mutex<Option<Workers>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let _ = self.tx.send(Envelope::Shutdown);
        let workers = self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            workers.join();
        }
    }
}

/// 调度器句柄，可廉价克隆并在线程间共享；最后一个句柄释放时关闭调度器
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// 初始化引擎并启动调度线程与结果投递线程；引擎初始化失败即启动失败
    pub fn start<B: EngineBackend>(
        mut backend: B,
        config: DispatcherConfig,
    ) -> Result<Self, DispatchError> {
        backend
            .initialize(&config.startup)
            .map_err(DispatchError::Startup)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let clock = LogicalClock::new();
        let cancel = CancelMark::new();

        let sink = ResultSink::new(sink_rx, cancel.clone(), config.squash_results);
        let sink = thread::Builder::new()
            .name(config.sink_thread_name.clone())
            .spawn(move || sink.run())
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;

        let worker = Worker {
            backend,
            rx,
            pending: VecDeque::new(),
            session: SessionState::new(),
            recovery: RecoveryEngine::new(config.recover_session),
            lookahead: SuggestionLookahead::new(config.suggestion_lookahead),
            cancel: cancel.clone(),
            sink: sink_tx,
        };
        let dispatcher = thread::Builder::new()
            .name(config.worker_thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;

        tracing::info!(
            lookahead = config.suggestion_lookahead,
            squash = config.squash_results,
            "Dispatcher started"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                tx,
                clock,
                cancel,
                workers: Mutex::new(Some(Workers { dispatcher, sink })),
            }),
        })
    }

    /// 异步提交：立即返回；回调（若有）在结果投递线程上至多调用一次
    pub fn submit_async(
        &self,
        input: Input,
        triggering_event: Option<TriggeringKeyEvent>,
        callback: Option<Callback>,
    ) {
        check_caller_contract(&input);
        let envelope = Envelope::Async(AsyncEnvelope {
            submitted_at: self.shared.clock.now(),
            input,
            triggering_event,
            callback,
        });
        if self.shared.tx.send(envelope).is_err() {
            tracing::warn!("Dispatcher terminated, dropping async request");
        }
    }

    /// 同步提交：阻塞当前线程直到调度线程处理完该命令
    ///
    /// 不能在异步运行时的工作线程上调用（会阻塞运行时），异步上下文请用 [`Dispatcher::call`]。
    pub fn submit_sync(&self, input: Input) -> Result<Output, DispatchError> {
        let rx = self.enqueue_sync(input)?;
        rx.blocking_recv().unwrap_or(Err(DispatchError::Terminated))
    }

    /// 同步提交的 async 版本：排队语义相同，等待方式为 `.await`
    pub async fn call(&self, input: Input) -> Result<Output, DispatchError> {
        let rx = self.enqueue_sync(input)?;
        rx.await.unwrap_or(Err(DispatchError::Terminated))
    }

    fn enqueue_sync(
        &self,
        input: Input,
    ) -> Result<oneshot::Receiver<Result<Output, DispatchError>>, DispatchError> {
        check_caller_contract(&input);
        let (responder, rx) = oneshot::channel();
        let envelope = Envelope::Sync(SyncEnvelope {
            submitted_at: self.shared.clock.now(),
            input,
            responder,
        });
        self.shared
            .tx
            .send(envelope)
            .map_err(|_| DispatchError::Terminated)?;
        Ok(rx)
    }

    /// 合并增量配置到活动配置并下发给引擎（只发不收）
    pub fn update_request(&self, delta: Request) {
        if self.shared.tx.send(Envelope::UpdateRequest(delta)).is_err() {
            tracing::warn!("Dispatcher terminated, dropping request update");
        }
    }

    /// 删除当前会话；之后需要会话的命令会创建新会话
    pub fn delete_session(&self) {
        let _ = self.shared.tx.send(Envelope::DeleteSession);
    }

    /// 健康检查：无会话时创建，会话失效时透明重建，返回当前会话 ID；
    /// 引擎不可达时返回错误，不重建
    ///
    /// 阻塞当前线程，异步上下文请用 [`Dispatcher::checked_session`]。
    pub fn check_session(&self) -> Result<SessionId, DispatchError> {
        let rx = self.enqueue_check_session()?;
        rx.blocking_recv().unwrap_or(Err(DispatchError::Terminated))
    }

    /// 健康检查的 async 版本
    pub async fn checked_session(&self) -> Result<SessionId, DispatchError> {
        let rx = self.enqueue_check_session()?;
        rx.await.unwrap_or(Err(DispatchError::Terminated))
    }

    fn enqueue_check_session(
        &self,
    ) -> Result<oneshot::Receiver<Result<SessionId, DispatchError>>, DispatchError> {
        let (responder, rx) = oneshot::channel();
        self.shared
            .tx
            .send(Envelope::CheckSession(responder))
            .map_err(|_| DispatchError::Terminated)?;
        Ok(rx)
    }

    /// 尽力取消：丢弃尚未派发的按键 / 光标 / 翻页命令，以及尚未投递的结果；
    /// 已经在引擎中执行的命令不受影响
    pub fn remove_pending_work(&self) {
        let now = self.shared.clock.now();
        self.shared.cancel.advance(now);
        tracing::debug!("Pending work cancelled");
    }

    /// 屏障：阻塞直到此前提交的所有工作都已派发且结果已投递
    ///
    /// 不能在异步运行时的工作线程上调用，异步上下文请用 [`Dispatcher::idle`]。
    pub fn wait_for_idle(&self) {
        if let Some(rx) = self.enqueue_barrier() {
            let _ = rx.blocking_recv();
        }
    }

    /// 屏障的 async 版本
    pub async fn idle(&self) {
        if let Some(rx) = self.enqueue_barrier() {
            let _ = rx.await;
        }
    }

    fn enqueue_barrier(&self) -> Option<oneshot::Receiver<()>> {
        let (done, rx) = oneshot::channel();
        self.shared.tx.send(Envelope::Barrier(done)).ok()?;
        Some(rx)
    }

    /// 删除会话、停止并等待两个工作线程；之后的同步提交返回 `Terminated`
    pub fn shutdown(&self) {
        let _ = self.shared.tx.send(Envelope::Shutdown);
        let workers = self
            .shared
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            workers.join();
            tracing::info!("Dispatcher shut down");
        }
    }
}

/// 调用方违反约定属于集成代码的 bug，直接 panic
fn check_caller_contract(input: &Input) {
    assert!(
        !input.kind.is_reserved(),
        "{:?} is issued by the dispatcher itself and cannot be submitted",
        input.kind
    );
    assert!(
        input.id().is_none(),
        "session id {:?} was set by the caller; only the dispatcher stamps session ids",
        input.id()
    );
}

/// 调度线程
struct Worker<B> {
    backend: B,
    rx: mpsc::UnboundedReceiver<Envelope>,
    /// 已从通道取出但尚未处理的元素，供前瞻使用
    pending: VecDeque<Envelope>,
    session: SessionState,
    recovery: RecoveryEngine,
    lookahead: SuggestionLookahead,
    cancel: CancelMark,
    sink: mpsc::UnboundedSender<SinkItem>,
}

impl<B: EngineBackend> Worker<B> {
    fn run(mut self) {
        tracing::debug!("Dispatcher worker started");
        while let Some(envelope) = self.next_envelope() {
            match envelope {
                Envelope::Async(envelope) => self.handle_async(envelope),
                Envelope::Sync(envelope) => self.handle_sync(envelope),
                Envelope::UpdateRequest(delta) => self.update_request(&delta),
                Envelope::CheckSession(responder) => {
                    let checked = self.check_session();
                    let _ = responder.send(checked);
                }
                Envelope::DeleteSession => self.delete_session(),
                Envelope::Barrier(done) => self.forward_barrier(done),
                Envelope::Shutdown => break,
            }
        }
        self.delete_session();
        tracing::debug!("Dispatcher worker stopped");
    }

    fn next_envelope(&mut self) -> Option<Envelope> {
        let next = match self.pending.pop_front() {
            Some(envelope) => Some(envelope),
            None => self.rx.blocking_recv(),
        };
        while let Ok(envelope) = self.rx.try_recv() {
            self.pending.push_back(envelope);
        }
        next
    }

    fn handle_async(&mut self, envelope: AsyncEnvelope) {
        let AsyncEnvelope {
            submitted_at,
            input,
            triggering_event,
            callback,
        } = envelope;

        if input.is_cancellable() && self.cancel.is_cancelled(submitted_at) {
            tracing::debug!(kind = ?input.kind, "Discarding cancelled request");
            return;
        }

        let input = if self.lookahead.should_skip(&input, &self.pending) {
            input.without_suggestion()
        } else {
            input
        };
        let outcome = self.evaluate(&input);

        match callback {
            Some(callback) => {
                let item = SinkItem::Result(PendingCallback {
                    submitted_at,
                    classification: Classification::of(&input, &outcome),
                    outcome,
                    triggering_event,
                    callback,
                });
                if self.sink.send(item).is_err() {
                    tracing::warn!("Result sink closed, dropping callback");
                }
            }
            None => {
                if let Err(e) = outcome {
                    tracing::warn!(kind = ?input.kind, "Async request failed: {}", e);
                }
            }
        }
    }

    fn handle_sync(&mut self, envelope: SyncEnvelope) {
        let SyncEnvelope {
            submitted_at,
            input,
            responder,
        } = envelope;

        let outcome = if input.is_cancellable() && self.cancel.is_cancelled(submitted_at) {
            Err(DispatchError::Cancelled)
        } else {
            self.evaluate(&input)
        };
        if responder.send(outcome).is_err() {
            tracing::debug!(kind = ?input.kind, "Sync caller went away before completion");
        }
    }

    /// 派发一条命令，按恢复引擎的建议处理会话过期与损坏响应
    fn evaluate(&mut self, input: &Input) -> Result<Output, DispatchError> {
        let requires_session = input.kind.requires_session();
        let mut attempt = 0;
        loop {
            let outcome = if requires_session {
                let id = self.ensure_session()?;
                tracing::debug!(kind = ?input.kind, session_id = id, "Dispatching");
                self.backend.evaluate(&input.stamped(id))
            } else {
                tracing::debug!(kind = ?input.kind, "Dispatching");
                self.backend.evaluate(input)
            };

            match self.recovery.handle(requires_session, &outcome, attempt) {
                RecoveryAction::Deliver => return outcome.map_err(DispatchError::from),
                RecoveryAction::TreatAsEmpty => {
                    if let Err(e) = &outcome {
                        tracing::warn!(kind = ?input.kind, "Treating response as empty: {}", e);
                    }
                    return Ok(Output::default());
                }
                RecoveryAction::RecreateSession => {
                    let stale = self.session.invalidate();
                    tracing::warn!(stale_session = ?stale, kind = ?input.kind, "Session expired, recreating");
                    attempt += 1;
                }
                RecoveryAction::Escalate => {
                    return Err(match outcome {
                        Err(e) => {
                            tracing::error!(kind = ?input.kind, "Engine call failed: {}", e);
                            e.into()
                        }
                        Ok(_) => {
                            self.session.invalidate();
                            tracing::error!(kind = ?input.kind, "Session could not be re-established");
                            DispatchError::SessionLost(input.kind)
                        }
                    });
                }
            }
        }
    }

    /// 幂等：已有会话直接返回；否则创建会话并重新下发活动配置
    fn ensure_session(&mut self) -> Result<SessionId, DispatchError> {
        if let Some(id) = self.session.id() {
            return Ok(id);
        }

        let created = match self.backend.evaluate(&Input::new(CommandKind::CreateSession)) {
            Ok(output) => output,
            Err(BackendError::Malformed(e)) => {
                tracing::warn!("Malformed CreateSession response: {}", e);
                Output::default()
            }
            Err(e) => {
                tracing::error!("Failed to create session: {}", e);
                return Err(e.into());
            }
        };
        if created.error_code != ErrorCode::Success || created.id == INVALID_SESSION_ID {
            tracing::error!(error_code = ?created.error_code, "Engine refused to create a session");
            return Err(DispatchError::SessionLost(CommandKind::CreateSession));
        }

        self.session.activate(created.id);
        tracing::info!(session_id = created.id, "Session created");
        // 活动配置未下发成功的会话不能交给后续命令使用
        if let Err(e) = self.apply_request(created.id) {
            tracing::error!(session_id = created.id, "Failed to apply active request: {}", e);
            self.delete_session();
            return Err(e);
        }
        Ok(created.id)
    }

    /// 把当前活动配置下发给指定会话
    fn apply_request(&mut self, id: SessionId) -> Result<(), DispatchError> {
        let input = Input::new(CommandKind::SetRequest)
            .with_request(self.session.active_request().clone())
            .stamped(id);
        match self.backend.evaluate(&input) {
            Ok(output) if output.error_code == ErrorCode::Success => Ok(()),
            Ok(output) => {
                tracing::warn!(error_code = ?output.error_code, session_id = id, "Engine rejected active request");
                Ok(())
            }
            Err(BackendError::Malformed(e)) => {
                tracing::warn!(session_id = id, "Malformed SetRequest response: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_request(&mut self, delta: &Request) {
        self.session.merge_request(delta);
        let applied = match self.session.id() {
            Some(id) => self.apply_request(id),
            None => self.ensure_session().map(|_| ()),
        };
        if let Err(e) = applied {
            tracing::warn!("Failed to apply request update: {}", e);
        }
    }

    fn check_session(&mut self) -> Result<SessionId, DispatchError> {
        let Some(id) = self.session.id() else {
            return self.ensure_session();
        };
        let ping = Input::new(CommandKind::NoOperation).stamped(id);
        match self.backend.evaluate(&ping) {
            Ok(output) if output.is_session_failure() => {}
            Ok(_) => return Ok(id),
            Err(BackendError::Malformed(e)) => {
                tracing::warn!(session_id = id, "Malformed health check response: {}", e);
                return Ok(id);
            }
            Err(e) => {
                tracing::error!(session_id = id, "Health check failed: {}", e);
                return Err(e.into());
            }
        }
        tracing::warn!(session_id = id, "Session expired, recreating");
        self.delete_session();
        self.ensure_session()
    }

    fn delete_session(&mut self) {
        let Some(id) = self.session.invalidate() else {
            return;
        };
        let input = Input::new(CommandKind::DeleteSession).stamped(id);
        match self.backend.evaluate(&input) {
            Ok(_) => tracing::info!(session_id = id, "Session deleted"),
            Err(e) => tracing::warn!(session_id = id, "Failed to delete session: {}", e),
        }
    }

    fn forward_barrier(&mut self, done: oneshot::Sender<()>) {
        if let Err(mpsc::error::SendError(SinkItem::Barrier(done))) =
            self.sink.send(SinkItem::Barrier(done))
        {
            let _ = done.send(());
        }
    }
}
