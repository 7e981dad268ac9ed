//! 对外门面：把类型化的输入法操作翻译成调度器提交
//!
//! `ImeClient` 是 `Dispatcher` 上的一层薄包装：
//! - 按键 / 候选 / 光标 / 翻页等渲染类操作走异步提交，结果经回调投递
//! - 配置读写、学习数据清理、存储读取、用户词典命令会阻塞到引擎处理完成
//!
//! 进程内单实例由组合根持有的 `ClientSlot` 管理，测试可换入新实例并取回旧实例。

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::DispatchError;
use crate::engine::EngineBackend;
use crate::executor::{Callback, Dispatcher, DispatcherConfig};
use crate::protocol::{
    CommandKind, Config, Input, InputFieldType, KeyEvent, Output, Request, SessionCommand,
    SessionId, StorageEntry, StorageType, SurroundingContext, TriggeringKeyEvent,
    UsageStatsEvent, UserDictionaryCommand, UserDictionaryStatus,
};

/// 输入法客户端（可克隆，克隆共享同一个调度器）
#[derive(Clone)]
pub struct ImeClient {
    dispatcher: Dispatcher,
}

impl ImeClient {
    /// 初始化引擎并启动调度器
    pub fn start<B: EngineBackend>(
        backend: B,
        config: DispatcherConfig,
    ) -> Result<Self, DispatchError> {
        Ok(Self::from_dispatcher(Dispatcher::start(backend, config)?))
    }

    pub fn from_dispatcher(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // ---------- 渲染类操作（异步） ----------

    /// 按键求值；`triggering_event` 原样随回调交还，供 UI 透传未消费的按键
    pub fn send_key(
        &self,
        key: KeyEvent,
        context: Option<SurroundingContext>,
        triggering_event: Option<TriggeringKeyEvent>,
        callback: Option<Callback>,
    ) {
        let mut input = Input::send_key(key);
        if let Some(context) = context {
            input = input.with_context(context);
        }
        self.dispatcher
            .submit_async(input, triggering_event, callback);
    }

    /// 上屏当前组字
    pub fn submit(&self, callback: Option<Callback>) {
        self.send_command(SessionCommand::Submit, callback);
    }

    /// 上屏指定候选；给出候选所在行时一并记录使用统计
    pub fn submit_candidate(
        &self,
        candidate_id: i32,
        row_index: Option<u32>,
        callback: Option<Callback>,
    ) {
        self.send_command(
            SessionCommand::SubmitCandidate { id: candidate_id },
            callback,
        );
        if let Some(row) = row_index {
            self.send_usage_stats_event(UsageStatsEvent::SubmittedCandidateRow(row));
        }
    }

    /// 清空组字与上下文（如输入框切换后）
    pub fn reset_context(&self) {
        self.send_command(SessionCommand::ResetContext, None);
    }

    pub fn move_cursor(&self, position: usize, callback: Option<Callback>) {
        self.send_command(SessionCommand::MoveCursor { position }, callback);
    }

    pub fn page_down(&self, callback: Option<Callback>) {
        self.send_command(SessionCommand::ConvertNextPage, callback);
    }

    pub fn page_up(&self, callback: Option<Callback>) {
        self.send_command(SessionCommand::ConvertPrevPage, callback);
    }

    pub fn switch_input_field_type(&self, field_type: InputFieldType) {
        self.send_command(SessionCommand::SwitchInputFieldType { field_type }, None);
    }

    pub fn undo_or_rewind(&self, callback: Option<Callback>) {
        self.send_command(SessionCommand::UndoOrRewind, callback);
    }

    pub fn expand_suggestion(&self, callback: Option<Callback>) {
        self.send_command(SessionCommand::ExpandSuggestion, callback);
    }

    pub fn send_usage_stats_event(&self, event: UsageStatsEvent) {
        self.send_command(SessionCommand::UsageStatsEvent { event }, None);
    }

    fn send_command(&self, command: SessionCommand, callback: Option<Callback>) {
        self.dispatcher
            .submit_async(Input::send_command(command), None, callback);
    }

    // ---------- 配置 ----------

    /// 合并增量请求到活动配置；会话重建后自动重新下发
    pub fn update_request(&self, delta: Request) {
        self.dispatcher.update_request(delta);
    }

    /// 写入引擎配置，阻塞到生效
    pub fn set_config(&self, config: Config) -> Result<Output, DispatchError> {
        self.dispatcher
            .submit_sync(Input::new(CommandKind::SetConfig).with_config(config))
    }

    pub fn get_config(&self) -> Result<Config, DispatchError> {
        let output = self.dispatcher.submit_sync(Input::new(CommandKind::GetConfig))?;
        Ok(output.config.unwrap_or_default())
    }

    /// 外部强制配置（如企业策略），与引擎配置合并
    pub fn set_imposed_config(&self, config: Config) {
        self.dispatcher.submit_async(
            Input::new(CommandKind::SetImposedConfig).with_config(config),
            None,
            None,
        );
    }

    // ---------- 维护命令 ----------

    /// 清除学习历史，返回时引擎已处理完成
    pub fn clear_user_history(&self) -> Result<(), DispatchError> {
        self.maintenance(CommandKind::ClearUserHistory)
    }

    pub fn clear_user_prediction(&self) -> Result<(), DispatchError> {
        self.maintenance(CommandKind::ClearUserPrediction)
    }

    pub fn clear_unused_user_prediction(&self) -> Result<(), DispatchError> {
        self.maintenance(CommandKind::ClearUnusedUserPrediction)
    }

    fn maintenance(&self, kind: CommandKind) -> Result<(), DispatchError> {
        self.dispatcher.submit_sync(Input::new(kind)).map(|_| ())
    }

    /// 重新加载词典与配置
    pub fn reload(&self) {
        self.dispatcher
            .submit_async(Input::new(CommandKind::Reload), None, None);
    }

    /// 把学习数据落盘
    pub fn sync_data(&self) {
        self.dispatcher
            .submit_async(Input::new(CommandKind::SyncData), None, None);
    }

    // ---------- 通用存储 ----------

    pub fn insert_to_storage(&self, entry: StorageEntry) {
        self.dispatcher.submit_async(
            Input::new(CommandKind::InsertToStorage).with_storage_entry(entry),
            None,
            None,
        );
    }

    /// 读取某类存储的全部条目
    pub fn read_all_from_storage(
        &self,
        storage_type: StorageType,
    ) -> Result<Vec<StorageEntry>, DispatchError> {
        let selector = StorageEntry::new(storage_type, "", Vec::new());
        let output = self.dispatcher.submit_sync(
            Input::new(CommandKind::ReadAllFromStorage).with_storage_entry(selector),
        )?;
        Ok(output.storage_entries)
    }

    pub fn clear_storage(&self, storage_type: StorageType) {
        let selector = StorageEntry::new(storage_type, "", Vec::new());
        self.dispatcher.submit_async(
            Input::new(CommandKind::ClearStorage).with_storage_entry(selector),
            None,
            None,
        );
    }

    pub fn send_user_dictionary_command(
        &self,
        command: UserDictionaryCommand,
    ) -> Result<UserDictionaryStatus, DispatchError> {
        let output = self.dispatcher.submit_sync(
            Input::new(CommandKind::SendUserDictionaryCommand)
                .with_user_dictionary_command(command),
        )?;
        Ok(output.user_dictionary_status.unwrap_or_default())
    }

    // ---------- 生命周期 ----------

    pub fn remove_pending_work(&self) {
        self.dispatcher.remove_pending_work();
    }

    pub fn wait_for_idle(&self) {
        self.dispatcher.wait_for_idle();
    }

    pub fn check_session(&self) -> Result<SessionId, DispatchError> {
        self.dispatcher.check_session()
    }

    pub fn delete_session(&self) {
        self.dispatcher.delete_session();
    }

    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }
}

/// 进程内唯一客户端的持有者
///
/// 首次使用时创建；测试可用 `swap` 换入新实例，返回值为旧实例以便恢复。
#[derive(Default)]
pub struct ClientSlot {
    client: Mutex<Option<ImeClient>>,
}

impl ClientSlot {
    pub const fn new() -> Self {
        Self {
            client: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ImeClient>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 已有实例时直接返回；否则用 `init` 创建并保存（持锁期间创建，保证只创建一次）
    pub fn get_or_try_init<F>(&self, init: F) -> Result<ImeClient, DispatchError>
    where
        F: FnOnce() -> Result<ImeClient, DispatchError>,
    {
        let mut slot = self.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = init()?;
        *slot = Some(client.clone());
        Ok(client)
    }

    pub fn get(&self) -> Option<ImeClient> {
        self.lock().clone()
    }

    /// 换入新实例（`None` 表示清空），返回旧实例
    pub fn swap(&self, client: Option<ImeClient>) -> Option<ImeClient> {
        std::mem::replace(&mut *self.lock(), client)
    }

    pub fn take(&self) -> Option<ImeClient> {
        self.swap(None)
    }
}
