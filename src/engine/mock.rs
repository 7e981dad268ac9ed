//! Mock 引擎（用于测试与演示，无需真实转换引擎）
//!
//! 每个会话维护一个组字缓冲：字符键追加、Enter / Submit 上屏、Backspace 删除，
//! 候选为缓冲原文、大写形式以及可选的 suggestion。
//! `MockEngineControl` 与引擎共享，测试可以借它记录收到的请求、暂停引擎、注入失败。

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::core::BackendError;
use crate::engine::{EngineBackend, StartupContext};
use crate::protocol::{
    Candidate, CandidateList, CommandKind, CommitResult, Config, DeletionRange, ErrorCode,
    InputFieldType, Input, KeyEvent, ModifierKey, Output, Preedit, Request, SessionCommand,
    SessionId, SpecialKey, StorageEntry, StorageType, UserDictionaryCommand, UserDictionaryEntry,
    UserDictionaryStatus,
};

const DEFAULT_PAGE_SIZE: usize = 9;

/// 计划中的失败：第 `nth` 次收到 `kind` 时返回 `error`
#[derive(Debug)]
struct ScheduledFailure {
    kind: CommandKind,
    nth: usize,
    error: BackendError,
}

#[derive(Debug, Default)]
struct ControlState {
    inputs: Vec<Input>,
    counts: HashMap<CommandKind, usize>,
    paused: bool,
    failures: Vec<ScheduledFailure>,
    expire_sessions: bool,
    reject_sessions: bool,
    initialize_error: Option<BackendError>,
    initialized: bool,
}

#[derive(Debug, Default)]
struct ControlInner {
    state: Mutex<ControlState>,
    resumed: Condvar,
}

/// 单次求值前从探针取出的指令
#[derive(Debug, Clone, Copy, Default)]
struct Directives {
    expire_sessions: bool,
    reject_sessions: bool,
}

/// 观测与操控 Mock 引擎的句柄
#[derive(Clone, Debug, Default)]
pub struct MockEngineControl {
    inner: Arc<ControlInner>,
}

impl MockEngineControl {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 之后的 evaluate 调用阻塞，直到 `resume`
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        self.inner.resumed.notify_all();
    }

    /// 第 `nth`（从 1 开始）次收到 `kind` 时返回 `error`
    pub fn fail_nth(&self, kind: CommandKind, nth: usize, error: BackendError) {
        self.lock().failures.push(ScheduledFailure { kind, nth, error });
    }

    /// 下一次求值前丢弃所有会话，模拟引擎重启
    pub fn expire_sessions(&self) {
        self.lock().expire_sessions = true;
    }

    /// 为真时所有带会话的命令都返回 SessionFailure
    pub fn reject_sessions(&self, reject: bool) {
        self.lock().reject_sessions = reject;
    }

    pub fn fail_initialize(&self, error: BackendError) {
        self.lock().initialize_error = Some(error);
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// 引擎按顺序收到的全部请求
    pub fn inputs(&self) -> Vec<Input> {
        self.lock().inputs.clone()
    }

    pub fn inputs_of(&self, kind: CommandKind) -> Vec<Input> {
        self.lock()
            .inputs
            .iter()
            .filter(|input| input.kind == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: CommandKind) -> usize {
        self.lock().counts.get(&kind).copied().unwrap_or(0)
    }

    fn initialize(&self) -> Result<(), BackendError> {
        let mut state = self.lock();
        if let Some(error) = state.initialize_error.take() {
            return Err(error);
        }
        state.initialized = true;
        Ok(())
    }

    fn record(&self, input: &Input) -> Result<Directives, BackendError> {
        let mut state = self.lock();
        while state.paused {
            state = self
                .inner
                .resumed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.inputs.push(input.clone());
        let count = state.counts.entry(input.kind).or_insert(0);
        *count += 1;
        let nth = *count;

        if let Some(pos) = state
            .failures
            .iter()
            .position(|f| f.kind == input.kind && f.nth == nth)
        {
            return Err(state.failures.remove(pos).error);
        }

        Ok(Directives {
            expire_sessions: std::mem::take(&mut state.expire_sessions),
            reject_sessions: state.reject_sessions,
        })
    }
}

/// 会话内组字状态
#[derive(Debug, Default)]
struct Composition {
    buffer: String,
    focused: Option<usize>,
    request: Request,
    field_type: InputFieldType,
    last_commit: Option<CommitResult>,
}

impl Composition {
    fn page_size(&self) -> usize {
        self.request
            .candidate_page_size
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    fn candidates(&self, suggest: bool, expand: bool) -> Vec<Candidate> {
        let mut values = vec![(self.buffer.clone(), None)];
        let upper = self.buffer.to_uppercase();
        if upper != self.buffer {
            values.push((upper, None));
        }
        if suggest {
            values.push((format!("{0}{0}", self.buffer), Some("suggestion")));
        }
        if expand {
            values.push((format!("{}…", self.buffer), Some("suggestion")));
            values.push((format!("[{}]", self.buffer), Some("suggestion")));
        }
        values
            .into_iter()
            .enumerate()
            .map(|(id, (value, annotation))| Candidate {
                id: id as i32,
                value,
                annotation: annotation.map(str::to_string),
            })
            .collect()
    }

    fn composing(&self, id: SessionId, suggest: bool, expand: bool) -> Output {
        Output {
            id,
            consumed: true,
            preedit: Some(Preedit {
                text: self.buffer.clone(),
                cursor: self.buffer.chars().count(),
            }),
            candidates: Some(CandidateList {
                candidates: self.candidates(suggest, expand),
                focused_index: self.focused,
            }),
            ..Output::default()
        }
    }

    fn commit(&mut self, id: SessionId, value: String) -> Output {
        let result = CommitResult {
            value,
            key: std::mem::take(&mut self.buffer),
        };
        self.focused = None;
        self.last_commit = Some(result.clone());
        Output {
            id,
            consumed: true,
            result: Some(result),
            ..Output::default()
        }
    }

    fn handle_key(&mut self, id: SessionId, key: &KeyEvent, suggest: bool) -> Output {
        let pass_through = Output {
            id,
            ..Output::default()
        };

        if let Some(c) = key.key_code {
            if key
                .modifiers
                .iter()
                .any(|m| matches!(m, ModifierKey::Ctrl | ModifierKey::Alt))
            {
                return pass_through;
            }
            self.buffer.push(c);
            self.focused = None;
            return self.composing(id, suggest, false);
        }
        if let Some(text) = &key.key_string {
            self.buffer.push_str(text);
            self.focused = None;
            return self.composing(id, suggest, false);
        }
        if self.buffer.is_empty() {
            return pass_through;
        }

        match key.special_key {
            Some(SpecialKey::Backspace) => {
                self.buffer.pop();
                self.focused = None;
                if self.buffer.is_empty() {
                    Output {
                        id,
                        consumed: true,
                        ..Output::default()
                    }
                } else {
                    self.composing(id, suggest, false)
                }
            }
            Some(SpecialKey::Enter) => {
                let value = self.buffer.clone();
                self.commit(id, value)
            }
            Some(SpecialKey::Space) => {
                let total = self.candidates(suggest, false).len();
                self.focused = Some(self.focused.map_or(0, |i| (i + 1) % total));
                self.composing(id, suggest, false)
            }
            Some(SpecialKey::Escape) => {
                self.buffer.clear();
                self.focused = None;
                Output {
                    id,
                    consumed: true,
                    ..Output::default()
                }
            }
            _ => pass_through,
        }
    }

    fn handle_command(&mut self, id: SessionId, command: &SessionCommand) -> Output {
        match command {
            SessionCommand::Submit => {
                if self.buffer.is_empty() {
                    Output {
                        id,
                        ..Output::default()
                    }
                } else {
                    let value = self.buffer.clone();
                    self.commit(id, value)
                }
            }
            SessionCommand::SubmitCandidate { id: candidate_id } => {
                let chosen = self
                    .candidates(true, false)
                    .into_iter()
                    .find(|c| c.id == *candidate_id);
                match chosen {
                    Some(candidate) if !self.buffer.is_empty() => self.commit(id, candidate.value),
                    _ => Output::with_error(ErrorCode::InvalidRequest),
                }
            }
            SessionCommand::ResetContext => {
                self.buffer.clear();
                self.focused = None;
                self.last_commit = None;
                Output {
                    id,
                    consumed: true,
                    ..Output::default()
                }
            }
            SessionCommand::MoveCursor { position } => {
                let mut output = self.composing(id, true, false);
                if let Some(preedit) = output.preedit.as_mut() {
                    preedit.cursor = (*position).min(self.buffer.chars().count());
                }
                output
            }
            SessionCommand::ConvertNextPage | SessionCommand::ConvertPrevPage => {
                let total = self.candidates(true, false).len();
                let page = self.page_size();
                let current = self.focused.unwrap_or(0);
                let next = if *command == SessionCommand::ConvertNextPage {
                    (current + page).min(total.saturating_sub(1))
                } else {
                    current.saturating_sub(page)
                };
                self.focused = Some(next);
                self.composing(id, true, false)
            }
            SessionCommand::SwitchInputFieldType { field_type } => {
                self.field_type = *field_type;
                Output {
                    id,
                    consumed: true,
                    ..Output::default()
                }
            }
            SessionCommand::UndoOrRewind => {
                if let Some(last) = self.last_commit.take() {
                    let length = last.value.chars().count() as u32;
                    self.buffer = last.key;
                    let mut output = self.composing(id, true, false);
                    output.deletion_range = Some(DeletionRange {
                        offset: -(length as i32),
                        length,
                    });
                    output
                } else if self.buffer.pop().is_some() {
                    self.composing(id, true, false)
                } else {
                    Output {
                        id,
                        ..Output::default()
                    }
                }
            }
            SessionCommand::ExpandSuggestion => self.composing(id, true, true),
            SessionCommand::UsageStatsEvent { .. } => Output {
                id,
                consumed: true,
                ..Output::default()
            },
        }
    }
}

/// 进程内 Mock 引擎
#[derive(Debug)]
pub struct MockEngine {
    control: MockEngineControl,
    next_session_id: SessionId,
    sessions: HashMap<SessionId, Composition>,
    config: Config,
    storage: HashMap<StorageType, Vec<StorageEntry>>,
    dictionaries: HashMap<u64, (String, Vec<UserDictionaryEntry>)>,
    next_dictionary_id: u64,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_control(MockEngineControl::default())
    }

    pub fn with_control(control: MockEngineControl) -> Self {
        Self {
            control,
            next_session_id: 1,
            sessions: HashMap::new(),
            config: Config::default(),
            storage: HashMap::new(),
            dictionaries: HashMap::new(),
            next_dictionary_id: 1,
        }
    }

    pub fn control(&self) -> MockEngineControl {
        self.control.clone()
    }

    fn evaluate_in_session(&mut self, id: SessionId, input: &Input) -> Output {
        if input.kind == CommandKind::DeleteSession {
            self.sessions.remove(&id);
            return Output {
                id,
                ..Output::default()
            };
        }
        let Some(composition) = self.sessions.get_mut(&id) else {
            return Output {
                id,
                error_code: ErrorCode::SessionFailure,
                ..Output::default()
            };
        };
        let suggest = input.request_suggestion != Some(false);

        match (input.kind, &input.key, &input.command) {
            (CommandKind::SetRequest, _, _) => {
                composition.request = input.request.clone().unwrap_or_default();
                Output {
                    id,
                    ..Output::default()
                }
            }
            (CommandKind::SendKey, Some(key), _) => composition.handle_key(id, key, suggest),
            (CommandKind::SendCommand, _, Some(command)) => {
                composition.handle_command(id, command)
            }
            _ => Output::with_error(ErrorCode::InvalidRequest),
        }
    }

    fn evaluate_global(&mut self, input: &Input) -> Output {
        match input.kind {
            CommandKind::GetConfig => Output {
                config: Some(self.config.clone()),
                ..Output::default()
            },
            CommandKind::SetConfig => {
                self.config = input.config.clone().unwrap_or_default();
                Output {
                    config: Some(self.config.clone()),
                    ..Output::default()
                }
            }
            CommandKind::SetImposedConfig => {
                if let Some(config) = &input.config {
                    self.config.merge_from(config);
                }
                Output::default()
            }
            CommandKind::ClearUserHistory | CommandKind::ClearUserPrediction => {
                for composition in self.sessions.values_mut() {
                    composition.last_commit = None;
                }
                Output::default()
            }
            CommandKind::InsertToStorage => match &input.storage_entry {
                Some(entry) => {
                    let entries = self.storage.entry(entry.storage_type).or_default();
                    entries.retain(|e| e.key != entry.key);
                    entries.push(entry.clone());
                    Output::default()
                }
                None => Output::with_error(ErrorCode::InvalidRequest),
            },
            CommandKind::ReadAllFromStorage => match &input.storage_entry {
                Some(selector) => Output {
                    storage_entries: self
                        .storage
                        .get(&selector.storage_type)
                        .cloned()
                        .unwrap_or_default(),
                    ..Output::default()
                },
                None => Output::with_error(ErrorCode::InvalidRequest),
            },
            CommandKind::ClearStorage => {
                if let Some(selector) = &input.storage_entry {
                    self.storage.remove(&selector.storage_type);
                }
                Output::default()
            }
            CommandKind::SendUserDictionaryCommand => match &input.user_dictionary_command {
                Some(command) => Output {
                    user_dictionary_status: Some(self.user_dictionary(command)),
                    ..Output::default()
                },
                None => Output::with_error(ErrorCode::InvalidRequest),
            },
            _ => Output::default(),
        }
    }

    fn user_dictionary(&mut self, command: &UserDictionaryCommand) -> UserDictionaryStatus {
        match command {
            UserDictionaryCommand::CreateDictionary { name } => {
                let dictionary_id = self.next_dictionary_id;
                self.next_dictionary_id += 1;
                self.dictionaries
                    .insert(dictionary_id, (name.clone(), Vec::new()));
                UserDictionaryStatus {
                    success: true,
                    dictionary_id: Some(dictionary_id),
                    entries: Vec::new(),
                }
            }
            UserDictionaryCommand::DeleteDictionary { dictionary_id } => UserDictionaryStatus {
                success: self.dictionaries.remove(dictionary_id).is_some(),
                dictionary_id: Some(*dictionary_id),
                entries: Vec::new(),
            },
            UserDictionaryCommand::AddEntry {
                dictionary_id,
                entry,
            } => match self.dictionaries.get_mut(dictionary_id) {
                Some((_, entries)) => {
                    entries.push(entry.clone());
                    UserDictionaryStatus {
                        success: true,
                        dictionary_id: Some(*dictionary_id),
                        entries: Vec::new(),
                    }
                }
                None => UserDictionaryStatus::default(),
            },
            UserDictionaryCommand::GetEntries { dictionary_id } => {
                match self.dictionaries.get(dictionary_id) {
                    Some((_, entries)) => UserDictionaryStatus {
                        success: true,
                        dictionary_id: Some(*dictionary_id),
                        entries: entries.clone(),
                    },
                    None => UserDictionaryStatus::default(),
                }
            }
            UserDictionaryCommand::Save => UserDictionaryStatus {
                success: true,
                ..UserDictionaryStatus::default()
            },
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBackend for MockEngine {
    fn initialize(&mut self, context: &StartupContext) -> Result<(), BackendError> {
        self.control.initialize()?;
        tracing::debug!(data_dir = ?context.data_dir, "Mock engine initialized");
        Ok(())
    }

    fn evaluate(&mut self, input: &Input) -> Result<Output, BackendError> {
        let directives = self.control.record(input)?;
        if directives.expire_sessions {
            self.sessions.clear();
        }

        if input.kind == CommandKind::CreateSession {
            let id = self.next_session_id;
            self.next_session_id += 1;
            self.sessions.insert(id, Composition::default());
            return Ok(Output {
                id,
                ..Output::default()
            });
        }

        match input.id() {
            Some(id) if directives.reject_sessions || !self.sessions.contains_key(&id) => {
                Ok(Output {
                    id,
                    error_code: ErrorCode::SessionFailure,
                    ..Output::default()
                })
            }
            Some(id) if input.kind.requires_session() => Ok(self.evaluate_in_session(id, input)),
            None if input.kind.requires_session() => {
                Ok(Output::with_error(ErrorCode::InvalidRequest))
            }
            _ => Ok(self.evaluate_global(input)),
        }
    }
}
