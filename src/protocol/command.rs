//! 引擎请求 / 响应值对象
//!
//! `Input` 在提交边界构造完成后即不可变；会话 ID 只能由调度线程通过 `stamped` 生成新值写入，
//! 调用方无法设置。`Output` 是引擎返回的渲染结果。

use serde::{Deserialize, Serialize};

use super::key_event::KeyEvent;
use super::settings::{Config, Request};

/// 引擎会话 ID
pub type SessionId = u64;

/// 「无会话」哨兵值
pub const INVALID_SESSION_ID: SessionId = 0;

/// 命令类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// 由调度器内部发出
    CreateSession,
    /// 由调度器内部发出
    DeleteSession,
    SendKey,
    SendCommand,
    SetRequest,
    GetConfig,
    SetConfig,
    SetImposedConfig,
    #[default]
    NoOperation,
    Reload,
    ClearUserHistory,
    ClearUserPrediction,
    ClearUnusedUserPrediction,
    SendUserDictionaryCommand,
    InsertToStorage,
    ReadAllFromStorage,
    ClearStorage,
    SyncData,
}

impl CommandKind {
    /// 是否需要由调度线程盖上当前会话 ID
    pub fn requires_session(self) -> bool {
        !matches!(
            self,
            CommandKind::CreateSession
                | CommandKind::NoOperation
                | CommandKind::GetConfig
                | CommandKind::SetConfig
                | CommandKind::SetImposedConfig
                | CommandKind::Reload
                | CommandKind::ClearUserHistory
                | CommandKind::ClearUserPrediction
                | CommandKind::ClearUnusedUserPrediction
                | CommandKind::SendUserDictionaryCommand
                | CommandKind::InsertToStorage
                | CommandKind::ReadAllFromStorage
                | CommandKind::ClearStorage
                | CommandKind::SyncData
        )
    }

    /// 会话生命周期命令只允许调度器自己发出
    pub fn is_reserved(self) -> bool {
        matches!(self, CommandKind::CreateSession | CommandKind::DeleteSession)
    }
}

/// 输入框类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFieldType {
    #[default]
    Normal,
    Password,
    Tel,
    Number,
}

/// 使用统计事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum UsageStatsEvent {
    SubmittedCandidateRow(u32),
    KeyboardFold,
    KeyboardExpand,
    SoftwareKeyboardLayoutLandscape(u32),
    SoftwareKeyboardLayoutPortrait(u32),
}

/// 会话内命令（SendCommand 的载荷）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionCommand {
    /// 提交当前组字
    Submit,
    SubmitCandidate {
        id: i32,
    },
    ResetContext,
    MoveCursor {
        position: usize,
    },
    ConvertNextPage,
    ConvertPrevPage,
    SwitchInputFieldType {
        field_type: InputFieldType,
    },
    UndoOrRewind,
    /// 展开更多 suggestion，结果只做追加
    ExpandSuggestion,
    UsageStatsEvent {
        event: UsageStatsEvent,
    },
}

/// 光标前后文本
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurroundingContext {
    pub preceding_text: String,
    pub following_text: String,
    pub input_field_type: InputFieldType,
}

/// 通用存储的分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    SymbolHistory,
    EmoticonHistory,
    EmojiHistory,
}

/// 通用存储条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub storage_type: StorageType,
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl StorageEntry {
    pub fn new(storage_type: StorageType, key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            storage_type,
            key: key.into(),
            values,
        }
    }
}

/// 用户词典条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDictionaryEntry {
    pub key: String,
    pub value: String,
    pub comment: Option<String>,
}

/// 用户词典编辑命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserDictionaryCommand {
    CreateDictionary { name: String },
    DeleteDictionary { dictionary_id: u64 },
    AddEntry { dictionary_id: u64, entry: UserDictionaryEntry },
    GetEntries { dictionary_id: u64 },
    Save,
}

/// 用户词典命令结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserDictionaryStatus {
    pub success: bool,
    pub dictionary_id: Option<u64>,
    pub entries: Vec<UserDictionaryEntry>,
}

/// 发往引擎的请求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Input {
    pub kind: CommandKind,
    id: Option<SessionId>,
    pub key: Option<KeyEvent>,
    pub command: Option<SessionCommand>,
    pub context: Option<SurroundingContext>,
    pub config: Option<Config>,
    pub request: Option<Request>,
    pub storage_entry: Option<StorageEntry>,
    pub user_dictionary_command: Option<UserDictionaryCommand>,
    /// `Some(false)` 表示本次不必计算 suggestion
    pub request_suggestion: Option<bool>,
}

impl Input {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn send_key(key: KeyEvent) -> Self {
        Self {
            key: Some(key),
            ..Self::new(CommandKind::SendKey)
        }
    }

    pub fn send_command(command: SessionCommand) -> Self {
        Self {
            command: Some(command),
            ..Self::new(CommandKind::SendCommand)
        }
    }

    pub fn with_context(mut self, context: SurroundingContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_request(mut self, request: Request) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_storage_entry(mut self, entry: StorageEntry) -> Self {
        self.storage_entry = Some(entry);
        self
    }

    pub fn with_user_dictionary_command(mut self, command: UserDictionaryCommand) -> Self {
        self.user_dictionary_command = Some(command);
        self
    }

    /// 调度线程盖上的会话 ID
    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    /// 生成盖有会话 ID 的新值，原值不变
    pub(crate) fn stamped(&self, id: SessionId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    pub(crate) fn without_suggestion(self) -> Self {
        Self {
            request_suggestion: Some(false),
            ..self
        }
    }

    /// 可被 `remove_pending_work` 丢弃的命令：按键求值、光标 / 翻页
    pub fn is_cancellable(&self) -> bool {
        match self.kind {
            CommandKind::SendKey => true,
            CommandKind::SendCommand => matches!(
                self.command,
                Some(SessionCommand::MoveCursor { .. })
                    | Some(SessionCommand::ConvertNextPage)
                    | Some(SessionCommand::ConvertPrevPage)
            ),
            _ => false,
        }
    }

    pub fn is_expand_suggestion(&self) -> bool {
        self.kind == CommandKind::SendCommand
            && self.command == Some(SessionCommand::ExpandSuggestion)
    }

    /// 普通字符 / 退格按键
    pub fn is_plain_typing(&self) -> bool {
        self.kind == CommandKind::SendKey
            && self.key.as_ref().is_some_and(KeyEvent::is_plain_typing)
    }
}

/// 引擎结果码
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[default]
    Success,
    /// 会话不存在或已过期
    SessionFailure,
    InvalidRequest,
}

/// 上屏结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub value: String,
    pub key: String,
}

/// 预编辑区
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preedit {
    pub text: String,
    pub cursor: usize,
}

/// 单个候选
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i32,
    pub value: String,
    pub annotation: Option<String>,
}

/// 候选列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateList {
    pub candidates: Vec<Candidate>,
    pub focused_index: Option<usize>,
}

/// 删除光标周边文本的指令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRange {
    pub offset: i32,
    pub length: u32,
}

/// 引擎响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    /// 响应所属会话，`INVALID_SESSION_ID` 表示无
    pub id: SessionId,
    /// 按键是否被引擎消费（否则应透传给输入框）
    pub consumed: bool,
    pub error_code: ErrorCode,
    pub result: Option<CommitResult>,
    pub preedit: Option<Preedit>,
    pub candidates: Option<CandidateList>,
    pub deletion_range: Option<DeletionRange>,
    pub config: Option<Config>,
    pub storage_entries: Vec<StorageEntry>,
    pub user_dictionary_status: Option<UserDictionaryStatus>,
}

impl Output {
    pub fn with_error(error_code: ErrorCode) -> Self {
        Self {
            error_code,
            ..Self::default()
        }
    }

    pub fn is_session_failure(&self) -> bool {
        self.error_code == ErrorCode::SessionFailure
    }

    pub fn has_candidates(&self) -> bool {
        self.candidates
            .as_ref()
            .is_some_and(|list| !list.candidates.is_empty())
    }
}
