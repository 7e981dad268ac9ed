//! 引擎协议：请求 / 响应值对象、按键事件与设置
//!
//! 调度核心只关心命令类型、会话 ID 与少量用于合并判定的响应字段，
//! 其余字段原样在调用方与引擎之间传递。

mod command;
mod key_event;
mod settings;

pub use command::{
    Candidate, CandidateList, CommandKind, CommitResult, DeletionRange, ErrorCode, Input,
    InputFieldType, Output, Preedit, SessionCommand, SessionId, StorageEntry, StorageType,
    SurroundingContext, UsageStatsEvent, UserDictionaryCommand, UserDictionaryEntry,
    UserDictionaryStatus, INVALID_SESSION_ID,
};
pub use key_event::{KeyEvent, ModifierKey, SpecialKey, TriggeringKeyEvent};
pub use settings::{
    Config, PreeditMethod, Request, SessionKeymap, SpaceCharacterForm, SpecialRomanjiTable,
};
