//! 按键事件
//!
//! - `KeyEvent`：发往引擎的逻辑按键（字符 / 特殊键 / 修饰键）
//! - `TriggeringKeyEvent`：触发本次求值的平台原始按键，引擎不关心，只在回调时原样交还 UI，
//!   供其在引擎未消费（consumed = false）时把按键透传给输入框

use serde::{Deserialize, Serialize};

/// 特殊键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialKey {
    Backspace,
    Delete,
    Enter,
    Space,
    Escape,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
}

/// 修饰键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierKey {
    Shift,
    Ctrl,
    Alt,
    Caps,
}

/// 发往引擎的逻辑按键
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyEvent {
    /// 可打印字符
    pub key_code: Option<char>,
    pub special_key: Option<SpecialKey>,
    pub modifiers: Vec<ModifierKey>,
    /// 软键盘直接给出的字符串（如整段假名）
    pub key_string: Option<String>,
}

impl KeyEvent {
    pub fn char(c: char) -> Self {
        Self {
            key_code: Some(c),
            ..Self::default()
        }
    }

    pub fn special(key: SpecialKey) -> Self {
        Self {
            special_key: Some(key),
            ..Self::default()
        }
    }

    pub fn with_modifier(mut self, modifier: ModifierKey) -> Self {
        if !self.modifiers.contains(&modifier) {
            self.modifiers.push(modifier);
        }
        self
    }

    /// 普通字符键或退格键：连续输入时可以跳过其 suggestion 计算
    pub fn is_plain_typing(&self) -> bool {
        let plain_char = self.key_code.is_some()
            && self.special_key.is_none()
            && self
                .modifiers
                .iter()
                .all(|m| matches!(m, ModifierKey::Shift | ModifierKey::Caps));
        let backspace = self.special_key == Some(SpecialKey::Backspace)
            && self.key_code.is_none()
            && self.modifiers.is_empty();
        plain_char || backspace
    }
}

/// 平台原始按键（对调度核心不透明）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggeringKeyEvent {
    /// 平台键码
    pub native_key_code: i32,
    /// 平台修饰位
    pub meta_state: u32,
    pub unicode_char: Option<char>,
}

impl TriggeringKeyEvent {
    pub fn new(native_key_code: i32) -> Self {
        Self {
            native_key_code,
            ..Self::default()
        }
    }
}
