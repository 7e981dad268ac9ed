//! 引擎设置：`Config`（用户偏好，可持久化）与 `Request`（客户端能力声明，随会话下发）
//!
//! 两者的字段都是可选的，合并语义为「新值中出现的字段覆盖旧值，缺省字段保留旧值」。

use serde::{Deserialize, Serialize};

fn merge_field<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if let Some(v) = src {
        *dst = Some(v.clone());
    }
}

/// 预编辑输入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreeditMethod {
    Roman,
    Kana,
}

/// 键位映射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKeymap {
    Mobile,
    Atok,
    Msime,
    Kotoeri,
    Custom,
}

/// 空格字符宽度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceCharacterForm {
    FollowInputMode,
    Fullwidth,
    Halfwidth,
}

/// 用户偏好配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session_keymap: Option<SessionKeymap>,
    pub preedit_method: Option<PreeditMethod>,
    pub space_character_form: Option<SpaceCharacterForm>,
    pub use_history_suggest: Option<bool>,
    pub use_dictionary_suggest: Option<bool>,
    pub use_realtime_conversion: Option<bool>,
    pub use_auto_conversion: Option<bool>,
    pub incognito_mode: Option<bool>,
    pub suggestions_size: Option<u32>,
}

impl Config {
    pub fn merge_from(&mut self, other: &Config) {
        merge_field(&mut self.session_keymap, &other.session_keymap);
        merge_field(&mut self.preedit_method, &other.preedit_method);
        merge_field(&mut self.space_character_form, &other.space_character_form);
        merge_field(&mut self.use_history_suggest, &other.use_history_suggest);
        merge_field(&mut self.use_dictionary_suggest, &other.use_dictionary_suggest);
        merge_field(&mut self.use_realtime_conversion, &other.use_realtime_conversion);
        merge_field(&mut self.use_auto_conversion, &other.use_auto_conversion);
        merge_field(&mut self.incognito_mode, &other.incognito_mode);
        merge_field(&mut self.suggestions_size, &other.suggestions_size);
    }
}

/// 罗马字转换表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialRomanjiTable {
    Default,
    TwelveKeysToHiragana,
    FlickToHiragana,
    ToggleFlickToHiragana,
    QwertyMobileToHiragana,
}

/// 客户端能力声明（当前活动配置），每次会话（重新）创建后都会重新下发
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub mixed_conversion: Option<bool>,
    pub zero_query_suggestion: Option<bool>,
    pub auto_partial_suggestion: Option<bool>,
    pub update_input_mode_from_surrounding_text: Option<bool>,
    pub special_romanji_table: Option<SpecialRomanjiTable>,
    pub keyboard_name: Option<String>,
    pub candidate_page_size: Option<u32>,
}

impl Request {
    pub fn merge_from(&mut self, other: &Request) {
        merge_field(&mut self.mixed_conversion, &other.mixed_conversion);
        merge_field(&mut self.zero_query_suggestion, &other.zero_query_suggestion);
        merge_field(&mut self.auto_partial_suggestion, &other.auto_partial_suggestion);
        merge_field(
            &mut self.update_input_mode_from_surrounding_text,
            &other.update_input_mode_from_surrounding_text,
        );
        merge_field(&mut self.special_romanji_table, &other.special_romanji_table);
        merge_field(&mut self.keyboard_name, &other.keyboard_name);
        merge_field(&mut self.candidate_page_size, &other.candidate_page_size);
    }
}
