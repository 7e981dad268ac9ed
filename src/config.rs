//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `IME__*` 覆盖（双下划线表示嵌套，如 `IME__EXECUTOR__SQUASH_RESULTS=false`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::engine::StartupContext;
use crate::executor::DispatcherConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub engine: EngineSection,
}

/// [executor] 段：调度与结果投递策略
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// 跳过 suggestion 前瞻的队列深度，0 表示关闭
    #[serde(default = "default_suggestion_lookahead")]
    pub suggestion_lookahead: usize,
    #[serde(default = "default_true")]
    pub squash_results: bool,
    /// 会话过期时自动重建一次
    #[serde(default = "default_true")]
    pub recover_session: bool,
    #[serde(default = "default_worker_thread_name")]
    pub worker_thread_name: String,
    #[serde(default = "default_sink_thread_name")]
    pub sink_thread_name: String,
}

fn default_suggestion_lookahead() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_worker_thread_name() -> String {
    "ime-dispatcher".into()
}

fn default_sink_thread_name() -> String {
    "ime-result-sink".into()
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            suggestion_lookahead: default_suggestion_lookahead(),
            squash_results: true,
            recover_session: true,
            worker_thread_name: default_worker_thread_name(),
            sink_thread_name: default_sink_thread_name(),
        }
    }
}

/// [engine] 段：引擎启动参数
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineSection {
    /// 词典与学习数据目录
    pub data_dir: Option<PathBuf>,
    pub client_name: Option<String>,
}

impl From<&AppConfig> for DispatcherConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            suggestion_lookahead: cfg.executor.suggestion_lookahead,
            squash_results: cfg.executor.squash_results,
            recover_session: cfg.executor.recover_session,
            worker_thread_name: cfg.executor.worker_thread_name.clone(),
            sink_thread_name: cfg.executor.sink_thread_name.clone(),
            startup: StartupContext {
                data_dir: cfg.engine.data_dir.clone(),
                client_name: cfg.engine.client_name.clone(),
            },
        }
    }
}

/// 从 config 目录加载配置，环境变量 IME__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 IME__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("IME")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.executor.suggestion_lookahead, 1);
        assert!(cfg.executor.squash_results);
        assert!(cfg.executor.recover_session);
        assert!(cfg.engine.data_dir.is_none());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[executor]\nsuggestion_lookahead = 0\nsquash_results = false\n\n[engine]\ndata_dir = \"/var/lib/ime\"\nclient_name = \"test\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.executor.suggestion_lookahead, 0);
        assert!(!cfg.executor.squash_results);
        assert!(cfg.executor.recover_session);
        assert_eq!(cfg.engine.data_dir, Some(PathBuf::from("/var/lib/ime")));

        let runtime = DispatcherConfig::from(&cfg);
        assert_eq!(runtime.suggestion_lookahead, 0);
        assert!(!runtime.squash_results);
        assert_eq!(runtime.startup.client_name.as_deref(), Some("test"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.executor.worker_thread_name, "ime-dispatcher");
        assert_eq!(cfg.executor.sink_thread_name, "ime-result-sink");
    }
}
