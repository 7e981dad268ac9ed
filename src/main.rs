//! IME Executor 演示程序
//!
//! 入口：初始化日志、加载配置、用 Mock 引擎启动调度器；
//! 从标准输入逐行读取，每个字符作为一次按键异步提交，行尾提交上屏并打印结果。
//! EOF 或 Ctrl+C 时删除会话并停止工作线程。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use ime_executor::config::load_config;
use ime_executor::core::{ShutdownManager, ShutdownReason};
use ime_executor::protocol::KeyEvent;
use ime_executor::{callback, observability, DispatcherConfig, ImeClient, MockEngine};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let client = ImeClient::start(MockEngine::new(), DispatcherConfig::from(&cfg))
        .context("Failed to start dispatcher")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => type_line(&client, &line),
                None => {
                    shutdown.shutdown(ShutdownReason::InputClosed);
                    break;
                }
            },
        }
    }

    tracing::info!(reason = ?shutdown.reason(), "Stopping input");

    // 等已提交的按键全部投递后再关闭
    client.dispatcher().idle().await;
    tokio::task::spawn_blocking(move || client.shutdown())
        .await
        .context("Dispatcher shutdown failed")?;

    Ok(())
}

fn type_line(client: &ImeClient, line: &str) {
    for c in line.chars() {
        client.send_key(KeyEvent::char(c), None, None, None);
    }
    client.submit(callback(|outcome, _| match outcome {
        Ok(output) => {
            if let Some(result) = output.result {
                println!("{}", result.value);
            }
        }
        Err(e) => tracing::error!("Submit failed: {}", e),
    }));
}
