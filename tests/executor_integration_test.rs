//! 调度核心集成测试：Mock 引擎 + 探针，覆盖顺序、合并、会话与取消语义

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ime_executor::engine::{MockEngine, MockEngineControl};
use ime_executor::protocol::{
    CommandKind, Config, Input, KeyEvent, Output, Request, SessionCommand, SpecialKey,
};
use ime_executor::{
    callback, BackendError, Callback, DispatchError, Dispatcher, DispatcherConfig, ImeClient,
};

fn start_with(config: DispatcherConfig) -> (Dispatcher, MockEngineControl) {
    let engine = MockEngine::new();
    let control = engine.control();
    let dispatcher = Dispatcher::start(engine, config).unwrap();
    (dispatcher, control)
}

fn start() -> (Dispatcher, MockEngineControl) {
    start_with(DispatcherConfig::default())
}

fn key(c: char) -> Input {
    Input::send_key(KeyEvent::char(c))
}

fn special(key: SpecialKey) -> Input {
    Input::send_key(KeyEvent::special(key))
}

/// 回调把标签记进共享列表
fn record(tag: &'static str, seen: &Arc<Mutex<Vec<&'static str>>>) -> Option<Callback> {
    let seen = Arc::clone(seen);
    callback(move |_, _| seen.lock().unwrap().push(tag))
}

/// 提交一个空缓冲上的退格（不被消费，不可合并），其回调阻塞投递线程直到放行
fn gate_sink(dispatcher: &Dispatcher) -> std_mpsc::Sender<()> {
    let (release, gate) = std_mpsc::channel::<()>();
    dispatcher.submit_async(
        special(SpecialKey::Backspace),
        None,
        callback(move |_, _| {
            let _ = gate.recv();
        }),
    );
    release
}

/// 发往引擎的命令中去掉会话生命周期与配置下发
fn caller_inputs(control: &MockEngineControl) -> Vec<Input> {
    control
        .inputs()
        .into_iter()
        .filter(|input| {
            !matches!(
                input.kind,
                CommandKind::CreateSession | CommandKind::DeleteSession | CommandKind::SetRequest
            )
        })
        .collect()
}

#[test]
fn test_fifo_dispatch_across_producers() {
    let (dispatcher, control) = start();
    let submitted = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..4)
        .map(|t| {
            let dispatcher = dispatcher.clone();
            let submitted = Arc::clone(&submitted);
            thread::spawn(move || {
                for i in 0..25 {
                    let input =
                        Input::send_command(SessionCommand::MoveCursor { position: t * 100 + i });
                    // 持锁提交，记录顺序即队列顺序
                    let mut order = submitted.lock().unwrap();
                    order.push(input.clone());
                    if i % 5 == 0 {
                        dispatcher.submit_sync(input).unwrap();
                    } else {
                        dispatcher.submit_async(input, None, None);
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    dispatcher.wait_for_idle();

    let dispatched: Vec<_> = caller_inputs(&control)
        .into_iter()
        .map(|input| input.command)
        .collect();
    let expected: Vec<_> = submitted
        .lock()
        .unwrap()
        .iter()
        .map(|input| input.command.clone())
        .collect();
    assert_eq!(dispatched.len(), 100);
    assert_eq!(dispatched, expected);
    dispatcher.shutdown();
}

#[test]
fn test_squashable_result_superseded_by_commit() {
    let (dispatcher, _control) = start();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let release = gate_sink(&dispatcher);
    dispatcher.submit_async(key('a'), None, record("k1", &seen));
    dispatcher.submit_async(special(SpecialKey::Enter), None, record("k2", &seen));
    // 同步命令返回时 K1、K2 都已派发并交给投递线程
    dispatcher
        .submit_sync(Input::new(CommandKind::NoOperation))
        .unwrap();
    release.send(()).unwrap();
    dispatcher.wait_for_idle();

    assert_eq!(*seen.lock().unwrap(), vec!["k2"]);
    dispatcher.shutdown();
}

#[test]
fn test_unsquashable_results_always_delivered() {
    let (dispatcher, _control) = start();
    let commits = Arc::new(Mutex::new(Vec::new()));
    let commit_cb = |commits: &Arc<Mutex<Vec<String>>>| {
        let commits = Arc::clone(commits);
        callback(move |outcome, _| {
            if let Some(result) = outcome.unwrap().result {
                commits.lock().unwrap().push(result.value);
            }
        })
    };

    let release = gate_sink(&dispatcher);
    dispatcher.submit_async(key('a'), None, commit_cb(&commits));
    dispatcher.submit_async(special(SpecialKey::Enter), None, commit_cb(&commits));
    dispatcher.submit_async(key('b'), None, commit_cb(&commits));
    dispatcher.submit_async(special(SpecialKey::Enter), None, commit_cb(&commits));
    dispatcher
        .submit_sync(Input::new(CommandKind::NoOperation))
        .unwrap();
    release.send(()).unwrap();
    dispatcher.wait_for_idle();

    assert_eq!(*commits.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    dispatcher.shutdown();
}

#[test]
fn test_expand_suggestion_never_squashed() {
    let (dispatcher, _control) = start();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let release = gate_sink(&dispatcher);
    dispatcher.submit_async(key('x'), None, record("x", &seen));
    dispatcher.submit_async(
        Input::send_command(SessionCommand::ExpandSuggestion),
        None,
        record("expand", &seen),
    );
    dispatcher.submit_async(key('y'), None, record("y", &seen));
    dispatcher
        .submit_sync(Input::new(CommandKind::NoOperation))
        .unwrap();
    release.send(()).unwrap();
    dispatcher.wait_for_idle();

    assert_eq!(*seen.lock().unwrap(), vec!["expand", "y"]);
    dispatcher.shutdown();
}

#[test]
fn test_squash_disabled_delivers_everything() {
    let (dispatcher, _control) = start_with(DispatcherConfig {
        squash_results: false,
        ..DispatcherConfig::default()
    });
    let seen = Arc::new(Mutex::new(Vec::new()));

    let release = gate_sink(&dispatcher);
    dispatcher.submit_async(key('a'), None, record("a", &seen));
    dispatcher.submit_async(key('b'), None, record("b", &seen));
    dispatcher
        .submit_sync(Input::new(CommandKind::NoOperation))
        .unwrap();
    release.send(()).unwrap();
    dispatcher.wait_for_idle();

    assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    dispatcher.shutdown();
}

#[test]
fn test_session_stamping() {
    let (dispatcher, control) = start();
    let session = dispatcher.check_session().unwrap();

    let original = key('a');
    dispatcher.submit_async(original.clone(), None, None);
    dispatcher
        .submit_sync(Input::new(CommandKind::GetConfig))
        .unwrap();
    dispatcher
        .submit_sync(Input::send_command(SessionCommand::Submit))
        .unwrap();
    assert_eq!(original.id(), None);

    for input in caller_inputs(&control) {
        if input.kind.requires_session() {
            assert_eq!(input.id(), Some(session), "{:?} not stamped", input.kind);
        } else {
            assert_eq!(input.id(), None, "{:?} must not carry a session", input.kind);
        }
    }

    // 删除后重建，新会话 ID 不同
    dispatcher.delete_session();
    dispatcher.submit_sync(key('b')).unwrap();
    let keys = control.inputs_of(CommandKind::SendKey);
    let last = keys.last().unwrap().id().unwrap();
    assert_ne!(last, session);
    dispatcher.shutdown();
}

#[test]
#[should_panic(expected = "only the dispatcher stamps session ids")]
fn test_caller_cannot_supply_session_id() {
    let (dispatcher, _control) = start();
    let forged: Input = serde_json::from_str(r#"{"kind":"SendKey","id":7}"#).unwrap();
    dispatcher.submit_async(forged, None, None);
}

#[test]
fn test_ensure_session_idempotent() {
    let (dispatcher, control) = start();
    let first = dispatcher.check_session().unwrap();
    let second = dispatcher.check_session().unwrap();
    dispatcher.submit_sync(key('a')).unwrap();

    assert_eq!(first, second);
    assert_eq!(control.count(CommandKind::CreateSession), 1);
    dispatcher.shutdown();
}

#[test]
fn test_sync_call_sees_config_at_fifo_position() {
    let (dispatcher, _control) = start();
    let before = Config {
        suggestions_size: Some(3),
        ..Config::default()
    };
    let after = Config {
        suggestions_size: Some(7),
        ..Config::default()
    };

    dispatcher.submit_async(
        Input::new(CommandKind::SetConfig).with_config(before.clone()),
        None,
        None,
    );
    let typist = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || {
            for i in 0..100u32 {
                let c = char::from(b'a' + (i % 26) as u8);
                dispatcher.submit_async(key(c), None, callback(|_, _| {}));
            }
        })
    };

    let observed = dispatcher
        .submit_sync(Input::new(CommandKind::GetConfig))
        .unwrap();
    assert_eq!(observed.config, Some(before));

    dispatcher.submit_async(
        Input::new(CommandKind::SetConfig).with_config(after.clone()),
        None,
        None,
    );
    let observed = dispatcher
        .submit_sync(Input::new(CommandKind::GetConfig))
        .unwrap();
    assert_eq!(observed.config, Some(after));

    typist.join().unwrap();
    dispatcher.wait_for_idle();
    dispatcher.shutdown();
}

#[test]
fn test_failure_mid_burst_does_not_wedge_dispatcher() {
    let (dispatcher, control) = start_with(DispatcherConfig {
        squash_results: false,
        ..DispatcherConfig::default()
    });
    control.fail_nth(
        CommandKind::SendKey,
        5,
        BackendError::Unavailable("pipe closed".into()),
    );

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    for i in 0..10u8 {
        let outcomes = Arc::clone(&outcomes);
        dispatcher.submit_async(
            key(char::from(b'a' + i)),
            None,
            callback(move |outcome, _| outcomes.lock().unwrap().push((i, outcome))),
        );
    }
    dispatcher.wait_for_idle();

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 10);
    for (i, outcome) in outcomes.iter() {
        if *i == 4 {
            assert_eq!(
                outcome,
                &Err(DispatchError::Backend(BackendError::Unavailable(
                    "pipe closed".into()
                )))
            );
        } else {
            assert!(outcome.is_ok(), "command #{} failed", i + 1);
        }
    }
    let order: Vec<_> = outcomes.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, (0..10).collect::<Vec<_>>());

    let keys: Vec<_> = control
        .inputs_of(CommandKind::SendKey)
        .into_iter()
        .filter_map(|input| input.key.and_then(|k| k.key_code))
        .collect();
    assert_eq!(keys, ('a'..='j').collect::<Vec<_>>());
    dispatcher.shutdown();
}

#[test]
fn test_expired_session_recreated_with_active_request() {
    let (dispatcher, control) = start();
    let request = Request {
        candidate_page_size: Some(5),
        ..Request::default()
    };
    dispatcher.update_request(request.clone());
    let stale = dispatcher.check_session().unwrap();

    control.expire_sessions();
    let output = dispatcher.submit_sync(key('a')).unwrap();
    assert_ne!(output.id, stale);
    assert!(output.consumed);

    let trace: Vec<_> = control
        .inputs()
        .into_iter()
        .map(|input| (input.kind, input.id()))
        .collect();
    assert_eq!(
        trace,
        vec![
            (CommandKind::CreateSession, None),
            (CommandKind::SetRequest, Some(stale)),
            (CommandKind::NoOperation, Some(stale)),
            (CommandKind::SendKey, Some(stale)),
            (CommandKind::CreateSession, None),
            (CommandKind::SetRequest, Some(output.id)),
            (CommandKind::SendKey, Some(output.id)),
        ]
    );
    let requests = control.inputs_of(CommandKind::SetRequest);
    assert!(requests.iter().all(|input| input.request == Some(request.clone())));
    dispatcher.shutdown();
}

#[test]
fn test_session_lost_when_recreation_fails() {
    let (dispatcher, control) = start();
    dispatcher.check_session().unwrap();

    control.reject_sessions(true);
    assert_eq!(
        dispatcher.submit_sync(key('a')),
        Err(DispatchError::SessionLost(CommandKind::SendKey))
    );

    control.reject_sessions(false);
    let output = dispatcher.submit_sync(key('b')).unwrap();
    assert!(output.consumed);
    dispatcher.shutdown();
}

#[test]
fn test_session_recovery_can_be_disabled() {
    let (dispatcher, control) = start_with(DispatcherConfig {
        recover_session: false,
        ..DispatcherConfig::default()
    });
    dispatcher.check_session().unwrap();
    control.expire_sessions();

    assert_eq!(
        dispatcher.submit_sync(key('a')),
        Err(DispatchError::SessionLost(CommandKind::SendKey))
    );
    assert_eq!(control.count(CommandKind::CreateSession), 1);
    dispatcher.shutdown();
}

#[test]
fn test_health_check_recreates_expired_session() {
    let (dispatcher, control) = start();
    let stale = dispatcher.check_session().unwrap();
    control.expire_sessions();

    let fresh = dispatcher.check_session().unwrap();
    assert_ne!(fresh, stale);
    assert_eq!(control.count(CommandKind::CreateSession), 2);
    let deletes = control.inputs_of(CommandKind::DeleteSession);
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].id(), Some(stale));
    dispatcher.shutdown();
}

#[test]
fn test_health_check_keeps_session_when_backend_unavailable() {
    let (dispatcher, control) = start();
    let session = dispatcher.check_session().unwrap();
    control.fail_nth(
        CommandKind::NoOperation,
        1,
        BackendError::Unavailable("down".into()),
    );

    assert_eq!(
        dispatcher.check_session(),
        Err(DispatchError::Backend(BackendError::Unavailable(
            "down".into()
        )))
    );
    assert_eq!(control.count(CommandKind::CreateSession), 1);
    assert_eq!(control.count(CommandKind::DeleteSession), 0);

    assert_eq!(dispatcher.check_session(), Ok(session));
    dispatcher.shutdown();
}

#[test]
fn test_health_check_tolerates_malformed_reply() {
    let (dispatcher, control) = start();
    let session = dispatcher.check_session().unwrap();
    control.fail_nth(
        CommandKind::NoOperation,
        1,
        BackendError::Malformed("truncated frame".into()),
    );

    assert_eq!(dispatcher.check_session(), Ok(session));
    assert_eq!(control.count(CommandKind::CreateSession), 1);
    dispatcher.shutdown();
}

#[test]
fn test_session_discarded_when_active_request_cannot_be_applied() {
    let (dispatcher, control) = start();
    control.fail_nth(
        CommandKind::SetRequest,
        1,
        BackendError::Unavailable("down".into()),
    );

    assert_eq!(
        dispatcher.submit_sync(key('a')),
        Err(DispatchError::Backend(BackendError::Unavailable(
            "down".into()
        )))
    );
    let output = dispatcher.submit_sync(key('b')).unwrap();
    assert!(output.consumed);

    // 失败的会话被删除，下一条命令在重新下发配置的新会话上执行
    let trace: Vec<_> = control
        .inputs()
        .into_iter()
        .map(|input| (input.kind, input.id()))
        .collect();
    assert_eq!(
        trace,
        vec![
            (CommandKind::CreateSession, None),
            (CommandKind::SetRequest, Some(1)),
            (CommandKind::DeleteSession, Some(1)),
            (CommandKind::CreateSession, None),
            (CommandKind::SetRequest, Some(2)),
            (CommandKind::SendKey, Some(2)),
        ]
    );
    assert_eq!(output.id, 2);
    dispatcher.shutdown();
}

#[test]
fn test_malformed_response_treated_as_empty() {
    let (dispatcher, control) = start();
    control.fail_nth(
        CommandKind::SendKey,
        1,
        BackendError::Malformed("truncated frame".into()),
    );

    assert_eq!(dispatcher.submit_sync(key('a')), Ok(Output::default()));
    assert!(dispatcher.submit_sync(key('b')).unwrap().consumed);
    dispatcher.shutdown();
}

#[test]
fn test_lookahead_strips_suggestion_while_typing_queued() {
    let (dispatcher, control) = start();
    control.pause();
    dispatcher.submit_async(Input::new(CommandKind::NoOperation), None, None);
    dispatcher.submit_async(key('a'), None, None);
    dispatcher.submit_async(key('b'), None, None);
    dispatcher.submit_async(key('c'), None, None);
    control.resume();
    dispatcher.wait_for_idle();

    let hints: Vec<_> = control
        .inputs_of(CommandKind::SendKey)
        .into_iter()
        .map(|input| input.request_suggestion)
        .collect();
    assert_eq!(hints, vec![Some(false), Some(false), None]);
    dispatcher.shutdown();
}

#[test]
fn test_lookahead_disabled() {
    let (dispatcher, control) = start_with(DispatcherConfig {
        suggestion_lookahead: 0,
        ..DispatcherConfig::default()
    });
    control.pause();
    dispatcher.submit_async(Input::new(CommandKind::NoOperation), None, None);
    dispatcher.submit_async(key('a'), None, None);
    dispatcher.submit_async(key('b'), None, None);
    control.resume();
    dispatcher.wait_for_idle();

    assert!(control
        .inputs_of(CommandKind::SendKey)
        .iter()
        .all(|input| input.request_suggestion.is_none()));
    dispatcher.shutdown();
}

#[test]
fn test_remove_pending_work() {
    let (dispatcher, control) = start();
    let seen = Arc::new(Mutex::new(Vec::new()));

    control.pause();
    dispatcher.submit_async(Input::new(CommandKind::NoOperation), None, None);
    dispatcher.submit_async(key('a'), None, record("k1", &seen));
    dispatcher.submit_async(key('b'), None, record("k2", &seen));
    dispatcher.submit_async(
        Input::send_command(SessionCommand::MoveCursor { position: 0 }),
        None,
        record("cursor", &seen),
    );
    dispatcher.submit_async(
        Input::send_command(SessionCommand::Submit),
        None,
        record("submit", &seen),
    );
    dispatcher.remove_pending_work();
    dispatcher.submit_async(key('c'), None, record("k3", &seen));
    control.resume();
    dispatcher.wait_for_idle();

    let keys: Vec<_> = control
        .inputs_of(CommandKind::SendKey)
        .into_iter()
        .filter_map(|input| input.key.and_then(|k| k.key_code))
        .collect();
    assert_eq!(keys, vec!['c']);
    // Submit 不可丢弃，照常派发，但其结果早于取消点，不再投递
    assert_eq!(control.count(CommandKind::SendCommand), 1);
    assert_eq!(*seen.lock().unwrap(), vec!["k3"]);
    dispatcher.shutdown();
}

#[tokio::test]
async fn test_cancelled_sync_request_reports_cancelled() {
    let (dispatcher, control) = start();
    control.pause();
    dispatcher.submit_async(Input::new(CommandKind::NoOperation), None, None);

    // 首次 poll 即入队，调度线程仍阻塞在 NoOperation 上
    let mut pending = Box::pin(dispatcher.call(key('a')));
    assert!(tokio::time::timeout(Duration::ZERO, &mut pending)
        .await
        .is_err());

    dispatcher.remove_pending_work();
    control.resume();
    assert_eq!(pending.await, Err(DispatchError::Cancelled));
    assert_eq!(control.count(CommandKind::SendKey), 0);
}

#[test]
fn test_delete_session_then_recreate() {
    let (dispatcher, control) = start();
    let first = dispatcher.check_session().unwrap();
    dispatcher.delete_session();
    let second = dispatcher.check_session().unwrap();

    assert_ne!(first, second);
    let deletes = control.inputs_of(CommandKind::DeleteSession);
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].id(), Some(first));
    dispatcher.shutdown();
}

#[test]
fn test_update_request_merges_deltas() {
    let (dispatcher, control) = start();
    dispatcher.update_request(Request {
        candidate_page_size: Some(5),
        ..Request::default()
    });
    dispatcher.update_request(Request {
        mixed_conversion: Some(true),
        ..Request::default()
    });
    dispatcher.wait_for_idle();

    let last = control
        .inputs_of(CommandKind::SetRequest)
        .pop()
        .and_then(|input| input.request)
        .unwrap();
    assert_eq!(last.candidate_page_size, Some(5));
    assert_eq!(last.mixed_conversion, Some(true));
    dispatcher.shutdown();
}

#[test]
fn test_at_most_once_delivery() {
    let (dispatcher, _control) = start();
    let delivered = Arc::new(Mutex::new(Vec::new()));
    for i in 0..50u32 {
        let delivered = Arc::clone(&delivered);
        let c = char::from(b'a' + (i % 26) as u8);
        dispatcher.submit_async(
            key(c),
            None,
            callback(move |_, _| delivered.lock().unwrap().push(i)),
        );
    }
    dispatcher.wait_for_idle();

    let mut delivered = delivered.lock().unwrap().clone();
    let total = delivered.len();
    delivered.dedup();
    assert_eq!(delivered.len(), total);
    assert!(total <= 50);
    // 最后一条结果总会投递
    assert_eq!(delivered.last(), Some(&49));
    dispatcher.shutdown();
}

#[test]
fn test_startup_failure_is_fatal() {
    let engine = MockEngine::new();
    engine
        .control()
        .fail_initialize(BackendError::Initialization("dictionary missing".into()));

    let result = ImeClient::start(engine, DispatcherConfig::default());
    assert!(matches!(result, Err(DispatchError::Startup(_))));
}

#[test]
fn test_shutdown_terminates_and_deletes_session() {
    let (dispatcher, control) = start();
    dispatcher.check_session().unwrap();
    dispatcher.shutdown();

    assert_eq!(control.count(CommandKind::DeleteSession), 1);
    assert_eq!(
        dispatcher.submit_sync(Input::new(CommandKind::GetConfig)),
        Err(DispatchError::Terminated)
    );
    assert_eq!(dispatcher.check_session(), Err(DispatchError::Terminated));

    // 关闭后的异步提交被丢弃，回调不会触发
    let fired = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&fired);
    dispatcher.submit_async(key('a'), None, callback(move |_, _| *flag.lock().unwrap() = true));
    dispatcher.wait_for_idle();
    assert!(!*fired.lock().unwrap());
}

#[tokio::test]
async fn test_async_call_path() {
    let (dispatcher, control) = start();
    let output = dispatcher.call(key('a')).await.unwrap();
    assert!(output.consumed);

    let config = dispatcher
        .call(Input::new(CommandKind::GetConfig))
        .await
        .unwrap()
        .config;
    assert_eq!(config, Some(Config::default()));

    let session = dispatcher.checked_session().await.unwrap();
    assert_eq!(session, output.id);

    dispatcher.idle().await;
    assert_eq!(control.count(CommandKind::SendKey), 1);
    assert_eq!(control.count(CommandKind::CreateSession), 1);
}
