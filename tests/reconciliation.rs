//! End-to-end behaviour of a session: commands, widget changes and preference
//! changes from other sessions.

use std::sync::Arc;
use std::time::Duration;

use coral_expand::{
    ChangeSource, Command, CommentNode, CommentThread, Config, ControlPanel, DiscoveryState,
    Preference, PreferenceStore, ReconciliationEngine, ReconciliationState, Reply,
    SessionHandle, SyncStorage, ThreadLocator, Visibility,
};
use tokio::time;

fn article_thread() -> CommentThread {
    CommentThread::with_comments(vec![
        CommentNode::new("alice", 0, Visibility::Hidden),
        CommentNode::new("bob", 1, Visibility::Hidden),
        CommentNode::new("carol", 2, Visibility::Hidden),
        CommentNode::new("dave", 0, Visibility::Shown),
        CommentNode::new("erin", 1, Visibility::Shown),
    ])
}

async fn started(storage: &SyncStorage, thread: &CommentThread) -> SessionHandle {
    let mut session = SessionHandle::start(
        &Config::default(),
        Arc::new(storage.session()),
        Arc::new(ThreadLocator::immediately(thread.clone())),
    );
    assert_eq!(session.wait_until_settled().await, DiscoveryState::Monitoring);
    session
}

async fn state(session: &SessionHandle) -> ReconciliationState {
    match session.send(Command::GetState).await.unwrap() {
        Reply::State(state) => state,
        other => panic!("unexpected reply {:?}", other),
    }
}

/// Let queued triggers drain.
async fn settle() {
    time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn scenario_a_enable_auto_expand_on_fresh_session() {
    let storage = SyncStorage::in_memory("sync");
    let thread = article_thread();
    let session = started(&storage, &thread).await;

    // Preference off: the initial pass and later changes expand nothing.
    assert_eq!(thread.hidden_count(), 3);
    thread.push_comment("frank", 1, Visibility::Hidden);
    settle().await;
    assert_eq!(thread.hidden_count(), 4);

    let response = session
        .request_json(r#"{"action":"setAutoExpand","enabled":true}"#)
        .await;
    assert_eq!(response, r#"{"success":true,"count":4}"#);

    let state = state(&session).await;
    assert!(state.auto_expand_enabled);
    assert!(!state.manual_collapse_active);
    assert!(storage.session().read().unwrap().always_expand);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_manual_collapse_suppresses_auto_expand() {
    let storage = SyncStorage::in_memory("sync");
    storage.session().write(Preference::new(true)).unwrap();
    let thread = article_thread();
    let session = started(&storage, &thread).await;
    assert_eq!(thread.hidden_count(), 0);

    let response = session.request_json(r#"{"action":"collapse"}"#).await;
    assert_eq!(response, r#"{"success":true,"count":3}"#);
    assert!(state(&session).await.manual_collapse_active);

    // New content and fallback polls leave everything as the user set it.
    thread.load_batch(vec![
        CommentNode::new("grace", 1, Visibility::Hidden),
        CommentNode::new("heidi", 0, Visibility::Hidden),
    ]);
    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(thread.hidden_count(), 5);
    assert!(state(&session).await.manual_collapse_active);

    let response = session.request_json(r#"{"action":"expand"}"#).await;
    assert_eq!(response, r#"{"success":true,"count":5}"#);
    assert!(!state(&session).await.manual_collapse_active);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_commands_while_searching() {
    let storage = SyncStorage::in_memory("sync");
    let session = SessionHandle::start(
        &Config::default(),
        Arc::new(storage.session()),
        Arc::new(ThreadLocator::after_attempts(article_thread(), 10)),
    );
    assert_eq!(session.discovery_state(), DiscoveryState::Searching);

    for request in [
        r#"{"action":"expand"}"#,
        r#"{"action":"collapse"}"#,
        r#"{"action":"setAutoExpand","enabled":true}"#,
        r#"{"action":"setAutoExpand","enabled":false}"#,
    ] {
        assert_eq!(
            session.request_json(request).await,
            r#"{"success":false,"error":"Comments not loaded yet"}"#,
            "{}",
            request
        );
    }
    assert_eq!(
        session.request_json(r#"{"action":"getState"}"#).await,
        r#"{"success":true,"autoExpandEnabled":false,"manualCollapseActive":false}"#
    );
    assert_eq!(storage.session().revision(), 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_preference_changed_in_another_session() {
    let storage = SyncStorage::in_memory("sync");
    let thread = article_thread();
    let session = started(&storage, &thread).await;

    session.send(Command::Collapse).await.unwrap();
    assert!(state(&session).await.manual_collapse_active);

    // Another tab flips the toggle.
    storage.session().write(Preference::new(true)).unwrap();
    settle().await;

    let state = state(&session).await;
    assert!(state.auto_expand_enabled);
    assert!(!state.manual_collapse_active);
    assert_eq!(thread.hidden_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn own_toggle_is_not_echoed_back() {
    let storage = SyncStorage::in_memory("sync");
    let thread = article_thread();
    let session = started(&storage, &thread).await;

    session
        .send(Command::SetAutoExpand { enabled: true })
        .await
        .unwrap();
    session.send(Command::Collapse).await.unwrap();
    settle().await;

    assert!(state(&session).await.manual_collapse_active);
    assert_eq!(thread.hidden_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn two_pages_follow_the_shared_preference() {
    let storage = SyncStorage::in_memory("sync");
    let first = article_thread();
    let second = article_thread();
    let page_one = started(&storage, &first).await;
    let _page_two = started(&storage, &second).await;

    page_one
        .send(Command::SetAutoExpand { enabled: true })
        .await
        .unwrap();
    settle().await;

    assert_eq!(first.hidden_count(), 0);
    assert_eq!(second.hidden_count(), 0);

    second.push_comment("ivan", 1, Visibility::Hidden);
    settle().await;
    assert_eq!(second.hidden_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn control_panel_toggle_before_widget_loads() {
    let storage = SyncStorage::in_memory("sync");
    let thread = article_thread();
    let mut session = SessionHandle::start(
        &Config::default(),
        Arc::new(storage.session()),
        Arc::new(ThreadLocator::after_attempts(thread.clone(), 5)),
    );

    let panel = ControlPanel::new(
        &Config::default().control,
        Arc::new(storage.session()),
        "https://www.ft.com/content/123",
        SessionHandle::start(
            &Config::default(),
            Arc::new(storage.session()),
            Arc::new(ThreadLocator::never()),
        ),
    );
    let status = panel.toggle(true).await;
    assert_eq!(status.text, "Enabled (reload page to apply)");
    assert!(!status.is_error);

    // The page picks the saved preference up once its widget appears.
    assert_eq!(session.wait_until_settled().await, DiscoveryState::Monitoring);
    assert_eq!(thread.hidden_count(), 0);
    assert!(state(&session).await.auto_expand_enabled);
}

#[tokio::test]
async fn manual_collapse_cleared_only_by_explicit_actions() {
    let storage = SyncStorage::in_memory("sync");
    let thread = article_thread();
    let mut engine = ReconciliationEngine::new(Arc::new(storage.session()));
    engine.on_discovered(Arc::new(thread.clone())).await;

    let commands = [
        Command::Collapse,
        Command::GetState,
        Command::Expand,
        Command::Collapse,
        Command::SetAutoExpand { enabled: true },
        Command::Collapse,
        Command::SetAutoExpand { enabled: false },
        Command::Collapse,
        Command::Collapse,
        Command::Expand,
    ];

    let mut collapsed = false;
    for command in commands {
        engine.on_command(command).await.unwrap();
        match command {
            Command::Collapse => collapsed = true,
            Command::Expand | Command::SetAutoExpand { .. } => collapsed = false,
            Command::GetState => {}
        }
        assert_eq!(engine.state().manual_collapse_active, collapsed, "{:?}", command);

        for source in [ChangeSource::Observed, ChangeSource::Poll] {
            thread.push_comment("new", 1, Visibility::Hidden);
            engine.on_widget_changed(source).await;
            assert_eq!(engine.state().manual_collapse_active, collapsed);
        }
    }
}
