// crates/tictactwo-client/tests/status_monitor.rs

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tictactwo_client::{
    ConnectionConfig, ConnectionManager, MemoryConnector, StatusBoard, StatusMonitor,
};
use tictactwo_protocol::wire_types::{TOPIC_PUBLIC, TOPIC_STATUS};
use tictactwo_protocol::{ClientFrame, ConnectionPurpose};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn config() -> ConnectionConfig {
    ConnectionConfig {
        reconnect_delay: Duration::from_millis(20),
        heartbeat_outgoing: Duration::ZERO,
        heartbeat_incoming: Duration::ZERO,
        connect_timeout: Duration::ZERO,
        event_channel_capacity: 64,
    }
}

async fn within<T>(future: impl Future<Output = Option<T>>) -> T {
    timeout(WAIT, future)
        .await
        .expect("timed out")
        .expect("peer went away")
}

async fn wait_board(monitor: &StatusMonitor, pred: impl Fn(&StatusBoard) -> bool) -> StatusBoard {
    let mut rx = monitor.watch();
    let board = timeout(WAIT, rx.wait_for(|board| pred(board)))
        .await
        .expect("timed out waiting for board")
        .expect("monitor stopped");
    board.clone()
}

const SNAPSHOT: &str = r#"{"type":"game_state_update","rooms":{
    "den": {"occupancy":"full","playerCount":2,"players":{"alice":"X","bob":"O"},"currentTurn":"O","isGameActive":true},
    "hut": {"occupancy":"waiting_for_opponent","playerCount":1,"players":{"carol":"X"},"isGameActive":false}
}}"#;

#[tokio::test]
async fn monitor_tracks_snapshots_across_reconnects() {
    let (connector, mut broker) = MemoryConnector::new();
    let conn = ConnectionManager::new(Arc::new(connector), config());
    let monitor = StatusMonitor::start(conn);
    assert!(monitor.identity().starts_with("status_monitor_"));

    let mut remote = within(broker.accept()).await;
    within(remote.expect_subscribe(TOPIC_STATUS)).await;
    assert_eq!(remote.purpose(), Some(ConnectionPurpose::Monitoring));
    assert_eq!(remote.identity(), Some(monitor.identity()));

    remote.publish(TOPIC_STATUS, SNAPSHOT);
    let board = wait_board(&monitor, |b| b.total_rooms() == 2).await;
    assert_eq!(board.active_games(), 1);
    assert_eq!(board.waiting_rooms(), 1);
    assert_eq!(board.total_players(), 3);
    assert!(board.is_connected());

    within(remote.expect_subscribe(TOPIC_PUBLIC)).await;
    remote.publish(TOPIC_PUBLIC, r#"{"type":"active_players","count":4}"#);
    wait_board(&monitor, |b| b.active_players() == 4).await;

    // Drop the transport; the monitor subscribes again on its own.
    remote.hang_up();
    wait_board(&monitor, |b| !b.is_connected()).await;
    let mut remote = within(broker.accept()).await;
    within(remote.expect_subscribe(TOPIC_STATUS)).await;
    wait_board(&monitor, |b| b.is_connected()).await;

    remote.publish(TOPIC_STATUS, r#"{"type":"game_state_update","rooms":{}}"#);
    wait_board(&monitor, |b| b.total_rooms() == 0).await;

    monitor.stop().await;
    while let Some(frame) = timeout(WAIT, remote.next_frame()).await.expect("timed out") {
        assert!(
            !matches!(frame, ClientFrame::Send { .. }),
            "monitor published {frame:?}"
        );
    }
}
