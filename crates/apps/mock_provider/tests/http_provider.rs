use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mock_provider::{AppState, World};
use pretty_assertions::assert_eq;
use streaming::{
    Channel, ControlAction, DataProvider, Direction, HttpProvider, ProviderError, RunStatus,
    SignalColor, SignalCommand, Strategy, SyncConfig, Synchronizer,
};

async fn spawn_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_provider::serve(listener, AppState::new(World::new())));
    addr
}

fn provider(addr: SocketAddr) -> HttpProvider {
    HttpProvider::new(format!("http://{addr}/")).with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn reads_every_resource() {
    let p = provider(spawn_server().await);

    let state = p.fetch_state().await.unwrap();
    assert_eq!(state.intersections.len(), 2);
    assert_eq!(state.vehicles.len(), 3);
    assert!(state.intersection("A1").is_some());

    let metrics = p.fetch_metrics().await.unwrap();
    assert_eq!(metrics.total_processed, 1300);
    assert_eq!(metrics.wait_time_history.as_deref().map(<[f64]>::len), Some(5));

    let summary = p.fetch_summary().await.unwrap();
    assert_eq!(summary.status, RunStatus::Running);
    assert_eq!(summary.emergency_vehicles, 1);

    let settings = p.fetch_settings().await.unwrap();
    assert_eq!(settings.strategy, Strategy::Ai);
}

#[tokio::test]
async fn writes_are_applied_and_echoed() {
    let p = provider(spawn_server().await);

    let settings = p.update_settings(Strategy::Manual).await.unwrap();
    assert_eq!(settings.strategy, Strategy::Manual);
    assert_eq!(p.fetch_settings().await.unwrap().strategy, Strategy::Manual);

    let action = ControlAction::new("B2", SignalCommand::NsGreen);
    assert_eq!(p.send_control(action.clone()).await.unwrap(), action);
    let state = p.fetch_state().await.unwrap();
    let b2 = state.intersection("B2").unwrap();
    assert_eq!(b2.phase, 0);
    assert_eq!(b2.signal(Direction::North), Some(SignalColor::Green));
    assert_eq!(b2.signal(Direction::East), Some(SignalColor::Red));
}

#[tokio::test]
async fn remote_rejections_carry_detail() {
    let p = provider(spawn_server().await);
    let err = p
        .send_control(ControlAction::new("Z9", SignalCommand::AllRed))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::Remote {
            status: 400,
            detail: "Invalid traffic light ID: Z9".into(),
        }
    );
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let err = provider(addr).fetch_state().await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn synchronizer_fills_snapshot_over_http() {
    let p = Arc::new(provider(spawn_server().await));
    let sync = Synchronizer::new(
        p,
        SyncConfig::new(Duration::from_millis(50), Duration::from_millis(100)),
    );
    sync.start();

    let mut ready = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snap = sync.snapshot();
        if snap.state.is_some() && snap.metrics.is_some() && snap.summary.is_some() && snap.strategy.is_some() {
            ready = true;
            break;
        }
    }
    assert!(ready, "snapshot never filled: {:?}", sync.last_error());
    assert_eq!(sync.last_error(), None);

    let confirmed = sync
        .send_control(ControlAction::new("A1", SignalCommand::EwYellow))
        .await
        .unwrap();
    assert_eq!(confirmed.action, SignalCommand::EwYellow);
    assert!(sync.revision(Channel::Control) >= 1);

    sync.stop();
    assert!(!sync.is_running());
}
