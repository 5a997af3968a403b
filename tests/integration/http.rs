//! Fleet end to end: config -> listeners -> fake replicas -> HTTP

use std::net::SocketAddr;
use std::time::Duration;

use hyper::StatusCode;
use tokio::sync::watch;

use replica_healthcheck::server::{Fleet, FleetError, ListenerError, ListenerState};

use crate::fake_mysql::{FakeReplica, Reply};
use crate::{free_port, http_get, parse_config, replica_yaml};

async fn wait_until_serving(states: &[(String, watch::Receiver<ListenerState>)]) {
    for (name, state) in states {
        let mut state = state.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ListenerState::Serving),
        )
        .await
        .unwrap_or_else(|_| panic!("{name} never started serving"))
        .unwrap();
    }
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[tokio::test]
async fn test_fleet_serves_each_replica_independently() {
    let healthy = FakeReplica::start(
        "",
        Reply::status(&[
            ("Replica_IO_Running", Some("Yes")),
            ("Seconds_Behind_Source", Some("0")),
        ]),
    )
    .await;
    let lagging = FakeReplica::start(
        "",
        Reply::status(&[
            ("Replica_IO_Running", Some("Yes")),
            ("Seconds_Behind_Source", Some("30")),
        ]),
    )
    .await;
    let stopped = FakeReplica::start("", Reply::empty(&["Seconds_Behind_Source"])).await;

    let (healthy_port, lagging_port, stopped_port) = (free_port(), free_port(), free_port());
    let yaml = [
        replica_yaml("healthy", healthy.port(), "", healthy_port, ""),
        replica_yaml(
            "lagging",
            lagging.port(),
            "",
            lagging_port,
            "  max_seconds_behind_source: 10\n",
        ),
        replica_yaml(
            "stopped",
            stopped.port(),
            "",
            stopped_port,
            "  fail_replica_not_running: true\n",
        ),
    ]
    .concat();

    let fleet = Fleet::from_config(&parse_config(&yaml)).unwrap();
    let shutdown = fleet.shutdown_token();
    let states = fleet.states();
    let running = tokio::spawn(fleet.run());
    wait_until_serving(&states).await;

    let (status, body) = http_get(loopback(healthy_port), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "{\"Replica_IO_Running\":\"Yes\",\"Seconds_Behind_Source\":0}\n"
    );

    let (status, body) = http_get(loopback(lagging_port), "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "replication lag is too high\n");

    let (status, body) = http_get(loopback(stopped_port), "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("not running"), "{body}");

    // Every request probes again
    http_get(loopback(healthy_port), "/").await;
    assert_eq!(healthy.queries().len(), 2);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    for (name, state) in states {
        assert_eq!(*state.borrow(), ListenerState::Stopped, "{name}");
    }
}

#[tokio::test]
async fn test_custom_path_routing() {
    let fake = FakeReplica::start("", Reply::status(&[("Seconds_Behind_Source", Some("0"))])).await;
    let port = free_port();
    let yaml = replica_yaml("replica1", fake.port(), "", port, "").replace(
        "    port: ",
        "    path: /replica-status\n    port: ",
    );

    let fleet = Fleet::from_config(&parse_config(&yaml)).unwrap();
    let shutdown = fleet.shutdown_token();
    let states = fleet.states();
    let running = tokio::spawn(fleet.run());
    wait_until_serving(&states).await;

    let (status, _) = http_get(loopback(port), "/replica-status").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = http_get(loopback(port), "/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(fake.queries().len(), 1);

    shutdown.cancel();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_failure_takes_down_the_fleet() {
    let fake = FakeReplica::start("", Reply::status(&[("Seconds_Behind_Source", Some("0"))])).await;
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let occupied_port = occupied.local_addr().unwrap().port();
    let good_port = free_port();

    let yaml = [
        replica_yaml("good", fake.port(), "", good_port, ""),
        replica_yaml("occupied", fake.port(), "", occupied_port, ""),
    ]
    .concat();
    let fleet = Fleet::from_config(&parse_config(&yaml)).unwrap();
    let states = fleet.states();

    let err = tokio::time::timeout(Duration::from_secs(10), fleet.run())
        .await
        .unwrap()
        .unwrap_err();
    match err {
        FleetError::Listener(ListenerError::Bind { replica, addr, .. }) => {
            assert_eq!(replica, "occupied");
            assert_eq!(addr.port(), occupied_port);
        }
        other => panic!("expected bind failure, got {other}"),
    }
    for (name, state) in states {
        assert_eq!(*state.borrow(), ListenerState::Stopped, "{name}");
    }
    // The healthy listener is gone too
    assert!(tokio::net::TcpStream::connect(loopback(good_port)).await.is_err());
}

#[tokio::test]
async fn test_missing_port_fails_before_listening() {
    let free = free_port();
    let yaml = [
        replica_yaml("good", 3306, "", free, ""),
        replica_yaml("noport", 3306, "", 0, ""),
    ]
    .concat();

    let err = Fleet::from_config(&parse_config(&yaml)).err().unwrap();
    assert_eq!(err.to_string(), "port not specified for noport");
    assert!(tokio::net::TcpStream::connect(loopback(free)).await.is_err());
}
