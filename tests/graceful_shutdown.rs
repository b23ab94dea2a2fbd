// Drain and forced-close behaviour of a running gateway.
mod common;

use std::time::Duration;

use common::{client, spawn_backend, spawn_gateway};
use courier::{LifecycleState, ShutdownReason};
use reqwest::StatusCode;

#[tokio::test(flavor = "multi_thread")]
async fn test_in_flight_request_completes_during_drain() {
    let (backend, probe) = spawn_backend(Duration::from_millis(300)).await;
    let mut gw = spawn_gateway(backend, "5s").await;

    let url = gw.url("/slow");
    let in_flight = tokio::spawn(async move { client().post(url).body("drain me").send().await });
    probe.wait_started(1).await;

    gw.shutdown.trigger_shutdown(ShutdownReason::Terminate);
    gw.lifecycle
        .wait_for(|s| *s == LifecycleState::Draining)
        .await
        .unwrap();

    // No new connections once draining.
    assert!(tokio::net::TcpStream::connect(gw.addr).await.is_err());

    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "drain me");

    tokio::time::timeout(Duration::from_secs(5), gw.server)
        .await
        .expect("server should stop after draining")
        .unwrap()
        .unwrap();
    assert_eq!(*gw.lifecycle.borrow(), LifecycleState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_requests_past_grace_period_are_force_closed() {
    let (backend, probe) = spawn_backend(Duration::from_secs(10)).await;
    let gw = spawn_gateway(backend, "200ms").await;

    let url = gw.url("/slow");
    let stuck = tokio::spawn(async move { client().post(url).body("never").send().await });
    probe.wait_started(1).await;

    let started = std::time::Instant::now();
    gw.shutdown.trigger_shutdown(ShutdownReason::Interrupt);

    tokio::time::timeout(Duration::from_secs(3), gw.server)
        .await
        .expect("forced close should not wait for the backend")
        .unwrap()
        .expect("aborting connection tasks is a clean forced close");
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(*gw.lifecycle.borrow(), LifecycleState::Stopped);

    // The caller's connection was cut rather than answered.
    let outcome = tokio::time::timeout(Duration::from_secs(3), stuck)
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_idle_keep_alive_connections_do_not_block_drain() {
    let (backend, _) = spawn_backend(Duration::ZERO).await;
    let gw = spawn_gateway(backend, "5s").await;

    // Leaves an idle pooled connection behind.
    let keep_alive = client();
    let response = keep_alive.get(gw.url("/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let started = std::time::Instant::now();
    gw.shutdown.trigger_shutdown(ShutdownReason::Requested);
    gw.server.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));
}
