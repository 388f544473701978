use std::sync::Arc;

use shaper_core::{BackendError, Device, DeviceInfo, Handle, Registry, ShaperUpdate};
use shaper_sim::SimBackend;
use shaper_socket::{ClientError, ShaperClient, ShaperServer};
use shaper_wire::attr::MAX_VALUE_SIZE;

const ETH0: u32 = 2;

async fn setup() -> (ShaperServer, ShaperClient, Arc<SimBackend>, Arc<Device>) {
    let _ = tracing_subscriber::fmt::try_init();

    let sim = Arc::new(SimBackend::new());
    let registry = Arc::new(Registry::new());
    let device =
        registry.register(Device::new(DeviceInfo::new(ETH0, "eth0"), Some(sim.clone()))).unwrap();

    let mut server = ShaperServer::new(registry);
    server.bind("127.0.0.1:0").await.unwrap();

    let mut client = ShaperClient::new();
    client.connect(server.local_addr().unwrap()).await.unwrap();

    (server, client, sim, device)
}

fn queues(range: std::ops::Range<u32>, weight: u32) -> Vec<ShaperUpdate> {
    range.map(|q| ShaperUpdate::new(Handle::queue(q)).weight(weight)).collect()
}

#[tokio::test]
async fn store_follows_the_applied_prefix() {
    let (_server, client, sim, device) = setup().await;

    sim.set_accept_limit(Some(2));
    assert_eq!(client.set(ETH0, queues(0..4, 1)).await.unwrap(), 2);
    assert_eq!(device.shapers(), sim.hardware());
    assert_eq!(device.shapers().len(), 2);

    // an update of an existing shaper gets through, the new one behind it doesn't
    sim.set_accept_limit(Some(1));
    let batch =
        vec![ShaperUpdate::new(Handle::queue(0)).weight(5), ShaperUpdate::new(Handle::queue(9))];
    assert_eq!(client.set(ETH0, batch).await.unwrap(), 1);

    assert_eq!(client.get(ETH0, Handle::queue(0)).await.unwrap().weight, 5);
    assert!(client.get(ETH0, Handle::queue(9)).await.is_err());
    assert_eq!(device.shapers(), sim.hardware());

    let stats = device.stats();
    assert_eq!(stats.partial(), 2);
    assert_eq!(stats.applied(), 3);
    assert_eq!(stats.rolled_back(), 3);
}

#[tokio::test]
async fn over_reported_count_is_clamped() {
    let (_server, client, sim, device) = setup().await;

    sim.set_lie_about_count(5);
    assert_eq!(client.set(ETH0, queues(0..2, 1)).await.unwrap(), 2);
    assert_eq!(client.delete(ETH0, vec![Handle::queue(0)]).await.unwrap(), 1);

    assert_eq!(device.stats().contract_violations(), 2);
    assert_eq!(device.shapers(), sim.hardware());
}

#[tokio::test]
async fn failed_batch_changes_nothing() {
    let (_server, client, sim, device) = setup().await;

    client.set(ETH0, queues(0..2, 1)).await.unwrap();
    let before = device.shapers();

    sim.set_failure(Some(BackendError::Failed { code: 16, reason: "device busy".into() }));
    let err = client.set(ETH0, queues(0..4, 2)).await.unwrap_err();
    assert_eq!(err.code(), Some(16));
    let err = client.delete(ETH0, vec![Handle::queue(0)]).await.unwrap_err();
    assert_eq!(err.code(), Some(16));

    assert_eq!(device.shapers(), before);
    assert_eq!(device.stats().failed(), 2);

    sim.set_failure(None);
    assert_eq!(client.set(ETH0, queues(0..4, 2)).await.unwrap(), 4);
    assert!(client.dump_all(ETH0).await.unwrap().iter().all(|info| info.weight == 2));
}

#[tokio::test]
async fn long_backend_reason_is_clipped() {
    let (server, client, sim, device) = setup().await;

    let reason = "x".repeat(70_000);
    sim.set_failure(Some(BackendError::Failed { code: 16, reason }));
    let err = client.set(ETH0, queues(0..2, 1)).await.unwrap_err();
    assert_eq!(err.code(), Some(16));
    let ClientError::Remote { message, .. } = err else {
        panic!("expected a remote error");
    };
    assert_eq!(message.len(), MAX_VALUE_SIZE);

    // the session survived the reply
    sim.set_failure(None);
    assert_eq!(client.set(ETH0, queues(0..2, 1)).await.unwrap(), 2);
    assert_eq!(device.shapers().len(), 2);
    assert_eq!(server.stats().active_clients(), 1);
}

#[tokio::test]
async fn partial_delete() {
    let (_server, client, sim, device) = setup().await;

    client.set(ETH0, queues(0..4, 1)).await.unwrap();

    sim.set_accept_limit(Some(2));
    let handles = vec![Handle::queue(3), Handle::queue(1), Handle::queue(0)];
    assert_eq!(client.delete(ETH0, handles).await.unwrap(), 2);

    let left: Vec<_> = device.shapers().iter().map(|info| info.handle).collect();
    assert_eq!(left, vec![Handle::queue(0), Handle::queue(2)]);
    assert_eq!(device.shapers(), sim.hardware());
}
