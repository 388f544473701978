use std::sync::Arc;

use shaper::{
    Device, DeviceInfo, Handle, Registry, ShaperClient, ShaperServer, ShaperUpdate, SimBackend,
};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    // A single device backed by simulated hardware
    let registry = Arc::new(Registry::new());
    registry
        .register(Device::new(DeviceInfo::new(2, "eth0"), Some(Arc::new(SimBackend::new()))))
        .unwrap();

    let mut server = ShaperServer::new(registry);
    server.bind("127.0.0.1:0").await.unwrap();

    let mut client = ShaperClient::new();
    client.connect(server.local_addr().unwrap()).await.unwrap();

    // Cap the device at 10 Gbps and nest two queue groups under a detached node
    let n = client
        .set(
            2,
            vec![
                ShaperUpdate::new(Handle::netdev()).bw_max(10_000_000_000),
                ShaperUpdate::new(Handle::detached(0)).bw_max(1_000_000_000),
                ShaperUpdate::new(Handle::queue_group(0)).parent(Handle::detached(0)).weight(3),
                ShaperUpdate::new(Handle::queue_group(1)).parent(Handle::detached(0)).weight(1),
            ],
        )
        .await
        .unwrap();
    println!("Configured {n} shapers");

    for info in client.dump_all(2).await.unwrap() {
        println!(
            "{} -> {}: bw_max={} weight={}",
            info.handle, info.parent, info.bw_max, info.weight
        );
    }

    // Move group 1 back under the device and drop the rest
    client.move_shapers(2, vec![(Handle::queue_group(1), Handle::netdev())]).await.unwrap();
    client.delete(2, vec![Handle::queue_group(0), Handle::detached(0)]).await.unwrap();

    let info = client.get(2, Handle::queue_group(1)).await.unwrap();
    println!("Group 1 now under {}", info.parent);

    for (scope, caps) in client.capabilities_all(2).await.unwrap() {
        println!("{scope}: {caps:?}");
    }
}
