use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use shaper_core::{
    errno, Capabilities, Cursor, Device, DeviceInfo, DeviceOptions, Handle, Registry, Scope,
    ShaperUpdate,
};
use shaper_sim::{SimBackend, SimOptions};
use shaper_socket::{
    ClientError, ClientOptions, ServerError, ServerOptions, ShaperClient, ShaperServer,
};
use shaper_wire::{message::cmd, Codec, Frame, Reply, Request, DEFAULT_MAX_FRAME_SIZE};

const ETH0: u32 = 2;
const LO: u32 = 1;

async fn setup(options: ServerOptions, sim: SimBackend) -> (ShaperServer, ShaperClient) {
    let _ = tracing_subscriber::fmt::try_init();

    let registry = Arc::new(Registry::new());
    registry.register(Device::new(DeviceInfo::new(LO, "lo"), None)).unwrap();
    registry
        .register(Device::with_options(
            DeviceInfo::new(ETH0, "eth0"),
            Some(Arc::new(sim)),
            DeviceOptions::default().default_page_size(4),
        ))
        .unwrap();

    let mut server = ShaperServer::with_options(registry, options);
    server.bind("127.0.0.1:0").await.unwrap();

    let mut client = ShaperClient::new();
    client.connect(server.local_addr().unwrap()).await.unwrap();

    (server, client)
}

#[tokio::test]
async fn set_get_dump() {
    let (server, client) = setup(ServerOptions::default(), SimBackend::new()).await;

    let n = client
        .set(ETH0, vec![ShaperUpdate::new(Handle::queue(0)).bw_max(1_000)])
        .await
        .unwrap();
    assert_eq!(n, 1);

    let info = client.get(ETH0, Handle::queue(0)).await.unwrap();
    assert_eq!(info.parent, Handle::netdev());
    assert_eq!(info.bw_max, 1_000);

    let updates: Vec<_> = (1..10).map(|q| ShaperUpdate::new(Handle::queue(q)).weight(q)).collect();
    assert_eq!(client.set(ETH0, updates).await.unwrap(), 9);

    // the device pages by 4
    let first = client.dump_page(ETH0, Cursor::START, None).await.unwrap();
    assert_eq!(first.shapers.len(), 4);
    assert!(first.next.is_some());

    let all = client.dump_all(ETH0).await.unwrap();
    let handles: Vec<_> = all.iter().map(|info| info.handle).collect();
    assert_eq!(handles, (0..10).map(Handle::queue).collect::<Vec<_>>());

    let device = server.registry().device(ETH0).unwrap();
    assert_eq!(device.shapers(), all);
    let stats = server.stats();
    assert!(stats.bytes_rx() > 0);
    assert!(stats.bytes_tx() > 0);
    assert_eq!(stats.requests(cmd::SET), 2);
    assert_eq!(stats.requests(cmd::GET), 1);
    // one page, then three for the full dump
    assert_eq!(stats.requests(cmd::DUMP), 4);
    assert_eq!(stats.total_requests(), 7);
}

#[tokio::test]
async fn move_and_delete() {
    let (server, client) = setup(ServerOptions::default(), SimBackend::new()).await;

    client
        .set(
            ETH0,
            vec![
                ShaperUpdate::new(Handle::detached(0)).bw_max(500),
                ShaperUpdate::new(Handle::queue_group(5)).bw_max(42),
            ],
        )
        .await
        .unwrap();

    let n = client.move_shapers(ETH0, vec![(Handle::queue_group(5), Handle::detached(0))]).await;
    assert_eq!(n.unwrap(), 1);

    let info = client.get(ETH0, Handle::queue_group(5)).await.unwrap();
    assert_eq!(info.parent, Handle::detached(0));
    assert_eq!(info.bw_max, 42);

    // moving a shaper that doesn't exist
    let err =
        client.move_shapers(ETH0, vec![(Handle::queue(9), Handle::netdev())]).await.unwrap_err();
    assert_eq!(err.code(), Some(errno::EINVAL));

    // a cycle
    let err = client
        .move_shapers(ETH0, vec![(Handle::detached(0), Handle::queue_group(5))])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(errno::EINVAL));

    assert_eq!(client.delete(ETH0, vec![Handle::queue_group(5)]).await.unwrap(), 1);
    let err = client.get(ETH0, Handle::queue_group(5)).await.unwrap_err();
    assert_eq!(err.code(), Some(errno::EINVAL));
    assert_eq!(server.registry().device(ETH0).unwrap().shapers().len(), 1);
}

#[tokio::test]
async fn capabilities() {
    let sim = SimBackend::with_options(
        SimOptions::empty()
            .scope(Scope::Netdev, Capabilities::all())
            .scope(Scope::Queue, Capabilities::METRIC_BPS | Capabilities::BW_MAX),
    );
    let (_server, client) = setup(ServerOptions::default(), sim).await;

    let caps = client.capabilities(ETH0, Scope::Queue).await.unwrap();
    assert_eq!(caps, Capabilities::METRIC_BPS | Capabilities::BW_MAX);

    let err = client.capabilities(ETH0, Scope::VirtualFunction).await.unwrap_err();
    assert_eq!(err.code(), Some(errno::EOPNOTSUPP));

    let all = client.capabilities_all(ETH0).await.unwrap();
    assert_eq!(all, vec![(Scope::Netdev, Capabilities::all()), (Scope::Queue, caps)]);
}

#[tokio::test]
async fn request_errors() {
    let (server, client) = setup(ServerOptions::default(), SimBackend::new()).await;

    // unknown device
    let err = client.get(99, Handle::netdev()).await.unwrap_err();
    assert_eq!(err.code(), Some(errno::EINVAL));

    // device without shaper support
    let err = client.set(LO, vec![ShaperUpdate::new(Handle::netdev())]).await.unwrap_err();
    assert_eq!(err.code(), Some(errno::EOPNOTSUPP));

    // never configured
    let err = client.get(ETH0, Handle::netdev()).await.unwrap_err();
    assert_eq!(err.code(), Some(errno::EINVAL));
    assert!(client.dump_all(ETH0).await.unwrap().is_empty());
    assert_eq!(client.delete(ETH0, vec![Handle::queue(0)]).await.unwrap(), 0);

    // illegal parent
    let err = client
        .set(ETH0, vec![ShaperUpdate::new(Handle::queue(0)).parent(Handle::queue_group(1))])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(errno::EINVAL));

    // the connection is still usable
    assert_eq!(client.set(ETH0, vec![ShaperUpdate::new(Handle::netdev())]).await.unwrap(), 1);
    assert_eq!(server.stats().failed_requests(), 4);
}

#[tokio::test]
async fn oversized_request_is_rejected() {
    let options = ServerOptions::default().max_frame_size(256);
    let (server, client) = setup(options, SimBackend::new()).await;

    let updates: Vec<_> = (0..64).map(|q| ShaperUpdate::new(Handle::queue(q)).bw_max(1)).collect();
    let err = client.set(ETH0, updates).await.unwrap_err();
    assert_eq!(err.code(), Some(errno::EMSGSIZE));
    assert_eq!(server.stats().oversized_frames(), 1);
    assert_eq!(server.stats().failed_requests(), 1);

    // the server closed the connection
    let err = client.request(Request::CapDump { ifindex: ETH0 }).await.unwrap_err();
    assert!(matches!(err, ClientError::SocketClosed));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let sim = SimBackend::with_options(SimOptions::default().latency(Duration::from_millis(500)));
    let (server, _) = setup(ServerOptions::default(), sim).await;

    let options = ClientOptions::default().timeout(Duration::from_millis(50));
    let mut client = ShaperClient::with_options(options);
    client.connect(server.local_addr().unwrap()).await.unwrap();

    let err = client.set(ETH0, vec![ShaperUpdate::new(Handle::netdev())]).await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout));

    // the request still went through on the device
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.registry().device(ETH0).unwrap().shapers().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clients() {
    let (server, client) = setup(ServerOptions::default(), SimBackend::new()).await;
    let addr = server.local_addr().unwrap();

    let mut tasks = Vec::new();
    for worker in 0..8u32 {
        let shared = client.clone();
        tasks.push(tokio::spawn(async move {
            let mut own = ShaperClient::new();
            own.connect(addr).await.unwrap();

            for i in 0..16 {
                let client = if i % 2 == 0 { &own } else { &shared };
                let handle = Handle::queue(worker * 16 + i);
                let n = client.set(ETH0, vec![ShaperUpdate::new(handle).bw_max(7)]).await;
                assert_eq!(n.unwrap(), 1);
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let all = client.dump_all(ETH0).await.unwrap();
    assert_eq!(all.len(), 8 * 16);
    assert!(all.iter().all(|info| info.bw_max == 7));
}

#[tokio::test]
async fn max_clients() {
    let (server, _client) = setup(ServerOptions::default().max_clients(1), SimBackend::new()).await;

    let mut second = ShaperClient::new();
    second.connect(server.local_addr().unwrap()).await.unwrap();

    let err = second.request(Request::CapDump { ifindex: ETH0 }).await.unwrap_err();
    assert!(matches!(err, ClientError::SocketClosed));
    assert_eq!(server.stats().active_clients(), 1);
}

#[tokio::test]
async fn unknown_command_is_malformed() {
    let (server, _client) = setup(ServerOptions::default(), SimBackend::new()).await;

    let stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    let mut conn = Framed::new(stream, Codec::new(DEFAULT_MAX_FRAME_SIZE));
    conn.send(Frame::new(42, 0, 7, Default::default())).await.unwrap();

    let frame = conn.next().await.unwrap().unwrap();
    assert_eq!(frame.seq(), 7);
    let Reply::Error { code, .. } = Reply::from_frame(&frame).unwrap() else {
        panic!("expected an error reply");
    };
    assert_eq!(code, errno::EINVAL);

    let stats = server.stats();
    assert_eq!(stats.malformed_requests(), 1);
    assert_eq!(stats.requests(0), 1);
    assert_eq!(stats.failed_requests(), 1);
}

#[tokio::test]
async fn bind_reports_io_errors() {
    let (server, _client) = setup(ServerOptions::default(), SimBackend::new()).await;

    let mut other = ShaperServer::new(Arc::new(Registry::new()));
    let err = other.bind(server.local_addr().unwrap()).await.unwrap_err();
    assert!(matches!(err, ServerError::Io(_)));
    assert!(other.local_addr().is_none());
}
