use std::sync::Arc;

use shaper::{Device, DeviceInfo, Handle, Registry, ShaperUpdate, SimBackend};

fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let sim = Arc::new(SimBackend::new());
    let registry = Registry::new();
    let device =
        registry.register(Device::new(DeviceInfo::new(2, "eth0"), Some(sim.clone()))).unwrap();

    // The hardware runs out of room after 3 entries
    sim.set_accept_limit(Some(3));

    let updates: Vec<_> =
        (0..8).map(|q| ShaperUpdate::new(Handle::queue(q)).bw_max(100_000)).collect();
    let n = device.set(&updates).unwrap();
    println!("Applied {n} of {} shapers", updates.len());

    // Only the applied prefix is visible
    for info in device.shapers() {
        println!("{} -> {}", info.handle, info.parent);
    }
    assert_eq!(device.shapers(), sim.hardware());

    let stats = device.stats();
    println!("partial batches: {}, rolled back: {}", stats.partial(), stats.rolled_back());
}
