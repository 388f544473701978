use shaper_core::{Cursor, Registry, ShaperError};
use shaper_wire::{Reply, Request};

/// Runs a request against the registry. Blocks for as long as the device backend does.
pub(crate) fn handle(registry: &Registry, request: Request, max_page_size: usize) -> Reply {
    match dispatch(registry, request, max_page_size) {
        Ok(reply) => reply,
        Err(e) => Reply::Error { code: e.errno(), message: e.to_string() },
    }
}

fn dispatch(
    registry: &Registry,
    request: Request,
    max_page_size: usize,
) -> Result<Reply, ShaperError> {
    let device = registry.device(request.ifindex())?;

    Ok(match request {
        Request::Get { handle, .. } => Reply::Shaper(device.get(handle)?),
        Request::Dump { cursor, page_size, .. } => {
            let budget = page_size
                .map(|size| size as usize)
                .unwrap_or(device.options().default_page_size)
                .min(max_page_size);
            let page = device.list(Cursor::from_raw(cursor), Some(budget))?;
            Reply::Shapers {
                shapers: page.shapers,
                cursor: page.next.map(Cursor::raw),
            }
        }
        Request::Set { shapers, .. } => modified(device.set(&shapers)?),
        Request::Delete { handles, .. } => modified(device.delete(&handles)?),
        Request::Move { moves, .. } => modified(device.move_shapers(&moves)?),
        Request::CapGet { scope, .. } => {
            Reply::Capabilities(vec![(scope, device.capabilities(scope)?)])
        }
        Request::CapDump { .. } => Reply::Capabilities(device.capabilities_all()?),
    })
}

#[inline]
fn modified(count: usize) -> Reply {
    Reply::Modified(u32::try_from(count).unwrap_or(u32::MAX))
}
