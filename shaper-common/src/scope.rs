use std::fmt;

/// The place of a shaper node in the device scheduling tree.
///
/// `Port` and `VirtualFunction` are only available on PF devices, usually inside the
/// host/hypervisor. `Netdev`, `QueueGroup` and `Queue` are available on both PFs and VFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Scope {
    /// Sentinel: no scope. A handle with this scope means "no handle".
    #[default]
    Unspecified = 0,
    /// The root shaper for the whole NIC.
    Port = 1,
    /// The main shaper for a given network device.
    Netdev = 2,
    /// The shaper attached to a given virtual function.
    VirtualFunction = 3,
    /// A shaper grouping multiple queues under the same device.
    QueueGroup = 4,
    /// The shaper attached to a single hardware queue.
    Queue = 5,
    /// A shaper created with no implied parent, to be attached later.
    Detached = 6,
}

impl Scope {
    /// Every scope, in wire order.
    pub const ALL: [Scope; 7] = [
        Scope::Unspecified,
        Scope::Port,
        Scope::Netdev,
        Scope::VirtualFunction,
        Scope::QueueGroup,
        Scope::Queue,
        Scope::Detached,
    ];

    /// The largest valid wire value.
    pub const MAX: u32 = Scope::Detached as u32;

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Unspecified => "unspec",
            Scope::Port => "port",
            Scope::Netdev => "netdev",
            Scope::VirtualFunction => "vf",
            Scope::QueueGroup => "queue-group",
            Scope::Queue => "queue",
            Scope::Detached => "detached",
        }
    }
}

impl TryFrom<u32> for Scope {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Scope::Unspecified),
            1 => Ok(Scope::Port),
            2 => Ok(Scope::Netdev),
            3 => Ok(Scope::VirtualFunction),
            4 => Ok(Scope::QueueGroup),
            5 => Ok(Scope::Queue),
            6 => Ok(Scope::Detached),
            _ => Err(value),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
