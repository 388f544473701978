use crate::Handle;

/// The unit of a shaper's bandwidth limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Metric {
    /// Packets per second.
    #[default]
    Pps = 0,
    /// Bits per second.
    Bps = 1,
}

impl TryFrom<u32> for Metric {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Metric::Pps),
            1 => Ok(Metric::Bps),
            _ => Err(value),
        }
    }
}

/// A shaping node on the NIC scheduler.
///
/// Rate and burst fields set to zero are unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaperInfo {
    /// Unique identifier of the node within its device.
    pub handle: Handle,
    /// The parent node. [`Handle::UNSPEC`] means the scope's default parent.
    pub parent: Handle,
    /// Whether the bandwidth limits count packets or bits.
    pub metric: Metric,
    /// Minimum guaranteed rate, according to `metric`.
    pub bw_min: u64,
    /// Maximum allowed rate, according to `metric`.
    pub bw_max: u64,
    /// Maximum burst in bytes for `bw_max`.
    pub burst: u64,
    /// Scheduling strict priority.
    pub priority: u32,
    /// Scheduling WRR weight among siblings at equal priority.
    pub weight: u32,
}

impl ShaperInfo {
    /// A new shaper with every setting unset.
    pub fn new(handle: Handle) -> Self {
        Self { handle, ..Default::default() }
    }

    pub fn with_parent(mut self, parent: Handle) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_bw_min(mut self, bw_min: u64) -> Self {
        self.bw_min = bw_min;
        self
    }

    pub fn with_bw_max(mut self, bw_max: u64) -> Self {
        self.bw_max = bw_max;
        self
    }

    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// A request to create or update a shaper.
///
/// Only the handle is mandatory. Fields left as `None` keep the value already stored for the
/// shaper, or the unset default when the shaper is new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaperUpdate {
    pub handle: Handle,
    pub parent: Option<Handle>,
    pub metric: Option<Metric>,
    pub bw_min: Option<u64>,
    pub bw_max: Option<u64>,
    pub burst: Option<u64>,
    pub priority: Option<u32>,
    pub weight: Option<u32>,
}

impl ShaperUpdate {
    pub fn new(handle: Handle) -> Self {
        Self { handle, ..Default::default() }
    }

    pub fn parent(mut self, parent: Handle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn bw_min(mut self, bw_min: u64) -> Self {
        self.bw_min = Some(bw_min);
        self
    }

    pub fn bw_max(mut self, bw_max: u64) -> Self {
        self.bw_max = Some(bw_max);
        self
    }

    pub fn burst(mut self, burst: u64) -> Self {
        self.burst = Some(burst);
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Applies the provided fields on top of `base`. The handle of `base` is replaced with the
    /// update's handle.
    pub fn apply_to(&self, base: ShaperInfo) -> ShaperInfo {
        ShaperInfo {
            handle: self.handle,
            parent: self.parent.unwrap_or(base.parent),
            metric: self.metric.unwrap_or(base.metric),
            bw_min: self.bw_min.unwrap_or(base.bw_min),
            bw_max: self.bw_max.unwrap_or(base.bw_max),
            burst: self.burst.unwrap_or(base.burst),
            priority: self.priority.unwrap_or(base.priority),
            weight: self.weight.unwrap_or(base.weight),
        }
    }
}

impl From<ShaperInfo> for ShaperUpdate {
    fn from(info: ShaperInfo) -> Self {
        Self {
            handle: info.handle,
            parent: Some(info.parent),
            metric: Some(info.metric),
            bw_min: Some(info.bw_min),
            bw_max: Some(info.bw_max),
            burst: Some(info.burst),
            priority: Some(info.priority),
            weight: Some(info.weight),
        }
    }
}
