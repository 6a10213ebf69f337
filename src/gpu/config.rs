#[cfg(feature = "strata-serde")]
use serde::{Deserialize, Serialize};

/// Descriptor counts of one backing binding pool.
#[cfg_attr(feature = "strata-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingPoolSizes {
    pub max_sets: u32,
    pub textures: u32,
    pub images: u32,
    pub input_attachments: u32,
    pub texel_buffers: u32,
    pub mutable_texel_buffers: u32,
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub dynamic_uniform_buffers: u32,
    pub dynamic_storage_buffers: u32,
}

impl Default for BindingPoolSizes {
    fn default() -> Self {
        Self {
            max_sets: 100,
            textures: 400,
            images: 100,
            input_attachments: 100,
            texel_buffers: 50,
            mutable_texel_buffers: 50,
            uniform_buffers: 300,
            storage_buffers: 0,
            dynamic_uniform_buffers: 200,
            dynamic_storage_buffers: 100,
        }
    }
}

/// Tunables of a [`Device`](crate::gpu::Device).
#[cfg_attr(feature = "strata-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Frames the CPU may run ahead of the GPU.
    pub delay_frames: u32,
    /// Submissions expected within one frame.
    pub expected_frame_flushes: u32,
    /// Timeout for submit-slot fence waits during a flush.
    pub wait_timeout_ns: u64,
    /// Timeout for read maps of synchronized buffers.
    pub map_read_timeout_ns: u64,
    /// How many of the most recent entries are scanned for duplicates.
    pub recently_added_window: usize,
    pub binding_pool_sizes: BindingPoolSizes,
    pub has_tessellation_shaders: bool,
    pub has_geometry_shaders: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            delay_frames: 3,
            expected_frame_flushes: 10,
            wait_timeout_ns: 10_000_000_000,
            map_read_timeout_ns: 10_000_000_000,
            recently_added_window: 10,
            binding_pool_sizes: BindingPoolSizes::default(),
            has_tessellation_shaders: false,
            has_geometry_shaders: false,
        }
    }
}

impl DeviceConfig {
    /// Number of submissions that may be in flight at once, capped at what a submit ring
    /// can index.
    pub fn max_submits(&self) -> usize {
        let submits = self
            .delay_frames
            .max(1)
            .saturating_mul(self.expected_frame_flushes.max(1));
        (submits as usize).min(u16::MAX as usize)
    }

    pub fn delay_frames(mut self, frames: u32) -> Self {
        self.delay_frames = frames;
        self
    }

    pub fn expected_frame_flushes(mut self, flushes: u32) -> Self {
        self.expected_frame_flushes = flushes;
        self
    }

    pub fn wait_timeout_ns(mut self, timeout: u64) -> Self {
        self.wait_timeout_ns = timeout;
        self
    }

    pub fn map_read_timeout_ns(mut self, timeout: u64) -> Self {
        self.map_read_timeout_ns = timeout;
        self
    }

    pub fn recently_added_window(mut self, window: usize) -> Self {
        self.recently_added_window = window;
        self
    }

    pub fn binding_pool_sizes(mut self, sizes: BindingPoolSizes) -> Self {
        self.binding_pool_sizes = sizes;
        self
    }

    pub fn optional_shader_stages(mut self, tessellation: bool, geometry: bool) -> Self {
        self.has_tessellation_shaders = tessellation;
        self.has_geometry_shaders = geometry;
        self
    }

    /// Default configuration with `STRATA_RECENT_WINDOW`, `STRATA_WAIT_TIMEOUT_NS` and
    /// `STRATA_DELAY_FRAMES` applied when set. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(window) = env_value::<usize>("STRATA_RECENT_WINDOW") {
            cfg.recently_added_window = window;
        }
        if let Some(timeout) = env_value::<u64>("STRATA_WAIT_TIMEOUT_NS") {
            cfg.wait_timeout_ns = timeout;
        }
        if let Some(frames) = env_value::<u32>("STRATA_DELAY_FRAMES") {
            cfg.delay_frames = frames;
        }
        cfg
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring unparseable {}={}", name, raw);
            None
        }
    }
}
