use std::default::Default;

use nomad_shared::BufferConfig;

/// Contains Config properties which will be used by a Runtime
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Bounds every buffer that fills while traffic is blocked
    pub buffers: BufferConfig,
    /// Maximum rounds of effect processing after one external call. Effects
    /// that keep producing effects past this bound are left queued for the
    /// next call.
    pub max_pump_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            buffers: BufferConfig::default(),
            max_pump_rounds: 64,
        }
    }
}
