#[derive(Debug, Clone, PartialEq)]
pub struct ReckoningConfig {
    /// Interval assumed until two updates have been seen.
    pub default_interval_secs: f32,
    pub min_interval_secs: f32,
    pub max_extrapolation_secs: f32,
}

impl Default for ReckoningConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 0.2,
            min_interval_secs: 0.01,
            max_extrapolation_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub frame_rate: u32,
    pub connect_timeout_ms: u64,
    pub max_chat_lines: usize,
    pub reckoning: ReckoningConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            connect_timeout_ms: 5000,
            max_chat_lines: 50,
            reckoning: ReckoningConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn frame_duration_secs(&self) -> f32 {
        1.0 / self.frame_rate.max(1) as f32
    }
}
