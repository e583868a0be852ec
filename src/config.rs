use crate::protocol::DEFAULT_BAUD_RATE;
use crate::types::RenderPolicy;
use std::time::Duration;

/// Pipeline settings.
///
/// [`Config::from_env`] starts from the defaults and applies any
/// `TOFGRID_*` overrides present in the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Serial device path or COM port name.
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound on a single port read. Also bounds how long a stop
    /// request waits on the ingest thread.
    pub read_timeout: Duration,
    /// Render cadence.
    pub tick_interval: Duration,
    pub render_policy: RenderPolicy,
    /// Re-open attempts after a link fault before giving up with
    /// `LinkLost`. Zero makes the first fault terminal.
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(10),
            tick_interval: Duration::from_millis(50),
            render_policy: RenderPolicy::HoldLast,
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Defaults with `TOFGRID_*` environment overrides.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = EnvReader { lookup };

        let config = Self {
            port: env.string("TOFGRID_PORT", &defaults.port),
            baud_rate: env.parsed("TOFGRID_BAUD", defaults.baud_rate),
            read_timeout: env.millis("TOFGRID_READ_TIMEOUT_MS", defaults.read_timeout),
            tick_interval: env.millis("TOFGRID_TICK_MS", defaults.tick_interval),
            render_policy: env.render_policy("TOFGRID_RENDER_POLICY", defaults.render_policy),
            reconnect_attempts: env.parsed(
                "TOFGRID_RECONNECT_ATTEMPTS",
                defaults.reconnect_attempts,
            ),
            reconnect_delay: env.millis("TOFGRID_RECONNECT_DELAY_MS", defaults.reconnect_delay),
        };

        log::debug!("Config: {:?}", config);
        config
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &str, default: T) -> T
    where
        T: std::str::FromStr + std::fmt::Display,
    {
        match self.raw(name) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                log::warn!("Ignoring {}='{}', using {}", name, v, default);
                default
            }),
            None => default,
        }
    }

    // Zero durations would spin the read loop or the ticker.
    fn millis(&self, name: &str, default: Duration) -> Duration {
        let ms = self.parsed(name, default.as_millis() as u64);
        if ms == 0 {
            log::warn!("Ignoring {}=0, using {}ms", name, default.as_millis());
            return default;
        }
        Duration::from_millis(ms)
    }

    fn render_policy(&self, name: &str, default: RenderPolicy) -> RenderPolicy {
        match self.raw(name) {
            Some(v) => RenderPolicy::from_name(&v).unwrap_or_else(|| {
                log::warn!(
                    "Unknown {}='{}', using {:?} (supported: hold|skip|blank)",
                    name,
                    v,
                    default
                );
                default
            }),
            None => default,
        }
    }
}
