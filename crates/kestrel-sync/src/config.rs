use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Device class decides how aggressively the background poller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            other => Err(format!("unknown device class '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub device_class: DeviceClass,
    pub desktop_poll_interval: Duration,
    pub mobile_poll_interval: Duration,
    /// Maximum messages requested per thread window.
    pub page_size: u32,
    /// Maximum members requested when a group is first viewed.
    pub group_member_page_size: u32,
    /// Credential group name used when a listing does not name one.
    pub default_group_name: String,
    /// Capacity of the sync event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_class: DeviceClass::Desktop,
            desktop_poll_interval: Duration::from_secs(5),
            mobile_poll_interval: Duration::from_secs(15),
            page_size: 25,
            group_member_page_size: 100,
            default_group_name: "default-key".to_string(),
            event_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Read `KESTREL_*` variables, falling back to defaults for anything
    /// missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            device_class: env_or("KESTREL_DEVICE_CLASS", defaults.device_class),
            desktop_poll_interval: Duration::from_millis(env_or(
                "KESTREL_POLL_DESKTOP_MS",
                defaults.desktop_poll_interval.as_millis() as u64,
            )),
            mobile_poll_interval: Duration::from_millis(env_or(
                "KESTREL_POLL_MOBILE_MS",
                defaults.mobile_poll_interval.as_millis() as u64,
            )),
            page_size: env_or("KESTREL_PAGE_SIZE", defaults.page_size),
            group_member_page_size: env_or(
                "KESTREL_GROUP_MEMBER_PAGE_SIZE",
                defaults.group_member_page_size,
            ),
            default_group_name: std::env::var("KESTREL_DEFAULT_GROUP")
                .unwrap_or(defaults.default_group_name),
            event_capacity: env_or("KESTREL_EVENT_CAPACITY", defaults.event_capacity),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        match self.device_class {
            DeviceClass::Desktop => self.desktop_poll_interval,
            DeviceClass::Mobile => self.mobile_poll_interval,
        }
    }
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Ignoring {}='{}': {}", name, raw, e);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_polls_less_often() {
        let mut config = SyncConfig::default();
        let desktop = config.poll_interval();
        config.device_class = DeviceClass::Mobile;
        assert!(config.poll_interval() > desktop);
    }

    #[test]
    fn device_class_parses_case_insensitively() {
        assert_eq!("Mobile".parse::<DeviceClass>(), Ok(DeviceClass::Mobile));
        assert!("tablet".parse::<DeviceClass>().is_err());
    }
}
