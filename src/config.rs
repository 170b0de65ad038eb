use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3000/ws";

pub struct Config {
    pub port: u16,
    /// Rooms without two live members are reaped after this much inactivity.
    pub room_idle_timeout: Duration,
    pub reaper_interval: Duration,
    /// Control-channel address used by session clients.
    pub server_url: String,
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            room_idle_timeout: env_secs("AURA_ROOM_IDLE_TIMEOUT_SECS", 600),
            reaper_interval: env_secs("AURA_REAPER_INTERVAL_SECS", 30),
            server_url: std::env::var("AURA_SERVER_URL")
                .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("PORT");
        std::env::remove_var("AURA_ROOM_IDLE_TIMEOUT_SECS");
        std::env::remove_var("AURA_REAPER_INTERVAL_SECS");
        std::env::remove_var("AURA_SERVER_URL");
    }

    #[test]
    #[serial]
    fn test_default_config() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.port, 3000);
        assert_eq!(config.room_idle_timeout, Duration::from_secs(600));
        assert_eq!(config.reaper_interval, Duration::from_secs(30));
        assert_eq!(config.server_url, "ws://localhost:3000/ws");
    }

    #[test]
    #[serial]
    fn test_port_from_env() {
        clear_env();
        std::env::set_var("PORT", "8080");
        let config = Config::from_env();
        assert_eq!(config.port, 8080);
    }

    #[test]
    #[serial]
    fn test_invalid_port_falls_back_to_default() {
        clear_env();
        std::env::set_var("PORT", "not_a_number");
        let config = Config::from_env();
        assert_eq!(config.port, 3000);
    }

    #[test]
    #[serial]
    fn test_reaper_settings_from_env() {
        clear_env();
        std::env::set_var("AURA_ROOM_IDLE_TIMEOUT_SECS", "45");
        std::env::set_var("AURA_REAPER_INTERVAL_SECS", "5");
        let config = Config::from_env();
        assert_eq!(config.room_idle_timeout, Duration::from_secs(45));
        assert_eq!(config.reaper_interval, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_zero_interval_falls_back_to_default() {
        clear_env();
        std::env::set_var("AURA_REAPER_INTERVAL_SECS", "0");
        let config = Config::from_env();
        assert_eq!(config.reaper_interval, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_server_url_from_env() {
        clear_env();
        std::env::set_var("AURA_SERVER_URL", "ws://10.0.0.2:4000/ws");
        let config = Config::from_env();
        assert_eq!(config.server_url, "ws://10.0.0.2:4000/ws");
    }
}
