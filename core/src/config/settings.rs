use super::BrokerConfig;
use crate::Result;
use config::{Config, Environment};

impl BrokerConfig {
    /// Load configuration from `WIREBROKER_*` environment variables, e.g.
    /// `WIREBROKER_PORT=9093` or `WIREBROKER_FRAMING=length_prefixed`.
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder()
            .add_source(Environment::with_prefix("WIREBROKER").try_parsing(true))
            .build()
            .map_err(|e| crate::BrokerError::Config(e.to_string()))?;

        let config = settings
            .try_deserialize::<BrokerConfig>()
            .map_err(|e| crate::BrokerError::Config(e.to_string()))?;

        config.validate().map_err(crate::BrokerError::Config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FramingMode;

    #[test]
    fn test_from_env_overrides_defaults() {
        std::env::set_var("WIREBROKER_PORT", "19092");
        std::env::set_var("WIREBROKER_FRAMING", "length_prefixed");
        let config = BrokerConfig::from_env();
        std::env::remove_var("WIREBROKER_PORT");
        std::env::remove_var("WIREBROKER_FRAMING");

        let config = config.unwrap();
        assert_eq!(config.port, 19092);
        assert_eq!(config.framing, FramingMode::LengthPrefixed);
        assert_eq!(config.read_timeout_ms, 5_000);
    }
}
