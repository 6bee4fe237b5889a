use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portal {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for Portal {
    fn default() -> Self {
        Self {
            url: "https://portal.sideline-app.net".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hub {
    pub url: String,
}

impl Default for Hub {
    fn default() -> Self {
        Self {
            url: "wss://portal.sideline-app.net/live".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub portal: Portal,
    pub hub: Hub,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ser_portal() {
        let p: Portal = Default::default();
        let serialized = toml::to_string(&p).unwrap();
        let deser = toml::from_str(&serialized);
        assert_eq!(deser, Ok(p));
    }

    #[test]
    fn test_ser_hub() {
        let h: Hub = Default::default();
        let serialized = toml::to_string(&h).unwrap();
        let deser = toml::from_str(&serialized);
        assert_eq!(deser, Ok(h));
    }

    #[test]
    fn test_ser_config() {
        let config: Config = Default::default();
        let serialized = toml::to_string(&config).unwrap();
        let deser = toml::from_str(&serialized);
        assert_eq!(deser, Ok(config));
    }
}
