pub mod error;

pub const DEFAULT_PORT: u16 = 8189;
pub const DEFAULT_ADDR: &str = "127.0.0.1";

pub struct AddrInfo {
    pub addr: String,
    pub port: u16,
}

impl AddrInfo {
    pub fn as_url(&self) -> String {
        format!("http://{}:{}", self.addr, self.port)
    }

    pub fn as_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("ORDER_INTAKE_ADDR").ok(),
            std::env::var("ORDER_INTAKE_PORT").ok(),
        )
    }

    /// Unset or unparseable values fall back to the defaults.
    fn from_values(addr: Option<String>, port: Option<String>) -> Self {
        let port: u16 = match port {
            Some(val) => val.parse().unwrap_or(DEFAULT_PORT),
            None => DEFAULT_PORT,
        };

        Self {
            addr: addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            port,
        }
    }
}
