//! Bridge configuration.
//!
//! Everything here is read once at startup. Malformed parity and stop-bit
//! settings degrade to a default with a warning instead of failing.

use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_SERIAL_PORT: &str = "COM2";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TCP_PORT: u16 = 9000;
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Serial parity mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    #[default]
    Even,
    Odd,
    Mark,
    Space,
}

impl Parity {
    /// Parse a parity flag (`N`, `E`, `O`, `M`, `S` or the full word).
    ///
    /// Unknown values fall back to [`Parity::default`].
    pub fn from_flag(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "none" => Parity::None,
            "e" | "even" => Parity::Even,
            "o" | "odd" => Parity::Odd,
            "m" | "mark" => Parity::Mark,
            "s" | "space" => Parity::Space,
            other => {
                tracing::warn!(parity = other, "Unsupported parity, using even");
                Parity::default()
            }
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum StopBits {
    #[default]
    #[serde(rename = "1")]
    One,
    #[serde(rename = "1.5")]
    OnePointFive,
    #[serde(rename = "2")]
    Two,
}

impl StopBits {
    /// Map the numeric flag (`1`, `15` for 1.5, `2`). Anything else is one stop bit.
    pub fn from_flag(bits: u8) -> Self {
        match bits {
            1 => StopBits::One,
            15 => StopBits::OnePointFive,
            2 => StopBits::Two,
            other => {
                tracing::warn!(stop_bits = other, "Unsupported stop bits, using 1");
                StopBits::One
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::default(),
            stop_bits: StopBits::default(),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Short line settings, e.g. `9600 8E1`.
    pub fn line_settings(&self) -> String {
        let stop = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        format!(
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.as_char(),
            stop
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERIAL_PORT)
    }
}

/// Settings for the forwarding engine and its TCP side.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_host: String,
    pub tcp_port: u16,
    /// Delay before every read, on both the serial and the client side.
    pub read_interval: Duration,
    pub client_write_timeout: Duration,
    /// Capacity of each direction's transfer buffer.
    pub buffer_size: usize,
}

impl BridgeConfig {
    pub fn new(tcp_port: u16) -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            tcp_port,
            read_interval: DEFAULT_READ_INTERVAL,
            client_write_timeout: DEFAULT_CLIENT_WRITE_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_read_interval(mut self, interval: Duration) -> Self {
        self.read_interval = interval;
        self
    }

    pub fn with_client_write_timeout(mut self, timeout: Duration) -> Self {
        self.client_write_timeout = timeout;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.tcp_port)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_PORT)
    }
}

/// Parse a duration flag: `2s`, `500ms`, `1m` or bare seconds (`2`, `0.5`).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, secs_per_unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, None)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, Some(1.0))
    } else if let Some(n) = s.strip_suffix('m') {
        (n, Some(60.0))
    } else {
        (s, Some(1.0))
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{s}', expected e.g. 2s or 500ms"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid duration '{s}', must be non-negative"));
    }
    let secs = match secs_per_unit {
        Some(scale) => value * scale,
        None => value / 1000.0,
    };
    Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid duration '{s}', too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_flags() {
        assert_eq!(Parity::from_flag("N"), Parity::None);
        assert_eq!(Parity::from_flag("e"), Parity::Even);
        assert_eq!(Parity::from_flag("O"), Parity::Odd);
        assert_eq!(Parity::from_flag("mark"), Parity::Mark);
        assert_eq!(Parity::from_flag("S"), Parity::Space);
    }

    #[test]
    fn unknown_parity_degrades_to_even() {
        assert_eq!(Parity::from_flag("X"), Parity::Even);
        assert_eq!(Parity::from_flag(""), Parity::Even);
    }

    #[test]
    fn stop_bit_flags() {
        assert_eq!(StopBits::from_flag(1), StopBits::One);
        assert_eq!(StopBits::from_flag(15), StopBits::OnePointFive);
        assert_eq!(StopBits::from_flag(2), StopBits::Two);
        assert_eq!(StopBits::from_flag(3), StopBits::One);
    }

    #[test]
    fn serial_defaults_match_reference_deployment() {
        let config = SerialConfig::default();
        assert_eq!(config.port, "COM2");
        assert_eq!(config.line_settings(), "9600 8E1");
    }

    #[test]
    fn serial_config_serializes() {
        let config = SerialConfig::new("/dev/ttyUSB0")
            .with_baud_rate(115_200)
            .with_parity(Parity::None)
            .with_stop_bits(StopBits::OnePointFive);
        insta::assert_json_snapshot!(config, @r#"
        {
          "port": "/dev/ttyUSB0",
          "baud_rate": 115200,
          "data_bits": 8,
          "parity": "none",
          "stop_bits": "1.5"
        }
        "#);
    }

    #[test]
    fn bridge_config_builders() {
        let config = BridgeConfig::new(7000)
            .with_bind_host("127.0.0.1")
            .with_read_interval(Duration::ZERO)
            .with_buffer_size(0);
        assert_eq!(config.listen_addr(), "127.0.0.1:7000");
        assert_eq!(config.read_interval, Duration::ZERO);
        assert_eq!(config.buffer_size, 1);
        assert_eq!(BridgeConfig::default().tcp_port, 9000);
        assert_eq!(BridgeConfig::default().read_interval, Duration::from_secs(2));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("0.5"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-1s").is_err());
        assert_eq!(
            parse_duration("1e20s"),
            Err("invalid duration '1e20s', too large".to_string())
        );
        assert!(parse_duration("1e300m").is_err());
        assert!(parse_duration("inf").is_err());
    }
}
