use crate::serial_terminal::{SerialTransport, TekTerminal, TerminalError, Transport};
use crate::tds3k::{ScopeError, Tds3k};
use std::time::Duration;

/// RS-232 parameters. Must match the device's UTILITY > System I/O menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    pub baud_rate: u32,
    /// Read timeout. Curve and hardcopy transfers end at the first read that
    /// times out, so this must be finite and non-zero.
    pub timeout: Duration,
    /// Run [`Tds3k::force_sanity`] after opening the port.
    pub check_identity: bool,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_secs(1),
            check_identity: true,
        }
    }
}

impl PortSettings {
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn skip_identity_check(mut self) -> Self {
        self.check_identity = false;
        self
    }

    fn validate(&self) -> Result<(), ConnectorError> {
        if self.timeout.is_zero() {
            return Err(ConnectorError::InvalidTimeout);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serial terminal error: {0}")]
    SerialTerminal(#[from] TerminalError),

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("Read timeout must be non-zero, transfers are delimited by it")]
    InvalidTimeout,
}

pub struct TekConnector;

impl TekConnector {
    /// Open `port` and return a ready device handle.
    pub fn connect(
        port: &str,
        settings: &PortSettings,
    ) -> Result<Tds3k<SerialTransport>, ConnectorError> {
        settings.validate()?;
        log::debug!(
            "Connecting to TDS 3000 on port {} at {} baud",
            port,
            settings.baud_rate
        );

        let transport = SerialTransport::open(port, settings.baud_rate, settings.timeout)?;
        Self::attach(transport, settings)
    }

    /// Build a device handle over an already open transport.
    pub fn attach<T: Transport>(
        transport: T,
        settings: &PortSettings,
    ) -> Result<Tds3k<T>, ConnectorError> {
        settings.validate()?;
        let mut scope = Tds3k::new(TekTerminal::new(transport));
        if settings.check_identity {
            scope.force_sanity()?;
        }
        Ok(scope)
    }

    /// Names of the serial ports present on this machine.
    pub fn available_ports() -> Result<Vec<String>, ConnectorError> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|info| info.port_name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::MockTransport;

    #[test]
    fn test_default_port_settings() {
        let settings = PortSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.timeout, Duration::from_secs(1));
        assert!(settings.check_identity);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let settings = PortSettings::default().timeout(Duration::ZERO);
        assert!(matches!(
            TekConnector::connect("/dev/ttyS0", &settings),
            Err(ConnectorError::InvalidTimeout)
        ));
        assert!(matches!(
            TekConnector::attach(MockTransport::new(), &settings),
            Err(ConnectorError::InvalidTimeout)
        ));
    }

    #[test]
    fn test_attach_checks_identity() {
        let transport =
            MockTransport::new().reply("*IDN?", "TEKTRONIX,TDS 3012,0,CF:91.1CT FV:v2.11\n");
        let scope = TekConnector::attach(transport, &PortSettings::default()).unwrap();
        assert_eq!(scope.into_transport().commands(), ["*IDN?"]);

        let transport = MockTransport::new().reply("*IDN?", "AGILENT TECHNOLOGIES,54622D\n");
        assert!(matches!(
            TekConnector::attach(transport, &PortSettings::default()),
            Err(ConnectorError::Scope(ScopeError::UnrecognizedDevice(_)))
        ));
    }

    #[test]
    fn test_attach_without_identity_check() {
        let settings = PortSettings::default().baud_rate(38400).skip_identity_check();
        let scope = TekConnector::attach(MockTransport::new(), &settings).unwrap();
        assert!(scope.into_transport().written().is_empty());
    }
}
