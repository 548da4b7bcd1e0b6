use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

const LINE_FEED: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

/// A byte-stream link to the instrument.
///
/// `read` must return `Ok(0)` when the link's read timeout expires without
/// data; the curve and hardcopy transfers use that gap as their only frame
/// delimiter.
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// [`Transport`] over a serial port opened with the `serialport` crate.
pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.serial.name())
            .finish()
    }
}

impl SerialTransport {
    /// Open `port`. The timeout must be finite: every response framing in this
    /// crate ends on a read timeout.
    pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TerminalError> {
        let serial = serialport::new(port, baud_rate).timeout(timeout).open()?;
        let mut transport = Self::from_port(serial);
        transport.flush()?;
        Ok(transport)
    }

    pub fn from_port(serial: Box<dyn SerialPort>) -> Self {
        Self { serial }
    }

    /// Drop anything buffered in either direction
    pub fn flush(&mut self) -> Result<(), TerminalError> {
        self.serial.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.serial.write_all(bytes)?;
        self.serial.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.serial.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Expected a quoted string, received: {0:?}")]
    NotQuoted(String),

    #[error("Expected {expected} fields, received {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("Invalid value {value:?} for field {field}")]
    InvalidField { field: &'static str, value: String },

    #[error("Expected a number, received: {0:?}")]
    InvalidNumber(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error: no complete response to '{query}?', received '{received}'")]
    Timeout { query: String, received: String },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Strip the surrounding double quotes from a device string.
pub fn unquote(response: &str) -> Result<&str, FormatError> {
    response
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| FormatError::NotQuoted(response.to_string()))
}

/// Command/query transactions over a [`Transport`].
///
/// Every method takes `&mut self`, so one transaction completes before the
/// next one can start on the same link.
#[derive(Debug)]
pub struct TekTerminal<T> {
    transport: T,
    /// The last line ended in `\r`; a `\n` read next belongs to it.
    pending_lf: bool,
}

impl<T: Transport> TekTerminal<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pending_lf: false,
        }
    }

    /// `None` when the read timed out.
    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        if self.transport.read(&mut byte)? == 0 {
            return Ok(None);
        }
        Ok(Some(byte[0]))
    }

    /// Read up to and including a line terminator, or whatever arrived before
    /// a timeout. The `\n` completing a previous `\r\n` pair is dropped.
    fn read_line(&mut self) -> std::io::Result<Vec<u8>> {
        let mut line = Vec::new();
        while let Some(byte) = self.read_byte()? {
            if std::mem::take(&mut self.pending_lf) && byte == LINE_FEED {
                continue;
            }
            line.push(byte);
            match byte {
                CARRIAGE_RETURN => {
                    self.pending_lf = true;
                    break;
                }
                LINE_FEED => break,
                _ => {}
            }
        }
        Ok(line)
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send `command` followed by `args`, space separated. No response is read.
    pub fn send_command(&mut self, command: &str, args: &[&str]) -> Result<(), TerminalError> {
        let mut line = String::from(command);
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        log::trace!("> {}", line);
        line.push('\r');
        self.transport.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Send `<query>?` and return the one-line reply without trailing whitespace.
    ///
    /// Header echo is switched off first on every call. Blocks until a line
    /// terminator arrives or the transport times out.
    pub fn send_query(&mut self, query: &str) -> Result<String, TerminalError> {
        self.headers_off()?;
        self.send_command(&format!("{query}?"), &[])?;

        let line = self.read_line()?;
        let terminated = matches!(line.last(), Some(&LINE_FEED | &CARRIAGE_RETURN));
        if !terminated {
            return Err(TerminalError::Timeout {
                query: query.to_string(),
                received: String::from_utf8_lossy(&line).into_owned(),
            });
        }

        let reply = String::from_utf8(line)?;
        let reply = reply.trim_end().to_string();
        log::trace!("< {}", reply);
        Ok(reply)
    }

    /// Like [`send_query`](Self::send_query), but the reply must be a quoted
    /// string; the quotes are removed.
    pub fn query_quoted_string(&mut self, query: &str) -> Result<String, TerminalError> {
        let reply = self.send_query(query)?;
        Ok(unquote(&reply)?.to_string())
    }

    /// Read raw bytes until the transport times out.
    ///
    /// Waits indefinitely for the first byte, then stops at the first read that
    /// yields nothing. A `\n` left over from the previous reply's `\r\n` is
    /// not part of the response.
    pub fn get_response(&mut self) -> Result<Vec<u8>, TerminalError> {
        let mut data = Vec::new();
        let mut skip_lf = std::mem::take(&mut self.pending_lf);

        loop {
            match self.read_byte()? {
                None if data.is_empty() => {}
                None => break,
                Some(LINE_FEED) if skip_lf => skip_lf = false,
                Some(byte) => {
                    skip_lf = false;
                    data.push(byte);
                }
            }
        }

        log::trace!("< {} bytes of binary data", data.len());
        Ok(data)
    }

    /// Disable echoing of command names in query replies.
    pub fn headers_off(&mut self) -> Result<(), TerminalError> {
        self.send_command("HEADER", &["OFF"])
    }

    pub fn headers_on(&mut self) -> Result<(), TerminalError> {
        self.send_command("HEADER", &["ON"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::MockTransport;

    #[test]
    fn test_send_command_joins_arguments() {
        let mut terminal = TekTerminal::new(MockTransport::new());
        terminal.send_command("DATA:SOURCE", &["CH1"]).unwrap();
        terminal.send_command("TRIGGER", &["FORCE", "NOW"]).unwrap();
        terminal.send_command("*CLS", &[]).unwrap();

        assert_eq!(
            terminal.transport_mut().written(),
            ["DATA:SOURCE CH1", "TRIGGER FORCE NOW", "*CLS"]
        );
        assert_eq!(
            terminal.transport_mut().raw_written(),
            b"DATA:SOURCE CH1\rTRIGGER FORCE NOW\r*CLS\r"
        );
    }

    #[test]
    fn test_send_query_disables_headers_every_time() {
        let transport = MockTransport::new()
            .reply("*IDN?", "TEKTRONIX,TDS 3034,0,CF:91.1CT FV:v2.11  \n")
            .reply("ACQUIRE:STATE?", "1\n");
        let mut terminal = TekTerminal::new(transport);

        let id = terminal.send_query("*IDN").unwrap();
        assert_eq!(id, "TEKTRONIX,TDS 3034,0,CF:91.1CT FV:v2.11");
        assert_eq!(terminal.send_query("ACQUIRE:STATE").unwrap(), "1");

        assert_eq!(
            terminal.transport_mut().written(),
            ["HEADER OFF", "*IDN?", "HEADER OFF", "ACQUIRE:STATE?"]
        );
    }

    #[test]
    fn test_send_query_skips_leftover_terminators() {
        let transport = MockTransport::new()
            .reply("WFMPRE:NR_PT?", "500\r\n")
            .reply("DATA:WIDTH?", "2\r\n");
        let mut terminal = TekTerminal::new(transport);

        assert_eq!(terminal.send_query("WFMPRE:NR_PT").unwrap(), "500");
        assert_eq!(terminal.send_query("DATA:WIDTH").unwrap(), "2");
    }

    #[test]
    fn test_empty_reply_is_not_a_timeout() {
        let transport = MockTransport::new()
            .reply("HARDCOPY:FORMAT?", "\n")
            .reply("WFMPRE:YUNIT?", "\r\n")
            .reply("WFMPRE:XUNIT?", "\n");
        let mut terminal = TekTerminal::new(transport);

        assert_eq!(terminal.send_query("HARDCOPY:FORMAT").unwrap(), "");
        assert!(matches!(
            terminal.query_quoted_string("WFMPRE:YUNIT"),
            Err(TerminalError::Format(FormatError::NotQuoted(reply))) if reply.is_empty()
        ));
        // The `\n` of the previous `\r\n` is dropped, this one is the reply.
        assert_eq!(terminal.send_query("WFMPRE:XUNIT").unwrap(), "");
    }

    #[test]
    fn test_get_response_drops_line_feed_of_previous_reply() {
        let transport = MockTransport::new()
            .reply("HARDCOPY:FORMAT?", "RLE\r\n")
            .reply("HARDCOPY START", b"BM\x00\x01".to_vec());
        let mut terminal = TekTerminal::new(transport);

        assert_eq!(terminal.send_query("HARDCOPY:FORMAT").unwrap(), "RLE");
        terminal.send_command("HARDCOPY", &["START"]).unwrap();
        assert_eq!(terminal.get_response().unwrap(), b"BM\x00\x01");
    }

    #[test]
    fn test_get_response_keeps_leading_line_feed_after_plain_lf() {
        let transport = MockTransport::new()
            .reply("WFMPRE:NR_PT?", "1\n")
            .reply("CURVE?", vec![0x0A, 0x0A]);
        let mut terminal = TekTerminal::new(transport);

        assert_eq!(terminal.send_query("WFMPRE:NR_PT").unwrap(), "1");
        terminal.send_command("CURVE?", &[]).unwrap();
        assert_eq!(terminal.get_response().unwrap(), [0x0A, 0x0A]);
    }

    #[test]
    fn test_send_query_without_terminator_times_out() {
        let transport = MockTransport::new().reply("TRIGGER:STATE?", "REA");
        let mut terminal = TekTerminal::new(transport);

        match terminal.send_query("TRIGGER:STATE") {
            Err(TerminalError::Timeout { query, received }) => {
                assert_eq!(query, "TRIGGER:STATE");
                assert_eq!(received, "REA");
            }
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_query_quoted_string() {
        let transport = MockTransport::new()
            .reply("WFMPRE:YUNIT?", "\"V\"\n")
            .reply("WFMPRE:XUNIT?", "s\n")
            .reply("WFMPRE:WFID?", "\"\n");
        let mut terminal = TekTerminal::new(transport);

        assert_eq!(terminal.query_quoted_string("WFMPRE:YUNIT").unwrap(), "V");
        assert!(matches!(
            terminal.query_quoted_string("WFMPRE:XUNIT"),
            Err(TerminalError::Format(FormatError::NotQuoted(_)))
        ));
        assert!(matches!(
            terminal.query_quoted_string("WFMPRE:WFID"),
            Err(TerminalError::Format(FormatError::NotQuoted(_)))
        ));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"Hz\"").unwrap(), "Hz");
        assert_eq!(unquote("\"\"").unwrap(), "");
        assert!(unquote("").is_err());
        assert!(unquote("\"V").is_err());
    }

    #[test]
    fn test_get_response_reads_until_gap() {
        let transport = MockTransport::new().reply("CURVE?", vec![b'#', b'1', b'2', 0x00, 0x0A, 0x0A]);
        let mut terminal = TekTerminal::new(transport);

        terminal.send_command("CURVE?", &[]).unwrap();
        let data = terminal.get_response().unwrap();
        assert_eq!(data, [b'#', b'1', b'2', 0x00, 0x0A, 0x0A]);
    }

    #[test]
    fn test_get_response_waits_for_first_byte() {
        let mut transport = MockTransport::new();
        transport.delay_next_reply(25);
        let mut terminal = TekTerminal::new(transport.reply("HARDCOPY START", "BM"));

        terminal.send_command("HARDCOPY", &["START"]).unwrap();
        assert_eq!(terminal.get_response().unwrap(), b"BM");
    }
}
