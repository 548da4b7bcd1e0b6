//! Scripted in-memory transport for unit tests.

use crate::serial_terminal::Transport;
use std::collections::{HashMap, VecDeque};

/// Give up after this many empty reads in a row instead of spinning forever.
const MAX_IDLE_READS: usize = 10_000;

/// Replies are keyed by the exact command line that triggers them (without the
/// trailing `\r`). Each write of that line releases the next queued reply.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: HashMap<String, VecDeque<Vec<u8>>>,
    pending: VecDeque<u8>,
    written: Vec<String>,
    raw_written: Vec<u8>,
    reply_delay: usize,
    silent_reads: usize,
    idle_reads: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command: &str, response: impl Into<Vec<u8>>) -> Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(response.into());
        self
    }

    /// The next released reply only shows up after `reads` empty reads.
    pub fn delay_next_reply(&mut self, reads: usize) {
        self.reply_delay = reads;
    }

    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub fn raw_written(&self) -> &[u8] {
        &self.raw_written
    }

    /// Written lines minus the `HEADER OFF` sent ahead of every query.
    pub fn commands(&self) -> Vec<&str> {
        self.written
            .iter()
            .map(String::as_str)
            .filter(|line| *line != "HEADER OFF")
            .collect()
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.raw_written.extend_from_slice(bytes);
        let text = String::from_utf8_lossy(bytes).into_owned();
        for line in text.split('\r').filter(|line| !line.is_empty()) {
            self.written.push(line.to_string());
            if let Some(reply) = self.replies.get_mut(line).and_then(VecDeque::pop_front) {
                self.silent_reads = std::mem::take(&mut self.reply_delay);
                self.pending.extend(reply);
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.silent_reads > 0 {
            self.silent_reads -= 1;
            return Ok(0);
        }
        match self.pending.pop_front() {
            Some(byte) => {
                self.idle_reads = 0;
                buf[0] = byte;
                Ok(1)
            }
            None => {
                self.idle_reads += 1;
                assert!(
                    self.idle_reads < MAX_IDLE_READS,
                    "transport read with nothing scripted; written so far: {:?}",
                    self.written
                );
                Ok(0)
            }
        }
    }
}
