//! Terminal byte decoder.
//!
//! Turns raw terminal input (as read from a tty in raw mode) into [`Key`]s.
//! The tricky part is ESC: it is both the Escape key and the first byte of
//! every escape sequence, so the reader waits briefly for follow-up bytes
//! before deciding.

use crate::error::{Error, Result};
use crate::key::{Key, KeyCode, Modifiers};
use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// Default wait for the rest of an escape sequence.
pub const DEFAULT_ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

const BUF_SIZE: usize = 64;
const READ_SIZE: usize = 32;
/// Longest CSI body scanned for a terminator.
const CSI_MAX: usize = 12;

const ESC: u8 = 27;

type ReadResult = (Vec<u8>, io::Result<usize>);

/// Channels to the thread performing blocking reads.
struct Worker {
    requests: Sender<Vec<u8>>,
    results: Receiver<ReadResult>,
}

/// Decodes keys from a byte source.
///
/// At most one read is in flight at a time. A read that outlives an escape
/// timeout stays outstanding and its bytes are picked up by the next call,
/// so nothing is lost.
pub struct Reader {
    source: Option<Box<dyn Read + Send>>,
    worker: Option<Worker>,
    /// Read buffer handed to the worker; `None` while a read is outstanding.
    scratch: Option<Vec<u8>>,
    buf: [u8; BUF_SIZE],
    pos: usize,
    end: usize,
    finished: bool,
    error: Option<io::Error>,
    timeout: Duration,
    parse_escape_sequences: bool,
}

impl Reader {
    /// Create a reader over `source`. Nothing is read until the first key
    /// is requested.
    pub fn new<R: Read + Send + 'static>(source: R) -> Self {
        Self {
            source: Some(Box::new(source)),
            worker: None,
            scratch: Some(vec![0; READ_SIZE]),
            buf: [0; BUF_SIZE],
            pos: 0,
            end: 0,
            finished: false,
            error: None,
            timeout: DEFAULT_ESCAPE_TIMEOUT,
            parse_escape_sequences: true,
        }
    }

    /// Set how long to wait for the rest of an escape sequence.
    pub fn escape_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder form of [`set_parse_escape_sequences`](Self::set_parse_escape_sequences).
    pub fn parse_escape_sequences(mut self, parse: bool) -> Self {
        self.parse_escape_sequences = parse;
        self
    }

    /// When false, ESC is always the Escape key and never waits.
    ///
    /// Use [`Router::has_escape_sequences`](crate::Router::has_escape_sequences)
    /// to decide; [`Input::run`](crate::Input::run) does this automatically.
    pub fn set_parse_escape_sequences(&mut self, parse: bool) {
        self.parse_escape_sequences = parse;
    }

    /// Read the next key.
    ///
    /// Blocks until at least one byte is available. Fails with
    /// [`Error::EndOfStream`] once the source is exhausted and everything
    /// buffered has been decoded.
    pub fn read_key(&mut self) -> Result<Key> {
        self.fill()?;

        let b = self.buf[self.pos];
        self.pos += 1;

        let key = match b {
            ESC if self.parse_escape_sequences => self.read_escape(),
            0x80..=0xFF => self.read_utf8(b),
            _ => decode_byte(b),
        };
        tracing::trace!(%key, "decoded key");
        Ok(key)
    }

    fn read_escape(&mut self) -> Key {
        self.fill_with_timeout(1);

        match self.peek(0) {
            Some(b'[') => return self.read_csi(),
            Some(b'O') => {
                self.fill_with_timeout(2);
                if let Some(c) = self.peek(1) {
                    self.pos += 2;
                    return decode_ss3(c);
                }
                // No final byte: the user typed Alt+O.
                self.pos += 1;
                return Key::alt('O');
            }
            Some(b' ') => {
                self.pos += 1;
                return Key::new(KeyCode::Space, Modifiers::ALT);
            }
            Some(c @ 33..=126) => {
                self.pos += 1;
                return Key::alt(c as char);
            }
            _ => {}
        }
        Key::key(KeyCode::Esc)
    }

    /// Collect `[` and a CSI body up to its final letter or `~`.
    fn read_csi(&mut self) -> Key {
        let mut len = 1;
        while len <= CSI_MAX {
            if self.available() <= len {
                self.fill_with_timeout(len + 1);
                if self.available() <= len {
                    break;
                }
            }
            let c = self.buf[self.pos + len];
            len += 1;
            if c.is_ascii_alphabetic() || c == b'~' {
                break;
            }
        }

        let key = decode_csi(&self.buf[self.pos + 1..self.pos + len]);
        self.pos += len;
        key
    }

    fn read_utf8(&mut self, lead: u8) -> Key {
        let width = match lead {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        if width > 1 {
            self.fill_with_timeout(width - 1);
            if self.available() >= width - 1 {
                let mut bytes = [0u8; 4];
                bytes[0] = lead;
                bytes[1..width].copy_from_slice(&self.buf[self.pos..self.pos + width - 1]);
                if let Some(c) = std::str::from_utf8(&bytes[..width])
                    .ok()
                    .and_then(|s| s.chars().next())
                {
                    self.pos += width - 1;
                    return Key::char(c);
                }
            }
        }
        // Not valid UTF-8: take the byte as Latin-1.
        Key::char(char::from(lead))
    }

    fn available(&self) -> usize {
        self.end - self.pos
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        (self.pos + offset < self.end).then(|| self.buf[self.pos + offset])
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.copy_within(self.pos..self.end, 0);
            self.end -= self.pos;
            self.pos = 0;
        }
    }

    /// Block until at least one byte is buffered.
    fn fill(&mut self) -> Result<()> {
        self.compact();
        while self.available() == 0 {
            if !self.request()? {
                return Err(self.error.take().map_or(Error::EndOfStream, Error::Io));
            }
            match self.worker.as_ref().map(|w| w.results.recv()) {
                Some(Ok(result)) => self.accept(result),
                _ => self.finished = true,
            }
        }
        Ok(())
    }

    /// Wait up to the escape timeout for `n` bytes to be buffered.
    ///
    /// Returns early when the timeout passes; the read then stays
    /// outstanding for the next call.
    fn fill_with_timeout(&mut self, n: usize) {
        self.compact();
        let deadline = Instant::now() + self.timeout;
        while self.available() < n {
            if !matches!(self.request(), Ok(true)) {
                return;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            let Some(worker) = &self.worker else { return };
            match worker.results.recv_timeout(left) {
                Ok(result) => self.accept(result),
                Err(RecvTimeoutError::Timeout) => return,
                Err(RecvTimeoutError::Disconnected) => {
                    self.finished = true;
                    return;
                }
            }
        }
    }

    /// Make sure a read is in flight. Returns false once the source is done.
    fn request(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        // Still waiting on the previous request.
        if self.scratch.is_none() {
            return Ok(true);
        }

        if self.worker.is_none() {
            self.worker = Some(self.spawn_worker()?);
        }
        let sent = match (&self.worker, self.scratch.take()) {
            (Some(worker), Some(scratch)) => worker.requests.send(scratch).is_ok(),
            _ => false,
        };
        if !sent {
            self.finished = true;
        }
        Ok(sent)
    }

    fn spawn_worker(&mut self) -> Result<Worker> {
        let Some(mut source) = self.source.take() else {
            return Err(Error::EndOfStream);
        };
        let (requests, request_rx) = mpsc::channel::<Vec<u8>>();
        let (result_tx, results) = mpsc::channel::<ReadResult>();

        thread::Builder::new()
            .name("keyrouter-reader".to_string())
            .spawn(move || {
                for mut scratch in request_rx {
                    let result = loop {
                        match source.read(&mut scratch) {
                            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                            result => break result,
                        }
                    };
                    if result_tx.send((scratch, result)).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Worker { requests, results })
    }

    fn accept(&mut self, (scratch, result): ReadResult) {
        match result {
            Ok(0) => self.finished = true,
            Ok(n) => {
                self.buf[self.end..self.end + n].copy_from_slice(&scratch[..n]);
                self.end += n;
            }
            Err(err) => {
                self.finished = true;
                self.error = Some(err);
            }
        }
        self.scratch = Some(scratch);
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("buffered", &self.available())
            .field("finished", &self.finished)
            .field("timeout", &self.timeout)
            .field("parse_escape_sequences", &self.parse_escape_sequences)
            .finish_non_exhaustive()
    }
}

/// Decode a byte that is a key on its own.
fn decode_byte(b: u8) -> Key {
    match b {
        0 => Key::new(KeyCode::Space, Modifiers::CTRL),
        8 | 127 => Key::key(KeyCode::Backspace),
        9 => Key::key(KeyCode::Tab),
        10 | 13 => Key::key(KeyCode::Enter),
        1..=26 => Key::ctrl(char::from(b'a' + b - 1)),
        ESC => Key::key(KeyCode::Esc),
        32 => Key::key(KeyCode::Space),
        _ => Key::char(char::from(b)),
    }
}

/// Decode the final byte of `ESC O x`.
fn decode_ss3(c: u8) -> Key {
    let code = match c {
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        _ => KeyCode::Esc,
    };
    Key::key(code)
}

/// Decode a CSI body: everything after `ESC [`, terminator included.
fn decode_csi(body: &[u8]) -> Key {
    let esc = Key::key(KeyCode::Esc);
    let Some((&last, params)) = body.split_last() else {
        return esc;
    };
    let Ok(params) = std::str::from_utf8(params) else {
        return esc;
    };

    let (number, modifiers) = match params.split_once(';') {
        Some((number, modifier)) => match decode_modifier(modifier) {
            Some(modifiers) => (number, modifiers),
            None => return esc,
        },
        None => (params, Modifiers::NONE),
    };

    let code = match last {
        b'~' => match number.parse::<u8>() {
            Ok(n) => tilde_code(n),
            Err(_) => None,
        },
        b'Z' if params.is_empty() => {
            return Key::new(KeyCode::Tab, Modifiers::SHIFT);
        }
        // Plain `ESC [ A` or modified `ESC [ 1 ; M A`.
        letter if number.is_empty() && params.is_empty() || number == "1" && !params.is_empty() => {
            match letter {
                b'A' => Some(KeyCode::Up),
                b'B' => Some(KeyCode::Down),
                b'C' => Some(KeyCode::Right),
                b'D' => Some(KeyCode::Left),
                b'H' => Some(KeyCode::Home),
                b'F' => Some(KeyCode::End),
                _ => None,
            }
        }
        _ => None,
    };

    code.map_or(esc, |code| Key::new(code, modifiers))
}

fn tilde_code(n: u8) -> Option<KeyCode> {
    let code = match n {
        1 | 7 => KeyCode::Home,
        2 => KeyCode::Insert,
        3 => KeyCode::Delete,
        4 | 8 => KeyCode::End,
        5 => KeyCode::PageUp,
        6 => KeyCode::PageDown,
        11..=15 => KeyCode::F(n - 10),
        17..=21 => KeyCode::F(n - 11),
        23 | 24 => KeyCode::F(n - 12),
        _ => return None,
    };
    Some(code)
}

/// Terminal modifier parameter: `1 + shift(1) + alt(2) + ctrl(4)`.
fn decode_modifier(text: &str) -> Option<Modifiers> {
    let bits = text.parse::<u16>().ok()?.checked_sub(1)?;
    let mut modifiers = Modifiers::NONE;
    if bits & 1 != 0 {
        modifiers |= Modifiers::SHIFT;
    }
    if bits & 2 != 0 {
        modifiers |= Modifiers::ALT;
    }
    if bits & 4 != 0 {
        modifiers |= Modifiers::CTRL;
    }
    Some(modifiers)
}
