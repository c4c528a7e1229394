//! Decoding from byte sources that deliver input over time.

use parking_lot::Mutex;
use std::io::{self, Cursor, Read};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tui_keyrouter::{Error, Input, Key, KeyCode, Modifiers, Reader, Router};

/// A byte source fed from a channel, like a tty that the user types into.
struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl ChannelSource {
    fn new() -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx, pending: Vec::new() })
    }
}

impl Read for ChannelSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(bytes) => self.pending = bytes,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[test]
fn test_modified_arrow() {
    let mut reader = Reader::new(Cursor::new(b"\x1b[1;5A".to_vec()));
    assert_eq!(
        reader.read_key().unwrap(),
        Key::new(KeyCode::Up, Modifiers::CTRL)
    );
    assert!(matches!(reader.read_key(), Err(Error::EndOfStream)));
}

#[test]
fn test_lone_escape_resolves_after_timeout() {
    let (tx, source) = ChannelSource::new();
    let mut reader = Reader::new(source).escape_timeout(Duration::from_millis(30));

    tx.send(vec![0x1b]).unwrap();
    let started = Instant::now();
    assert_eq!(reader.read_key().unwrap(), Key::key(KeyCode::Esc));
    assert!(started.elapsed() >= Duration::from_millis(30));

    // Bytes arriving after the timeout are picked up by the outstanding read.
    tx.send(b"j".to_vec()).unwrap();
    assert_eq!(reader.read_key().unwrap(), Key::char('j'));

    drop(tx);
    assert!(matches!(reader.read_key(), Err(Error::EndOfStream)));
}

#[test]
fn test_escape_without_parsing_does_not_wait() {
    let (tx, source) = ChannelSource::new();
    let mut reader = Reader::new(source)
        .escape_timeout(Duration::from_secs(5))
        .parse_escape_sequences(false);

    tx.send(vec![0x1b]).unwrap();
    let started = Instant::now();
    assert_eq!(reader.read_key().unwrap(), Key::key(KeyCode::Esc));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_sequence_split_across_reads() {
    let (tx, source) = ChannelSource::new();
    let mut reader = Reader::new(source).escape_timeout(Duration::from_millis(500));

    tx.send(b"\x1b[".to_vec()).unwrap();
    tx.send(b"15;".to_vec()).unwrap();
    tx.send(b"2~".to_vec()).unwrap();
    assert_eq!(
        reader.read_key().unwrap(),
        Key::new(KeyCode::F(5), Modifiers::SHIFT)
    );
}

#[test]
fn test_run_dispatches_until_end_of_stream() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();
    for pattern in ["j", "gg", "<Up>", "<Esc>"] {
        let trace = trace.clone();
        router.handle(pattern, move |m| trace.lock().push(format!("{pattern}:{}", m.count)));
    }
    let input = Input::new(router);

    let mut reader = Reader::new(Cursor::new(b"3jgg\x1b[A\x1bz".to_vec()));
    let mut results = Vec::new();
    let err = input.run(&mut reader, |handled| results.push(handled)).unwrap_err();

    assert!(matches!(err, Error::EndOfStream));
    assert_eq!(*trace.lock(), vec!["j:3", "gg:1", "<Up>:1"]);
    // `3`, `j`, `g`, `g`, Up, Alt+z
    assert_eq!(results, vec![true, true, true, true, true, false]);
}

#[test]
fn test_run_follows_active_router_escape_mode() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();
    let t = trace.clone();
    router.handle("<Esc>", move |_| t.lock().push("esc"));
    let input = Input::new(router);
    assert!(!input.current().has_escape_sequences());

    // Without arrow bindings ESC is Escape right away and `[A` are plain keys.
    let mut reader = Reader::new(Cursor::new(b"\x1b[A".to_vec()));
    let mut results = Vec::new();
    let _ = input.run(&mut reader, |handled| results.push(handled));
    assert_eq!(*trace.lock(), vec!["esc"]);
    assert_eq!(results, vec![true, false, false]);
}

#[test]
fn test_space_chords_reach_their_bindings() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();
    for pattern in ["<C-Space>", "<A-Space>"] {
        let trace = trace.clone();
        router.handle(pattern, move |_| trace.lock().push(pattern));
    }
    let input = Input::new(router);

    let mut reader = Reader::new(Cursor::new(b"\x00\x1b ".to_vec()));
    let mut results = Vec::new();
    let _ = input.run(&mut reader, |handled| results.push(handled));
    assert_eq!(*trace.lock(), vec!["<C-Space>", "<A-Space>"]);
    assert_eq!(results, vec![true, true]);
}
