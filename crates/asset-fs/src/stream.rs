//! Stream objects handed to read/write callbacks.
//!
//! Both streams carry a non-owning origin string purely for diagnostics;
//! neither stream is `Clone` and both enforce at-most-once semantics by
//! refusing further reads/writes once `done()`.

use std::io::{Read, Write};

use asset_core::contract;

/// A readable byte source backed by an open file. `read_some` is a
/// single best-effort backend call; `read_all` loops until `n` bytes
/// have been read or the stream is done.
pub struct ReadStream {
    file: Option<std::fs::File>,
    origin: String,
    done: bool,
    failed: bool,
}

impl ReadStream {
    pub(crate) fn open(path: &std::path::Path, origin: String) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self {
            file: Some(file),
            origin,
            done: false,
            failed: false,
        })
    }

    pub(crate) fn failed(origin: String) -> Self {
        Self {
            file: None,
            origin,
            done: true,
            failed: true,
        }
    }

    /// The path this stream was opened against, for diagnostics.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// True once EOF or an error has been observed.
    pub fn done(&self) -> bool {
        self.done
    }

    /// True only when the stream ended due to an error rather than EOF.
    pub fn fail(&self) -> bool {
        self.failed
    }

    /// One best-effort read into `dest`, returning the number of bytes
    /// actually read (which may be less than `dest.len()`, including
    /// zero at EOF).
    pub fn read_some(&mut self, dest: &mut [u8]) -> usize {
        if !contract::verify(!self.done, "read_some called on a done ReadStream") {
            return 0;
        }
        let Some(file) = self.file.as_mut() else {
            self.done = true;
            self.failed = true;
            return 0;
        };
        match file.read(dest) {
            Ok(0) => {
                self.done = true;
                0
            }
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(origin = %self.origin, error = %err, "read_some failed");
                self.done = true;
                self.failed = true;
                0
            }
        }
    }

    /// Reads until `dest` is full or the stream ends, returning the
    /// total bytes read.
    pub fn read_all(&mut self, dest: &mut [u8]) -> usize {
        let mut total = 0;
        while total < dest.len() && !self.done {
            let n = self.read_some(&mut dest[total..]);
            if n == 0 {
                break;
            }
            total += n;
        }
        total
    }

    /// Discards up to `n` bytes, stopping early at EOF/error.
    pub fn skip(&mut self, n: u64) {
        let mut buf = [0u8; 4096];
        let mut remaining = n;
        while remaining > 0 && !self.done {
            let chunk = remaining.min(buf.len() as u64) as usize;
            let read = self.read_some(&mut buf[..chunk]);
            if read == 0 {
                break;
            }
            remaining -= read as u64;
        }
    }
}

/// A writable byte sink. The backend signals completion via
/// [`WriteStream::finish`]; `valid()` reports whether the stream is
/// still open for writes.
pub struct WriteStream {
    file: Option<std::fs::File>,
    origin: String,
    failed: bool,
}

impl WriteStream {
    pub(crate) fn create(file: std::fs::File, origin: String) -> Self {
        Self {
            file: Some(file),
            origin,
            failed: false,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn valid(&self) -> bool {
        self.file.is_some() && !self.failed
    }

    /// One best-effort write, returning the number of bytes actually
    /// accepted.
    pub fn write_some(&mut self, data: &[u8]) -> usize {
        if !contract::verify(self.valid(), "write_some called on an invalid WriteStream") {
            return 0;
        }
        let file = self.file.as_mut().expect("checked by valid()");
        match file.write(data) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(origin = %self.origin, error = %err, "write_some failed");
                self.failed = true;
                0
            }
        }
    }

    /// Writes all of `data`, looping until it is fully accepted or the
    /// stream becomes invalid.
    pub fn write_all(&mut self, data: &[u8]) -> usize {
        let mut total = 0;
        while total < data.len() && self.valid() {
            let n = self.write_some(&data[total..]);
            if n == 0 {
                break;
            }
            total += n;
        }
        total
    }

    /// Flushes and marks the stream invalid for further writes.
    pub fn finish(mut self) -> bool {
        let ok = match self.file.take() {
            Some(mut file) => file.flush().is_ok(),
            None => false,
        };
        ok && !self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_all_stops_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"hello").unwrap();

        let mut stream = ReadStream::open(&path, path.display().to_string()).unwrap();
        let mut buf = [0u8; 16];
        let n = stream.read_all(&mut buf);
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], b"hello");
        assert!(stream.done());
        assert!(!stream.fail());
    }

    #[test]
    fn write_all_then_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.bin");
        let file = std::fs::File::create(&path).unwrap();
        let mut stream = WriteStream::create(file, path.display().to_string());
        assert_eq!(stream.write_all(b"payload"), 7);
        assert!(stream.finish());
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn failed_stream_reports_done_and_fail() {
        let stream = ReadStream::failed("missing.bin".to_string());
        assert!(stream.done());
        assert!(stream.fail());
    }
}
