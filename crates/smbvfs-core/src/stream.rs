//! Output stream that owns the resource lock.
//!
//! Opening a resource for writing acquires its lock and moves the guard into
//! [`SmbOutputStream`]. The lock is released once the stream is closed, after
//! buffered bytes have been flushed to the remote writer and the writer has
//! been dropped.

use std::fmt;
use std::io::{self, BufWriter, Write};

use tracing::{debug, warn};

use crate::locks::ResourceLockGuard;
use crate::resource::ResourceOutput;

/// Buffered remote writer holding the resource lock until closed.
pub struct SmbOutputStream {
    writer: Option<BufWriter<Box<dyn Write + Send>>>,
    lock: Option<ResourceLockGuard>,
}

impl SmbOutputStream {
    pub fn new(writer: Box<dyn Write + Send>, lock: ResourceLockGuard) -> Self {
        Self {
            writer: Some(BufWriter::new(writer)),
            lock: Some(lock),
        }
    }

    /// Whether the stream still holds the resource lock.
    pub fn holds_lock(&self) -> bool {
        self.lock.is_some()
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<Box<dyn Write + Send>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "output stream is closed"))
    }

    /// Flush, drop the remote writer, then release the lock.
    fn finish(&mut self) -> io::Result<()> {
        let result = match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        };
        if let Some(lock) = self.lock.take() {
            debug!(path = %lock.key(), "Closed output stream");
        }
        result
    }
}

impl Write for SmbOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl ResourceOutput for SmbOutputStream {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.finish()
    }
}

impl Drop for SmbOutputStream {
    fn drop(&mut self) {
        if self.writer.is_some()
            && let Err(e) = self.finish()
        {
            warn!(error = %e, "Failed to flush output stream on drop");
        }
    }
}

impl fmt::Debug for SmbOutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbOutputStream")
            .field("open", &self.writer.is_some())
            .field("lock", &self.lock.as_ref().map(ResourceLockGuard::key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::ResourceLockService;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Writer that records into a shared buffer and notices when it is dropped.
    struct Recorder {
        data: Arc<Mutex<Vec<u8>>>,
        locks: Arc<ResourceLockService>,
        locked_at_drop: Arc<Mutex<Option<bool>>>,
    }

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for Recorder {
        fn drop(&mut self) {
            *self.locked_at_drop.lock().unwrap() = Some(self.locks.is_locked("k"));
        }
    }

    fn open() -> (
        Box<SmbOutputStream>,
        Arc<ResourceLockService>,
        Arc<Mutex<Vec<u8>>>,
        Arc<Mutex<Option<bool>>>,
    ) {
        let locks = Arc::new(ResourceLockService::new(Duration::from_millis(10)));
        let data = Arc::new(Mutex::new(Vec::new()));
        let locked_at_drop = Arc::new(Mutex::new(None));
        let writer = Recorder {
            data: Arc::clone(&data),
            locks: Arc::clone(&locks),
            locked_at_drop: Arc::clone(&locked_at_drop),
        };
        let guard = locks.lock("k").unwrap();
        let stream = Box::new(SmbOutputStream::new(Box::new(writer), guard));
        (stream, locks, data, locked_at_drop)
    }

    #[test]
    fn test_close_flushes_then_unlocks() {
        let (mut stream, locks, data, locked_at_drop) = open();
        stream.write_all(b"buffered").unwrap();
        assert!(data.lock().unwrap().is_empty());
        assert!(locks.is_locked("k"));

        stream.close().unwrap();
        assert_eq!(&*data.lock().unwrap(), b"buffered");
        assert_eq!(*locked_at_drop.lock().unwrap(), Some(true));
        assert!(!locks.is_locked("k"));
    }

    #[test]
    fn test_drop_releases_lock() {
        let (mut stream, locks, data, _) = open();
        stream.write_all(b"x").unwrap();
        drop(stream);
        assert_eq!(&*data.lock().unwrap(), b"x");
        assert!(!locks.is_locked("k"));
    }
}
