use std::io;
use std::ops::Range;

use bytes::Bytes;

/// An append-only output buffer that refuses to grow past a fixed capacity.
///
/// Writes that do not fit fail with [`io::ErrorKind::WriteZero`] and leave the
/// buffer untouched. Already written bytes can be patched and moved in place,
/// which is what size-field backpatching needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl BoundedBuffer {
    /// Creates an empty buffer that holds at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(64 * 1024)),
            capacity,
        }
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Maximum number of bytes this buffer accepts.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes that can still be written.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// The written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Overwrites already written bytes starting at `offset`.
    pub fn patch(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "patch of {} bytes at {offset} exceeds written length {}",
                        data.len(),
                        self.buf.len()
                    ),
                )
            })?;
        self.buf[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Moves the written bytes in `src` so they start at `dest`.
    pub fn copy_within(&mut self, src: Range<usize>, dest: usize) -> io::Result<()> {
        let len = src.end.saturating_sub(src.start);
        if src.start > src.end || src.end > self.buf.len() || dest + len > self.buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "move of {}..{} to {dest} exceeds written length {}",
                    src.start,
                    src.end,
                    self.buf.len()
                ),
            ));
        }
        self.buf.copy_within(src, dest);
        Ok(())
    }

    /// Drops everything after the first `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// Converts the buffer into [`Bytes`].
    pub fn freeze(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

impl io::Write for BoundedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.len() > self.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!(
                    "output buffer full: {} bytes requested, {} of {} left",
                    data.len(),
                    self.remaining(),
                    self.capacity
                ),
            ));
        }

        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_write_within_capacity() {
        let mut buf = BoundedBuffer::new(4);
        buf.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.remaining(), 1);

        let err = buf.write_all(&[4, 5]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);

        buf.write_all(&[4]).unwrap();
        assert_eq!(buf.freeze().as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_patch_and_move() {
        let mut buf = BoundedBuffer::new(16);
        buf.write_all(&[0, 0, 0, 0, 9, 8, 7]).unwrap();
        buf.patch(0, &[0xaa]).unwrap();
        buf.copy_within(4..7, 1).unwrap();
        buf.truncate(4);
        assert_eq!(buf.as_slice(), &[0xaa, 9, 8, 7]);

        assert!(buf.patch(3, &[1, 2]).is_err());
        assert!(buf.copy_within(2..5, 0).is_err());
    }
}
