use std::io;

use bytes::Bytes;

/// Zero-copy extraction helpers for `io::Cursor<Bytes>`.
pub trait BytesCursorExt {
    /// Number of bytes left after the cursor position.
    fn remaining_len(&self) -> usize;

    /// Extracts the next `size` bytes without copying and advances the cursor.
    fn extract_bytes(&mut self, size: usize) -> io::Result<Bytes>;

    /// Extracts everything after the cursor position.
    fn extract_remaining(&mut self) -> Bytes;
}

impl BytesCursorExt for io::Cursor<Bytes> {
    fn remaining_len(&self) -> usize {
        let pos = self.position().min(self.get_ref().len() as u64) as usize;
        self.get_ref().len() - pos
    }

    fn extract_bytes(&mut self, size: usize) -> io::Result<Bytes> {
        let remaining = self.remaining_len();
        if size > remaining {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("requested {size} bytes, {remaining} remaining"),
            ));
        }

        let start = self.position() as usize;
        let slice = self.get_ref().slice(start..start + size);
        self.set_position((start + size) as u64);
        Ok(slice)
    }

    fn extract_remaining(&mut self) -> Bytes {
        let remaining = self.remaining_len();
        // Cannot fail: exactly the remaining length is requested.
        self.extract_bytes(remaining).unwrap_or_default()
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bytes() {
        let mut cursor = io::Cursor::new(Bytes::from_static(&[1, 2, 3, 4, 5]));
        assert_eq!(cursor.extract_bytes(2).unwrap().as_ref(), &[1, 2]);
        assert_eq!(cursor.remaining_len(), 3);

        let err = cursor.extract_bytes(4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(cursor.position(), 2);

        assert_eq!(cursor.extract_remaining().as_ref(), &[3, 4, 5]);
        assert_eq!(cursor.remaining_len(), 0);
        assert!(cursor.extract_remaining().is_empty());
    }
}
