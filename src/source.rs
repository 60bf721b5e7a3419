//! Windowed access to a block device or image.
//!
//! The core never needs a dedicated `BlockSource` trait: every parser here
//! is already generic over `R: Read + Seek`, the way the rest of this
//! crate reads structures directly off a cursor. What a nested partition
//! or an HFS wrapper's embedded volume needs is a way to clip an
//! underlying `Read + Seek` to a byte sub-range and have every absolute
//! offset inside that range measured from the window's own start —
//! that's `Windowed<R>`.

use std::io::{Read, Seek, SeekFrom};

/// Clips reads and seeks on `inner` to the half-open byte range
/// `[offset, offset + length)`. Every `SeekFrom::Start`/position reported
/// to callers is relative to the window, not the underlying source.
pub struct Windowed<R> {
    inner: R,
    offset: u64,
    length: u64,
    position: u64,
}

impl<R: Read + Seek> Windowed<R> {
    pub fn new(inner: R, offset: u64, length: u64) -> Self {
        Windowed { inner, offset, length, position: 0 }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for Windowed<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.position >= self.length {
            return Ok(0);
        }
        let remaining = (self.length - self.position) as usize;
        let to_read = buf.len().min(remaining);
        self.inner.seek(SeekFrom::Start(self.offset + self.position))?;
        let read = self.inner.read(&mut buf[..to_read])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for Windowed<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => self.length as i64 + offset,
        };
        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of window",
            ));
        }
        self.position = new_pos as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn clips_reads_to_window() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut w = Windowed::new(Cursor::new(data), 100, 10);

        let mut buf = [0u8; 16];
        let n = w.read(&mut buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf[..10], &(100u8..110).collect::<Vec<u8>>()[..]);

        let n = w.read(&mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn seek_end_is_window_relative() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut w = Windowed::new(Cursor::new(data), 50, 20);
        let pos = w.seek(SeekFrom::End(-5)).unwrap();
        assert_eq!(pos, 15);
        let mut buf = [0u8; 5];
        w.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [65, 66, 67, 68, 69]);
    }
}
