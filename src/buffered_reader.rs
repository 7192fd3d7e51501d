use std::io::{self, Read, Seek, SeekFrom};

const BUF_SIZE: usize = 16 << 10;

/// A buffered reader over a window of a seekable input, with absolute
/// position tracking.
///
/// Sequential reads are served from an internal read-ahead buffer;
/// `seek_to` just moves the logical position, so the random-access
/// second pass of time-ordered iteration can still hit the buffer when
/// consecutive records are close together.
pub(crate) struct SectionReader<R> {
    inner: R,
    /// Window bounds, absolute file offsets.
    start: u64,
    end: u64,
    /// Logical position of the next byte to deliver.
    pos: u64,
    /// Position of the underlying reader.
    inner_pos: u64,
    buf: Box<[u8]>,
    /// The buffer holds file bytes [buf_start, buf_start + buf_len).
    buf_start: u64,
    buf_len: usize,
}

impl<R: Read + Seek> SectionReader<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            start: 0,
            end,
            pos: 0,
            inner_pos: 0,
            buf: vec![0; BUF_SIZE].into_boxed_slice(),
            buf_start: 0,
            buf_len: 0,
        })
    }

    /// Restricts the reader to `[start, end)` and moves to `start`.
    pub fn set_window(&mut self, start: u64, end: u64) {
        self.start = start;
        self.end = end;
        self.pos = start;
    }

    /// Current logical position, as an absolute file offset.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Whether the logical position has reached the end of the window.
    pub fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    /// Moves the logical position to the absolute file offset `pos`.
    pub fn seek_to(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> io::Result<()> {
        if (self.end - self.pos.min(self.end)) < out.len() as u64 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let mut filled = 0;
        while filled < out.len() {
            let want = &mut out[filled..];
            if self.pos >= self.buf_start && self.pos < self.buf_start + self.buf_len as u64 {
                let off = (self.pos - self.buf_start) as usize;
                let n = want.len().min(self.buf_len - off);
                want[..n].copy_from_slice(&self.buf[off..off + n]);
                self.pos += n as u64;
                filled += n;
                continue;
            }
            if want.len() >= self.buf.len() {
                // Large read; bypass the buffer.
                self.position_inner()?;
                self.inner.read_exact(want)?;
                self.inner_pos += want.len() as u64;
                self.pos += want.len() as u64;
                filled = out.len();
                continue;
            }
            self.fill()?;
        }
        Ok(())
    }

    fn position_inner(&mut self) -> io::Result<()> {
        if self.inner_pos != self.pos {
            self.inner.seek(SeekFrom::Start(self.pos))?;
            self.inner_pos = self.pos;
        }
        Ok(())
    }

    fn fill(&mut self) -> io::Result<()> {
        self.position_inner()?;
        let max = (self.end - self.pos).min(self.buf.len() as u64) as usize;
        let n = self.inner.read(&mut self.buf[..max])?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        self.buf_start = self.pos;
        self.buf_len = n;
        self.inner_pos += n as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn windowed_reads() {
        let data: Vec<u8> = (0..=255).collect();
        let mut r = SectionReader::new(Cursor::new(data)).unwrap();
        r.set_window(10, 20);
        let mut out = [0u8; 4];
        r.read_exact(&mut out).unwrap();
        assert_eq!(out, [10, 11, 12, 13]);
        assert_eq!(r.position(), 14);
        assert!(!r.at_end());

        let mut out = [0u8; 6];
        r.read_exact(&mut out).unwrap();
        assert_eq!(out, [14, 15, 16, 17, 18, 19]);
        assert!(r.at_end());

        let mut out = [0u8; 1];
        assert!(r.read_exact(&mut out).is_err());
    }

    #[test]
    fn seek_within_window() {
        let data: Vec<u8> = (0..=255).collect();
        let mut r = SectionReader::new(Cursor::new(data)).unwrap();
        r.set_window(0, 256);
        let mut out = [0u8; 2];
        r.read_exact(&mut out).unwrap();
        r.seek_to(100);
        r.read_exact(&mut out).unwrap();
        assert_eq!(out, [100, 101]);
        r.seek_to(4);
        r.read_exact(&mut out).unwrap();
        assert_eq!(out, [4, 5]);
    }
}
