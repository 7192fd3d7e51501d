use byteorder::{ByteOrder, LittleEndian};

use crate::error::ReadError;

/// A bounds-checked little-endian decoder over a byte buffer.
///
/// Record payloads and feature sections are read through this; every
/// primitive read fails with the decoder's context error instead of
/// running off the end of a short buffer.
pub(crate) struct BufDecoder<'a> {
    buf: &'a [u8],
    what: ReadError,
}

impl<'a> BufDecoder<'a> {
    pub fn new(buf: &'a [u8], what: ReadError) -> Self {
        Self { buf, what }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    /// Narrows the decoder to the last `n` bytes of the buffer.
    pub fn tail(&self, n: usize) -> Result<BufDecoder<'a>, ReadError> {
        if n > self.buf.len() {
            return Err(self.what);
        }
        Ok(BufDecoder::new(&self.buf[self.buf.len() - n..], self.what))
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReadError> {
        if n > self.buf.len() {
            return Err(self.what);
        }
        self.buf = &self.buf[n..];
        Ok(())
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        if n > self.buf.len() {
            return Err(self.what);
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    pub fn bytes(&mut self, out: &mut [u8]) -> Result<(), ReadError> {
        out.copy_from_slice(self.take(out.len())?);
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ReadError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn u32(&mut self) -> Result<u32, ReadError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn i32(&mut self) -> Result<i32, ReadError> {
        Ok(self.u32()? as i32)
    }

    pub fn u64(&mut self) -> Result<u64, ReadError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn i64(&mut self) -> Result<i64, ReadError> {
        Ok(self.u64()? as i64)
    }

    pub fn u32_if(&mut self, cond: bool) -> Result<u32, ReadError> {
        if cond {
            self.u32()
        } else {
            Ok(0)
        }
    }

    pub fn i32_if(&mut self, cond: bool) -> Result<i32, ReadError> {
        if cond {
            self.i32()
        } else {
            Ok(0)
        }
    }

    pub fn u64_if(&mut self, cond: bool) -> Result<u64, ReadError> {
        if cond {
            self.u64()
        } else {
            Ok(0)
        }
    }

    /// Reads `n` u64 values into `out`, reusing its capacity.
    pub fn u64s(&mut self, out: &mut Vec<u64>, n: usize) -> Result<(), ReadError> {
        let bytes = self.take(n.checked_mul(8).ok_or(self.what)?)?;
        out.clear();
        out.reserve(n);
        for chunk in bytes.chunks_exact(8) {
            out.push(LittleEndian::read_u64(chunk));
        }
        Ok(())
    }

    /// Reads a zero-terminated string. If no terminator is present the
    /// whole remaining buffer is taken, matching what perf's own reader
    /// tolerates for the fixed-size name fields.
    pub fn cstring(&mut self) -> Result<String, ReadError> {
        let s = match memchr::memchr(0, self.buf) {
            Some(pos) => {
                let s = &self.buf[..pos];
                self.buf = &self.buf[pos + 1..];
                s
            }
            None => {
                let s = self.buf;
                self.buf = &[];
                s
            }
        };
        Ok(String::from_utf8_lossy(s).into_owned())
    }

    /// Reads a `perf_header_string`: a u32 length followed by that many
    /// bytes holding a zero-terminated string.
    pub fn len_string(&mut self) -> Result<String, ReadError> {
        let len = self.u32()? as usize;
        let mut inner = BufDecoder::new(self.take(len)?, self.what);
        inner.cstring()
    }

    /// Reads a `perf_header_string_list`.
    pub fn string_list(&mut self) -> Result<Vec<String>, ReadError> {
        let count = self.u32()?;
        let mut out = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            out.push(self.len_string()?);
        }
        Ok(out)
    }
}
