//! Bounds-checked reader for MySQL payload fields
//!
//! Every accessor returns `None` instead of panicking when the payload is
//! shorter than the field it describes.

/// NULL marker in text-protocol rows
pub const NULL_MARKER: u8 = 0xFB;

/// Cursor over a packet payload
#[derive(Debug, Clone, Copy)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.first().copied()
    }

    pub fn u8(&mut self) -> Option<u8> {
        let (&b, rest) = self.buf.split_first()?;
        self.buf = rest;
        Some(b)
    }

    pub fn u16_le(&mut self) -> Option<u16> {
        let bytes = self.take(2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn u32_le(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.buf.len() < n {
            return None;
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Some(head)
    }

    pub fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    /// Read up to the next NUL byte and consume it; without a NUL the rest
    /// of the payload is returned
    pub fn null_terminated(&mut self) -> &'a [u8] {
        match self.buf.iter().position(|&b| b == 0) {
            Some(pos) => {
                let s = &self.buf[..pos];
                self.buf = &self.buf[pos + 1..];
                s
            }
            None => self.rest(),
        }
    }

    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// Read a length-encoded integer
    ///
    /// Returns `None` on truncation or on the 0xFB / 0xFF markers, which are
    /// not integers.
    pub fn lenenc_int(&mut self) -> Option<u64> {
        match self.u8()? {
            b @ 0x00..=0xFA => Some(b as u64),
            0xFC => self.u16_le().map(u64::from),
            0xFD => {
                let b = self.take(3)?;
                Some(u32::from_le_bytes([b[0], b[1], b[2], 0]) as u64)
            }
            0xFE => {
                let b = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Some(u64::from_le_bytes(raw))
            }
            _ => None,
        }
    }

    /// Read a length-encoded string
    ///
    /// Outer `None` means the payload was truncated; `Some(None)` is SQL NULL.
    pub fn lenenc_bytes(&mut self) -> Option<Option<&'a [u8]>> {
        if self.peek()? == NULL_MARKER {
            self.u8();
            return Some(None);
        }
        let len = usize::try_from(self.lenenc_int()?).ok()?;
        self.take(len).map(Some)
    }
}
