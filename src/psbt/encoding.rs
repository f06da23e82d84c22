//! Bitcoin consensus encoding primitives.

use crate::error::PsbtError;

/// Cursor over a borrowed byte buffer.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<(), PsbtError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(PsbtError::TrailingBytes(n)),
        }
    }

    pub fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8], PsbtError> {
        if self.remaining() < len {
            return Err(PsbtError::Truncated(context));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(
        &mut self,
        context: &'static str,
    ) -> Result<[u8; N], PsbtError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, context)?);
        Ok(out)
    }

    pub fn read_u8(&mut self, context: &'static str) -> Result<u8, PsbtError> {
        Ok(self.take(1, context)?[0])
    }

    pub fn read_u32_le(&mut self, context: &'static str) -> Result<u32, PsbtError> {
        Ok(u32::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_i32_le(&mut self, context: &'static str) -> Result<i32, PsbtError> {
        Ok(i32::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_u64_le(&mut self, context: &'static str) -> Result<u64, PsbtError> {
        Ok(u64::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_compact_size(&mut self, context: &'static str) -> Result<u64, PsbtError> {
        let value = match self.read_u8(context)? {
            0xfd => u64::from(u16::from_le_bytes(self.read_array(context)?)),
            0xfe => u64::from(u32::from_le_bytes(self.read_array(context)?)),
            0xff => self.read_u64_le(context)?,
            n => u64::from(n),
        };
        Ok(value)
    }

    /// Compact-size length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self, context: &'static str) -> Result<&'a [u8], PsbtError> {
        let len = self.read_compact_size(context)?;
        let len = usize::try_from(len).map_err(|_| PsbtError::Truncated(context))?;
        self.take(len, context)
    }
}

pub(crate) fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

pub(crate) fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_size_boundaries() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000] {
            let mut buf = Vec::new();
            write_compact_size(&mut buf, value);
            let mut reader = Reader::new(&buf);
            assert_eq!(reader.read_compact_size("test").unwrap(), value);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn var_bytes_longer_than_buffer_is_truncated() {
        let mut reader = Reader::new(&[0x05, 0x01, 0x02]);
        assert_eq!(
            reader.read_var_bytes("script"),
            Err(PsbtError::Truncated("script"))
        );
    }

    #[test]
    fn finish_reports_leftover_bytes() {
        let mut reader = Reader::new(&[1, 2, 3]);
        reader.read_u8("byte").unwrap();
        assert_eq!(reader.finish(), Err(PsbtError::TrailingBytes(2)));
    }
}
