use std::convert::TryFrom;

use glam::{Vec3, Vec4};

use crate::error::ArchiveError;

use super::{ArchiveReader, ArchiveWriter};

pub const MAGIC: &[u8; 4] = b"EMBS";
pub const VERSION: u32 = 1;

/// Compact little-endian framing of the scene tree.
///
/// Keys are not stored; fields must be read back in the order they were written. Every
/// block carries a `u32` byte length so a reader can skip whatever a failed component left
/// unread.
#[derive(Debug)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
    open_blocks: Vec<usize>,
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryWriter {
    pub fn new() -> Self {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(MAGIC);
        buffer.extend_from_slice(&VERSION.to_le_bytes());
        Self {
            buffer,
            open_blocks: Vec::new(),
        }
    }

    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        if !self.open_blocks.is_empty() {
            return Err(ArchiveError::Unbalanced);
        }
        Ok(self.buffer)
    }

    fn put_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn put_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }
}

impl ArchiveWriter for BinaryWriter {
    fn begin_block(&mut self, _key: &str) {
        self.open_blocks.push(self.buffer.len());
        self.put_u32(0);
    }

    fn end_block(&mut self) {
        let Some(start) = self.open_blocks.pop() else {
            return;
        };
        let length = (self.buffer.len() - start - 4) as u32;
        self.buffer[start..start + 4].copy_from_slice(&length.to_le_bytes());
    }

    fn write_bool(&mut self, _key: &str, value: bool) {
        self.buffer.push(u8::from(value));
    }

    fn write_u32(&mut self, _key: &str, value: u32) {
        self.put_u32(value);
    }

    fn write_f32(&mut self, _key: &str, value: f32) {
        self.put_f32(value);
    }

    fn write_vec3(&mut self, _key: &str, value: Vec3) {
        for component in value.to_array() {
            self.put_f32(component);
        }
    }

    fn write_vec4(&mut self, _key: &str, value: Vec4) {
        for component in value.to_array() {
            self.put_f32(component);
        }
    }

    fn write_str(&mut self, _key: &str, value: &str) {
        self.put_str(value);
    }

    fn write_names(&mut self, _key: &str, names: &[String]) {
        self.put_u32(names.len() as u32);
        for name in names {
            self.put_str(name);
        }
    }
}

/// Reader for [`BinaryWriter`] output.
#[derive(Debug)]
pub struct BinaryReader {
    data: Vec<u8>,
    cursor: usize,
    block_ends: Vec<usize>,
}

impl BinaryReader {
    /// Validates the header and positions the cursor at the first field.
    pub fn new(data: Vec<u8>) -> Result<Self, ArchiveError> {
        if data.len() < 8 {
            return Err(ArchiveError::Truncated);
        }
        if &data[0..4] != MAGIC {
            return Err(ArchiveError::BadMagic);
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != VERSION {
            return Err(ArchiveError::UnsupportedVersion(version));
        }
        Ok(Self {
            data,
            cursor: 8,
            block_ends: Vec::new(),
        })
    }

    pub fn is_binary(data: &[u8]) -> bool {
        data.len() >= 4 && &data[0..4] == MAGIC
    }

    fn limit(&self) -> usize {
        self.block_ends.last().copied().unwrap_or(self.data.len())
    }

    fn take(&mut self, count: usize) -> Result<&[u8], ArchiveError> {
        let end = self
            .cursor
            .checked_add(count)
            .ok_or(ArchiveError::Truncated)?;
        if end > self.limit() {
            return Err(ArchiveError::Truncated);
        }
        let bytes = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    fn take_u32(&mut self) -> Result<u32, ArchiveError> {
        let bytes = self.take(4)?;
        let array = <[u8; 4]>::try_from(bytes).map_err(|_| ArchiveError::Truncated)?;
        Ok(u32::from_le_bytes(array))
    }

    fn take_f32(&mut self) -> Result<f32, ArchiveError> {
        self.take_u32().map(f32::from_bits)
    }

    fn take_str(&mut self, key: &str) -> Result<String, ArchiveError> {
        let length = self.take_u32()? as usize;
        let bytes = self.take(length)?.to_vec();
        String::from_utf8(bytes).map_err(|err| ArchiveError::InvalidValue {
            key: key.to_string(),
            message: err.to_string(),
        })
    }
}

impl ArchiveReader for BinaryReader {
    fn begin_block(&mut self, _key: &str) -> Result<(), ArchiveError> {
        let length = self.take_u32()? as usize;
        let end = self
            .cursor
            .checked_add(length)
            .ok_or(ArchiveError::Truncated)?;
        if end > self.limit() {
            return Err(ArchiveError::Truncated);
        }
        self.block_ends.push(end);
        Ok(())
    }

    fn end_block(&mut self) -> Result<(), ArchiveError> {
        let end = self.block_ends.pop().ok_or(ArchiveError::Unbalanced)?;
        self.cursor = end;
        Ok(())
    }

    fn depth(&self) -> usize {
        self.block_ends.len()
    }

    fn read_bool(&mut self, key: &str) -> Result<bool, ArchiveError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ArchiveError::InvalidValue {
                key: key.to_string(),
                message: format!("{other} is not a boolean"),
            }),
        }
    }

    fn read_u32(&mut self, _key: &str) -> Result<u32, ArchiveError> {
        self.take_u32()
    }

    fn read_f32(&mut self, _key: &str) -> Result<f32, ArchiveError> {
        self.take_f32()
    }

    fn read_vec3(&mut self, _key: &str) -> Result<Vec3, ArchiveError> {
        Ok(Vec3::new(self.take_f32()?, self.take_f32()?, self.take_f32()?))
    }

    fn read_vec4(&mut self, _key: &str) -> Result<Vec4, ArchiveError> {
        Ok(Vec4::new(
            self.take_f32()?,
            self.take_f32()?,
            self.take_f32()?,
            self.take_f32()?,
        ))
    }

    fn read_str(&mut self, key: &str) -> Result<String, ArchiveError> {
        self.take_str(key)
    }

    fn read_names(&mut self, key: &str) -> Result<Vec<String>, ArchiveError> {
        let count = self.take_u32()? as usize;
        let mut names = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            names.push(self.take_str(key)?);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_validated() {
        assert!(matches!(
            BinaryReader::new(b"NOPE\x01\x00\x00\x00".to_vec()),
            Err(ArchiveError::BadMagic)
        ));
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            BinaryReader::new(data),
            Err(ArchiveError::UnsupportedVersion(7))
        ));
        assert!(matches!(
            BinaryReader::new(b"EM".to_vec()),
            Err(ArchiveError::Truncated)
        ));
    }

    #[test]
    fn end_block_skips_unread_fields() {
        let mut writer = BinaryWriter::new();
        writer.begin_block("first");
        writer.write_f32("a", 1.0);
        writer.write_str("b", "ignored");
        writer.end_block();
        writer.write_u32("after", 42);
        let bytes = writer.finish().unwrap();

        let mut reader = BinaryReader::new(bytes).unwrap();
        reader.begin_block("first").unwrap();
        assert_eq!(reader.read_f32("a").unwrap(), 1.0);
        reader.end_block().unwrap();
        assert_eq!(reader.read_u32("after").unwrap(), 42);
    }

    #[test]
    fn reads_cannot_escape_their_block() {
        let mut writer = BinaryWriter::new();
        writer.begin_block("small");
        writer.write_bool("flag", true);
        writer.end_block();
        writer.write_f32("outside", 3.0);
        let bytes = writer.finish().unwrap();

        let mut reader = BinaryReader::new(bytes).unwrap();
        reader.begin_block("small").unwrap();
        assert!(reader.read_bool("flag").unwrap());
        assert!(matches!(
            reader.read_f32("outside"),
            Err(ArchiveError::Truncated)
        ));
    }

    #[test]
    fn unbalanced_writer_is_rejected() {
        let mut writer = BinaryWriter::new();
        writer.begin_block("open");
        assert!(matches!(writer.finish(), Err(ArchiveError::Unbalanced)));
    }
}
