//! Append-only block body storage.
//!
//! Block bodies live outside the key-value store in a flat file. Each
//! record is framed by a fixed magic number and a length prefix; index
//! entries address bodies by (offset, length). Records are never
//! rewritten or deleted; disconnected blocks simply stop being
//! referenced by the main chain.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use ebb_core::constants::MAX_BLOCK_SIZE;
use ebb_core::error::ChainError;
use ebb_core::types::Block;

use crate::entry::BlockFilePos;

/// Frame marker preceding every record.
pub const BLOCK_FILE_MAGIC: u32 = 0xEBB1_0C05;

/// Frame header size: magic plus length prefix.
const FRAME_LEN: u64 = 8;

/// Handle to the append-only block file.
pub struct BlockFile {
    file: File,
}

impl BlockFile {
    /// Open or create the block file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path.as_ref())
            .map_err(|e| ChainError::Storage(format!("block file open: {e}")))?;
        Ok(Self { file })
    }

    /// Append a block, returning its position.
    pub fn append(&mut self, block: &Block) -> Result<BlockFilePos, ChainError> {
        let body = bincode::encode_to_vec(block, bincode::config::standard())
            .map_err(|e| ChainError::Storage(format!("block encode: {e}")))?;

        let offset = self
            .file
            .seek(SeekFrom::End(0))
            .map_err(|e| ChainError::Storage(format!("block file seek: {e}")))?;

        let mut record = Vec::with_capacity(FRAME_LEN as usize + body.len());
        record.extend_from_slice(&BLOCK_FILE_MAGIC.to_le_bytes());
        record.extend_from_slice(&(body.len() as u32).to_le_bytes());
        record.extend_from_slice(&body);

        self.file
            .write_all(&record)
            .map_err(|e| ChainError::Storage(format!("block file write: {e}")))?;
        self.file
            .flush()
            .map_err(|e| ChainError::Storage(format!("block file flush: {e}")))?;

        Ok(BlockFilePos { offset, length: body.len() as u64 })
    }

    /// Read the block recorded at `pos`, verifying the frame.
    pub fn read(&mut self, pos: &BlockFilePos) -> Result<Block, ChainError> {
        if pos.length > MAX_BLOCK_SIZE as u64 {
            return Err(ChainError::Storage(format!(
                "block record length {} exceeds maximum",
                pos.length
            )));
        }

        self.file
            .seek(SeekFrom::Start(pos.offset))
            .map_err(|e| ChainError::Storage(format!("block file seek: {e}")))?;

        let mut frame = [0u8; FRAME_LEN as usize];
        self.file
            .read_exact(&mut frame)
            .map_err(|e| ChainError::Storage(format!("block frame read: {e}")))?;

        let magic = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        if magic != BLOCK_FILE_MAGIC {
            return Err(ChainError::Storage(format!(
                "bad block frame magic {magic:#010x} at offset {}",
                pos.offset
            )));
        }
        let length = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]) as u64;
        if length != pos.length {
            return Err(ChainError::Storage(format!(
                "block frame length {length} does not match index entry {}",
                pos.length
            )));
        }

        let mut body = vec![0u8; length as usize];
        self.file
            .read_exact(&mut body)
            .map_err(|e| ChainError::Storage(format!("block body read: {e}")))?;

        let (block, _) = bincode::decode_from_slice(&body, bincode::config::standard())
            .map_err(|e| ChainError::Storage(format!("block decode: {e}")))?;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebb_core::constants::COIN;
    use ebb_core::testing::{BlockBuilder, coinbase};
    use ebb_core::types::Hash256;

    fn test_block(height: u64) -> Block {
        BlockBuilder::new(Hash256([height as u8; 32]), 1_700_000_000)
            .tx(coinbase(height, 1_700_000_000, 50 * COIN, vec![0xAA; 32]))
            .build()
    }

    #[test]
    fn append_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("blocks.dat")).unwrap();

        let a = test_block(1);
        let b = test_block(2);
        let pos_a = file.append(&a).unwrap();
        let pos_b = file.append(&b).unwrap();

        assert_eq!(pos_a.offset, 0);
        assert!(pos_b.offset > pos_a.offset);
        assert_eq!(file.read(&pos_a).unwrap(), a);
        assert_eq!(file.read(&pos_b).unwrap(), b);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.dat");
        let block = test_block(1);
        let pos = BlockFile::open(&path).unwrap().append(&block).unwrap();

        let mut reopened = BlockFile::open(&path).unwrap();
        assert_eq!(reopened.read(&pos).unwrap(), block);
    }

    #[test]
    fn rejects_misaligned_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("blocks.dat")).unwrap();
        let pos = file.append(&test_block(1)).unwrap();

        // An offset into the middle of the record misses the magic.
        let bad = BlockFilePos { offset: pos.offset + 4, length: pos.length };
        assert!(file.read(&bad).is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("blocks.dat")).unwrap();
        let pos = file.append(&test_block(1)).unwrap();

        let bad = BlockFilePos { offset: pos.offset, length: pos.length + 1 };
        assert!(file.read(&bad).is_err());
    }

    #[test]
    fn rejects_oversized_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("blocks.dat")).unwrap();
        let bad = BlockFilePos { offset: 0, length: MAX_BLOCK_SIZE as u64 + 1 };
        assert!(file.read(&bad).is_err());
    }
}
