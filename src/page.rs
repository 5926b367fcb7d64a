//! The fixed 4096-byte on-disk page: a 12-byte header (CRC, data
//! length, reverse-chain link) followed by a 4084-byte body.

use crate::crc;
use crate::errors::{Result, StreamDbError};

pub const PAGE_SIZE: usize = 4096;
pub const HEADER_LEN: usize = 12;
pub const BODY_LEN: usize = PAGE_SIZE - HEADER_LEN;
pub const CHAIN_START: i32 = -1;

/// Page ids below this are reserved (the engine root occupies the
/// first bytes of the stream; these ids may never be handed out by
/// the free-list).
pub const FIRST_ALLOCATABLE_PAGE_ID: i32 = 3;

#[derive(Debug, Clone)]
pub struct Page {
    pub page_id: i32,
    pub data_length: i32,
    pub prev_page_id: i32,
    pub body: Box<[u8; BODY_LEN]>,
}

impl Page {
    /// A zero-initialised page ready to be committed to a freshly
    /// allocated slot.
    #[must_use]
    pub fn empty(page_id: i32) -> Self {
        Self { page_id, data_length: 0, prev_page_id: CHAIN_START, body: Box::new([0u8; BODY_LEN]) }
    }

    /// Fills the body (up to [`BODY_LEN`] bytes) from `data`, recording
    /// the actual length and returning the number of bytes consumed.
    ///
    /// # Panics
    /// Panics if `data.len()` exceeds [`BODY_LEN`] — callers must chunk
    /// their input into page-sized pieces first.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        assert!(data.len() <= BODY_LEN, "page body overflow: {} > {BODY_LEN}", data.len());
        self.body[..data.len()].copy_from_slice(data);
        self.data_length = data.len() as i32;
        data.len()
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.body[..self.data_length as usize]
    }

    /// Serialise this page to its full 4096-byte on-disk image,
    /// computing the CRC over the image with the checksum field
    /// zeroed.
    #[must_use]
    pub fn encode(&self) -> [u8; PAGE_SIZE] {
        let mut out = [0u8; PAGE_SIZE];
        out[4..8].copy_from_slice(&self.data_length.to_be_bytes());
        out[8..12].copy_from_slice(&self.prev_page_id.to_be_bytes());
        out[HEADER_LEN..].copy_from_slice(&*self.body);
        let sum = crc::checksum(&out);
        out[0..4].copy_from_slice(&sum.to_be_bytes());
        out
    }

    /// Decode a 4096-byte on-disk image into a page, validating its
    /// CRC unless `quick_mode` skips that check.
    ///
    /// # Errors
    /// Returns [`StreamDbError::CrcFailure`] if the CRC does not match
    /// and `quick_mode` is false.
    pub fn decode(page_id: i32, image: &[u8; PAGE_SIZE], quick_mode: bool) -> Result<Self> {
        let stored_crc = u32::from_be_bytes(image[0..4].try_into().unwrap());
        if !quick_mode {
            let mut check_image = *image;
            check_image[0..4].fill(0);
            if crc::checksum(&check_image) != stored_crc {
                return Err(StreamDbError::CrcFailure { page_id });
            }
        }
        let data_length = i32::from_be_bytes(image[4..8].try_into().unwrap());
        let prev_page_id = i32::from_be_bytes(image[8..12].try_into().unwrap());
        if !(0..=BODY_LEN as i32).contains(&data_length) {
            return Err(StreamDbError::Corrupted(format!(
                "page {page_id} has out-of-range data_length {data_length}"
            )));
        }
        let mut body = Box::new([0u8; BODY_LEN]);
        body.copy_from_slice(&image[HEADER_LEN..]);
        Ok(Self { page_id, data_length, prev_page_id, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let mut page = Page::empty(7);
        page.fill(b"hello world");
        page.prev_page_id = 3;
        let image = page.encode();
        let decoded = Page::decode(7, &image, false).unwrap();
        assert_eq!(decoded.data(), b"hello world");
        assert_eq!(decoded.prev_page_id, 3);
        assert_eq!(decoded.page_id, 7);
    }

    #[test]
    fn corrupted_image_fails_crc_unless_quick_mode() {
        let mut page = Page::empty(1);
        page.fill(b"payload");
        let mut image = page.encode();
        image[HEADER_LEN] ^= 0xFF;
        assert!(Page::decode(1, &image, false).is_err());
        assert!(Page::decode(1, &image, true).is_ok());
    }

    #[test]
    fn full_body_page_has_max_data_length() {
        let mut page = Page::empty(0);
        let data = vec![0xAB; BODY_LEN];
        let written = page.fill(&data);
        assert_eq!(written, BODY_LEN);
        assert_eq!(page.data_length as usize, BODY_LEN);
        let image = page.encode();
        let decoded = Page::decode(0, &image, false).unwrap();
        assert_eq!(decoded.data().len(), BODY_LEN);
    }
}
