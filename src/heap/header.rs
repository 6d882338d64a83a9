//! The heap file header page.

use crate::storage::PageId;

/// Maximum length of a heap file name stored in the header, in bytes.
pub const MAX_NAME_SIZE: usize = 64;

/// On-disk sentinel for "no page".
const NO_PAGE: u64 = u64::MAX;

/// File-wide metadata, persisted on the file's first page.
///
/// Layout (little-endian):
/// - bytes 0..64: file name, zero-padded
/// - bytes 64..72: first data page (u64::MAX = none)
/// - bytes 72..80: last data page (u64::MAX = none)
/// - bytes 80..84: total page count, header included (u32)
/// - bytes 84..88: live record count (u32)
///
/// `first_page` and `last_page` bound the data page chain: following
/// next-page links from `first_page` always ends at `last_page`, whose
/// own link is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Name the file was created under, truncated to [`MAX_NAME_SIZE`].
    pub file_name: String,
    /// Head of the data page chain.
    pub first_page: Option<PageId>,
    /// Tail of the data page chain.
    pub last_page: Option<PageId>,
    /// Total pages in the file, header page included.
    pub page_cnt: u32,
    /// Live records across all data pages.
    pub rec_cnt: u32,
}

impl FileHeader {
    /// Header of a freshly created heap file with one empty data page.
    pub fn new(file_name: &str, first_data_page: PageId) -> Self {
        let mut name = file_name.to_string();
        if name.len() > MAX_NAME_SIZE {
            let mut end = MAX_NAME_SIZE;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }
        Self {
            file_name: name,
            first_page: Some(first_data_page),
            last_page: Some(first_data_page),
            page_cnt: 2,
            rec_cnt: 0,
        }
    }

    /// Decodes a header from the first [`Self::ENCODED_SIZE`] bytes of a
    /// header page.
    pub fn read_from(data: &[u8]) -> Self {
        let name_end = data[..MAX_NAME_SIZE]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_SIZE);
        let decode_page = |bytes: [u8; 8]| match u64::from_le_bytes(bytes) {
            NO_PAGE => None,
            n => Some(PageId::new(n)),
        };
        Self {
            file_name: String::from_utf8_lossy(&data[..name_end]).into_owned(),
            first_page: decode_page(data[64..72].try_into().unwrap()),
            last_page: decode_page(data[72..80].try_into().unwrap()),
            page_cnt: u32::from_le_bytes(data[80..84].try_into().unwrap()),
            rec_cnt: u32::from_le_bytes(data[84..88].try_into().unwrap()),
        }
    }

    /// Encodes the header into the first bytes of a header page.
    pub fn write_to(&self, data: &mut [u8]) {
        data[..MAX_NAME_SIZE].fill(0);
        let name = self.file_name.as_bytes();
        let n = name.len().min(MAX_NAME_SIZE);
        data[..n].copy_from_slice(&name[..n]);

        let encode_page = |page: Option<PageId>| page.map_or(NO_PAGE, |p| p.page_num()).to_le_bytes();
        data[64..72].copy_from_slice(&encode_page(self.first_page));
        data[72..80].copy_from_slice(&encode_page(self.last_page));
        data[80..84].copy_from_slice(&self.page_cnt.to_le_bytes());
        data[84..88].copy_from_slice(&self.rec_cnt.to_le_bytes());
    }

    /// Bytes occupied by the encoded header.
    pub const ENCODED_SIZE: usize = MAX_NAME_SIZE + 8 + 8 + 4 + 4;
}
