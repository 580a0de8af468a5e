use crate::error::{ExtractStage, ProofError, Result};

use super::{
    TAG_EXIF_IFD_POINTER, TAG_USER_COMMENT, TIFF_BIG_ENDIAN, TIFF_LITTLE_ENDIAN, TIFF_MAGIC,
    TYPE_UNDEFINED,
};

const ENTRY_SIZE: usize = 12;
const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16_at(self, data: &[u8], pos: usize) -> Option<u16> {
        let bytes: [u8; 2] = data.get(pos..pos.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    fn u32_at(self, data: &[u8], pos: usize) -> Option<u32> {
        let bytes: [u8; 4] = data.get(pos..pos.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    /// Offset of the 4 byte value/offset field
    value_pos: usize,
}

struct Tiff<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Tiff<'a> {
    fn parse(data: &'a [u8]) -> Result<(Self, usize)> {
        let stage = ExtractStage::FoundSegment;
        if data.len() < 8 {
            return Err(ProofError::malformed_input(
                stage,
                format!("TIFF header needs 8 bytes, segment has {}", data.len()),
            ));
        }

        let order = match u16::from_be_bytes([data[0], data[1]]) {
            TIFF_LITTLE_ENDIAN => ByteOrder::Little,
            TIFF_BIG_ENDIAN => ByteOrder::Big,
            other => {
                return Err(ProofError::malformed_input(
                    stage,
                    format!("unknown byte order mark 0x{other:04x}"),
                ))
            }
        };
        let tiff = Tiff { data, order };

        let magic = tiff.u16(2).unwrap_or_default();
        if magic != TIFF_MAGIC {
            return Err(ProofError::malformed_input(
                stage,
                format!("bad TIFF magic {magic}"),
            ));
        }
        let ifd0 = tiff.u32(4).unwrap_or_default() as usize;
        log::trace!("TIFF header: {order:?}, IFD0 at {ifd0}");

        Ok((tiff, ifd0))
    }

    fn u16(&self, pos: usize) -> Option<u16> {
        self.order.u16_at(self.data, pos)
    }

    fn u32(&self, pos: usize) -> Option<u32> {
        self.order.u32_at(self.data, pos)
    }

    fn entries(&self, ifd_offset: usize) -> Result<Vec<Entry>> {
        let stage = ExtractStage::ParsingDirectory;
        let count = self.u16(ifd_offset).ok_or_else(|| {
            ProofError::malformed_input(
                stage,
                format!("directory offset {ifd_offset} is outside the segment"),
            )
        })? as usize;

        let first = ifd_offset + 2;
        if first + count * ENTRY_SIZE > self.data.len() {
            return Err(ProofError::malformed_input(
                stage,
                format!("directory at {ifd_offset} declares {count} entries past the segment end"),
            ));
        }

        let entries = (0..count)
            .filter_map(|i| {
                let pos = first + i * ENTRY_SIZE;
                Some(Entry {
                    tag: self.u16(pos)?,
                    field_type: self.u16(pos + 2)?,
                    count: self.u32(pos + 4)?,
                    value_pos: pos + 8,
                })
            })
            .collect();

        Ok(entries)
    }

    fn value_bytes(&self, entry: &Entry) -> Result<&'a [u8]> {
        let stage = ExtractStage::LocatingTag;
        if !matches!(entry.field_type, TYPE_BYTE | TYPE_ASCII | TYPE_UNDEFINED) {
            return Err(ProofError::malformed_input(
                stage,
                format!("user comment has unsupported field type {}", entry.field_type),
            ));
        }

        let count = entry.count as usize;
        let start = if count <= 4 {
            entry.value_pos
        } else {
            self.u32(entry.value_pos).unwrap_or_default() as usize
        };
        if start > self.data.len() {
            return Err(ProofError::malformed_input(
                stage,
                format!(
                    "user comment data offset {start} is past the segment end ({})",
                    self.data.len()
                ),
            ));
        }

        let end = start.saturating_add(count).min(self.data.len());
        if end - start < count {
            log::warn!(
                "user comment declares {count} bytes but only {} are present; clamping",
                end - start
            );
        }

        Ok(&self.data[start..end])
    }
}

/// Locates the user comment tag in a TIFF structure and returns its bytes.
///
/// IFD0 is searched first, then the Exif sub-IFD if IFD0 points to one.
pub(super) fn user_comment(blob: &[u8]) -> Result<&[u8]> {
    let (tiff, ifd0) = Tiff::parse(blob)?;
    let root = tiff.entries(ifd0)?;

    if let Some(entry) = root.iter().find(|e| e.tag == TAG_USER_COMMENT) {
        return tiff.value_bytes(entry);
    }

    let pointer = root
        .iter()
        .find(|e| e.tag == TAG_EXIF_IFD_POINTER && e.field_type == TYPE_LONG)
        .and_then(|e| tiff.u32(e.value_pos));
    if let Some(exif_ifd) = pointer {
        log::trace!("following Exif sub-IFD pointer to {exif_ifd}");
        let nested = tiff.entries(exif_ifd as usize)?;
        if let Some(entry) = nested.iter().find(|e| e.tag == TAG_USER_COMMENT) {
            return tiff.value_bytes(entry);
        }
    }

    Err(ProofError::not_found(
        ExtractStage::LocatingTag,
        "no user comment tag in IFD0 or the Exif sub-IFD",
    ))
}
