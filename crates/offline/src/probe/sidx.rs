//! Just enough ISO-BMFF to find a `sidx` (segment index) box.

use bytes::Buf;

use crate::{
    error::{OfflineError, OfflineResult},
    index::{scale_to_us, ChunkIndex},
};

const BOX_HEADER_SIZE: u64 = 8;
const LARGE_BOX_HEADER_SIZE: u64 = 16;

/// Walks the top-level boxes of `data` and parses the first `sidx` box.
///
/// `position` is the offset of `data[0]` in the resource, so that the returned chunk offsets
/// are absolute. Returns `Ok(None)` when the data carries no `sidx` box. A box that claims to
/// extend past the end of `data` ends the walk, unless it is the `sidx` box itself.
pub fn find_chunk_index(data: &[u8], position: u64) -> OfflineResult<Option<ChunkIndex>> {
    let mut offset = 0u64;
    let len = data.len() as u64;
    while len - offset >= BOX_HEADER_SIZE {
        let mut header = &data[offset as usize..];
        let size = header.get_u32();
        let box_type: [u8; 4] = [
            header.get_u8(),
            header.get_u8(),
            header.get_u8(),
            header.get_u8(),
        ];

        let (header_size, box_size) = match size {
            0 => (BOX_HEADER_SIZE, len - offset),
            1 => {
                if len - offset < LARGE_BOX_HEADER_SIZE {
                    break;
                }
                (LARGE_BOX_HEADER_SIZE, header.get_u64())
            }
            size => (BOX_HEADER_SIZE, u64::from(size)),
        };
        if box_size < header_size {
            return Err(invalid(format!(
                "box {} at {} is smaller than its header",
                String::from_utf8_lossy(&box_type),
                position.saturating_add(offset)
            )));
        }

        let end = offset.saturating_add(box_size);
        if &box_type == b"sidx" {
            if end > len {
                return Err(invalid("truncated sidx box".to_string()));
            }
            let body = &data[(offset + header_size) as usize..end as usize];
            let box_end = position
                .checked_add(end)
                .ok_or_else(|| invalid("sidx box ends past the addressable range".to_string()))?;
            return parse_sidx(body, box_end).map(Some);
        }
        if end > len {
            break;
        }
        offset = end;
    }

    Ok(None)
}

/// Parses the body of a `sidx` box ending at `box_end` in the resource.
fn parse_sidx(mut body: &[u8], box_end: u64) -> OfflineResult<ChunkIndex> {
    ensure(body, 12)?;
    let version = body.get_u8();
    body.advance(3); // flags
    let _reference_id = body.get_u32();
    let timescale = body.get_u32();
    if timescale == 0 {
        return Err(invalid("sidx timescale is zero".to_string()));
    }

    let (earliest_presentation_time, first_offset) = if version == 0 {
        ensure(body, 8)?;
        (u64::from(body.get_u32()), u64::from(body.get_u32()))
    } else {
        ensure(body, 16)?;
        (body.get_u64(), body.get_u64())
    };

    ensure(body, 4)?;
    body.advance(2); // reserved
    let reference_count = body.get_u16() as usize;
    ensure(body, reference_count * 12)?;

    let mut sizes = Vec::with_capacity(reference_count);
    let mut offsets = Vec::with_capacity(reference_count);
    let mut durations_us = Vec::with_capacity(reference_count);
    let mut times_us = Vec::with_capacity(reference_count);

    let overflow = || invalid("sidx offsets or times overflow".to_string());
    let timescale = u64::from(timescale);
    let mut offset = box_end.checked_add(first_offset).ok_or_else(overflow)?;
    let mut time = earliest_presentation_time;
    let mut time_us = scale_to_us(i128::from(time), timescale);
    for _ in 0..reference_count {
        let reference = body.get_u32();
        if reference & 0x8000_0000 != 0 {
            return Err(invalid("hierarchical sidx is not supported".to_string()));
        }
        let size = reference & 0x7fff_ffff;
        if size == 0 {
            return Err(invalid("sidx reference of zero bytes".to_string()));
        }
        let duration = body.get_u32();
        body.advance(4); // SAP

        sizes.push(size);
        offsets.push(offset);
        times_us.push(time_us);

        time = time.checked_add(u64::from(duration)).ok_or_else(overflow)?;
        let next_time_us = scale_to_us(i128::from(time), timescale);
        durations_us.push((next_time_us - time_us) as u64);

        time_us = next_time_us;
        offset = offset.checked_add(u64::from(size)).ok_or_else(overflow)?;
    }

    Ok(ChunkIndex::new(sizes, offsets, durations_us, times_us))
}

fn ensure(body: &[u8], needed: usize) -> OfflineResult<()> {
    if body.remaining() < needed {
        return Err(invalid("truncated sidx box".to_string()));
    }
    Ok(())
}

fn invalid(message: String) -> OfflineError {
    OfflineError::InvalidContainer(message)
}
