use crate::error::{OfflineError, OfflineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    /// `None` reads to the end of the resource.
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// The byte range shall be expressed and formatted as a byte-range-spec as defined in
    /// IETF RFC 7233:2014, subclause 2.1. It is restricted to a single expression identifying
    /// a contiguous range of bytes.
    pub fn parse<S>(s: S) -> OfflineResult<Self>
    where
        S: AsRef<str>,
    {
        let invalid = || OfflineError::MpdParsing(format!("Invalid byte range: {}", s.as_ref()));

        let (start, end) = s.as_ref().trim().split_once('-').ok_or_else(invalid)?;
        let first_byte_pos = start.parse::<u64>().map_err(|_| invalid())?;
        let last_byte_pos = match end {
            "" => None,
            end => Some(end.parse::<u64>().map_err(|_| invalid())?),
        };

        // 0-500 means 501 bytes
        let length = match last_byte_pos {
            Some(last) if last < first_byte_pos => return Err(invalid()),
            Some(last) => {
                let length = (last - first_byte_pos).checked_add(1).ok_or_else(invalid)?;
                // The exclusive end has to be addressable too
                first_byte_pos.checked_add(length).ok_or_else(invalid)?;
                Some(length)
            }
            None => None,
        };
        Ok(Self::new(first_byte_pos, length))
    }

    /// Exclusive end offset, if the range is bounded.
    pub fn end(&self) -> Option<u64> {
        self.length.map(|length| self.offset.saturating_add(length))
    }

    /// The `Range` header value. `None` for an empty range, which has no HTTP form.
    pub fn to_http_range(&self) -> Option<String> {
        match self.length {
            Some(0) => None,
            Some(length) => Some(format!(
                "bytes={}-{}",
                self.offset,
                self.offset.saturating_add(length - 1)
            )),
            None => Some(format!("bytes={}-", self.offset)),
        }
    }
}
