use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Error, RecordHeader, RecordType};


/// The largest payload a single record can carry.
pub const MAX_CONTENT_LEN: usize = u16::MAX as usize;


/// A received FastCGI record with its padding stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The header of the record.
    pub header: RecordHeader,
    /// The record payload, `header.content_length` bytes long.
    pub content: Bytes,
}

impl Record {
    /// Tests whether this record terminates its stream.
    #[inline]
    #[must_use]
    pub fn is_stream_end(&self) -> bool {
        self.content.is_empty()
    }
}


/// Appends `data` to `dst` as a sequence of `rtype` stream records.
///
/// Payloads longer than [`MAX_CONTENT_LEN`] are split across records. Empty
/// input appends nothing, since an empty record would end the stream; use
/// [`encode_stream_end`] for that.
pub fn encode_stream(rtype: RecordType, request_id: u16, data: &[u8], dst: &mut BytesMut) {
    for chunk in data.chunks(MAX_CONTENT_LEN) {
        let mut head = RecordHeader::new(rtype, request_id);
        #[allow(clippy::cast_possible_truncation)]
        head.set_lengths(chunk.len() as u16);
        dst.reserve(RecordHeader::LEN + head.body_len());
        dst.put_slice(&head.to_bytes());
        dst.put_slice(chunk);
        dst.put_slice(head.padding_bytes());
        #[cfg(feature = "trace-more")]
        tracing::trace!(?head, "encoded record");
    }
}

/// Appends the empty record that terminates an `rtype` stream.
pub fn encode_stream_end(rtype: RecordType, request_id: u16, dst: &mut BytesMut) {
    dst.put_slice(&RecordHeader::new(rtype, request_id).to_bytes());
}


/// An incremental decoder splitting a byte stream into [`Record`]s.
///
/// The decoder remembers a header it already consumed, so input may arrive
/// in arbitrarily small pieces.
#[derive(Debug, Default, Clone)]
pub struct RecordDecoder {
    head: Option<RecordHeader>,
}

impl RecordDecoder {
    /// Creates a new decoder positioned at a record boundary.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tests whether the decoder consumed a header whose body is still
    /// outstanding.
    #[inline]
    #[must_use]
    pub fn is_mid_record(&self) -> bool {
        self.head.is_some()
    }

    /// Removes the next complete record from the front of `src`.
    ///
    /// Returns `Ok(None)` if `src` does not hold a complete record yet; more
    /// input must be appended before the next call.
    ///
    /// # Errors
    /// Returns an error if a record header carries an unknown version or
    /// record type. The stream cannot be resynchronized afterwards.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Record>, Error> {
        let head = match self.head {
            Some(head) => head,
            None => {
                let Some(raw) = src.get(..RecordHeader::LEN) else {
                    return Ok(None);
                };
                let mut buf = [0; RecordHeader::LEN];
                buf.copy_from_slice(raw);
                let head = RecordHeader::from_bytes(buf)?;
                src.advance(RecordHeader::LEN);
                self.head = Some(head);
                head
            },
        };

        if src.len() < head.body_len() {
            src.reserve(head.body_len() - src.len());
            return Ok(None);
        }
        self.head = None;
        let content = src.split_to(head.content_length.into()).freeze();
        src.advance(head.padding_length.into());
        #[cfg(feature = "trace-more")]
        tracing::trace!(?head, "decoded record");
        Ok(Some(Record { header: head, content }))
    }
}


#[cfg(test)]
mod tests {
    use std::iter::repeat_with;
    use super::*;

    #[test]
    fn long_stream_is_split() -> Result<(), Error> {
        let data: Vec<u8> = repeat_with(|| fastrand::u8(..)).take(MAX_CONTENT_LEN + 100).collect();
        let mut buf = BytesMut::new();
        encode_stream(RecordType::Stdin, 3, &data, &mut buf);
        encode_stream_end(RecordType::Stdin, 3, &mut buf);

        let mut dec = RecordDecoder::new();
        let first = dec.decode(&mut buf)?.expect("first record");
        let second = dec.decode(&mut buf)?.expect("second record");
        let end = dec.decode(&mut buf)?.expect("end record");
        assert!(buf.is_empty());

        assert_eq!(first.content.len(), MAX_CONTENT_LEN);
        assert_eq!(second.content.len(), 100);
        assert_eq!(second.header.padding_length, 4);
        assert_eq!([first.content, second.content].concat(), data);
        assert!(end.is_stream_end());
        assert_eq!(end.header.request_id, 3);
        Ok(())
    }

    #[test]
    fn empty_data_encodes_nothing() {
        let mut buf = BytesMut::new();
        encode_stream(RecordType::Params, 1, &[], &mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_fragmented() -> Result<(), Error> {
        let mut wire = BytesMut::new();
        encode_stream(RecordType::Stdout, 1, b"Status: 200 OK\r\n\r\nhello", &mut wire);
        encode_stream(RecordType::Stderr, 1, b"PHP Notice", &mut wire);

        let mut dec = RecordDecoder::new();
        let mut input = BytesMut::new();
        let mut records = Vec::new();
        for &b in wire.iter() {
            input.put_u8(b);
            if let Some(rec) = dec.decode(&mut input)? {
                records.push(rec);
            }
        }
        assert!(input.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header.rtype, RecordType::Stdout);
        assert_eq!(&records[0].content[..], b"Status: 200 OK\r\n\r\nhello");
        assert_eq!(records[1].header.rtype, RecordType::Stderr);
        assert_eq!(&records[1].content[..], b"PHP Notice");
        Ok(())
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let mut input = BytesMut::from(&[1u8, 0x40, 0, 1, 0, 0, 0, 0][..]);
        let res = RecordDecoder::new().decode(&mut input);
        assert!(matches!(res, Err(Error::UnknownRecordType(0x40))));
    }
}
