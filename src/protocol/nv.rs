use bytes::BufMut;

use super::varint::VarInt;
use super::Error as ProtocolError;


/// An iterator over the complete name-value pairs in a `Params` stream.
///
/// Iteration stops at the first pair that is cut off by the end of the
/// input.
#[derive(Debug, Clone)]
pub struct NVIter<'a> {
    data: &'a [u8],
}

impl<'a> NVIter<'a> {
    /// Creates a new [`NVIter`] over the referenced input bytes.
    #[inline]
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for NVIter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let mut cur = self.data;
        let name_len = VarInt::decode(&mut cur)?.to_usize();
        let val_len = VarInt::decode(&mut cur)?.to_usize();
        let total_len = name_len.checked_add(val_len)?;

        if cur.len() >= total_len {
            self.data = &cur[total_len..];
            Some((&cur[..name_len], &cur[name_len..total_len]))
        } else {
            None
        }
    }
}

impl std::iter::FusedIterator for NVIter<'_> {}


/// Appends a name-value pair to `dst`.
///
/// Nothing is written if either length cannot be encoded.
///
/// # Errors
/// Returns [`ProtocolError::InvalidVarInt`] if either length is too large.
pub fn encode((name, value): (&[u8], &[u8]), dst: &mut impl BufMut) -> Result<usize, ProtocolError> {
    let name_len = VarInt::try_from(name.len())?;
    let val_len = VarInt::try_from(value.len())?;
    let written = name_len.encode(dst) + val_len.encode(dst);
    dst.put_slice(name);
    dst.put_slice(value);
    Ok(written + name.len() + value.len())
}
