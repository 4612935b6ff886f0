use std::fmt;

use bytes::BufMut;

use super::Error as ProtocolError;


/// A name or value length in a FastCGI name-value pair.
///
/// Lengths below 128 are sent as a single byte. Larger lengths take four
/// bytes with the high bit of the first byte set, which caps them at 31 bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VarInt(u32);

impl VarInt {
    /// The bit marking the 4-byte encoding.
    const LONG_BIT: u8 = 1 << 7;
    /// The largest length a [`VarInt`] can carry.
    pub const MAX: Self = VarInt((1 << 31) - 1);

    /// Returns the number of bytes [`VarInt::encode`] will produce.
    #[inline]
    #[must_use]
    pub fn encoded_len(self) -> usize {
        if self.0 < u32::from(Self::LONG_BIT) { 1 } else { 4 }
    }

    /// Decodes a [`VarInt`] from the front of `src` and advances `src` past it.
    ///
    /// Returns [`None`] without touching `src` if it ends in the middle of
    /// the encoding.
    pub fn decode(src: &mut &[u8]) -> Option<Self> {
        let data = *src;
        match data {
            [b, rest @ ..] if b & Self::LONG_BIT == 0 => {
                *src = rest;
                Some(Self((*b).into()))
            },
            [b0, b1, b2, b3, rest @ ..] => {
                *src = rest;
                Some(Self(u32::from_be_bytes([b0 & !Self::LONG_BIT, *b1, *b2, *b3])))
            },
            _ => None,
        }
    }

    /// Appends the wire encoding of the [`VarInt`] to `dst`.
    ///
    /// Returns the number of bytes written.
    pub fn encode(self, dst: &mut impl BufMut) -> usize {
        if self.encoded_len() == 1 {
            #[allow(clippy::cast_possible_truncation)]
            dst.put_u8(self.0 as u8);
            1
        } else {
            let mut e = self.0.to_be_bytes();
            e[0] |= Self::LONG_BIT;
            dst.put_slice(&e);
            e.len()
        }
    }

    /// Converts the [`VarInt`] into a [`usize`], saturating at [`usize::MAX`].
    #[inline]
    #[must_use]
    pub fn to_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl From<VarInt> for u32 {
    #[inline]
    fn from(v: VarInt) -> Self {
        v.0
    }
}

impl From<u8> for VarInt {
    #[inline]
    fn from(v: u8) -> Self {
        Self(v.into())
    }
}

impl TryFrom<usize> for VarInt {
    type Error = ProtocolError;

    /// Converts a length into a [`VarInt`].
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidVarInt`] if the length needs more
    /// than 31 bits.
    #[inline]
    fn try_from(v: usize) -> Result<Self, Self::Error> {
        match u32::try_from(v) {
            Ok(v) if v <= Self::MAX.0 => Ok(Self(v)),
            _ => Err(ProtocolError::InvalidVarInt),
        }
    }
}

impl fmt::Display for VarInt {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
