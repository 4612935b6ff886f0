use std::collections::HashMap;

use bytes::BufMut;
use smallvec::SmallVec;

use super::{OwnedVarName, VarName};
use crate::protocol::nv;
use crate::protocol::Error as ProtocolError;


const SMALLVEC_BASE_SIZE: usize = std::mem::size_of::<SmallVec<[u8; 0]>>();
// Maximum number of inline bytes before SmallVec exceeds SMALLVEC_BASE_SIZE.
// This derives from SmallVec's layout, which uses 1 usize as discriminant.
const INLINE_BYTES: usize = SMALLVEC_BASE_SIZE - std::mem::size_of::<usize>();

/// A byte buffer storing short values inline.
pub type SmallBytes = SmallVec<[u8; INLINE_BYTES]>;


/// The CGI/1.1 meta-variables sent to the application in `Params` records.
///
/// Names are compared case-insensitively. Inserting a name that is already
/// present replaces its value, so later layers (such as the path mapping)
/// override the defaults derived from the HTTP request.
#[derive(Debug, Clone, Default)]
pub struct Params {
    vars: HashMap<OwnedVarName, SmallBytes>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            // Room for the default variables plus a dozen headers without
            // rehashing
            vars: HashMap::with_capacity(40),
        }
    }

    /// Sets `name` to `value`, returning the previous value if there was one.
    ///
    /// The spelling of `name` replaces the previous spelling as well.
    pub fn insert(&mut self, name: impl Into<OwnedVarName>, value: impl AsRef<[u8]>) -> Option<SmallBytes> {
        let name = name.into();
        let old = self.vars.remove(VarName::new(name.as_ref()));
        self.vars.insert(name, SmallBytes::from_slice(value.as_ref()));
        old
    }

    /// Appends `value` to the existing value of `name`, separated by `sep`.
    ///
    /// Behaves like [`Params::insert`] if `name` is not present yet.
    pub fn append(&mut self, name: impl Into<OwnedVarName>, value: impl AsRef<[u8]>, sep: &[u8]) {
        let value = value.as_ref();
        self.vars.entry(name.into())
            .and_modify(|cur| {
                cur.extend_from_slice(sep);
                cur.extend_from_slice(value);
            })
            .or_insert_with(|| SmallBytes::from_slice(value));
    }

    /// Returns the value of `name`.
    #[must_use]
    #[allow(single_use_lifetimes)]
    pub fn get<'n>(&self, name: impl Into<&'n VarName>) -> Option<&[u8]> {
        self.vars.get(name.into()).map(SmallVec::as_slice)
    }

    /// Returns the value of `name` if it is valid UTF-8.
    #[must_use]
    #[allow(single_use_lifetimes)]
    pub fn get_str<'n>(&self, name: impl Into<&'n VarName>) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Tests whether `name` is set.
    #[must_use]
    #[allow(single_use_lifetimes)]
    pub fn contains<'n>(&self, name: impl Into<&'n VarName>) -> bool {
        self.vars.contains_key(name.into())
    }

    /// Unsets `name`, returning its value.
    #[allow(single_use_lifetimes)]
    pub fn remove<'n>(&mut self, name: impl Into<&'n VarName>) -> Option<SmallBytes> {
        self.vars.remove(name.into())
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Tests whether no variable is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterates over all variables in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&VarName, &[u8])> + '_ {
        self.vars.iter().map(|(n, v)| (VarName::new(n.as_ref()), v.as_slice()))
    }

    /// Appends all variables to `dst` as FastCGI name-value pairs.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidVarInt`] if a name or value is too
    /// long to be encoded. Pairs preceding the offending one have already
    /// been written.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, ProtocolError> {
        let mut written = 0;
        for (name, value) in &self.vars {
            written += nv::encode((name.as_ref().as_bytes(), value.as_slice()), dst)?;
        }
        Ok(written)
    }
}

impl<N: Into<OwnedVarName>, V: AsRef<[u8]>> Extend<(N, V)> for Params {
    fn extend<I: IntoIterator<Item = (N, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

impl<N: Into<OwnedVarName>, V: AsRef<[u8]>> FromIterator<(N, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        params.extend(iter);
        params
    }
}
