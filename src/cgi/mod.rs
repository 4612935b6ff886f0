use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};

use compact_str::CompactString;

mod intern;
mod params;
/// Parsing of the CGI/1.1 response head a FastCGI application writes to `Stdout`.
pub mod response;

pub use intern::StaticVarName;
pub use intern::StaticVarName::*;
pub use params::{Params, SmallBytes};


/// A string wrapper for CGI/1.1 variable names.
///
/// CGI/1.1 variable names are case-insensitive (RFC 3875, Section 4.1), so
/// equality, ordering, and hashing ignore ASCII case. The string itself is
/// not modified.
///
/// [`Params`] is keyed by names, so a variable set by the request mapper
/// replaces a default with any spelling.
#[derive(Debug, ref_cast::RefCastCustom)]
#[repr(transparent)]
pub struct VarName(str);

impl VarName {
    /// Wraps a string reference in a [`VarName`].
    #[ref_cast::ref_cast_custom]
    // Unsafe code is generated and checked by ref-cast
    #[allow(unsafe_code, clippy::let_underscore_untyped)]
    #[must_use]
    pub const fn new(s: &str) -> &Self;

    /// Returns the wrapped string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    fn norm_iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.as_bytes().iter().map(u8::to_ascii_uppercase)
    }
}

impl<'a, T: AsRef<str> + ?Sized> From<&'a T> for &'a VarName {
    #[inline]
    fn from(v: &'a T) -> Self {
        VarName::new(v.as_ref())
    }
}

impl From<StaticVarName> for &VarName {
    #[inline]
    fn from(v: StaticVarName) -> Self {
        VarName::new(v.into())
    }
}

impl fmt::Display for VarName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl PartialEq for VarName {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}
impl Eq for VarName {}

impl Hash for VarName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.norm_iter() {
            state.write_u8(byte);
        }
        // Ensure prefix-freeness
        state.write_u8(0xff);
    }
}


#[derive(Clone)]
enum VarNameInner {
    Static(StaticVarName),
    Custom(CompactString),
}

/// An owned [`VarName`], used as the key of [`Params`].
///
/// Names the gateway emits on every request are interned as
/// [`StaticVarName`]s; anything else (mostly `HTTP_*` header variables) is
/// stored inline when short enough and on the heap otherwise.
#[derive(Clone)]
#[repr(transparent)]
pub struct OwnedVarName(VarNameInner);

impl OwnedVarName {
    /// Builds the `HTTP_*` variable name for a request header.
    ///
    /// The header name is upper-cased and `-` becomes `_`, as in RFC 3875,
    /// Section 4.1.18. Returns [`None`] for names that already contain `_`:
    /// after the conversion they would be indistinguishable from a header
    /// spelled with `-`, which lets a client shadow headers set by proxies.
    #[must_use]
    pub fn from_header(name: &http::HeaderName) -> Option<Self> {
        let name = name.as_str();
        if name.contains('_') {
            return None;
        }
        let mut var = String::with_capacity(5 + name.len());
        var.push_str("HTTP_");
        var.extend(name.chars().map(|c| match c {
            '-' => '_',
            c => c.to_ascii_uppercase(),
        }));
        Some(var.into())
    }

    // Internal alias because self.borrow() can't infer type
    #[inline]
    fn as_var(&self) -> &VarName {
        self.borrow()
    }
}

impl From<StaticVarName> for OwnedVarName {
    #[inline]
    fn from(v: StaticVarName) -> Self {
        Self(VarNameInner::Static(v))
    }
}

impl From<&str> for OwnedVarName {
    fn from(v: &str) -> Self {
        Self(match v.parse() {
            Ok(s) => VarNameInner::Static(s),
            Err(_) => VarNameInner::Custom(v.into()),
        })
    }
}

impl From<String> for OwnedVarName {
    /// Converts a [`String`] into an [`OwnedVarName`], upper-casing it so
    /// well-known names are interned regardless of their spelling.
    fn from(mut v: String) -> Self {
        v.make_ascii_uppercase();
        Self(match v.parse() {
            Ok(s) => VarNameInner::Static(s),
            Err(_) => VarNameInner::Custom(v.into()),
        })
    }
}

impl AsRef<str> for OwnedVarName {
    #[inline]
    fn as_ref(&self) -> &str {
        match &self.0 {
            VarNameInner::Static(s) => s.as_ref(),
            VarNameInner::Custom(s) => s.as_ref(),
        }
    }
}

impl Borrow<VarName> for OwnedVarName {
    #[inline]
    fn borrow(&self) -> &VarName {
        self.as_ref().into()
    }
}

impl fmt::Debug for OwnedVarName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OwnedVarName({:?})", self.as_ref())
    }
}

impl fmt::Display for OwnedVarName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self.as_ref(), f)
    }
}

impl PartialEq for OwnedVarName {
    fn eq(&self, other: &Self) -> bool {
        use VarNameInner::*;
        if let (&Static(s1), &Static(s2)) = (&self.0, &other.0) {
            return s1 == s2;
        }
        self.as_var() == other.as_var()
    }
}
impl Eq for OwnedVarName {}

impl Hash for OwnedVarName {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_var().hash(state);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_check() {
        use std::mem::size_of;
        assert_eq!(size_of::<OwnedVarName>(), size_of::<CompactString>());
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(VarName::new("script_name"), VarName::new("SCRIPT_NAME"));
        assert_eq!(OwnedVarName::from("Path_Info"), OwnedVarName::from(PATH_INFO));
        assert_eq!(OwnedVarName::from("x-custom".to_owned()).as_ref(), "X-CUSTOM");
        assert_ne!(VarName::new("PATH_INFO"), VarName::new("PATH_INF"));
    }

    #[test]
    fn header_names() {
        let host = OwnedVarName::from_header(&http::header::HOST);
        assert_eq!(host, Some(OwnedVarName::from(HTTP_HOST)));

        let custom = http::HeaderName::from_static("x-request-id");
        assert_eq!(OwnedVarName::from_header(&custom).as_ref().map(AsRef::as_ref), Some("HTTP_X_REQUEST_ID"));

        let spoof = http::HeaderName::from_static("x_forwarded_for");
        assert_eq!(OwnedVarName::from_header(&spoof), None);
    }
}
