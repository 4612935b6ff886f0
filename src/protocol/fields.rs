use std::fmt;

use super::Error as ProtocolError;


/// Converts between a field enum and the integer it is sent as. Unknown
/// values map to the given [`ProtocolError`] variant.
macro_rules! wire_field {
    ($ty:ident as $int:ty, $err:ident) => {
        impl TryFrom<$int> for $ty {
            type Error = ProtocolError;

            #[inline]
            fn try_from(v: $int) -> Result<Self, Self::Error> {
                Self::from_repr(v).ok_or(ProtocolError::$err(v))
            }
        }

        impl From<$ty> for $int {
            #[inline]
            fn from(v: $ty) -> Self {
                v as Self
            }
        }
    };
}


/// A validated FastCGI version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::FromRepr)]
#[repr(u8)]
pub enum Version {
    /// FastCGI Version 1
    V1 = 1,
}

wire_field!(Version as u8, UnknownVersion);


/// The role a gateway asks the FastCGI application to play.
///
/// The gateway only sends [`Role::Responder`] requests.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::FromRepr)]
#[repr(u16)]
pub enum Role {
    Responder = 1,
    Authorizer = 2,
    Filter = 3,
}

wire_field!(Role as u16, UnknownRole);


bitflags::bitflags! {
    /// Control flags sent along with a `BeginRequest` record.
    #[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestFlags: u8 {
        /// Ask the application to keep the connection open after the request.
        const KeepConn = 1;
    }
}

impl fmt::Debug for RequestFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RequestFlags({:#04b})", self.bits())
    }
}


/// The protocol-level outcome reported in an `EndRequest` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::FromRepr)]
#[cfg_attr(test, derive(strum::EnumIter))]
#[repr(u8)]
pub enum ProtocolStatus {
    /// The request completed normally.
    RequestComplete = 0,
    /// The application refused a second request on a multiplexed connection.
    CantMpxConn = 1,
    /// The application ran out of some resource, such as worker processes.
    Overloaded = 2,
    /// The application does not implement the requested role.
    UnknownRole = 3,
}

wire_field!(ProtocolStatus as u8, UnknownStatus);


/// A validated FastCGI record type.
///
/// Only the request and response streams matter to a gateway. Management
/// records and `Data` are still decoded so they can be skipped.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::FromRepr)]
#[cfg_attr(test, derive(strum::EnumIter))]
#[repr(u8)]
pub enum RecordType {
    BeginRequest = 1,
    AbortRequest = 2,
    EndRequest = 3,
    Params = 4,
    Stdin = 5,
    Stdout = 6,
    Stderr = 7,
    Data = 8,
    GetValues = 9,
    GetValuesResult = 10,
    Unknown = 11,
}

wire_field!(RecordType as u8, UnknownRecordType);


#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;
    use super::*;

    #[test]
    fn record_type_codes() -> Result<(), ProtocolError> {
        for (code, rtype) in (1u8..).zip(RecordType::iter()) {
            assert_eq!(RecordType::try_from(code)?, rtype);
            assert_eq!(u8::from(rtype), code);
        }
        assert!(matches!(RecordType::try_from(0), Err(ProtocolError::UnknownRecordType(0))));
        assert!(matches!(RecordType::try_from(12), Err(ProtocolError::UnknownRecordType(12))));
        Ok(())
    }

    #[test]
    fn status_codes() {
        for status in ProtocolStatus::iter() {
            assert!(matches!(ProtocolStatus::try_from(u8::from(status)), Ok(s) if s == status));
        }
        assert!(matches!(ProtocolStatus::try_from(4), Err(ProtocolError::UnknownStatus(4))));
    }

    #[test]
    fn roles_and_versions() {
        assert!(matches!(Role::try_from(1), Ok(Role::Responder)));
        assert!(matches!(Role::try_from(0x0100), Err(ProtocolError::UnknownRole(0x0100))));
        assert_eq!(u16::from(Role::Filter), 3);
        assert!(matches!(Version::try_from(2), Err(ProtocolError::UnknownVersion(2))));
    }

    #[test]
    fn flags_debug() {
        assert_eq!(format!("{:?}", RequestFlags::KeepConn), "RequestFlags(0b01)");
        assert_eq!(format!("{:?}", RequestFlags::empty()), "RequestFlags(0b00)");
    }
}
