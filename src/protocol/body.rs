use super::Error as ProtocolError;
use super::{ProtocolStatus, RecordHeader, RecordType, RequestFlags, Role};


/// The body of a [`RecordType::BeginRequest`] FastCGI record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginRequest {
    /// The role of the FastCGI application in this request.
    pub role: Role,
    /// The control flags for this request.
    pub flags: RequestFlags,
}

impl BeginRequest {
    /// The length of the record body.
    pub const LEN: u16 = 8;

    /// Parses the input bytes into a [`BeginRequest`] record body.
    ///
    /// Unknown flag bits are ignored.
    ///
    /// # Errors
    /// Returns an error if the role is unknown.
    pub fn from_bytes(data: [u8; 8]) -> Result<Self, ProtocolError> {
        let role = u16::from_be_bytes([data[0], data[1]]);
        Ok(Self {
            role: Role::try_from(role)?,
            flags: RequestFlags::from_bits_truncate(data[2]),
        })
    }

    /// Encodes the [`BeginRequest`] record body into its binary wire format.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0; 8];
        buf[..2].copy_from_slice(&u16::to_be_bytes(self.role.into()));
        buf[2] = self.flags.bits();
        buf
    }

    /// Encodes a complete `BeginRequest` record, header included.
    #[must_use]
    pub fn to_record(self, request_id: u16) -> [u8; 16] {
        let mut head = RecordHeader::new(RecordType::BeginRequest, request_id);
        head.set_lengths(Self::LEN);
        let mut buf = [0; 16];
        buf[..RecordHeader::LEN].copy_from_slice(&head.to_bytes());
        buf[RecordHeader::LEN..].copy_from_slice(&self.to_bytes());
        buf
    }
}


/// The body of a [`RecordType::EndRequest`] FastCGI record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRequest {
    /// The application's exit status, as exit(3) would report it in plain CGI.
    pub app_status: u32,
    /// The protocol status code for this response.
    pub protocol_status: ProtocolStatus,
}

impl EndRequest {
    /// The length of the record body.
    pub const LEN: u16 = 8;

    /// Parses a record payload into an [`EndRequest`] body.
    ///
    /// # Errors
    /// Returns an error if the payload is not exactly [`EndRequest::LEN`]
    /// bytes long or carries an unknown protocol status.
    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        let data: [u8; 8] = data.try_into()
            .map_err(|_| ProtocolError::InvalidBodyLen(RecordType::EndRequest, data.len()))?;
        Self::from_bytes(data)
    }

    /// Parses the input bytes into an [`EndRequest`] record body.
    ///
    /// # Errors
    /// Returns an error if the protocol status is unknown.
    pub fn from_bytes(data: [u8; 8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            app_status: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            protocol_status: ProtocolStatus::try_from(data[4])?,
        })
    }

    /// Encodes the [`EndRequest`] record body into its binary wire format.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0; 8];
        buf[..4].copy_from_slice(&u32::to_be_bytes(self.app_status));
        buf[4] = self.protocol_status.into();
        buf
    }
}
