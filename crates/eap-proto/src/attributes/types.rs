/// Attributes an EAP conversation reads or writes.
///
/// RFC 2865 defines everything below 79; EAP-Message and
/// Message-Authenticator come from RFC 3579. Attributes outside this set are
/// still carried, just by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeType {
    UserName = 1,
    FramedMtu = 12,
    ReplyMessage = 18,
    /// Carries the conversation token
    State = 24,
    Class = 25,
    VendorSpecific = 26,
    SessionTimeout = 27,
    CalledStationId = 30,
    CallingStationId = 31,
    NasIdentifier = 32,
    /// Copied verbatim into every reply
    ProxyState = 33,
    EapMessage = 79,
    MessageAuthenticator = 80,
}

impl AttributeType {
    const KNOWN: [AttributeType; 13] = [
        AttributeType::UserName,
        AttributeType::FramedMtu,
        AttributeType::ReplyMessage,
        AttributeType::State,
        AttributeType::Class,
        AttributeType::VendorSpecific,
        AttributeType::SessionTimeout,
        AttributeType::CalledStationId,
        AttributeType::CallingStationId,
        AttributeType::NasIdentifier,
        AttributeType::ProxyState,
        AttributeType::EapMessage,
        AttributeType::MessageAuthenticator,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::KNOWN.into_iter().find(|known| *known as u8 == value)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
