use std::fmt;

/// Application function number: the byte after the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Afn(pub u8);

impl Afn {
    /// Real-time data upload.
    pub const UPLOAD: Afn = Afn(0xC0);
    pub const ALARM: Afn = Afn(0x81);
    pub const MANUAL_SET: Afn = Afn(0x82);
    pub const IMAGE: Afn = Afn(0x83);
    pub const VOLTAGE: Afn = Afn(0x84);
    /// User-defined; a user AFN byte follows.
    pub const USER_DEFINED: Afn = Afn(0xFF);

    pub fn is_known(self) -> bool {
        matches!(
            self,
            Afn::UPLOAD | Afn::ALARM | Afn::MANUAL_SET | Afn::IMAGE | Afn::VOLTAGE
        )
    }

    pub fn is_user_defined(self) -> bool {
        self == Afn::USER_DEFINED
    }

    pub fn name(self) -> &'static str {
        match self {
            Afn::UPLOAD => "upload",
            Afn::ALARM => "alarm",
            Afn::MANUAL_SET => "manual-set",
            Afn::IMAGE => "image",
            Afn::VOLTAGE => "voltage",
            Afn::USER_DEFINED => "user-defined",
            _ => "unknown",
        }
    }

    /// Look up by name as printed by [`Afn::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Afn::UPLOAD,
            Afn::ALARM,
            Afn::MANUAL_SET,
            Afn::IMAGE,
            Afn::VOLTAGE,
            Afn::USER_DEFINED,
        ]
        .into_iter()
        .find(|afn| afn.name() == name)
    }
}

impl From<u8> for Afn {
    fn from(value: u8) -> Self {
        Afn(value)
    }
}

impl fmt::Display for Afn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_set() {
        for afn in [0xC0, 0x81, 0x82, 0x83, 0x84] {
            assert!(Afn(afn).is_known());
        }
        assert!(!Afn(0xFF).is_known());
        assert!(Afn(0xFF).is_user_defined());
        assert!(!Afn(0x85).is_known());
    }

    #[test]
    fn names() {
        assert_eq!(Afn::UPLOAD.to_string(), "upload(0xC0)");
        assert_eq!(Afn(0x01).to_string(), "unknown(0x01)");
        assert_eq!(Afn::from_name("voltage"), Some(Afn::VOLTAGE));
        assert_eq!(Afn::from_name("nope"), None);
    }
}
