//! Generic resource attributes and their SMB attribute bits.

use bitflags::bitflags;

bitflags! {
    /// SMB file attribute bits as reported by the server.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NativeAttributes: u32 {
        const READONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        const NORMAL = 0x80;
    }
}

/// A generic resource attribute.
///
/// The named constants form the closed set understood by every provider. Other
/// values are passed to the protocol as their own bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceAttribute(pub u16);

impl ResourceAttribute {
    pub const HIDDEN: Self = Self(1);
    pub const SYSTEM: Self = Self(2);
    pub const ARCHIVE: Self = Self(4);
    pub const READONLY: Self = Self(8);

    /// The SMB bits this attribute controls.
    pub fn to_native(self) -> NativeAttributes {
        match self {
            Self::HIDDEN => NativeAttributes::HIDDEN,
            Self::SYSTEM => NativeAttributes::SYSTEM,
            Self::ARCHIVE => NativeAttributes::ARCHIVE,
            Self::READONLY => NativeAttributes::READONLY,
            Self(other) => NativeAttributes::from_bits_retain(u32::from(other)),
        }
    }
}

/// Set or clear `attribute` in `bits`, leaving every other bit untouched.
pub fn apply(bits: u32, attribute: ResourceAttribute, value: bool) -> u32 {
    let mut native = NativeAttributes::from_bits_retain(bits);
    native.set(attribute.to_native(), value);
    native.bits()
}

/// Whether any of the bits of `attribute` are set in `bits`.
pub fn is_set(bits: u32, attribute: ResourceAttribute) -> bool {
    NativeAttributes::from_bits_retain(bits).intersects(attribute.to_native())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        assert_eq!(ResourceAttribute::HIDDEN.to_native(), NativeAttributes::HIDDEN);
        assert_eq!(ResourceAttribute::SYSTEM.to_native(), NativeAttributes::SYSTEM);
        assert_eq!(ResourceAttribute::ARCHIVE.to_native(), NativeAttributes::ARCHIVE);
        assert_eq!(ResourceAttribute::READONLY.to_native(), NativeAttributes::READONLY);
    }

    #[test]
    fn test_unknown_passes_through() {
        assert_eq!(ResourceAttribute(0x100).to_native().bits(), 0x100);
        assert_eq!(ResourceAttribute(0x10).to_native(), NativeAttributes::DIRECTORY);
    }

    #[test]
    fn test_apply_keeps_other_bits() {
        let bits = (NativeAttributes::DIRECTORY | NativeAttributes::SYSTEM).bits();
        let hidden = apply(bits, ResourceAttribute::HIDDEN, true);
        assert_eq!(hidden, 0x10 | 0x04 | 0x02);
        let cleared = apply(hidden, ResourceAttribute::SYSTEM, false);
        assert_eq!(cleared, 0x10 | 0x02);
    }
}
