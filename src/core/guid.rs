//! 128-bit interface identifiers
//!
//! Layout matches the native `GUID` structure so values can be passed by
//! pointer across the ABI without conversion.

use std::fmt;
use std::str::FromStr;

/// Globally unique interface / class identifier
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const ZERO: Guid = Guid::from_u128(0);

    /// Build from the big-endian integer form (`0x00000000_0000_0000_c000_000000000046`)
    #[inline]
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    #[inline]
    pub const fn to_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    /// Build from 16 bytes in network order
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self::from_u128(u128::from_be_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        self.to_u128().to_be_bytes()
    }

    /// Parse registry form, with or without surrounding braces
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(text);

        let groups: Vec<&str> = text.split('-').collect();
        let expected = [8, 4, 4, 4, 12];
        if groups.len() != expected.len()
            || groups.iter().zip(expected).any(|(g, len)| g.len() != len)
        {
            return None;
        }

        let hex: String = groups.concat();
        u128::from_str_radix(&hex, 16).ok().map(Self::from_u128)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self)
    }
}

impl FromStr for Guid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid GUID: {}", s))
    }
}

/// Well-known interface and class identifiers
pub mod iids {
    use super::Guid;

    pub const IID_IUNKNOWN: Guid = Guid::from_u128(0x00000000_0000_0000_c000_000000000046);
    pub const IID_IINSPECTABLE: Guid = Guid::from_u128(0xaf86e2e0_b12d_4c6a_9c5a_d7aa65101e90);
    pub const IID_IAGILE_OBJECT: Guid = Guid::from_u128(0x94ea2b94_e9cc_49e0_c0ff_ee64ca8f5b90);
    pub const IID_IMARSHAL: Guid = Guid::from_u128(0x00000003_0000_0000_c000_000000000046);
    pub const IID_IWEAK_REFERENCE_SOURCE: Guid =
        Guid::from_u128(0x00000038_0000_0000_c000_000000000046);
    pub const IID_IWEAK_REFERENCE: Guid = Guid::from_u128(0x00000037_0000_0000_c000_000000000046);
    pub const IID_ISTRINGABLE: Guid = Guid::from_u128(0x96369f54_8eb6_48f0_abce_c1b211e627c3);
    pub const IID_ICUSTOM_PROPERTY_PROVIDER: Guid =
        Guid::from_u128(0x7c925755_3e48_42b4_8677_76372267033f);
    pub const IID_IPROPERTY_VALUE: Guid = Guid::from_u128(0x4bd682dd_7554_40e9_9a9b_82654ede7e62);

    pub const CLSID_INPROC_FREE_THREADED_MARSHALER: Guid =
        Guid::from_u128(0x0000033a_0000_0000_c000_000000000046);

    /// Generic definitions used when deriving parameterized identifiers
    pub const PINTERFACE_IREFERENCE: Guid = Guid::from_u128(0x61c17706_2d65_11e0_9ae8_d48564015472);
    pub const PINTERFACE_IREFERENCE_ARRAY: Guid =
        Guid::from_u128(0x61c17707_2d65_11e0_9ae8_d48564015472);
    pub const PINTERFACE_IKEY_VALUE_PAIR: Guid =
        Guid::from_u128(0x02b51929_c1c4_4a7e_8940_0312b5c18500);

    /// Namespace mixed into every parameterized identifier
    pub const PARAMETERIZED_NAMESPACE: Guid =
        Guid::from_u128(0x11f47ad5_7b73_42c0_abae_878b1e16adee);
}

/// Derives identifiers for parameterized interfaces from their signatures
///
/// Identifiers are name-based (version 5 layout) and stable across processes,
/// so native consumers holding an instantiation can query for it.
pub struct GuidGenerator;

impl GuidGenerator {
    /// Identifier for `definition` instantiated with the given argument signatures
    pub fn parameterized(definition: &Guid, argument_signatures: &[String]) -> Guid {
        let mut signature = format!("pinterface({{{}}}", definition);
        for arg in argument_signatures {
            signature.push(';');
            signature.push_str(arg);
        }
        signature.push(')');
        Self::from_signature(&signature)
    }

    /// Identifier for an arbitrary type signature
    pub fn from_signature(signature: &str) -> Guid {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&iids::PARAMETERIZED_NAMESPACE.to_bytes());
        hasher.update(signature.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        bytes[6] = (bytes[6] & 0x0f) | 0x50;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Guid::from_bytes(bytes)
    }
}
