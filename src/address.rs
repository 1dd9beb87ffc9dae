//! Content addressing
//!
//! Stored files are named by the BLAKE3 digest of their bytes plus an
//! extension derived from the declared media type.

use std::fmt;

/// BLAKE3 digest of a payload (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentAddress([u8; 32]);

impl ContentAddress {
    /// Length of the hex rendering
    pub const HEX_LEN: usize = 64;

    /// Compute the address of `data`
    pub fn of(data: &[u8]) -> Self {
        ContentAddress(blake3::hash(data).into())
    }

    /// Lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(ContentAddress(arr))
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Media types with a dedicated extension
const EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", ".png"),
    ("image/jpeg", ".jpg"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/bmp", ".bmp"),
];

/// Extension for anything not listed above
const FALLBACK_EXTENSION: &str = ".bin";

/// File extension for a declared media type
pub fn extension_for(content_type: &str) -> &'static str {
    EXTENSIONS
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(content_type.trim()))
        .map(|(_, ext)| *ext)
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Name of a stored file: `<hex address><extension>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredName {
    address: ContentAddress,
    extension: &'static str,
}

impl StoredName {
    pub fn new(address: ContentAddress, content_type: &str) -> Self {
        Self {
            address,
            extension: extension_for(content_type),
        }
    }

    /// Parse a name previously produced by this type.
    ///
    /// Returns `None` for anything else, including ignore-list entries
    /// such as `index.html`.
    pub fn parse(name: &str) -> Option<Self> {
        if name.len() <= ContentAddress::HEX_LEN || !name.is_char_boundary(ContentAddress::HEX_LEN) {
            return None;
        }
        let (hex_part, ext) = name.split_at(ContentAddress::HEX_LEN);
        if hex_part.bytes().any(|b| b.is_ascii_uppercase()) {
            return None;
        }
        let address = ContentAddress::from_hex(hex_part).ok()?;
        let extension = EXTENSIONS
            .iter()
            .map(|(_, e)| *e)
            .chain(std::iter::once(FALLBACK_EXTENSION))
            .find(|e| *e == ext)?;
        Some(Self { address, extension })
    }

    pub fn address(&self) -> &ContentAddress {
        &self.address
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.address, self.extension)
    }
}
