use sha1::{Digest, Sha1};

/// A 20-byte content hash, used throughout the schema as a stable,
/// deterministic series/source/mapping identifier.
pub type Id = [u8; 20];

/// Hash `bytes` with SHA-1, producing the identifier used to key interned
/// strings and series records.
pub fn hash(bytes: &[u8]) -> Id {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Render an [`Id`] as lower-case hex, the form used in key names.
pub fn hex(id: &Id) -> String {
    hex::encode(id)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_input_same_hash() {
        assert_eq!(hash(b"kernel.all.load"), hash(b"kernel.all.load"));
    }

    #[test]
    fn different_input_different_hash() {
        assert_ne!(hash(b"kernel.all.load"), hash(b"kernel.all.load1"));
    }

    #[test]
    fn hex_is_forty_chars_lowercase() {
        let rendered = hex(&hash(b"some-source"));
        assert_eq!(rendered.len(), 40);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
