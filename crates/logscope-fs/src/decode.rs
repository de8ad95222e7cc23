//! Text decoding keyed by encoding label.

use std::collections::HashMap;

use encoding_rs::Encoding;
use parking_lot::RwLock;
use tracing::warn;

/// Shared cache of encoding lookups, keyed by WHATWG label.
///
/// Every logical read decodes its complete byte span in one call, so no
/// decoder state can leak between reads or between watches sharing an
/// encoding. Unknown labels fall back to lossy UTF-8 and are cached so
/// the warning fires once per label.
#[derive(Default)]
pub struct DecoderPool {
    encodings: RwLock<HashMap<String, Option<&'static Encoding>>>,
}

impl DecoderPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` under the named encoding, or as UTF-8 when no label
    /// is given or the label is unknown.
    pub fn decode(&self, label: Option<&str>, bytes: &[u8]) -> String {
        let Some(label) = label else {
            return String::from_utf8_lossy(bytes).into_owned();
        };
        match self.lookup(label) {
            Some(encoding) => {
                let (text, _, _) = encoding.decode(bytes);
                text.into_owned()
            }
            None => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    fn lookup(&self, label: &str) -> Option<&'static Encoding> {
        if let Some(cached) = self.encodings.read().get(label) {
            return *cached;
        }
        let encoding = Encoding::for_label(label.as_bytes());
        if encoding.is_none() {
            warn!(label, "unknown text encoding, decoding as UTF-8");
        }
        self.encodings.write().insert(label.to_string(), encoding);
        encoding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_default() {
        let pool = DecoderPool::new();
        assert_eq!(pool.decode(None, "héllo".as_bytes()), "héllo");
    }

    #[test]
    fn test_windows_1252() {
        let pool = DecoderPool::new();
        // 0xE9 is é in windows-1252 but invalid UTF-8
        assert_eq!(pool.decode(Some("windows-1252"), &[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn test_unknown_label_falls_back_to_utf8() {
        let pool = DecoderPool::new();
        assert_eq!(pool.decode(Some("no-such-encoding"), b"plain"), "plain");
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let pool = DecoderPool::new();
        let decoded = pool.decode(None, &[0x61, 0xFF, 0x62]);
        assert!(decoded.starts_with('a') && decoded.ends_with('b'));
    }
}
