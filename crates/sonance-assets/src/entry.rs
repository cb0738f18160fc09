use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Encoded audio container/codec of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Mp3,
    Ogg,
    Wav,
    Flac,
    Aac,
    Webm,
}

impl Codec {
    /// Infer the codec from the file extension of a URL or path.
    /// Query strings and fragments are ignored.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Codec::Mp3),
            "ogg" | "oga" | "opus" => Some(Codec::Ogg),
            "wav" | "wave" => Some(Codec::Wav),
            "flac" => Some(Codec::Flac),
            "m4a" | "aac" | "mp4" => Some(Codec::Aac),
            "webm" => Some(Codec::Webm),
            _ => None,
        }
    }

    /// Infer the codec from a MIME type such as `audio/mpeg; codecs=...`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        match essence.to_ascii_lowercase().as_str() {
            "audio/mpeg" | "audio/mp3" => Some(Codec::Mp3),
            "audio/ogg" | "application/ogg" => Some(Codec::Ogg),
            "audio/wav" | "audio/wave" | "audio/x-wav" => Some(Codec::Wav),
            "audio/flac" | "audio/x-flac" => Some(Codec::Flac),
            "audio/aac" | "audio/mp4" | "audio/x-m4a" => Some(Codec::Aac),
            "audio/webm" => Some(Codec::Webm),
            _ => None,
        }
    }

    /// Sniff the codec from the leading bytes of the data.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'I', b'D', b'3', ..] => Some(Codec::Mp3),
            [0xFF, second, ..] if second & 0xE0 == 0xE0 && second & 0x06 != 0 => Some(Codec::Mp3),
            [0xFF, second, ..] if second & 0xF6 == 0xF0 => Some(Codec::Aac),
            [b'O', b'g', b'g', b'S', ..] => Some(Codec::Ogg),
            [b'f', b'L', b'a', b'C', ..] => Some(Codec::Flac),
            [0x1A, 0x45, 0xDF, 0xA3, ..] => Some(Codec::Webm),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(Codec::Wav),
            [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some(Codec::Aac),
            _ => None,
        }
    }

    /// Extension first, then the declared content type, then sniffing.
    pub fn infer(url: &str, mime: Option<&str>, bytes: &[u8]) -> Option<Self> {
        Self::from_url(url)
            .or_else(|| mime.and_then(Self::from_mime))
            .or_else(|| Self::from_magic(bytes))
    }

    /// Canonical MIME type for this codec.
    pub fn mime(&self) -> &'static str {
        match self {
            Codec::Mp3 => "audio/mpeg",
            Codec::Ogg => "audio/ogg",
            Codec::Wav => "audio/wav",
            Codec::Flac => "audio/flac",
            Codec::Aac => "audio/mp4",
            Codec::Webm => "audio/webm",
        }
    }
}

/// Raw encoded audio bytes fetched from a URL, shared by every voice that
/// plays it.
#[derive(Debug)]
pub struct AssetEntry {
    url: String,
    codec: Codec,
    bytes: Arc<[u8]>,
}

impl AssetEntry {
    pub fn new(url: impl Into<String>, codec: Codec, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            url: url.into(),
            codec,
            bytes: bytes.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn mime(&self) -> &'static str {
        self.codec.mime()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A shared handle to the byte buffer (no copy).
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_from_extension() {
        assert_eq!(Codec::from_url("/audio/theme.mp3"), Some(Codec::Mp3));
        assert_eq!(Codec::from_url("https://cdn.example.com/a/b.OGG?v=3"), Some(Codec::Ogg));
        assert_eq!(Codec::from_url("click.m4a#t=1"), Some(Codec::Aac));
        assert_eq!(Codec::from_url("/audio/readme"), None);
        assert_eq!(Codec::from_url("/audio.v2/readme"), None);
    }

    #[test]
    fn codec_from_mime() {
        assert_eq!(Codec::from_mime("audio/mpeg"), Some(Codec::Mp3));
        assert_eq!(Codec::from_mime("audio/webm; codecs=opus"), Some(Codec::Webm));
        assert_eq!(Codec::from_mime("text/html"), None);
    }

    #[test]
    fn codec_from_magic_bytes() {
        assert_eq!(Codec::from_magic(b"ID3\x04\x00"), Some(Codec::Mp3));
        assert_eq!(Codec::from_magic(b"OggS\x00\x02"), Some(Codec::Ogg));
        assert_eq!(Codec::from_magic(b"RIFF\x24\x00\x00\x00WAVEfmt "), Some(Codec::Wav));
        assert_eq!(Codec::from_magic(b"fLaC\x00"), Some(Codec::Flac));
        assert_eq!(Codec::from_magic(b"<html>"), None);
    }

    #[test]
    fn infer_prefers_extension() {
        assert_eq!(Codec::infer("blob", None, b"OggS...."), Some(Codec::Ogg));
        assert_eq!(Codec::infer("x.wav", Some("audio/mpeg"), b"OggS...."), Some(Codec::Wav));
        assert_eq!(Codec::infer("blob", Some("audio/mpeg"), b"OggS...."), Some(Codec::Mp3));
        assert_eq!(Codec::infer("blob", Some("text/html"), b"OggS...."), Some(Codec::Ogg));
    }

    #[test]
    fn entry_shares_bytes() {
        let entry = AssetEntry::new("a.wav", Codec::Wav, vec![1u8, 2, 3]);
        let shared = entry.shared_bytes();
        assert_eq!(&*shared, entry.bytes());
        assert_eq!(entry.len(), 3);
        assert_eq!(entry.mime(), "audio/wav");
    }
}
