//! Ciphertext generation tags.
//!
//! Every ciphertext written by this crate starts with a short literal tag
//! naming the routine that can read it; untagged bytes predate tagging.

/// Wire format of a stored ciphertext, derived from its leading bytes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiphertextFormat {
    /// `KMSx`: KMS chunks, no encryption context.
    KmsContextless,
    /// `KMSc`: KMS chunks bound to an encryption context.
    Kms,
    /// `LOCc`: local AES chunks, JSON array body.
    Local,
    /// `LOCcv2`: local AES chunks, binary-packed body.
    LocalV2,
    /// No tag: legacy pepper-keyed local envelope.
    Legacy,
}

impl CiphertextFormat {
    /// Tagged formats, longest tag first so `LOCcv2` wins over `LOCc`.
    const TAGGED: [Self; 4] = [Self::LocalV2, Self::KmsContextless, Self::Kms, Self::Local];

    /// The literal tag bytes.
    #[must_use]
    pub const fn tag(self) -> &'static [u8] {
        match self {
            Self::KmsContextless => b"KMSx",
            Self::Kms => b"KMSc",
            Self::Local => b"LOCc",
            Self::LocalV2 => b"LOCcv2",
            Self::Legacy => b"",
        }
    }

    /// Classifies a ciphertext and returns it with the tag stripped.
    #[must_use]
    pub fn sniff(ciphertext: &[u8]) -> (Self, &[u8]) {
        Self::TAGGED
            .into_iter()
            .find_map(|format| {
                ciphertext
                    .strip_prefix(format.tag())
                    .map(|body| (format, body))
            })
            .unwrap_or((Self::Legacy, ciphertext))
    }

    /// Prepends this format's tag to `body`.
    #[must_use]
    pub fn wrap(self, body: &[u8]) -> Vec<u8> {
        let tag = self.tag();
        let mut out = Vec::with_capacity(tag.len() + body.len());
        out.extend_from_slice(tag);
        out.extend_from_slice(body);
        out
    }
}
