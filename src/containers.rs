use memmap2::Mmap;
use std::sync::Arc;

enum Inner<'bytes> {
    Owned(Box<[u8]>),
    Borrowed(&'bytes [u8]),
    Mapped {
        pos: usize,
        len: usize,
        source: Arc<Mmap>,
    },
}

impl<'bytes> Inner<'bytes> {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Inner::Owned(x) => x,
            Inner::Borrowed(x) => x,
            Inner::Mapped { pos, len, source } => &source[*pos..*pos + *len],
        }
    }
}

/// A byte buffer that may own its data, borrow it from a caller, or alias a
/// shared memory mapping of the archive it was read from.
pub(crate) struct Bytes<'bytes> {
    inner: Inner<'bytes>,
}

impl<'bytes> Bytes<'bytes> {
    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    pub(crate) fn from_borrowed(bytes: &'bytes [u8]) -> Self {
        Self {
            inner: Inner::Borrowed(bytes),
        }
    }

    #[must_use]
    pub(crate) fn from_owned(bytes: Vec<u8>) -> Bytes<'static> {
        Bytes {
            inner: Inner::Owned(bytes.into_boxed_slice()),
        }
    }

    #[must_use]
    pub(crate) fn from_mapped(pos: usize, len: usize, source: Arc<Mmap>) -> Bytes<'static> {
        Bytes {
            inner: Inner::Mapped { pos, len, source },
        }
    }

    #[must_use]
    pub(crate) fn into_owned(self) -> Bytes<'static> {
        match self.inner {
            Inner::Owned(x) => Bytes {
                inner: Inner::Owned(x),
            },
            Inner::Borrowed(x) => Bytes::from_owned(x.to_vec()),
            Inner::Mapped { pos, len, source } => Bytes {
                inner: Inner::Mapped { pos, len, source },
            },
        }
    }

    #[must_use]
    pub(crate) fn into_compressable(
        self,
        decompressed_len: Option<usize>,
    ) -> CompressableBytes<'bytes> {
        CompressableBytes {
            bytes: self,
            decompressed_len,
        }
    }
}

impl<'bytes> Default for Bytes<'bytes> {
    fn default() -> Self {
        Self {
            inner: Inner::Owned(Box::default()),
        }
    }
}

/// [`Bytes`] plus the bookkeeping needed to remember whether the payload is
/// compressed, and how large it decompresses to.
#[derive(Default)]
pub(crate) struct CompressableBytes<'bytes> {
    bytes: Bytes<'bytes>,
    decompressed_len: Option<usize>,
}

impl<'bytes> CompressableBytes<'bytes> {
    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub(crate) fn is_compressed(&self) -> bool {
        self.decompressed_len.is_some()
    }

    #[must_use]
    pub(crate) fn decompressed_len(&self) -> Option<usize> {
        self.decompressed_len
    }

    #[must_use]
    pub(crate) fn from_owned(bytes: Vec<u8>, decompressed_len: Option<usize>) -> Self {
        Self {
            bytes: Bytes::from_owned(bytes),
            decompressed_len,
        }
    }

    #[must_use]
    pub(crate) fn from_borrowed(bytes: &'bytes [u8], decompressed_len: Option<usize>) -> Self {
        Self {
            bytes: Bytes::from_borrowed(bytes),
            decompressed_len,
        }
    }

    #[must_use]
    pub(crate) fn into_owned(self) -> CompressableBytes<'static> {
        CompressableBytes {
            bytes: self.bytes.into_owned(),
            decompressed_len: self.decompressed_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Bytes, CompressableBytes};

    #[test]
    fn default_state() {
        let b = Bytes::default();
        assert!(b.is_empty());
        assert_eq!(b.len(), 0);

        let c = CompressableBytes::default();
        assert!(c.is_empty());
        assert!(!c.is_compressed());
        assert_eq!(c.decompressed_len(), None);
    }

    #[test]
    fn owned_and_borrowed() {
        let payload = [1u8, 2, 3, 4];
        let borrowed = Bytes::from_borrowed(&payload[..]);
        assert_eq!(borrowed.as_bytes(), &payload[..]);

        let owned = borrowed.into_owned();
        assert_eq!(owned.as_bytes(), &payload[..]);

        let compressable = owned.into_compressable(Some(16));
        assert!(compressable.is_compressed());
        assert_eq!(compressable.decompressed_len(), Some(16));
    }
}
