use crate::{
    containers::Bytes,
    tes3::Result,
};
use std::io::Write;

/// One member of a Morrowind archive: a plain run of bytes.
#[derive(Default)]
pub struct File<'bytes> {
    pub(crate) bytes: Bytes<'bytes>,
}

impl<'bytes> File<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn into_owned(self) -> File<'static> {
        File {
            bytes: self.bytes.into_owned(),
        }
    }

    pub fn write<Out>(&self, stream: &mut Out) -> Result<()>
    where
        Out: ?Sized + Write,
    {
        stream.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl<'bytes> From<&'bytes [u8]> for File<'bytes> {
    fn from(value: &'bytes [u8]) -> Self {
        Self {
            bytes: Bytes::from_borrowed(value),
        }
    }
}

impl From<Vec<u8>> for File<'static> {
    fn from(value: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from_owned(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tes3::File;

    #[test]
    fn default_state() {
        let f = File::new();
        assert!(f.is_empty());
        assert_eq!(f.len(), 0);
        assert!(f.as_bytes().is_empty());
    }

    #[test]
    fn assigned_state() {
        let payload = [0u8; 64];
        let f = File::from(&payload[..]);
        assert_eq!(f.len(), payload.len());
        assert_eq!(f.as_bytes(), &payload[..]);
    }
}
