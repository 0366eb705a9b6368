//! String layouts used on the wire by the various archive dialects.

use crate::io::{BinaryReadable, BinaryWriteable, Endian, Source};
use bstr::{BStr as ByteStr, BString as ByteString};
use std::io::{self, Write};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("postfix null terminator was missing from a string")]
    MissingNullTerminator,

    #[error("a string is too large to be written without data loss")]
    StringTooLarge,
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        Self::new(io::ErrorKind::InvalidData, value)
    }
}

/// A u8 length prefix followed by unterminated contents.
pub(crate) struct BString;

impl BinaryReadable for BString {
    type Item = ByteString;

    fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>,
    {
        let len: u8 = stream.read(endian)?;
        let mut result = vec![0u8; len.into()];
        stream.read_into(&mut result[..])?;
        Ok(result.into())
    }
}

impl BinaryWriteable for BString {
    type Item = ByteStr;

    fn to_stream<Out>(stream: &mut Out, item: &Self::Item, endian: Endian) -> io::Result<()>
    where
        Out: ?Sized + Write,
    {
        let Ok(len) = u8::try_from(item.len()) else {
            return Err(Error::StringTooLarge.into());
        };
        u8::to_stream(stream, &len, endian)?;
        stream.write_all(item)
    }
}

/// Null terminated contents, no length prefix.
pub(crate) struct ZString;

impl BinaryReadable for ZString {
    type Item = ByteString;

    fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>,
    {
        let mut result = Vec::new();
        loop {
            let byte: u8 = stream.read(endian)?;
            match byte {
                0 => break,
                byte => result.push(byte),
            };
        }
        Ok(result.into())
    }
}

impl BinaryWriteable for ZString {
    type Item = ByteStr;

    fn to_stream<Out>(stream: &mut Out, item: &Self::Item, _: Endian) -> io::Result<()>
    where
        Out: ?Sized + Write,
    {
        stream.write_all(item)?;
        stream.write_all(b"\0")
    }
}

/// A u8 length prefix followed by null terminated contents. The prefix counts
/// the terminator but not itself.
pub(crate) struct BZString;

impl BinaryReadable for BZString {
    type Item = ByteString;

    fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>,
    {
        let len: u8 = stream.read(endian)?;
        if len == 0 {
            return Ok(Self::Item::default());
        }

        let mut result = vec![0u8; len.into()];
        stream.read_into(&mut result[..])?;
        match result.pop() {
            Some(b'\0') => Ok(result.into()),
            _ => Err(Error::MissingNullTerminator.into()),
        }
    }
}

impl BinaryWriteable for BZString {
    type Item = ByteStr;

    fn to_stream<Out>(stream: &mut Out, item: &Self::Item, endian: Endian) -> io::Result<()>
    where
        Out: ?Sized + Write,
    {
        let Ok(len) = u8::try_from(item.len() + 1) else {
            return Err(Error::StringTooLarge.into());
        };
        u8::to_stream(stream, &len, endian)?;
        stream.write_all(item)?;
        stream.write_all(b"\0")
    }
}

/// A u16 length prefix followed by unterminated contents.
pub(crate) struct WString;

impl BinaryReadable for WString {
    type Item = ByteString;

    fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>,
    {
        let len: u16 = stream.read(endian)?;
        let mut result = vec![0u8; len.into()];
        stream.read_into(&mut result[..])?;
        Ok(result.into())
    }
}

impl BinaryWriteable for WString {
    type Item = ByteStr;

    fn to_stream<Out>(stream: &mut Out, item: &Self::Item, endian: Endian) -> io::Result<()>
    where
        Out: ?Sized + Write,
    {
        let Ok(len) = u16::try_from(item.len()) else {
            return Err(Error::StringTooLarge.into());
        };
        u16::to_stream(stream, &len, endian)?;
        stream.write_all(item)
    }
}

#[cfg(test)]
mod tests {
    use super::{BZString, WString, ZString};
    use crate::io::{BorrowedSource, Endian, Source};
    use bstr::ByteSlice as _;

    #[test]
    fn zstring_terminates() -> anyhow::Result<()> {
        let payload = b"meshes\0leftovers";
        let mut source = BorrowedSource::from(&payload[..]);
        let read = source.read_protocol::<ZString>(Endian::Little)?;
        assert_eq!(read.as_bstr(), b"meshes".as_bstr());
        assert_eq!(source.stream_position(), 7);
        Ok(())
    }

    #[test]
    fn bzstring_requires_terminator() {
        let payload = b"\x04abcd";
        let mut source = BorrowedSource::from(&payload[..]);
        assert!(source.read_protocol::<BZString>(Endian::Little).is_err());
    }

    #[test]
    fn wstring_round_trip() -> anyhow::Result<()> {
        let mut buffer = Vec::new();
        {
            let mut sink = crate::io::Sink::new(&mut buffer);
            sink.write_protocol::<WString>(b"textures/stone.dds".as_bstr(), Endian::Little)?;
        }
        let mut source = BorrowedSource::from(buffer.as_slice());
        let read = source.read_protocol::<WString>(Endian::Little)?;
        assert_eq!(read.as_bstr(), b"textures/stone.dds".as_bstr());
        Ok(())
    }
}
