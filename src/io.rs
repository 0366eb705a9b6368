use crate::containers::Bytes;
use core::{mem, ops::Range};
use memmap2::Mmap;
use std::{
    fs::File,
    io::{self, Write},
    sync::Arc,
};

#[derive(Clone, Copy)]
pub(crate) enum Endian {
    Little,
    Big,
}

pub(crate) trait Source<'bytes> {
    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn read_bytes(&mut self, len: usize) -> io::Result<Bytes<'bytes>>;

    fn seek_absolute(&mut self, pos: usize) -> io::Result<()>;

    #[must_use]
    fn stream_position(&self) -> usize;

    #[must_use]
    fn remaining(&self) -> usize;

    fn read<T>(&mut self, endian: Endian) -> io::Result<T>
    where
        T: BinaryReadable<Item = T>,
    {
        T::from_stream(self, endian)
    }

    fn read_protocol<T>(&mut self, endian: Endian) -> io::Result<T::Item>
    where
        T: BinaryReadable,
    {
        T::from_stream(self, endian)
    }

    fn save_restore_position<F, T>(&mut self, f: F) -> io::Result<T>
    where
        F: FnOnce(&mut Self) -> T,
    {
        let position = self.stream_position();
        let result = f(self);
        self.seek_absolute(position)?;
        Ok(result)
    }

    fn seek_relative(&mut self, offset: isize) -> io::Result<()> {
        if let Some(pos) = self.stream_position().checked_add_signed(offset) {
            self.seek_absolute(pos)
        } else {
            Err(io::ErrorKind::UnexpectedEof.into())
        }
    }
}

macro_rules! make_sourceable {
    ($this:ty, $bytes_lifetime:lifetime $(,$this_lifetime:lifetime)?) => {
        impl $(<$this_lifetime>)? Source<$bytes_lifetime> for $this {
            fn read_into(&mut self, buf: &mut [u8]) -> io::Result<()> {
                let start = self.pos;
                let stop = start + buf.len();
                if stop > self.source.len() {
                    Err(io::ErrorKind::UnexpectedEof.into())
                } else {
                    self.pos = stop;
                    buf.copy_from_slice(&self.source[start..stop]);
                    Ok(())
                }
            }

            fn read_bytes(&mut self, len: usize) -> io::Result<Bytes<$bytes_lifetime>> {
                let start = self.pos;
                let stop = start + len;
                if stop > self.source.len() {
                    Err(io::ErrorKind::UnexpectedEof.into())
                } else {
                    self.pos = stop;
                    Ok(self.make_bytes(start..stop))
                }
            }

            fn seek_absolute(&mut self, pos: usize) -> io::Result<()> {
                if pos > self.source.len() {
                    Err(io::ErrorKind::UnexpectedEof.into())
                } else {
                    self.pos = pos;
                    Ok(())
                }
            }

            fn stream_position(&self) -> usize {
                self.pos
            }

            fn remaining(&self) -> usize {
                self.source.len() - self.pos
            }
        }
    };
}

pub(crate) struct BorrowedSource<'bytes> {
    source: &'bytes [u8],
    pos: usize,
}

impl<'bytes> BorrowedSource<'bytes> {
    #[must_use]
    fn make_bytes(&self, range: Range<usize>) -> Bytes<'bytes> {
        Bytes::from_borrowed(&self.source[range])
    }
}

impl<'bytes> From<&'bytes [u8]> for BorrowedSource<'bytes> {
    fn from(source: &'bytes [u8]) -> Self {
        Self { source, pos: 0 }
    }
}

make_sourceable!(BorrowedSource<'bytes>, 'bytes, 'bytes);

pub(crate) struct MappedSource {
    source: Arc<Mmap>,
    pos: usize,
}

impl MappedSource {
    #[must_use]
    fn make_bytes(&self, range: Range<usize>) -> Bytes<'static> {
        Bytes::from_mapped(range.start, range.len(), self.source.clone())
    }
}

impl TryFrom<&File> for MappedSource {
    type Error = io::Error;

    fn try_from(value: &File) -> Result<Self, Self::Error> {
        let mapping = unsafe { Mmap::map(value) }?;
        Ok(Self {
            source: Arc::new(mapping),
            pos: 0,
        })
    }
}

make_sourceable!(MappedSource, 'static);

pub(crate) trait BinaryReadable {
    type Item;

    fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>;
}

pub(crate) trait BinaryWriteable {
    type Item: ?Sized;

    fn to_stream<Out>(stream: &mut Out, item: &Self::Item, endian: Endian) -> io::Result<()>
    where
        Out: ?Sized + Write;
}

macro_rules! make_binary_streamable {
    ($t:ty) => {
        impl BinaryReadable for $t {
            type Item = $t;

            fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
            where
                In: ?Sized + Source<'bytes>,
            {
                let mut bytes = [0u8; mem::size_of::<Self::Item>()];
                stream.read_into(&mut bytes)?;
                Ok(match endian {
                    Endian::Little => Self::from_le_bytes(bytes),
                    Endian::Big => Self::from_be_bytes(bytes),
                })
            }
        }

        impl BinaryWriteable for $t {
            type Item = $t;

            fn to_stream<Out>(stream: &mut Out, item: &Self::Item, endian: Endian) -> io::Result<()>
            where
                Out: ?Sized + Write,
            {
                let bytes = match endian {
                    Endian::Little => item.to_le_bytes(),
                    Endian::Big => item.to_be_bytes(),
                };
                stream.write_all(&bytes)
            }
        }
    };
}

make_binary_streamable!(u8);
make_binary_streamable!(u16);
make_binary_streamable!(u32);
make_binary_streamable!(u64);

macro_rules! make_binary_streamable_tuple {
    ($($idx:tt $t:ident),+) => {
        impl<$($t,)+> BinaryReadable for ($($t,)+)
        where
            $($t: BinaryReadable<Item = $t>,)+
        {
            type Item = ($($t,)+);

            fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
            where
                In: ?Sized + Source<'bytes>,
            {
                Ok(($(
                    $t::from_stream(stream, endian)?,
                )+))
            }
        }

        impl<$($t,)+> BinaryWriteable for ($($t,)+)
        where
            $($t: BinaryWriteable<Item = $t>,)+
        {
            type Item = ($($t,)+);

            fn to_stream<Out>(stream: &mut Out, item: &Self::Item, endian: Endian) -> io::Result<()>
            where
                Out: ?Sized + Write,
            {
                $(
                    $t::to_stream(stream, &item.$idx, endian)?;
                )+
                Ok(())
            }
        }
    };
}

make_binary_streamable_tuple!(0 T0, 1 T1);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6, 7 T7);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6, 7 T7, 8 T8);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6, 7 T7, 8 T8, 9 T9);

pub(crate) struct Sink<'stream, Out>
where
    Out: ?Sized + Write,
{
    stream: &'stream mut Out,
}

impl<'stream, Out> Sink<'stream, Out>
where
    Out: ?Sized + Write,
{
    #[must_use]
    pub(crate) fn new(stream: &'stream mut Out) -> Self {
        Self { stream }
    }

    pub(crate) fn write<T>(&mut self, item: &T, endian: Endian) -> io::Result<()>
    where
        T: BinaryWriteable<Item = T>,
    {
        T::to_stream(&mut self.stream, item, endian)
    }

    pub(crate) fn write_protocol<T>(&mut self, item: &T::Item, endian: Endian) -> io::Result<()>
    where
        T: BinaryWriteable,
    {
        T::to_stream(&mut self.stream, item, endian)
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::{BorrowedSource, Endian, Sink, Source};

    #[test]
    fn round_trip_integers() -> anyhow::Result<()> {
        let mut buffer = Vec::new();
        {
            let mut sink = Sink::new(&mut buffer);
            sink.write(&(0x1234_5678u32, 0xABCDu16, 0x42u8), Endian::Little)?;
        }

        let mut source = BorrowedSource::from(buffer.as_slice());
        let (a, b, c): (u32, u16, u8) = source.read(Endian::Little)?;
        assert_eq!(a, 0x1234_5678);
        assert_eq!(b, 0xABCD);
        assert_eq!(c, 0x42);
        assert_eq!(source.remaining(), 0);
        Ok(())
    }

    #[test]
    fn seek_past_end_fails() {
        let payload = [0u8; 4];
        let mut source = BorrowedSource::from(&payload[..]);
        assert!(source.seek_absolute(5).is_err());
        assert!(source.seek_absolute(4).is_ok());
        assert!(source.read::<u8>(Endian::Little).is_err());
    }

    #[test]
    fn save_restore_position() -> anyhow::Result<()> {
        let payload = [1u8, 2, 3, 4];
        let mut source = BorrowedSource::from(&payload[..]);
        let _: u8 = source.read(Endian::Little)?;
        let inner = source.save_restore_position(|source| source.read::<u8>(Endian::Little))??;
        assert_eq!(inner, 2);
        assert_eq!(source.stream_position(), 1);
        Ok(())
    }
}
