//! Each dialect stores its members in a map ordered by the dialect's own name
//! hash, keyed by a hash + name pair. These macros stamp out that machinery.

macro_rules! key {
    ($this:ident: $hash:ty, $hash_in_place:path) => {
        /// A key for indexing into the mapping of an archive.
        ///
        /// Equality and ordering consider only the hash, which is computed
        /// from the normalized form of the name.
        #[derive(Clone, Debug, Default)]
        pub struct $this {
            pub(crate) hash: $hash,
            pub(crate) name: ::bstr::BString,
        }

        impl $this {
            #[must_use]
            pub fn hash(&self) -> &$hash {
                &self.hash
            }

            #[must_use]
            pub fn name(&self) -> &::bstr::BStr {
                self.name.as_ref()
            }

            #[must_use]
            fn from_name(mut name: ::bstr::BString) -> Self {
                let hash = $hash_in_place(&mut name);
                Self { hash, name }
            }
        }

        impl From<::bstr::BString> for $this {
            fn from(name: ::bstr::BString) -> Self {
                Self::from_name(name)
            }
        }

        impl From<&::bstr::BStr> for $this {
            fn from(name: &::bstr::BStr) -> Self {
                Self::from_name(name.to_owned())
            }
        }

        impl From<&[u8]> for $this {
            fn from(name: &[u8]) -> Self {
                Self::from_name(name.into())
            }
        }

        impl From<&str> for $this {
            fn from(name: &str) -> Self {
                Self::from_name(name.into())
            }
        }

        impl From<String> for $this {
            fn from(name: String) -> Self {
                Self::from_name(name.into())
            }
        }

        impl ::core::borrow::Borrow<$hash> for $this {
            fn borrow(&self) -> &$hash {
                &self.hash
            }
        }

        impl PartialEq for $this {
            fn eq(&self, other: &Self) -> bool {
                self.hash == other.hash
            }
        }

        impl Eq for $this {}

        impl PartialOrd for $this {
            fn partial_cmp(&self, other: &Self) -> Option<::core::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $this {
            fn cmp(&self, other: &Self) -> ::core::cmp::Ordering {
                self.hash.cmp(&other.hash)
            }
        }
    };
}

macro_rules! mapping {
    ($this:ident: $key:ty => $value:ident) => {
        impl<'bytes> $this<'bytes> {
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.map.is_empty()
            }

            #[must_use]
            pub fn len(&self) -> usize {
                self.map.len()
            }

            #[must_use]
            pub fn get<Q>(&self, key: &Q) -> Option<&$value<'bytes>>
            where
                $key: ::core::borrow::Borrow<Q>,
                Q: Ord + ?Sized,
            {
                self.map.get(key)
            }

            #[must_use]
            pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&$key, &$value<'bytes>)>
            where
                $key: ::core::borrow::Borrow<Q>,
                Q: Ord + ?Sized,
            {
                self.map.get_key_value(key)
            }

            pub fn insert<K>(&mut self, key: K, value: $value<'bytes>) -> Option<$value<'bytes>>
            where
                K: Into<$key>,
            {
                self.map.insert(key.into(), value)
            }

            pub fn iter(&self) -> impl Iterator<Item = (&$key, &$value<'bytes>)> {
                self.map.iter()
            }

            pub fn keys(&self) -> impl Iterator<Item = &$key> {
                self.map.keys()
            }

            pub fn values(&self) -> impl Iterator<Item = &$value<'bytes>> {
                self.map.values()
            }
        }

        impl<'bytes> Default for $this<'bytes> {
            fn default() -> Self {
                Self {
                    map: ::std::collections::BTreeMap::new(),
                }
            }
        }

        impl<'bytes> IntoIterator for $this<'bytes> {
            type Item = ($key, $value<'bytes>);
            type IntoIter = ::std::collections::btree_map::IntoIter<$key, $value<'bytes>>;

            fn into_iter(self) -> Self::IntoIter {
                self.map.into_iter()
            }
        }

        impl<'bytes, K> FromIterator<(K, $value<'bytes>)> for $this<'bytes>
        where
            K: Into<$key>,
        {
            fn from_iter<I>(iter: I) -> Self
            where
                I: IntoIterator<Item = (K, $value<'bytes>)>,
            {
                let map = iter
                    .into_iter()
                    .map(|(key, value)| (key.into(), value))
                    .collect();
                Self { map }
            }
        }
    };
}

pub(crate) use key;
pub(crate) use mapping;
