use crate::{
    derive,
    tes4::{hashing, File, Hash},
};
use std::collections::BTreeMap;

derive::key!(Key: Hash, hashing::hash_file_in_place);

/// One directory of an Oblivion era archive: a mapping from hashed file
/// names to files, ordered by hash as the format requires.
pub struct Directory<'bytes> {
    pub(crate) map: BTreeMap<Key, File<'bytes>>,
}

derive::mapping!(Directory: Key => File);

#[cfg(test)]
mod tests {
    use crate::tes4::{Directory, DirectoryKey, File};

    #[test]
    fn default_state() {
        let d = Directory::new();
        assert!(d.is_empty());
        assert_eq!(d.len(), 0);
    }

    #[test]
    fn keys_compare_by_hash() {
        let mut d = Directory::new();
        d.insert(DirectoryKey::from("Pot.NIF"), File::new());
        assert!(d.get_key_value(DirectoryKey::from("pot.nif").hash()).is_some());
    }
}
