//! Case folding, glob matching, and the sanitizing bridge between raw
//! archive-internal names and host filesystem paths.

use bstr::ByteSlice as _;

/// Compares two strings, optionally ignoring ASCII case.
#[must_use]
pub fn str_compare(lhs: &str, rhs: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        lhs == rhs
    } else {
        lhs.eq_ignore_ascii_case(rhs)
    }
}

#[must_use]
pub fn to_lower(value: &str) -> String {
    value.to_ascii_lowercase()
}

/// Matches `string` against a glob `pattern` supporting `*` and `?`.
#[must_use]
pub fn str_match(pattern: &str, string: &str, case_sensitive: bool) -> bool {
    let pattern: Vec<char> = if case_sensitive {
        pattern.chars().collect()
    } else {
        pattern.chars().flat_map(char::to_lowercase).collect()
    };
    let string: Vec<char> = if case_sensitive {
        string.chars().collect()
    } else {
        string.chars().flat_map(char::to_lowercase).collect()
    };

    // iterative wildcard matching, backtracking on the last `*`
    let (mut p, mut s) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while s < string.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == string[s]) {
            p += 1;
            s += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, s));
            p += 1;
        } else if let Some((star_p, star_s)) = star {
            p = star_p + 1;
            s = star_s + 1;
            star = Some((star_p, star_s + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Converts raw bytes into valid UTF-8, replacing every invalid byte with
/// `replacement`.
#[must_use]
pub fn make_valid(bytes: &[u8], replacement: char) -> String {
    let mut result = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        result.push_str(chunk.valid());
        for _ in chunk.invalid() {
            result.push(replacement);
        }
    }
    result
}

/// Converts an archive-internal name into the crate's canonical form: valid
/// UTF-8, forward slash separated.
#[must_use]
pub fn virtual_to_local(name: &[u8]) -> String {
    make_valid(name, '_').replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::{make_valid, str_compare, str_match, virtual_to_local};

    #[test]
    fn comparison() {
        assert!(str_compare("Textures", "textures", false));
        assert!(!str_compare("Textures", "textures", true));
        assert!(str_compare("a", "a", true));
    }

    #[test]
    fn globbing() {
        assert!(str_match("*.bsa", "Skyrim - Textures0.bsa", false));
        assert!(str_match("*.BSA", "skyrim.bsa", false));
        assert!(!str_match("*.bsa", "skyrim.ba2", false));
        assert!(str_match("mesh??.nif", "mesh01.nif", true));
        assert!(!str_match("mesh??.nif", "mesh1.nif", true));
        assert!(str_match("*", "", true));
    }

    #[test]
    fn sanitizing() {
        assert_eq!(make_valid(b"sound\xFF.wav", '_'), "sound_.wav");
        assert_eq!(make_valid(b"plain.nif", '_'), "plain.nif");
        assert_eq!(
            virtual_to_local(b"meshes\\clutter\\pot.nif"),
            "meshes/clutter/pot.nif"
        );
    }
}
