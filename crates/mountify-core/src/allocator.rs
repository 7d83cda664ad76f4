/// Drive-letter allocation: which of `A:`..`Z:` are free right now.
///
/// The allocator reports system truth only. A caller editing a profile whose
/// own letter is in use (typically because that profile is mounted) merges it
/// back with [`with_current_letter`].
use crate::platform::{DriveQuery, SystemDrives};
use std::sync::Arc;
use tracing::{debug, warn};

/// Every drive letter, in order.
pub const ALPHABET: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

pub struct DriveLetterAllocator {
    query: Arc<dyn DriveQuery>,
}

impl Default for DriveLetterAllocator {
    fn default() -> Self {
        Self::new(Arc::new(SystemDrives))
    }
}

impl DriveLetterAllocator {
    pub fn new(query: Arc<dyn DriveQuery>) -> Self {
        Self { query }
    }

    /// Letters not assigned to any drive, sorted.
    ///
    /// Fails open: if the OS query errors, the whole alphabet is returned so a
    /// picker is never left empty. The tradeoff is that a used letter may be
    /// offered; the mount path pre-cleans the letter anyway.
    pub fn available_letters(&self) -> Vec<char> {
        match self.query.used_letters() {
            Ok(used) => {
                let free: Vec<char> = ALPHABET
                    .iter()
                    .copied()
                    .filter(|c| !used.iter().any(|u| u.eq_ignore_ascii_case(c)))
                    .collect();
                debug!("Drive letters in use: {:?}, free: {}", used, free.len());
                free
            }
            Err(e) => {
                warn!("Drive query failed, offering all letters: {}", e);
                ALPHABET.to_vec()
            }
        }
    }
}

/// Merge `current` into `letters` for edit continuity, keeping the result
/// sorted and free of duplicates.
pub fn with_current_letter(mut letters: Vec<char>, current: Option<char>) -> Vec<char> {
    if let Some(c) = current.filter(char::is_ascii_alphabetic) {
        letters.push(c.to_ascii_uppercase());
    }
    letters.sort_unstable();
    letters.dedup();
    letters
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Fixed(Vec<char>);

    impl DriveQuery for Fixed {
        fn used_letters(&self) -> io::Result<Vec<char>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl DriveQuery for Broken {
        fn used_letters(&self) -> io::Result<Vec<char>> {
            Err(io::Error::other("wmi unavailable"))
        }
    }

    #[test]
    fn used_letters_are_excluded() {
        let alloc = DriveLetterAllocator::new(Arc::new(Fixed(vec!['C', 'D', 'S'])));
        let free = alloc.available_letters();
        assert_eq!(free.len(), 23);
        for used in ['C', 'D', 'S'] {
            assert!(!free.contains(&used));
        }
        assert!(free.windows(2).all(|w| w[0] < w[1]), "must be sorted");
    }

    #[test]
    fn query_failure_fails_open() {
        let alloc = DriveLetterAllocator::new(Arc::new(Broken));
        assert_eq!(alloc.available_letters(), ALPHABET.to_vec());
    }

    #[test]
    fn current_letter_is_merged_once() {
        let merged = with_current_letter(vec!['A', 'T'], Some('s'));
        assert_eq!(merged, vec!['A', 'S', 'T']);
        let merged = with_current_letter(vec!['A', 'S'], Some('S'));
        assert_eq!(merged, vec!['A', 'S']);
        assert_eq!(with_current_letter(vec!['B'], None), vec!['B']);
    }
}
