/// Drive-letter enumeration using the Windows API.
///
/// `GetLogicalDrives` returns a bitmask with bit 0 = `A:` through bit 25 =
/// `Z:`, covering fixed, removable, optical and mapped network drives alike.
use std::io;

/// Source of the set of drive letters currently assigned by the OS.
pub trait DriveQuery: Send + Sync {
    fn used_letters(&self) -> io::Result<Vec<char>>;
}

/// The live system drive table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDrives;

impl DriveQuery for SystemDrives {
    fn used_letters(&self) -> io::Result<Vec<char>> {
        query_logical_drives().map(letters_from_mask)
    }
}

/// Decode a `GetLogicalDrives` bitmask into uppercase letters.
pub fn letters_from_mask(mask: u32) -> Vec<char> {
    (0..26u8)
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| char::from(b'A' + bit))
        .collect()
}

#[cfg(windows)]
fn query_logical_drives() -> io::Result<u32> {
    use windows::Win32::Storage::FileSystem::GetLogicalDrives;

    let mask = unsafe { GetLogicalDrives() };
    if mask == 0 {
        tracing::warn!("GetLogicalDrives returned 0");
        return Err(io::Error::last_os_error());
    }
    Ok(mask)
}

#[cfg(not(windows))]
fn query_logical_drives() -> io::Result<u32> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "drive letters only exist on Windows",
    ))
}
