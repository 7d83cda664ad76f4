/// Elevation check for Windows.
///
/// When the process already holds an admin token, installer sessions run
/// directly instead of asking `Start-Process -Verb RunAs` for a UAC prompt.
/// Any failure to read the token is treated as "not elevated", which only
/// costs an extra prompt.

/// Whether the current process runs with an elevated (admin) token.
#[cfg(windows)]
pub fn is_elevated() -> bool {
    match token::query_elevation() {
        Ok(elevated) => elevated,
        Err(e) => {
            tracing::debug!("Cannot read process token elevation: {}", e);
            false
        }
    }
}

#[cfg(not(windows))]
pub fn is_elevated() -> bool {
    false
}

#[cfg(windows)]
mod token {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    /// Process token closed on drop.
    struct Token(HANDLE);

    impl Drop for Token {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    pub(super) fn query_elevation() -> windows::core::Result<bool> {
        let token = unsafe {
            let mut handle = HANDLE::default();
            OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut handle)?;
            Token(handle)
        };

        let mut elevation = TOKEN_ELEVATION::default();
        let mut written = 0u32;
        unsafe {
            GetTokenInformation(
                token.0,
                TokenElevation,
                Some(&mut elevation as *mut TOKEN_ELEVATION as *mut _),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut written,
            )?;
        }
        Ok(elevation.TokenIsElevated != 0)
    }
}
