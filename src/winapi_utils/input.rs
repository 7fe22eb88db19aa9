//! User input WinAPI wrappers.
//!
//! Provides the time since the last keyboard or mouse input for the current
//! session, which drives away detection.

use std::time::Duration;
use windows::Win32::System::SystemInformation::GetTickCount;
use windows::Win32::UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO};

/// Gets how long the current session has had no keyboard or mouse input.
///
/// Returns `None` if the call fails (e.g., no interactive session).
///
/// # Example
/// ```no_run
/// use useraction::winapi_utils::get_idle_time;
///
/// if let Some(idle) = get_idle_time() {
///     println!("Idle for {}s", idle.as_secs());
/// }
/// ```
pub fn get_idle_time() -> Option<Duration> {
    let mut info = LASTINPUTINFO {
        cbSize: std::mem::size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };

    let ok = unsafe { GetLastInputInfo(&mut info) }.as_bool();
    if !ok {
        return None;
    }

    // Both values are 32-bit tick counts; wrapping_sub handles the ~49 day rollover.
    let now = unsafe { GetTickCount() };
    Some(Duration::from_millis(now.wrapping_sub(info.dwTime) as u64))
}
