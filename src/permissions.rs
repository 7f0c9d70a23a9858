use anyhow::Result;

/// Check and request microphone permission
///
/// # Errors
/// Currently never returns error (the OS prompts on first capture)
#[allow(clippy::unnecessary_wraps)] // Consistent API with other permission checks
pub fn check_microphone_permission() -> Result<()> {
    tracing::info!("checking microphone permission");

    // The OS prompts for microphone access the first time the capture
    // device is opened; a denied prompt surfaces as a capture setup error.
    tracing::warn!("microphone permission will be requested on first audio capture");

    Ok(())
}

/// Whether the OS-level input-simulation capability is available
///
/// When this returns false the insertion protocol skips the paste
/// keystroke and degrades to clipboard-only copy.
#[must_use]
pub fn input_simulation_granted() -> bool {
    #[cfg(target_os = "macos")]
    {
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        // Creating a HID-state event source fails when Accessibility /
        // Input Monitoring has not been granted to this process.
        CGEventSource::new(CGEventSourceStateID::HIDSystemState).is_ok()
    }

    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

/// Run all permission preflight checks
///
/// A missing input-simulation permission is not fatal: the app keeps
/// running and insertion falls back to clipboard-only copy.
///
/// # Errors
/// Returns error if the microphone check fails
pub fn preflight() -> Result<()> {
    tracing::info!("running permission preflight");

    check_microphone_permission()?;

    if input_simulation_granted() {
        tracing::info!("input simulation permission granted");
    } else {
        tracing::warn!(
            "input simulation permission missing - transcripts will be copied to the clipboard \
             instead of pasted (System Settings → Privacy & Security → Accessibility)"
        );
    }

    Ok(())
}
