// src/capture/permission.rs
use log::{info, warn};
use serde::Serialize;
use std::sync::Mutex;

/// Capture authorization as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionState {
    Authorized,
    NotDetermined,
    Denied,
    Restricted,
    Unknown,
}

impl PermissionState {
    /// Map a platform/config value. Anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "authorized" => Self::Authorized,
            "not-determined" | "notdetermined" | "not_determined" => Self::NotDetermined,
            "denied" => Self::Denied,
            "restricted" => Self::Restricted,
            _ => Self::Unknown,
        }
    }

    /// User-facing message for states that block capture.
    pub fn error_message(self) -> Option<&'static str> {
        match self {
            Self::Authorized | Self::NotDetermined => None,
            Self::Denied => Some("Camera access was denied. Allow access in your system settings to capture receipts."),
            Self::Restricted => Some("Camera access is restricted on this device."),
            Self::Unknown => Some("Camera authorization status is unknown."),
        }
    }
}

/// Source of truth for capture authorization.
pub trait CameraAuthority: Send + Sync {
    fn status(&self) -> PermissionState;

    /// Ask the user for access. May block while a dialog is open.
    fn request_access(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionOutcome {
    pub state: PermissionState,
    pub error: Option<String>,
}

impl PermissionOutcome {
    pub fn is_authorized(&self) -> bool {
        self.state == PermissionState::Authorized
    }
}

/// Resolve the current authorization, prompting only when undetermined.
pub fn request_camera_access(authority: &dyn CameraAuthority) -> PermissionOutcome {
    let state = match authority.status() {
        PermissionState::NotDetermined => {
            info!("Camera permission not determined, asking user");
            if authority.request_access() {
                PermissionState::Authorized
            } else {
                PermissionState::Denied
            }
        }
        other => other,
    };

    let error = state.error_message().map(str::to_string);
    if let Some(message) = &error {
        warn!("Camera access unavailable: {}", message);
    }

    PermissionOutcome { state, error }
}

/// Remembers the user's answer and asks through `prompter` while the state
/// is still undetermined.
pub struct ConsentAuthority<P> {
    state: Mutex<PermissionState>,
    prompter: P,
}

impl<P> ConsentAuthority<P>
where
    P: Fn() -> bool + Send + Sync,
{
    pub fn new(initial: PermissionState, prompter: P) -> Self {
        Self {
            state: Mutex::new(initial),
            prompter,
        }
    }
}

impl<P> CameraAuthority for ConsentAuthority<P>
where
    P: Fn() -> bool + Send + Sync,
{
    fn status(&self) -> PermissionState {
        self.state.lock().map(|s| *s).unwrap_or(PermissionState::Unknown)
    }

    fn request_access(&self) -> bool {
        let granted = (self.prompter)();
        if let Ok(mut state) = self.state.lock() {
            if *state == PermissionState::NotDetermined {
                *state = if granted {
                    PermissionState::Authorized
                } else {
                    PermissionState::Denied
                };
            }
        }
        granted
    }
}
