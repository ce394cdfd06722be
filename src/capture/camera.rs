// src/capture/camera.rs
use anyhow::Result;
use log::info;

use super::image::CapturedImage;
use super::permission::{request_camera_access, CameraAuthority, PermissionOutcome};

/// A capture flow that yields one bitmap, or `None` when the user backs out.
pub trait CameraDevice: Send + Sync {
    fn capture(&self) -> Result<Option<CapturedImage>>;
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Denied(PermissionOutcome),
    Cancelled,
    Captured(CapturedImage),
}

/// Check authorization first; the device is only opened once access is granted.
///
/// `on_permission` sees the resolved permission before the device is touched,
/// whatever the result.
pub fn capture_with_permission<F>(
    authority: &dyn CameraAuthority,
    device: &dyn CameraDevice,
    on_permission: F,
) -> Result<CaptureOutcome>
where
    F: FnOnce(&PermissionOutcome),
{
    let permission = request_camera_access(authority);
    on_permission(&permission);
    if !permission.is_authorized() {
        return Ok(CaptureOutcome::Denied(permission));
    }

    match device.capture()? {
        Some(image) => Ok(CaptureOutcome::Captured(image)),
        None => {
            info!("Capture cancelled by user");
            Ok(CaptureOutcome::Cancelled)
        }
    }
}

/// Desktop stand-in for a camera: confirms the "shutter" with the user and
/// grabs the primary screen.
#[cfg(feature = "desktop")]
pub struct ScreenCamera<C> {
    confirm: C,
}

#[cfg(feature = "desktop")]
impl<C> ScreenCamera<C>
where
    C: Fn() -> bool + Send + Sync,
{
    pub fn new(confirm: C) -> Self {
        Self { confirm }
    }
}

#[cfg(feature = "desktop")]
impl<C> CameraDevice for ScreenCamera<C>
where
    C: Fn() -> bool + Send + Sync,
{
    fn capture(&self) -> Result<Option<CapturedImage>> {
        use anyhow::anyhow;
        use screenshots::Screen;

        if !(self.confirm)() {
            return Ok(None);
        }

        info!("Capturing primary screen");
        let screens = Screen::all()?;
        let screen = screens
            .iter()
            .find(|s| s.display_info.is_primary)
            .or_else(|| screens.first())
            .ok_or_else(|| anyhow!("No screens found"))?;

        let rgba = screen.capture()?;
        info!("Screen captured: {}x{}", rgba.width(), rgba.height());
        Ok(Some(CapturedImage::new(image::DynamicImage::ImageRgba8(rgba))))
    }
}
