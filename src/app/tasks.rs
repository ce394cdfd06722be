// src/app/tasks.rs
use anyhow::Result;
use log::info;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::controller::Controller;
use crate::ai::connector::AiConnector;
use crate::capture::camera::{capture_with_permission, CameraDevice, CaptureOutcome};
use crate::capture::image::CapturedImage;
use crate::capture::permission::CameraAuthority;

pub type SharedController = Arc<Mutex<Controller>>;

pub fn shared(controller: Controller) -> SharedController {
    Arc::new(Mutex::new(controller))
}

/// Lock the controller, recovering the state if a worker panicked mid-update.
pub fn lock(controller: &SharedController) -> MutexGuard<'_, Controller> {
    controller.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Send the current question and image to the model on a worker thread.
/// Returns `None` without spawning when submit is disabled.
pub fn spawn_submission<F>(
    controller: &SharedController,
    connector: Arc<dyn AiConnector>,
    notify: F,
) -> Option<JoinHandle<()>>
where
    F: Fn() + Send + 'static,
{
    let submission = lock(controller).begin_submission()?;
    let controller = Arc::clone(controller);

    Some(thread::spawn(move || {
        let result = connector.generate(&submission.prompt, &submission.image);
        lock(&controller).finish_submission(submission.seq, result);
        notify();
    }))
}

/// Run an image-producing job (file read + decode, capture) on a worker thread.
pub fn spawn_acquisition<J, F>(controller: &SharedController, job: J, notify: F) -> JoinHandle<()>
where
    J: FnOnce() -> Result<Option<CapturedImage>> + Send + 'static,
    F: Fn() + Send + 'static,
{
    let seq = lock(controller).begin_acquisition();
    let controller = Arc::clone(controller);

    thread::spawn(move || {
        let result = job();
        lock(&controller).finish_acquisition(seq, result);
        notify();
    })
}

/// Permission check followed by capture, all off the UI thread since the
/// permission prompt may block.
pub fn spawn_camera_capture<F>(
    controller: &SharedController,
    authority: Arc<dyn CameraAuthority>,
    device: Arc<dyn CameraDevice>,
    notify: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    let controller = Arc::clone(controller);

    thread::spawn(move || {
        let mut seq = None;
        let outcome = capture_with_permission(authority.as_ref(), device.as_ref(), |permission| {
            let mut guard = lock(&controller);
            if guard.apply_permission(permission.clone()) {
                seq = Some(guard.begin_acquisition());
            }
            drop(guard);
            notify();
        });

        let Some(seq) = seq else {
            return;
        };
        info!("Capture #{} finished", seq);
        let result = outcome.map(|outcome| match outcome {
            CaptureOutcome::Captured(image) => Some(image),
            CaptureOutcome::Cancelled | CaptureOutcome::Denied(_) => None,
        });
        lock(&controller).finish_acquisition(seq, result);
        notify();
    })
}
