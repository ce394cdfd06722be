// src/app/controller.rs
use anyhow::Error;
use log::{error, info, warn};
use serde::Serialize;

use crate::ai::prompt;
use crate::capture::image::{CapturedImage, ImageSummary};
use crate::capture::permission::PermissionOutcome;

/// Where a submission is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Pending,
    Answered,
    Failed,
}

/// How results from overlapping tasks are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingPolicy {
    /// Only the most recently started task may update the state.
    #[default]
    LatestRequest,
    /// Whatever arrives last wins, even if it belongs to an older request.
    LastArrival,
}

/// Everything a front end renders. Owned by [`Controller`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub image: Option<ImageSummary>,
    pub question: String,
    pub answer: String,
    pub status: SubmissionStatus,
    pub show_library_picker: bool,
    pub show_camera: bool,
    pub acquiring: bool,
    pub permission_error: Option<String>,
    pub generation_error: Option<String>,
}

/// Work handed to a generation task.
#[derive(Debug, Clone)]
pub struct Submission {
    pub seq: u64,
    pub prompt: String,
    pub image: CapturedImage,
}

#[derive(Debug, Default)]
pub struct Controller {
    state: ViewState,
    image: Option<CapturedImage>,
    policy: OrderingPolicy,
    next_seq: u64,
    latest_submission: u64,
    latest_acquisition: u64,
    image_revision: u64,
}

impl Controller {
    pub fn new(policy: OrderingPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.clone()
    }

    pub fn image(&self) -> Option<&CapturedImage> {
        self.image.as_ref()
    }

    /// Bumped every time the image is replaced or cleared.
    pub fn image_revision(&self) -> u64 {
        self.image_revision
    }

    /// Drop the image and every piece of transient state.
    pub fn reset(&mut self) {
        info!("Resetting view state");
        self.state = ViewState::default();
        self.image = None;
        self.image_revision += 1;
    }

    pub fn set_question(&mut self, question: impl Into<String>) {
        self.state.question = question.into();
        if matches!(self.state.status, SubmissionStatus::Answered | SubmissionStatus::Failed) {
            self.state.status = SubmissionStatus::Idle;
        }
    }

    /// Submit is only offered with a question and an image.
    pub fn can_submit(&self) -> bool {
        !self.state.question.is_empty() && self.image.is_some()
    }

    pub fn open_library_picker(&mut self) {
        self.state.show_library_picker = true;
    }

    pub fn close_library_picker(&mut self) {
        self.state.show_library_picker = false;
    }

    /// Record the permission gate's result; opens the camera when authorized.
    pub fn apply_permission(&mut self, outcome: PermissionOutcome) -> bool {
        if outcome.is_authorized() {
            self.state.permission_error = None;
            self.state.show_camera = true;
            true
        } else {
            self.state.show_camera = false;
            self.state.permission_error = outcome.error;
            false
        }
    }

    pub fn dismiss_permission_error(&mut self) {
        self.state.permission_error = None;
    }

    pub fn close_camera(&mut self) {
        self.state.show_camera = false;
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn accepts(&self, seq: u64, latest: u64) -> bool {
        match self.policy {
            OrderingPolicy::LatestRequest => seq >= latest,
            OrderingPolicy::LastArrival => true,
        }
    }

    /// Start an image acquisition and return its sequence number.
    pub fn begin_acquisition(&mut self) -> u64 {
        let seq = self.bump_seq();
        self.latest_acquisition = seq;
        self.state.acquiring = true;
        self.state.show_library_picker = false;
        seq
    }

    /// Apply an acquisition result. Returns true if the image was replaced.
    pub fn finish_acquisition(&mut self, seq: u64, result: anyhow::Result<Option<CapturedImage>>) -> bool {
        if !self.accepts(seq, self.latest_acquisition) {
            warn!("Discarding stale image acquisition #{} (latest #{})", seq, self.latest_acquisition);
            return false;
        }
        if seq >= self.latest_acquisition {
            self.state.acquiring = false;
            self.state.show_camera = false;
        }

        match result {
            Ok(Some(image)) => {
                let summary = image.summary();
                info!("Image acquired: {}x{}", summary.width, summary.height);
                self.state.image = Some(summary);
                self.image = Some(image);
                self.image_revision += 1;
                true
            }
            Ok(None) => {
                info!("Image acquisition #{} produced no image", seq);
                false
            }
            Err(e) => {
                error!("Image acquisition failed: {:#}", e);
                false
            }
        }
    }

    /// Start a generation request, or `None` when submit is disabled.
    pub fn begin_submission(&mut self) -> Option<Submission> {
        let image = match (&self.image, self.state.question.is_empty()) {
            (Some(image), false) => image.clone(),
            _ => return None,
        };

        let seq = self.bump_seq();
        self.latest_submission = seq;
        self.state.status = SubmissionStatus::Pending;
        self.state.generation_error = None;

        info!("Submitting question #{}: '{}'", seq, self.state.question);
        Some(Submission {
            seq,
            prompt: prompt::compose(&self.state.question),
            image,
        })
    }

    /// Apply a generation result. Returns true if the state changed.
    ///
    /// Failures leave the previous answer in place; the error text is kept in
    /// [`ViewState::generation_error`] so a front end can offer a retry.
    pub fn finish_submission(&mut self, seq: u64, result: Result<String, Error>) -> bool {
        if !self.accepts(seq, self.latest_submission) {
            warn!("Discarding stale answer #{} (latest #{})", seq, self.latest_submission);
            return false;
        }

        match result {
            Ok(answer) => {
                info!("Answer #{} received", seq);
                self.state.answer = answer;
                self.state.status = SubmissionStatus::Answered;
                self.state.generation_error = None;
            }
            Err(e) => {
                error!("Generation #{} failed: {:#}", seq, e);
                self.state.status = SubmissionStatus::Failed;
                self.state.generation_error = Some(format!("{:#}", e));
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::image::sample_image;
    use crate::capture::permission::PermissionState;
    use anyhow::anyhow;

    fn ready(policy: OrderingPolicy) -> Controller {
        let mut controller = Controller::new(policy);
        let seq = controller.begin_acquisition();
        assert!(controller.finish_acquisition(seq, Ok(Some(sample_image(2, 2)))));
        controller.set_question("What is the total?");
        controller
    }

    #[test]
    fn submit_needs_question_and_image() {
        let mut controller = Controller::default();
        assert!(!controller.can_submit());
        controller.set_question("What is the total?");
        assert!(!controller.can_submit());
        assert!(controller.begin_submission().is_none());

        let seq = controller.begin_acquisition();
        controller.finish_acquisition(seq, Ok(Some(sample_image(1, 1))));
        assert!(controller.can_submit());

        controller.set_question("");
        assert!(!controller.can_submit());
        assert!(controller.begin_submission().is_none());
    }

    #[test]
    fn submission_composes_prompt_and_stores_answer() {
        let mut controller = ready(OrderingPolicy::default());
        let submission = controller.begin_submission().unwrap();
        assert_eq!(submission.prompt, format!("{} Question: What is the total?", prompt::INSTRUCTION));
        assert_eq!(controller.state().status, SubmissionStatus::Pending);

        controller.finish_submission(submission.seq, Ok("The total is $42.17".to_string()));
        assert_eq!(controller.state().answer, "The total is $42.17");
        assert_eq!(controller.state().status, SubmissionStatus::Answered);

        controller.set_question("What is the tax?");
        assert_eq!(controller.state().status, SubmissionStatus::Idle);
    }

    #[test]
    fn failure_keeps_previous_answer() {
        let mut controller = ready(OrderingPolicy::default());
        let first = controller.begin_submission().unwrap();
        controller.finish_submission(first.seq, Ok("first".into()));

        let second = controller.begin_submission().unwrap();
        controller.finish_submission(second.seq, Err(anyhow!("connection reset")));
        assert_eq!(controller.state().answer, "first");
        assert_eq!(controller.state().status, SubmissionStatus::Failed);
        assert!(controller.state().generation_error.as_deref().unwrap().contains("connection reset"));

        let third = controller.begin_submission().unwrap();
        assert!(controller.state().generation_error.is_none());
        controller.finish_submission(third.seq, Ok("third".into()));
        assert_eq!(controller.state().answer, "third");
    }

    #[test]
    fn stale_answer_is_discarded() {
        let mut controller = ready(OrderingPolicy::LatestRequest);
        let a = controller.begin_submission().unwrap();
        let b = controller.begin_submission().unwrap();

        assert!(controller.finish_submission(b.seq, Ok("B".into())));
        assert!(!controller.finish_submission(a.seq, Ok("A".into())));
        assert_eq!(controller.state().answer, "B");
    }

    #[test]
    fn last_arrival_policy_lets_older_answer_win() {
        let mut controller = ready(OrderingPolicy::LastArrival);
        let a = controller.begin_submission().unwrap();
        let b = controller.begin_submission().unwrap();

        controller.finish_submission(b.seq, Ok("B".into()));
        controller.finish_submission(a.seq, Ok("A".into()));
        assert_eq!(controller.state().answer, "A");
    }

    #[test]
    fn failed_decode_keeps_previous_image() {
        let mut controller = Controller::default();
        let seq = controller.begin_acquisition();
        controller.finish_acquisition(seq, Ok(Some(sample_image(5, 4))));

        let seq = controller.begin_acquisition();
        assert!(controller.state().acquiring);
        assert!(!controller.finish_acquisition(seq, Err(anyhow!("bad bytes"))));
        assert!(!controller.state().acquiring);
        assert_eq!(controller.state().image, Some(ImageSummary { width: 5, height: 4 }));
    }

    #[test]
    fn newer_acquisition_replaces_image_and_stale_one_is_dropped() {
        let mut controller = Controller::default();
        let old = controller.begin_acquisition();
        let new = controller.begin_acquisition();
        assert!(controller.finish_acquisition(new, Ok(Some(sample_image(3, 3)))));
        assert!(!controller.finish_acquisition(old, Ok(Some(sample_image(9, 9)))));
        assert_eq!(controller.image().unwrap().summary().width, 3);
        assert_eq!(controller.image_revision(), 1);
    }

    #[test]
    fn picker_closes_when_acquisition_starts() {
        let mut controller = Controller::default();
        controller.open_library_picker();
        assert!(controller.state().show_library_picker);
        controller.begin_acquisition();
        assert!(!controller.state().show_library_picker);
    }

    #[test]
    fn permission_outcome_drives_camera_flag() {
        let mut controller = Controller::default();
        let denied = PermissionOutcome {
            state: PermissionState::Denied,
            error: PermissionState::Denied.error_message().map(str::to_string),
        };
        assert!(!controller.apply_permission(denied));
        assert!(!controller.state().show_camera);
        assert!(controller.state().permission_error.is_some());

        controller.dismiss_permission_error();
        assert!(controller.state().permission_error.is_none());

        let granted = PermissionOutcome { state: PermissionState::Authorized, error: None };
        assert!(controller.apply_permission(granted));
        assert!(controller.state().show_camera);

        let seq = controller.begin_acquisition();
        controller.finish_acquisition(seq, Ok(None));
        assert!(!controller.state().show_camera);
        assert!(controller.image().is_none());
    }

    #[test]
    fn reset_clears_everything() {
        let mut controller = ready(OrderingPolicy::default());
        controller.reset();
        assert_eq!(controller.snapshot(), ViewState::default());
        assert!(controller.image().is_none());
    }

    #[test]
    fn state_serializes_for_front_ends() {
        let controller = ready(OrderingPolicy::default());
        let json = serde_json::to_value(controller.state()).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["image"]["width"], 2);
        assert_eq!(json["question"], "What is the total?");
    }
}
