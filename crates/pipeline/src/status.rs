//! Status normalization.
//!
//! Upstream progress is free text. [`classify_step`] maps it onto the
//! canonical [`AssetStatus`] values and [`StatusMachine`] decides which
//! transitions a job may take.

use meshforge_core::status::AssetStatus;

/// Case-insensitive substrings checked in order against the step text.
const STEP_KEYWORDS: &[(&str, AssetStatus)] = &[
    ("preprocess", AssetStatus::Preprocessing),
    ("rendering video", AssetStatus::RenderingVideo),
    ("generating glb", AssetStatus::GeneratingModel),
];

/// Classify a progress step. `None` means the text carries no recognised
/// phase and the current status stays as it is.
pub fn classify_step(step: &str) -> Option<AssetStatus> {
    let lowered = step.to_lowercase();
    STEP_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, status)| *status)
}

/// Result of feeding an event into the [`StatusMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The job moved to this status and it should be persisted.
    Changed(AssetStatus),
    /// Accepted, but the status stays where it is.
    Unchanged,
    /// The job already failed; nothing moves any more.
    Ignored,
}

/// Per-job status tracker.
///
/// `error` is absorbing. `complete` may only be left for `error`.
#[derive(Debug, Clone)]
pub struct StatusMachine {
    state: AssetStatus,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusMachine {
    pub fn new() -> Self {
        Self {
            state: AssetStatus::Processing,
        }
    }

    pub fn current(&self) -> AssetStatus {
        self.state
    }

    pub fn on_progress(&mut self, step: &str) -> Transition {
        if let Some(blocked) = self.blocked() {
            return blocked;
        }
        match classify_step(step) {
            Some(next) => self.move_to(next),
            None => Transition::Unchanged,
        }
    }

    /// Record that an artifact was saved (`model_saved` or `video_saved`).
    pub fn on_artifact_saved(&mut self, saved: AssetStatus) -> Transition {
        if let Some(blocked) = self.blocked() {
            return blocked;
        }
        self.move_to(saved)
    }

    pub fn on_complete(&mut self) -> Transition {
        if let Some(blocked) = self.blocked() {
            return blocked;
        }
        self.move_to(AssetStatus::Complete)
    }

    pub fn on_error(&mut self) -> Transition {
        if self.state == AssetStatus::Error {
            return Transition::Ignored;
        }
        self.move_to(AssetStatus::Error)
    }

    // ---- private helpers ----

    fn blocked(&self) -> Option<Transition> {
        match self.state {
            AssetStatus::Error => Some(Transition::Ignored),
            AssetStatus::Complete => Some(Transition::Unchanged),
            _ => None,
        }
    }

    fn move_to(&mut self, next: AssetStatus) -> Transition {
        if self.state == next {
            return Transition::Unchanged;
        }
        tracing::debug!(from = %self.state, to = %next, "Status transition");
        self.state = next;
        Transition::Changed(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_phases() {
        assert_eq!(
            classify_step("Preprocessing image"),
            Some(AssetStatus::Preprocessing)
        );
        assert_eq!(
            classify_step("RENDERING VIDEO 3/10"),
            Some(AssetStatus::RenderingVideo)
        );
        assert_eq!(
            classify_step("Generating GLB mesh"),
            Some(AssetStatus::GeneratingModel)
        );
    }

    #[test]
    fn unknown_steps_are_unclassified() {
        assert_eq!(classify_step("Loading weights"), None);
        assert_eq!(classify_step(""), None);
        assert_eq!(classify_step("rendering"), None);
    }

    #[test]
    fn progress_moves_through_phases() {
        let mut machine = StatusMachine::new();
        assert_eq!(
            machine.on_progress("Preprocessing"),
            Transition::Changed(AssetStatus::Preprocessing)
        );
        assert_eq!(machine.on_progress("Preprocessing 2/2"), Transition::Unchanged);
        assert_eq!(machine.on_progress("Warming up"), Transition::Unchanged);
        assert_eq!(
            machine.on_progress("Rendering video"),
            Transition::Changed(AssetStatus::RenderingVideo)
        );
        assert_eq!(machine.current(), AssetStatus::RenderingVideo);
    }

    #[test]
    fn error_is_absorbing() {
        let mut machine = StatusMachine::new();
        assert_eq!(machine.on_error(), Transition::Changed(AssetStatus::Error));
        assert_eq!(machine.on_progress("Generating GLB"), Transition::Ignored);
        assert_eq!(
            machine.on_artifact_saved(AssetStatus::ModelSaved),
            Transition::Ignored
        );
        assert_eq!(machine.on_complete(), Transition::Ignored);
        assert_eq!(machine.on_error(), Transition::Ignored);
        assert_eq!(machine.current(), AssetStatus::Error);
    }

    #[test]
    fn complete_only_yields_to_error() {
        let mut machine = StatusMachine::new();
        assert_eq!(
            machine.on_complete(),
            Transition::Changed(AssetStatus::Complete)
        );
        assert_eq!(machine.on_progress("Preprocessing"), Transition::Unchanged);
        assert_eq!(
            machine.on_artifact_saved(AssetStatus::VideoSaved),
            Transition::Unchanged
        );
        assert_eq!(machine.on_complete(), Transition::Unchanged);
        assert_eq!(machine.on_error(), Transition::Changed(AssetStatus::Error));
    }

    #[test]
    fn artifact_saves_are_recorded() {
        let mut machine = StatusMachine::new();
        machine.on_progress("Rendering video");
        assert_eq!(
            machine.on_artifact_saved(AssetStatus::VideoSaved),
            Transition::Changed(AssetStatus::VideoSaved)
        );
        assert_eq!(
            machine.on_progress("Generating GLB"),
            Transition::Changed(AssetStatus::GeneratingModel)
        );
        assert_eq!(
            machine.on_artifact_saved(AssetStatus::ModelSaved),
            Transition::Changed(AssetStatus::ModelSaved)
        );
    }
}
