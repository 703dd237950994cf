// UI state of the emotion view and what the window derives from it

use crate::models::EmotionReading;
use crate::overlay::Overlay;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CameraState {
    #[default]
    Idle,
    Requesting,
    Active,
}

/// Identifies one detection tick: the capture session it belongs to and its order within it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStamp {
    pub session: u64,
    pub sequence: u64,
}

/// What one detection tick produced
#[derive(Clone, Debug, PartialEq)]
pub struct TickOutcome {
    pub reading: Option<EmotionReading>,
    pub overlay: Overlay,
}

/// Why a tick was not applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The capture session the tick belongs to is over
    SessionEnded,
    /// A newer tick of the same session was already applied
    OutOfOrder,
}

#[derive(Clone, Debug, Default)]
pub struct ViewState {
    camera: CameraState,
    session: u64,
    last_sequence: u64,
    emotion: Option<EmotionReading>,
    overlay: Overlay,
}

impl ViewState {
    pub fn camera(&self) -> CameraState {
        self.camera
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn emotion(&self) -> Option<EmotionReading> {
        self.emotion
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Moves Idle -> Requesting and opens a new session
    pub fn begin_request(&mut self) -> Option<u64> {
        if self.camera != CameraState::Idle {
            return None;
        }
        self.camera = CameraState::Requesting;
        self.session += 1;
        self.last_sequence = 0;
        Some(self.session)
    }

    /// Moves Requesting -> Active if `session` is still the pending one
    pub fn activate(&mut self, session: u64) -> bool {
        if self.camera != CameraState::Requesting || self.session != session {
            return false;
        }
        self.camera = CameraState::Active;
        true
    }

    /// Returns to Idle after a refused request, unless the session was already ended
    pub fn request_failed(&mut self, session: u64) {
        if self.camera == CameraState::Requesting && self.session == session {
            self.end_session();
        }
    }

    /// Ends the current session and wipes everything tied to it
    pub fn end_session(&mut self) {
        self.camera = CameraState::Idle;
        self.session += 1;
        self.last_sequence = 0;
        self.emotion = None;
        self.overlay.clear();
    }

    /// Applies a tick only if it belongs to the running session and is newer than the last one
    pub fn apply_tick(
        &mut self,
        stamp: TickStamp,
        outcome: TickOutcome,
    ) -> std::result::Result<(), Rejection> {
        if self.camera != CameraState::Active || stamp.session != self.session {
            debug!("Discarding tick {:?} from an ended session", stamp);
            return Err(Rejection::SessionEnded);
        }
        if stamp.sequence <= self.last_sequence {
            debug!("Discarding out-of-order tick {:?}", stamp);
            return Err(Rejection::OutOfOrder);
        }
        self.last_sequence = stamp.sequence;
        self.emotion = outcome.reading;
        self.overlay = outcome.overlay;
        Ok(())
    }
}

/// Model loading as the status line sees it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelsState {
    Loading,
    Loaded,
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleAction {
    Start,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToggleButton {
    pub label: &'static str,
    pub enabled: bool,
    pub action: ToggleAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmotionCard {
    pub label: String,
    pub confidence: u8,
}

impl EmotionCard {
    /// Fill fraction of the percentage bar
    pub fn fill(&self) -> f32 {
        f32::from(self.confidence) / 100.0
    }

    pub fn percentage_text(&self) -> String {
        format!("{}%", self.confidence)
    }
}

/// Everything the window needs for one repaint
#[derive(Clone, Debug)]
pub struct ViewSnapshot {
    pub models: ModelsState,
    pub camera: CameraState,
    pub emotion: Option<EmotionReading>,
    pub overlay: Overlay,
}

impl ViewSnapshot {
    pub fn models_loaded(&self) -> bool {
        self.models == ModelsState::Loaded
    }

    pub fn status_line(&self) -> &'static str {
        match self.models {
            ModelsState::Loading => "Loading models... please wait",
            ModelsState::Loaded => "Models loaded successfully!",
            ModelsState::Failed(_) => "Failed to load models",
        }
    }

    pub fn toggle_button(&self) -> ToggleButton {
        if self.models_loaded() && self.camera != CameraState::Idle {
            ToggleButton {
                label: "Stop Camera",
                enabled: true,
                action: ToggleAction::Stop,
            }
        } else {
            ToggleButton {
                label: "Start Camera",
                enabled: self.models_loaded(),
                action: ToggleAction::Start,
            }
        }
    }

    pub fn shows_video(&self) -> bool {
        self.camera == CameraState::Active
    }

    pub fn emotion_card(&self) -> Option<EmotionCard> {
        self.emotion.map(|reading| EmotionCard {
            label: reading.expression.to_string(),
            confidence: reading.confidence,
        })
    }
}
