//! Shared application state for the HTTP handlers.

use std::sync::Arc;

use speech_player::SpeechQueue;

use crate::synth::Synthesizer;

/// Handles shared by every request.
pub struct AppState {
    /// Playback engine; owns the output device through its worker.
    pub player: Arc<SpeechQueue>,
    /// Text-to-speech backend. `None` disables `/text`.
    pub synth: Option<Arc<dyn Synthesizer>>,
}

impl AppState {
    pub fn new(player: Arc<SpeechQueue>, synth: Option<Arc<dyn Synthesizer>>) -> Self {
        Self { player, synth }
    }
}
