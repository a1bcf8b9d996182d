//! Voice activities as queue tasks
//!
//! Speaking and listening both need the audio device to themselves, so each
//! runs as a [`Task`](crate::queue::Task) on the runner. Actual synthesis and
//! recognition stay behind the [`Synthesizer`] and [`Recognizer`] traits.

mod activity;
mod arbiter;
mod control;
mod listen;
mod speak;

pub use activity::{Activity, ActivityTask, Outcome};
pub use arbiter::AudioArbiter;
pub use control::{ControlHandle, ControlReceiver, PlaybackControl, control_channel};
pub use listen::{Listen, ListenOptions, ListenTask, Recognizer, Transcript};
pub use speak::{DEFAULT_SPEED, DEFAULT_VOICE, Speak, SpeakTask, Synthesizer, Utterance};
