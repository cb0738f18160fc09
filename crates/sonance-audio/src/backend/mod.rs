//! Concrete audio outputs.

mod headless;
mod kira;

pub use self::headless::{HeadlessBackend, HeadlessDecoder, HeadlessProbes, ProbeState, VoiceProbe};
pub use self::kira::{KiraBackend, KiraDecoder};
