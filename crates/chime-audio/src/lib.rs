//! # chime-audio
//!
//! Concurrent sound playback sessions for interactive applications.
//!
//! Features:
//! - A per-context `SoundSystem` tracking every live playback task
//! - Ephemeral `SoundChannel`s with derived position/remaining queries
//! - Async `SoundFile` loading through pluggable resolvers and decoders
//! - cpal device output, or a silent backend for headless use

pub mod asset;
pub mod backend;
pub mod channel;
pub mod clock;
pub mod decode;
pub mod file;
pub mod mixer;
pub mod output;
pub mod resample;
pub mod resolve;
pub mod system;
pub mod task;

pub use asset::SoundAsset;
pub use backend::{Backend, OutputFormat, SilentBackend};
pub use channel::SoundChannel;
pub use clock::{Clock, TokioClock};
pub use decode::{Decoder, SymphoniaDecoder};
pub use file::SoundFile;
pub use output::CpalBackend;
pub use resolve::{DirResolver, MemoryResolver, ResourceResolver};
pub use system::{SoundSystem, SoundSystemBuilder};
pub use task::{Scheduler, TaskHandle, TaskId};
