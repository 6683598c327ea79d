//! WAV recording of the converted stream

pub mod wav;
pub mod writer;

pub use wav::{finalized_sizes, FinalSizes, WavFormat};
pub use writer::{ContainerWriter, FinalizeSummary};
