//! Spectrum model configuration.

use sinclair_ula::ContentionVariant;

/// Supported Spectrum models.
///
/// The emulator uses a trait object (`Box<dyn SpectrumMemory>`) selected
/// by this enum at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumModel {
    Spectrum48K,
    Spectrum128K,
}

impl SpectrumModel {
    /// T-states the /INT line is held low for this model.
    #[must_use]
    pub const fn interrupt_length(self) -> i64 {
        match self {
            SpectrumModel::Spectrum48K => 32,
            SpectrumModel::Spectrum128K => 36,
        }
    }

    /// T-states per complete video frame.
    #[must_use]
    pub const fn tstates_per_frame(self) -> i64 {
        match self {
            SpectrumModel::Spectrum48K => 69_888,
            SpectrumModel::Spectrum128K => 70_908,
        }
    }

    #[must_use]
    pub const fn contention_variant(self) -> ContentionVariant {
        match self {
            SpectrumModel::Spectrum48K => ContentionVariant::Standard48K,
            SpectrumModel::Spectrum128K => ContentionVariant::Standard128K,
        }
    }
}

/// Configuration for creating a Spectrum instance.
pub struct SpectrumConfig {
    pub model: SpectrumModel,
    /// ROM data. 16,384 bytes for 48K; 32,768 bytes (two 16K pages) for 128K.
    pub rom: Vec<u8>,
}
