pub use crate::config::*;

/// A builder for the normalization tables.
///
/// Starts from [Mappings::standard] and overrides individual entries. This
/// is the supported way to resolve taxonomy disagreements — for example,
/// folding ride-hail arrivals into public transit instead of keeping the
/// distinct UBER/Lyft category:
///
/// ```
/// pub use trip_calibration::builder::MappingsBuilder;
/// pub use trip_calibration::{AccessMode, Source};
///
/// let mappings = MappingsBuilder::new()
///     .survey_mode("tnc", AccessMode::PublicTransit)
///     .model_mode("RIDEHAIL_LOC1", AccessMode::PublicTransit)
///     .build();
///
/// assert_eq!(
///     mappings.resolve_mode(Source::Survey, "tnc").unwrap(),
///     AccessMode::PublicTransit
/// );
/// ```
pub struct MappingsBuilder {
    mappings: Mappings,
}

impl MappingsBuilder {
    pub fn new() -> MappingsBuilder {
        MappingsBuilder {
            mappings: Mappings::standard(),
        }
    }

    /// Maps a raw model access-mode code, adding or replacing the entry.
    pub fn model_mode(mut self, raw: &str, mode: AccessMode) -> MappingsBuilder {
        self.mappings.model_modes.insert(raw.to_string(), mode);
        self
    }

    /// Maps a raw survey access-mode code, adding or replacing the entry.
    pub fn survey_mode(mut self, raw: &str, mode: AccessMode) -> MappingsBuilder {
        self.mappings.survey_modes.insert(raw.to_string(), mode);
        self
    }

    /// Maps a raw model tour-type code to a shared detailed code.
    pub fn tour_type(mut self, raw: &str, shared: &str) -> MappingsBuilder {
        self.mappings
            .tour_types
            .insert(raw.to_string(), shared.to_string());
        self
    }

    pub fn build(self) -> Mappings {
        self.mappings
    }
}

impl Default for MappingsBuilder {
    fn default() -> Self {
        MappingsBuilder::new()
    }
}
