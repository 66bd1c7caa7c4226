use serde::{Deserialize, Serialize};

/// Caller-tunable conversion parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConvertParams {
    /// Diffusion steps; clamped server-side to the configured ceiling.
    #[serde(default = "ConvertParams::default_diffusion_steps")]
    pub diffusion_steps: u32,
    /// Output length multiplier.
    #[serde(default = "ConvertParams::default_length_adjust")]
    pub length_adjust: f32,
    /// Also convert speaking style, not only timbre.
    #[serde(default = "ConvertParams::default_convert_style")]
    pub convert_style: bool,
}

impl ConvertParams {
    const fn default_diffusion_steps() -> u32 {
        30
    }
    const fn default_length_adjust() -> f32 {
        1.0
    }
    const fn default_convert_style() -> bool {
        true
    }

    /// Copy with `diffusion_steps` limited to `ceiling`.
    pub fn clamped(mut self, ceiling: u32) -> Self {
        self.diffusion_steps = self.diffusion_steps.min(ceiling);
        self
    }
}

impl Default for ConvertParams {
    fn default() -> Self {
        Self {
            diffusion_steps: Self::default_diffusion_steps(),
            length_adjust: Self::default_length_adjust(),
            convert_style: Self::default_convert_style(),
        }
    }
}

/// Sampling knobs forwarded on every call.
///
/// Not exposed to callers; set once in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelKnobs {
    pub intelligibility_cfg_rate: f32,
    pub similarity_cfg_rate: f32,
    pub top_p: f32,
    pub temperature: f32,
    pub repetition_penalty: f32,
    pub anonymization_only: bool,
}

impl Default for ModelKnobs {
    fn default() -> Self {
        Self {
            intelligibility_cfg_rate: 0.7,
            similarity_cfg_rate: 0.7,
            top_p: 0.7,
            temperature: 0.7,
            repetition_penalty: 1.5,
            anonymization_only: false,
        }
    }
}

/// Payload of a conversion job.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertRequest {
    /// Encoded source utterance (content to keep).
    pub source_audio: Vec<u8>,
    /// Encoded reference utterance (voice to imitate).
    pub target_audio: Vec<u8>,
    pub params: ConvertParams,
    pub knobs: ModelKnobs,
}

impl ConvertRequest {
    pub fn new(source_audio: Vec<u8>, target_audio: Vec<u8>, params: ConvertParams) -> Self {
        Self {
            source_audio,
            target_audio,
            params,
            knobs: ModelKnobs::default(),
        }
    }

    pub fn with_knobs(mut self, knobs: ModelKnobs) -> Self {
        self.knobs = knobs;
        self
    }
}

/// Synthesized audio returned by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertOutput {
    pub sample_rate: u32,
    /// WAV-encoded samples.
    pub audio: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_route_contract() {
        let p = ConvertParams::default();
        assert_eq!(p.diffusion_steps, 30);
        assert_eq!(p.length_adjust, 1.0);
        assert!(p.convert_style);
    }

    #[test]
    fn clamp_only_lowers() {
        let p = ConvertParams {
            diffusion_steps: 999,
            ..Default::default()
        };
        assert_eq!(p.clamped(50).diffusion_steps, 50);
        assert_eq!(ConvertParams::default().clamped(50).diffusion_steps, 30);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let p: ConvertParams = serde_json::from_str(r#"{"diffusion_steps": 10}"#).unwrap();
        assert_eq!(p.diffusion_steps, 10);
        assert_eq!(p.length_adjust, 1.0);
        assert!(p.convert_style);
    }

    #[test]
    fn knobs_default_to_deployment_values() {
        let k = ModelKnobs::default();
        assert_eq!(k.repetition_penalty, 1.5);
        assert!(!k.anonymization_only);
    }
}
