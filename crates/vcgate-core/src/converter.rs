use async_trait::async_trait;
use vcgate_model::{ConvertOutput, ConvertRequest};

use crate::error::ModelError;

/// The external voice-conversion model.
///
/// Implementations may be slow and may fail with resource exhaustion.
/// They are never called concurrently: the controller holds the job slot
/// for the whole call.
#[async_trait]
pub trait Converter: Send + Sync + 'static {
    /// Human-readable backend name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Convert `source_audio` into the voice of `target_audio`.
    async fn convert(&self, request: ConvertRequest) -> Result<ConvertOutput, ModelError>;
}
