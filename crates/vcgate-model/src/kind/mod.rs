mod job;
pub use job::JobKind;

mod convert;
pub use convert::{ConvertOutput, ConvertParams, ConvertRequest, ModelKnobs};
