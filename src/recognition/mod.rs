pub mod orchestrator;

pub use orchestrator::{
    classify_transfer_error, PipelineStage, RecognitionError, RecognitionJob,
    RecognitionOrchestrator, RECOGNITION_ENDPOINT, UPLOAD_ENDPOINT,
};
