pub mod camera;
pub mod file_input;

pub use camera::{
    CameraConstraints, CameraDevice, CameraHandle, CameraReadiness, CameraStream, DeviceError,
    MediaAcquisitionManager, RawFrame, StillCaptureError,
};
pub use file_input::{validate_file, FileRejection, SelectedFile};
