use ort::execution_providers::ExecutionProviderDispatch;

/// Hardware execution providers to try for the detector session.
///
/// ONNX Runtime falls back to CPU for anything not listed or unavailable,
/// so an empty list simply means CPU inference.
pub(super) fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}
