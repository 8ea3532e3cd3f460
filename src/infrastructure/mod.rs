pub mod js_executor;
pub mod ocr;

pub use js_executor::JsExecutor;
pub use ocr::{build_ocr_engine, OcrEngine, TesseractOcr, VisionOcr};
