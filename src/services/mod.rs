pub mod captcha_solver;
pub mod failure_writer;
pub mod obligation_parser;
pub mod portal;
pub mod report;

pub use captcha_solver::{clean_ocr_text, parse_expression, CaptchaError, CaptchaSolver};
pub use failure_writer::FailureWriter;
pub use obligation_parser::parse_obligation_table;
pub use portal::{ChromiumPortal, Portal, SubmitObservation};
pub use report::{ReportGenerator, ReportTable, Tint};
