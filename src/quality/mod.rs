//! 质量层：多维审计与报告

pub mod gate;
pub mod report;

pub use gate::{seo_analysis, AuditInput, QualityGate};
pub use report::{Dimension, GenerationPhase, QualityReport, Violation};
