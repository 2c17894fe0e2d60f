pub mod analyzer;
pub mod behavior_store;
pub mod config;
pub mod engines;
pub mod header_parser;
pub mod text_utils;
pub mod threat_intel;

pub use analyzer::{AnalysisResult, EmailInput, PhishingAnalyzer, RiskLevel};
pub use behavior_store::{BehaviorStore, JsonFileStore, MemoryStore};
pub use config::{AnalyzerConfig, MlConfig, PatternConfig, Sensitivity};
pub use engines::behavior::Disposition;
pub use engines::{Finding, FindingCategory, Severity};
