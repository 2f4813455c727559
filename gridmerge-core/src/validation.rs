//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy: any `Error` rejects the merge before I/O, `Warning` is only logged.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::layout::plan;
use crate::request::GridSpec;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Warning)
    }

    /// All error messages joined, for `InvalidParameters`
    pub fn error_summary(&self) -> String {
        self.errors()
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, spec: &GridSpec) -> Vec<ValidationViolation>;

    fn violation(&self, severity: ViolationSeverity, message: String, index: Option<usize>) -> ValidationViolation {
        ValidationViolation {
            rule: self.name().to_string(),
            severity,
            message,
            index,
        }
    }
}

// --- Concrete Rules ---

pub struct DimensionsRule;

impl ValidationRule for DimensionsRule {
    fn name(&self) -> &'static str { "dimensions" }

    fn validate(&self, spec: &GridSpec) -> Vec<ValidationViolation> {
        let mut violations = vec![];
        if spec.width == 0 {
            violations.push(self.violation(ViolationSeverity::Error, "width must be greater than zero".into(), None));
        }
        if spec.height == 0 {
            violations.push(self.violation(ViolationSeverity::Error, "height must be greater than zero".into(), None));
        }
        violations
    }
}

pub struct ImageListRule;

impl ValidationRule for ImageListRule {
    fn name(&self) -> &'static str { "image_list" }

    fn validate(&self, spec: &GridSpec) -> Vec<ValidationViolation> {
        if spec.images.is_empty() {
            vec![self.violation(ViolationSeverity::Error, "at least one image is required".into(), None)]
        } else {
            vec![]
        }
    }
}

pub struct AbsoluteUriRule;

impl ValidationRule for AbsoluteUriRule {
    fn name(&self) -> &'static str { "absolute_uri" }

    fn validate(&self, spec: &GridSpec) -> Vec<ValidationViolation> {
        spec.images
            .iter()
            .enumerate()
            .filter_map(|(index, uri)| {
                Url::parse(uri).err().map(|e| {
                    self.violation(
                        ViolationSeverity::Error,
                        format!("image {} is not an absolute URI ({}): {}", index, uri, e),
                        Some(index),
                    )
                })
            })
            .collect()
    }
}

/// Canvas smaller than the grid: cells floor to 0 px. Allowed, but worth a warning.
pub struct CellSizeRule;

impl ValidationRule for CellSizeRule {
    fn name(&self) -> &'static str { "cell_size" }

    fn validate(&self, spec: &GridSpec) -> Vec<ValidationViolation> {
        let Ok(layout) = plan(spec.images.len(), spec.width, spec.height) else {
            return vec![];
        };
        if layout.has_degenerate_cells() {
            vec![self.violation(
                ViolationSeverity::Warning,
                format!(
                    "{}x{} canvas gives {}x{} px cells for a {}x{} grid; images will not be visible",
                    spec.width, spec.height, layout.cell_width, layout.cell_height, layout.cols, layout.rows
                ),
                None,
            )]
        } else {
            vec![]
        }
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(DimensionsRule),
                Box::new(ImageListRule),
                Box::new(AbsoluteUriRule),
                Box::new(CellSizeRule),
            ],
        }
    }

    pub fn validate(&self, spec: &GridSpec) -> ValidationResult {
        let mut all_violations = vec![];

        for rule in &self.rules {
            all_violations.extend(rule.validate(spec));
        }

        let has_errors = all_violations.iter()
            .any(|v| v.severity == ViolationSeverity::Error);

        ValidationResult {
            valid: !has_errors,
            violations: all_violations,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
