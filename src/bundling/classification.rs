//! Per-classification formation rules
//!
//! The passed and NDT streams run through one engine; everything that
//! differs between them lives in a `ClassificationDescriptor`.

use crate::types::Classification;

/// How batch ids are built and advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScheme {
    /// `<orderNo>_<yy>1<seq:4>`, sequence restarts when the year changes
    YearSequence,
    /// `<orderNo>_<seq:3>`
    OrderSequence,
}

/// How bundle numbers are built and advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingScheme {
    /// `<yy>1<CLASS><seq:4>`, sequenced across all orders of the classification
    GlobalYear,
    /// `<orderNo><CLASS><seq:3>`, sequenced per order
    PerOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationDescriptor {
    pub classification: Classification,
    /// Code embedded in bundle numbers, e.g. "OK"
    pub class_code: String,
    pub batch_scheme: BatchScheme,
    pub numbering_scheme: NumberingScheme,
}

impl ClassificationDescriptor {
    pub fn passed(class_code: impl Into<String>) -> Self {
        Self {
            classification: Classification::Passed,
            class_code: class_code.into(),
            batch_scheme: BatchScheme::YearSequence,
            numbering_scheme: NumberingScheme::GlobalYear,
        }
    }

    pub fn ndt(class_code: impl Into<String>) -> Self {
        Self {
            classification: Classification::Ndt,
            class_code: class_code.into(),
            batch_scheme: BatchScheme::OrderSequence,
            numbering_scheme: NumberingScheme::PerOrder,
        }
    }
}

/// Descriptors for both streams, indexable by `Classification::index`.
#[derive(Debug, Clone)]
pub struct ClassificationSet {
    descriptors: [ClassificationDescriptor; 2],
}

impl ClassificationSet {
    pub fn new(passed_code: &str, ndt_code: &str) -> Self {
        Self {
            descriptors: [
                ClassificationDescriptor::passed(passed_code),
                ClassificationDescriptor::ndt(ndt_code),
            ],
        }
    }

    pub fn get(&self, classification: Classification) -> &ClassificationDescriptor {
        &self.descriptors[classification.index()]
    }
}

impl Default for ClassificationSet {
    fn default() -> Self {
        Self::new(
            crate::config::defaults::DEFAULT_PASSED_CLASS_CODE,
            crate::config::defaults::DEFAULT_NDT_CLASS_CODE,
        )
    }
}
