//! Static description of an exposed metric.

use ami_protocol::Event;
use prometheus::Opts;

use crate::expression::ValueExpr;

/// A label and the expression producing its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelExpr {
    pub name: String,
    pub value: ValueExpr,
}

/// Name, help text and labels of a metric.
///
/// Label names are fixed at construction; their order determines series
/// identity.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    name: String,
    description: String,
    labels: Vec<LabelExpr>,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<ValueExpr>) -> Self {
        self.labels.push(LabelExpr {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn labels(&self) -> &[LabelExpr] {
        &self.labels
    }

    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn label_names(&self) -> Vec<&str> {
        self.labels.iter().map(|label| label.name.as_str()).collect()
    }

    /// Label values for `event`, in declaration order.
    pub fn evaluate_labels(&self, event: &Event) -> Vec<String> {
        self.labels
            .iter()
            .map(|label| label.value.evaluate(event))
            .collect()
    }

    pub(crate) fn opts(&self) -> Opts {
        // prometheus rejects empty help text
        let help = if self.description.is_empty() {
            self.name.clone()
        } else {
            self.description.clone()
        };
        Opts::new(self.name.clone(), help)
    }
}
