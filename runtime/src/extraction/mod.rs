//! Field extraction from a stable page.
//!
//! Every configured field is read independently. A missing element, an empty
//! value or a failed query leaves that one field empty; extraction itself
//! never fails.

use crate::profile::{FieldSource, FieldSpec, FieldTransform, SiteProfile};
use crate::renderer::RenderContext;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

/// Named field values in profile order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRecord {
    fields: Vec<(String, Option<String>)>,
}

impl ExtractedRecord {
    pub fn new(fields: Vec<(String, Option<String>)>) -> Self {
        Self { fields }
    }

    /// Value of a field; `None` when absent or not configured.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for ExtractedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Reads a profile's fields off a rendered page.
#[derive(Debug, Clone)]
pub struct PageExtractor {
    fields: Vec<FieldSpec>,
}

impl PageExtractor {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn from_profile(profile: &SiteProfile) -> Self {
        Self::new(profile.fields.clone())
    }

    /// Extract every field from the page. Query errors count as absent.
    pub async fn extract(&self, page: &dyn RenderContext) -> ExtractedRecord {
        let mut fields = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            let raw = match &spec.source {
                FieldSource::Text => page.query_text(&spec.selector).await,
                FieldSource::InnerHtml => page.query_html(&spec.selector).await,
                FieldSource::Attribute(attr) => page.query_attribute(&spec.selector, attr).await,
            };
            let value = match raw {
                Ok(v) => v.and_then(|v| normalize(&v, spec.transform)),
                Err(e) => {
                    debug!(field = %spec.name, "field query failed: {e:#}");
                    None
                }
            };
            fields.push((spec.name.clone(), value));
        }
        ExtractedRecord::new(fields)
    }
}

/// Trim, apply the transform, and treat an empty result as absent.
fn normalize(raw: &str, transform: FieldTransform) -> Option<String> {
    let value = match transform {
        FieldTransform::None => raw.trim().to_string(),
        FieldTransform::DigitsOnly => raw.chars().filter(|c| c.is_ascii_digit()).collect(),
    };
    (!value.is_empty()).then_some(value)
}
