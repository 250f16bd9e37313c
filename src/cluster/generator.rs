//! Cluster generator - turns an abstract capacity request into a resource set

use async_trait::async_trait;
use thiserror::Error;

use crate::address::Address;
use crate::schema::ResourceDefinition;

use super::resources::{
    ResourceSet, BROKER_KIND_POOLED, BROKER_KIND_SHARDED, LABEL_ADDRESS, LABEL_BROKER_KIND,
};

pub const PARAM_STORAGE_CAPACITY: &str = "STORAGE_CAPACITY";
pub const PARAM_BROKER_CPU: &str = "BROKER_CPU";
pub const PARAM_BROKER_MEMORY_LIMIT: &str = "BROKER_MEMORY_LIMIT";
pub const PARAM_ADDRESS_FULL_POLICY: &str = "ADDRESS_FULL_POLICY";

const DEFAULT_ADDRESS_FULL_POLICY: &str = "FAIL";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("Unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
}

#[async_trait]
pub trait ClusterGenerator: Send + Sync {
    /// Generate the resource set for a broker cluster.
    ///
    /// `address` is the dedicated address of a sharded cluster and `None`
    /// for pooled clusters.
    async fn generate_cluster(
        &self,
        cluster_id: &str,
        definition: &ResourceDefinition,
        replicas: u32,
        address: Option<&Address>,
    ) -> Result<ResourceSet, GeneratorError>;
}

/// Generator that fills a small set of known templates from definition
/// parameters
#[derive(Debug, Clone)]
pub struct TemplateClusterGenerator {
    templates: Vec<String>,
}

impl TemplateClusterGenerator {
    pub fn new() -> Self {
        Self {
            templates: vec![
                "queue-persisted".to_string(),
                "queue-inmemory".to_string(),
            ],
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.templates.push(template.into());
        self
    }

    /// Pure generation logic
    pub fn process_template(
        &self,
        cluster_id: &str,
        definition: &ResourceDefinition,
        replicas: u32,
        address: Option<&Address>,
    ) -> Result<ResourceSet, GeneratorError> {
        if !self.templates.contains(&definition.template) {
            return Err(GeneratorError::UnknownTemplate(definition.template.clone()));
        }

        let params = &definition.parameters;
        let storage_size = params.get(PARAM_STORAGE_CAPACITY).cloned();
        if let Some(size) = &storage_size {
            validate_quantity(PARAM_STORAGE_CAPACITY, size)?;
        }
        if definition.template.ends_with("-persisted") && storage_size.is_none() {
            return Err(GeneratorError::InvalidParameter {
                name: PARAM_STORAGE_CAPACITY.to_string(),
                reason: "required for persisted templates".to_string(),
            });
        }

        let mut set = ResourceSet::new(cluster_id).with_replicas(replicas, 0);
        set.template = definition.template.clone();
        set.storage_size = storage_size;
        set.cpu = params.get(PARAM_BROKER_CPU).cloned();
        set.memory = params.get(PARAM_BROKER_MEMORY_LIMIT).cloned();
        set.address_full_policy = Some(
            params
                .get(PARAM_ADDRESS_FULL_POLICY)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ADDRESS_FULL_POLICY.to_string()),
        );

        set = match address {
            Some(address) => set
                .with_label(LABEL_BROKER_KIND, BROKER_KIND_SHARDED)
                .with_label(LABEL_ADDRESS, address.name()),
            None => set.with_label(LABEL_BROKER_KIND, BROKER_KIND_POOLED),
        };

        Ok(set)
    }
}

impl Default for TemplateClusterGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterGenerator for TemplateClusterGenerator {
    async fn generate_cluster(
        &self,
        cluster_id: &str,
        definition: &ResourceDefinition,
        replicas: u32,
        address: Option<&Address>,
    ) -> Result<ResourceSet, GeneratorError> {
        self.process_template(cluster_id, definition, replicas, address)
    }
}

/// Accepts quantities like "512Mi", "2Gi" or "100"
fn validate_quantity(name: &str, value: &str) -> Result<(), GeneratorError> {
    let digits = value.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = &value[digits.len()..];
    let known = ["", "Ki", "Mi", "Gi", "Ti", "k", "M", "G", "T"];
    if digits.is_empty() || digits.parse::<f64>().is_err() || !known.contains(&suffix) {
        return Err(GeneratorError::InvalidParameter {
            name: name.to_string(),
            reason: format!("'{}' is not a quantity", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressType;

    fn definition() -> ResourceDefinition {
        ResourceDefinition::new("broker")
            .with_parameter(PARAM_STORAGE_CAPACITY, "2Gi")
            .with_parameter(PARAM_BROKER_MEMORY_LIMIT, "512Mi")
    }

    #[test]
    fn test_generate_pooled() {
        let generator = TemplateClusterGenerator::new();
        let set = generator
            .process_template("broker-pooled-1", &definition(), 1, None)
            .unwrap();
        assert!(set.is_pooled());
        assert_eq!(set.storage_size.as_deref(), Some("2Gi"));
        assert_eq!(set.address_full_policy.as_deref(), Some("FAIL"));
        assert_eq!(set.ready_replicas, 0);
    }

    #[test]
    fn test_generate_sharded() {
        let generator = TemplateClusterGenerator::new();
        let address = Address::new("q1", "q1", AddressType::Queue, "large-queue");
        let set = generator
            .process_template("q1-0", &definition(), 1, Some(&address))
            .unwrap();
        assert!(!set.is_pooled());
        assert_eq!(set.labels.get(LABEL_ADDRESS).map(String::as_str), Some("q1"));
    }

    #[test]
    fn test_unknown_template() {
        let generator = TemplateClusterGenerator::new();
        let mut def = definition();
        def.template = "mystery".into();
        let result = generator.process_template("x", &def, 1, None);
        assert_eq!(result, Err(GeneratorError::UnknownTemplate("mystery".into())));
    }

    #[test]
    fn test_bad_storage_quantity() {
        let generator = TemplateClusterGenerator::new();
        let def = ResourceDefinition::new("broker").with_parameter(PARAM_STORAGE_CAPACITY, "lots");
        let result = generator.process_template("x", &def, 1, None);
        assert!(matches!(result, Err(GeneratorError::InvalidParameter { .. })));
    }

    #[test]
    fn test_persisted_requires_storage() {
        let generator = TemplateClusterGenerator::new();
        let result = generator.process_template("x", &ResourceDefinition::new("broker"), 1, None);
        assert!(matches!(result, Err(GeneratorError::InvalidParameter { .. })));

        let mut inmemory = ResourceDefinition::new("broker");
        inmemory.template = "queue-inmemory".into();
        assert!(generator.process_template("x", &inmemory, 1, None).is_ok());
    }
}
