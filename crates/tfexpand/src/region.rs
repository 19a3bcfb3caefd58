//! Region of every resource instance
//!
//! Lookup order:
//! 1. the `region` attribute of the resource
//! 2. the `region` of its provider configuration
//! 3. the `availability_zone` attribute without its zone letter (`us-east-1a` -> `us-east-1`)
//!
//! Whatever is found has to be one of [KNOWN_REGIONS].
use crate::document::ProviderBlock;
use crate::expression::Evaluator;
use crate::value::Value;
use indexmap::IndexMap;

pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ca-central-1",
    "sa-east-1",
    "af-south-1",
    "ap-east-1",
    "me-south-1",
];

const REGION: &str = "region";
const AVAILABILITY_ZONE: &str = "availability_zone";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("cannot determine the region of {resource}: no `region`, provider region or `availability_zone`")]
    Unresolvable { resource: String },

    #[error("{resource}: unrecognized region `{value}` (from {origin})")]
    Unrecognized {
        resource: String,
        value: String,
        origin: String,
    },

    #[error("{resource}: `{attribute}` must be a string, got {found}")]
    NotText {
        resource: String,
        attribute: String,
        found: &'static str,
    },
}

pub fn is_known_region(region: &str) -> bool {
    KNOWN_REGIONS.contains(&region)
}

/// `us-east-1a` -> `us-east-1`
///
/// Only a single lowercase letter directly after the region number is stripped.
pub fn region_of_zone(zone: &str) -> Option<&str> {
    let mut chars = zone.chars().rev();
    let letter = chars.next()?;
    let digit = chars.next()?;
    if letter.is_ascii_lowercase() && digit.is_ascii_digit() {
        Some(&zone[..zone.len() - 1])
    } else {
        None
    }
}

/// Default regions of the provider configurations in scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionResolver {
    /// keyed by `aws` or `aws.alias`
    provider_regions: IndexMap<String, String>,
}

impl RegionResolver {
    pub fn new(provider_regions: IndexMap<String, String>) -> Self {
        Self { provider_regions }
    }

    pub fn provider_regions(&self) -> &IndexMap<String, String> {
        &self.provider_regions
    }

    /// Adds the regions of the given providers, replacing inherited ones with the same key
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn register_providers(
        &mut self,
        providers: &[ProviderBlock],
        evaluator: &Evaluator,
    ) -> Result<(), crate::Error> {
        for provider in providers {
            let key = provider.key();
            let Some(raw) = provider.attributes.get(REGION) else {
                continue;
            };

            let context = format!("provider.{key}.{REGION}");
            match evaluator.evaluate(raw, &context)? {
                Value::Null => continue,
                Value::Text(region) => {
                    tracing::debug!(provider = %key, %region, "provider region");
                    self.provider_regions.insert(key, region);
                }
                other => {
                    return Err(RegionError::NotText {
                        resource: format!("provider.{key}"),
                        attribute: REGION.to_string(),
                        found: other.type_name(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }

    pub fn resolve(
        &self,
        address: &str,
        resource_type: &str,
        provider: Option<&str>,
        attributes: &IndexMap<String, Value>,
    ) -> Result<String, RegionError> {
        if let Some(region) = text_attribute(attributes, address, REGION)? {
            return validate(address, region, "`region` attribute");
        }

        let provider_key = match provider {
            Some(key) => key,
            None => resource_type
                .split_once('_')
                .map_or(resource_type, |(prefix, _)| prefix),
        };
        if let Some(region) = self.provider_regions.get(provider_key) {
            return validate(address, region, &format!("provider `{provider_key}`"));
        }

        if let Some(zone) = text_attribute(attributes, address, AVAILABILITY_ZONE)? {
            let origin = format!("`{AVAILABILITY_ZONE}` {zone}");
            let Some(region) = region_of_zone(zone) else {
                return Err(RegionError::Unrecognized {
                    resource: address.to_string(),
                    value: zone.to_string(),
                    origin,
                });
            };
            return validate(address, region, &origin);
        }

        Err(RegionError::Unresolvable {
            resource: address.to_string(),
        })
    }
}

/// `null` counts as absent
fn text_attribute<'a>(
    attributes: &'a IndexMap<String, Value>,
    address: &str,
    attribute: &str,
) -> Result<Option<&'a str>, RegionError> {
    match attributes.get(attribute) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(text)) => Ok(Some(text.as_str())),
        Some(other) => Err(RegionError::NotText {
            resource: address.to_string(),
            attribute: attribute.to_string(),
            found: other.type_name(),
        }),
    }
}

fn validate(address: &str, region: &str, origin: &str) -> Result<String, RegionError> {
    if !is_known_region(region) {
        return Err(RegionError::Unrecognized {
            resource: address.to_string(),
            value: region.to_string(),
            origin: origin.to_string(),
        });
    }

    tracing::trace!(resource = address, region, origin, "region resolved");
    Ok(region.to_string())
}
