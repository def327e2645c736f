//! Fallback chain resolution
//!
//! Expands `{ref, type}` entries against the model and instance group
//! definitions. Every resolved candidate is an owned copy, so tagging a group
//! member never affects a direct reference to the same model.

use super::{ChainEntry, FallbackChain, ProviderCandidate, ReferenceKind};
use crate::config::RoutingConfig;
use crate::routing::candidate::CandidateDef;
use std::collections::HashMap;

/// Number of candidates listed in the resolution summary log
const SUMMARY_SAMPLE: usize = 5;

/// Resolve the configured chain into concrete candidates
///
/// Lookup misses and invalid definitions are logged at warn and omitted.
/// An empty result is returned as-is; deciding that it is critical is the
/// caller's job.
pub fn resolve(config: &RoutingConfig) -> FallbackChain {
    let models_by_id: HashMap<&str, &CandidateDef> = config
        .models
        .iter()
        .filter_map(|def| def.id.as_deref().map(|id| (id, def)))
        .collect();
    let groups_by_id: HashMap<&str, &[String]> = config
        .instance_groups
        .iter()
        .map(|group| (group.id.as_str(), group.models.as_slice()))
        .collect();

    let mut resolved = Vec::with_capacity(config.fallback_chain.len());

    for (index, entry) in config.fallback_chain.iter().enumerate() {
        match entry {
            ChainEntry::Literal(def) => match ProviderCandidate::try_from(def) {
                Ok(candidate) => resolved.push(candidate),
                Err(reason) => {
                    tracing::warn!(
                        entry = index,
                        reason = %reason,
                        "Skipping invalid fallback chain entry"
                    );
                }
            },
            ChainEntry::Reference(reference) => match reference.kind {
                ReferenceKind::Model => {
                    if let Some(candidate) =
                        lookup_model(&models_by_id, &reference.target, index)
                    {
                        resolved.push(candidate);
                    }
                }
                ReferenceKind::InstanceGroup => {
                    let Some(members) = groups_by_id.get(reference.target.as_str()) else {
                        tracing::warn!(
                            entry = index,
                            group = %reference.target,
                            "Instance group reference not found in routing configuration"
                        );
                        continue;
                    };

                    for member in members.iter() {
                        match lookup_model(&models_by_id, member, index) {
                            Some(candidate) => {
                                resolved.push(candidate.with_group(reference.target.clone()))
                            }
                            None => {
                                tracing::warn!(
                                    entry = index,
                                    group = %reference.target,
                                    model_ref = %member,
                                    "Instance group member skipped"
                                );
                            }
                        }
                    }
                }
                ReferenceKind::Unknown => {
                    tracing::warn!(
                        entry = index,
                        reference = %reference.target,
                        "Unknown reference type in fallback chain, entry skipped"
                    );
                }
            },
        }
    }

    let sample: Vec<String> = resolved
        .iter()
        .take(SUMMARY_SAMPLE)
        .map(ToString::to_string)
        .collect();
    tracing::info!(
        total_providers = resolved.len(),
        configured_entries = config.fallback_chain.len(),
        sample_providers = ?sample,
        "Resolved fallback chain"
    );

    FallbackChain::new(resolved)
}

fn lookup_model(
    models_by_id: &HashMap<&str, &CandidateDef>,
    id: &str,
    index: usize,
) -> Option<ProviderCandidate> {
    let Some(def) = models_by_id.get(id) else {
        tracing::warn!(
            entry = index,
            model_ref = %id,
            "Model reference not found in routing configuration"
        );
        return None;
    };

    match ProviderCandidate::try_from(*def) {
        Ok(candidate) => Some(candidate),
        Err(reason) => {
            tracing::warn!(
                entry = index,
                model_ref = %id,
                reason = %reason,
                "Referenced model definition is invalid"
            );
            None
        }
    }
}
