//! Integration tests for fallback chain resolution
//!
//! Model references resolve in place, instance groups expand to their members
//! in declared order, and anything unresolvable is dropped without disturbing
//! the order of the rest.

use proptest::prelude::*;
use tailgate::config::RoutingConfig;
use tailgate::routing::{
    CandidateDef, ChainEntry, InstanceGroupDef, ReferenceKind, RoutingReference, resolve,
};

fn model(id: &str, provider: &str, name: &str) -> CandidateDef {
    CandidateDef {
        id: Some(id.to_string()),
        provider: Some(provider.to_string()),
        model: Some(name.to_string()),
        ..CandidateDef::default()
    }
}

fn model_ref(target: &str) -> ChainEntry {
    ChainEntry::Reference(RoutingReference {
        target: target.to_string(),
        kind: ReferenceKind::Model,
    })
}

fn group_ref(target: &str) -> ChainEntry {
    ChainEntry::Reference(RoutingReference {
        target: target.to_string(),
        kind: ReferenceKind::InstanceGroup,
    })
}

fn parse(toml_str: &str) -> RoutingConfig {
    #[derive(serde::Deserialize)]
    struct Wrapper {
        routing: RoutingConfig,
    }
    toml::from_str::<Wrapper>(toml_str).unwrap().routing
}

#[test]
fn test_model_reference_resolves_to_one_untagged_candidate() {
    let config = RoutingConfig {
        models: vec![model("gemini-flash", "gemini", "gemini-1.5-flash")],
        instance_groups: vec![],
        fallback_chain: vec![model_ref("gemini-flash")],
    };

    let chain = resolve(&config);
    assert_eq!(chain.len(), 1);
    let candidate = chain.get(0).unwrap();
    assert_eq!(candidate.provider().as_str(), "gemini");
    assert_eq!(candidate.model(), "gemini-1.5-flash");
    assert_eq!(candidate.id(), Some("gemini-flash"));
    assert_eq!(candidate.group_id(), None);
}

#[test]
fn test_group_reference_expands_members_in_order_with_tag() {
    let config = parse(
        r#"
[[routing.models]]
id = "mistral-a"
provider = "mistral"
model = "mistral"
api_url = "http://10.0.0.1:11434/api/generate"

[[routing.models]]
id = "mistral-b"
provider = "mistral"
model = "mistral"
api_url = "http://10.0.0.2:11435/api/generate"

[[routing.instance_groups]]
id = "mistral-cluster"
models = ["mistral-b", "mistral-a"]

[[routing.fallback_chain]]
ref = "mistral-cluster"
type = "instance_group"

[[routing.fallback_chain]]
ref = "mistral-a"
"#,
    );

    let chain = resolve(&config);
    let summary: Vec<(Option<&str>, Option<&str>)> = chain
        .iter()
        .map(|c| (c.id(), c.group_id()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Some("mistral-b"), Some("mistral-cluster")),
            (Some("mistral-a"), Some("mistral-cluster")),
            // Direct reference to a group member stays untagged
            (Some("mistral-a"), None),
        ]
    );
    assert_eq!(chain.get(0).unwrap().health_key(), "mistral:mistral:11435");
}

#[test]
fn test_one_bad_reference_among_three_good() {
    let config = RoutingConfig {
        models: vec![
            model("a", "ollama", "llama3"),
            model("b", "openai", "gpt-4o"),
            model("c", "gemini", "gemini-pro"),
        ],
        instance_groups: vec![],
        fallback_chain: vec![model_ref("a"), model_ref("missing"), model_ref("c")],
    };

    let chain = resolve(&config);
    let ids: Vec<_> = chain.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec![Some("a"), Some("c")]);
}

#[test]
fn test_unknown_type_and_unknown_group_are_dropped() {
    let config = parse(
        r#"
[[routing.models]]
id = "a"
provider = "ollama"
model = "llama3"

[[routing.instance_groups]]
id = "pool"
models = ["a", "ghost"]

[[routing.fallback_chain]]
ref = "a"
type = "shard"

[[routing.fallback_chain]]
ref = "nowhere"
type = "instance_group"

[[routing.fallback_chain]]
ref = "pool"
type = "instance_group"
"#,
    );

    let chain = resolve(&config);
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.get(0).unwrap().group_id(), Some("pool"));
}

#[test]
fn test_literal_entries_are_validated() {
    let config = parse(
        r#"
[[routing.fallback_chain]]
provider = "openai"
model = "gpt-4o-mini"

[[routing.fallback_chain]]
provider = "openai"

[[routing.fallback_chain]]
model = "orphan"
"#,
    );

    let chain = resolve(&config);
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.get(0).unwrap().model(), "gpt-4o-mini");
    assert_eq!(chain.get(0).unwrap().id(), None);
}

#[test]
fn test_empty_chain_is_not_an_error() {
    assert!(resolve(&RoutingConfig::default()).is_empty());
}

proptest! {
    /// Resolution keeps exactly the known references, in chain order
    #[test]
    fn prop_resolution_preserves_order_of_known_refs(
        known in 1usize..8,
        refs in prop::collection::vec(0usize..12, 0..20),
    ) {
        let models: Vec<CandidateDef> = (0..known)
            .map(|i| model(&format!("m{}", i), "ollama", &format!("llama-{}", i)))
            .collect();
        let config = RoutingConfig {
            models,
            instance_groups: vec![],
            fallback_chain: refs.iter().map(|i| model_ref(&format!("m{}", i))).collect(),
        };

        let resolved: Vec<String> = resolve(&config)
            .iter()
            .map(|c| c.id().unwrap_or_default().to_string())
            .collect();
        let expected: Vec<String> = refs
            .iter()
            .filter(|i| **i < known)
            .map(|i| format!("m{}", i))
            .collect();
        prop_assert_eq!(resolved, expected);
    }

    /// A group expands to its resolvable members, each tagged with the group
    #[test]
    fn prop_group_members_keep_declared_order(
        members in prop::collection::vec(0usize..6, 0..10),
    ) {
        let models: Vec<CandidateDef> = (0..4)
            .map(|i| model(&format!("m{}", i), "mistral", "mistral"))
            .collect();
        let config = RoutingConfig {
            models,
            instance_groups: vec![InstanceGroupDef {
                id: "g".to_string(),
                models: members.iter().map(|i| format!("m{}", i)).collect(),
            }],
            fallback_chain: vec![group_ref("g")],
        };

        let chain = resolve(&config);
        let expected: Vec<String> = members
            .iter()
            .filter(|i| **i < 4)
            .map(|i| format!("m{}", i))
            .collect();
        prop_assert_eq!(chain.len(), expected.len());
        for (candidate, id) in chain.iter().zip(&expected) {
            prop_assert_eq!(candidate.id(), Some(id.as_str()));
            prop_assert_eq!(candidate.group_id(), Some("g"));
        }
    }
}
