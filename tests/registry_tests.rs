use nodeflow::core::{Context, HybridClock, NodeKind};
use nodeflow::io::{Inputs, Outputs};
use nodeflow::nodes::{counter_source, log_sink, scale};
use nodeflow::registry::{NodeConstructor, NodeDeclaration, NodeRegistry};
use nodeflow::NodeError;
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_inventory_collects_builtin_nodes() {
    let registry = NodeRegistry::from_inventory();
    let ids: Vec<&str> = registry.ids().collect();

    assert!(ids.contains(&"counter_source"));
    assert!(ids.contains(&"scale"));
    assert!(ids.contains(&"log_sink"));

    let scale = registry.get("scale").unwrap();
    assert_eq!(scale.kind(), NodeKind::Operator);
    assert!(scale.has_input("in"));
    assert!(scale.has_output("out"));
    assert!(!scale.has_output("in"));
    assert_eq!(scale.parameters[0].name, "factor");
    assert_eq!(scale.parameters[0].default, json!(2));

    assert_eq!(registry.get("counter_source").unwrap().kind(), NodeKind::Source);
    assert_eq!(registry.get("log_sink").unwrap().kind(), NodeKind::Sink);
}

#[test]
fn test_each_module_declares_one_node() {
    for (declaration, id) in [
        (counter_source::register(), "counter_source"),
        (scale::register(), "scale"),
        (log_sink::register(), "log_sink"),
    ] {
        assert_eq!(declaration.id, id);
        assert!(!declaration.description.is_empty());
    }
}

#[test]
fn test_register_rejects_duplicates() {
    let mut registry = NodeRegistry::new();
    assert!(registry.is_empty());

    registry.register(scale::register()).unwrap();
    assert!(matches!(
        registry.register(scale::register()),
        Err(NodeError::DuplicateNode(id)) if id == "scale"
    ));
    assert_eq!(registry.len(), 1);
    assert!(matches!(
        registry.get("missing"),
        Err(NodeError::UnknownNode(_))
    ));
}

#[test]
fn test_declaration_builder() {
    let declaration = NodeDeclaration::new("custom", log_sink::register().constructor)
        .with_description("Custom sink")
        .add_input("left", "u64")
        .add_input("right", "u64")
        .add_parameter("threshold", "number", json!(10));

    assert_eq!(declaration.kind(), NodeKind::Sink);
    assert_eq!(declaration.inputs.len(), 2);
    assert!(declaration.outputs.is_empty());
    let param = serde_json::to_value(&declaration.parameters[0]).unwrap();
    assert_eq!(param, json!({ "name": "threshold", "type": "number", "default": 10 }));
}

#[test]
fn test_constructor_reports_missing_port() {
    let clock = Arc::new(HybridClock::default());
    let constructor = scale::register().constructor;
    assert!(matches!(constructor, NodeConstructor::Operator(_)));

    let mut ctx = Context::for_node("double");
    let err = constructor
        .construct(
            &mut ctx,
            &json!({}),
            Inputs::new("double", clock.clone()),
            Outputs::new("double", clock),
        )
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NodeError>(),
        Some(NodeError::PortNotFound { .. })
    ));
}
