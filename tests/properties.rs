//! Property tests for message validation and node naming

use pipegraph::link::local;
use pipegraph::manager::{NodeContainer, NodeRef};
use pipegraph::protocol::{Content, Field, FieldKind};
use pipegraph::{Data, Message, MessageType, ParamTree, ParamValue, ValidationError};
use proptest::prelude::*;

fn message_type() -> impl Strategy<Value = MessageType> {
    prop::sample::select(MessageType::all().to_vec())
}

fn valid_field(name: &str, kind: FieldKind) -> Field {
    match kind {
        FieldKind::String => Field::String(format!("{name}-value")),
        FieldKind::Link => Field::Link(local::pair().0),
        FieldKind::Data => Field::Data(Data::array(vec![1.0, 2.0])),
        FieldKind::Value => Field::Value(ParamValue::Float(1.5)),
    }
}

fn valid_content(kind: MessageType) -> Content {
    kind.required_fields()
        .iter()
        .map(|(name, fk)| (name.to_string(), valid_field(name, *fk)))
        .collect()
}

proptest! {
    #[test]
    fn complete_content_is_accepted(kind in message_type()) {
        let msg = Message::new(kind, valid_content(kind)).unwrap();
        prop_assert_eq!(msg.kind(), kind);
        prop_assert_eq!(msg.content().len(), kind.required_fields().len());
    }

    #[test]
    fn dropping_any_field_is_rejected(kind in message_type(), pick in any::<prop::sample::Index>()) {
        let fields = kind.required_fields();
        prop_assume!(!fields.is_empty());
        let (missing, _) = fields[pick.index(fields.len())];
        let mut content = valid_content(kind);
        content.remove(missing);
        let is_missing_field = matches!(
            Message::new(kind, content),
            Err(ValidationError::MissingField { .. })
        );
        prop_assert!(is_missing_field);
    }

    #[test]
    fn extra_fields_are_rejected(kind in message_type(), extra in "[a-z]{3,12}") {
        prop_assume!(!kind.required_fields().iter().any(|(n, _)| *n == extra));
        let mut content = valid_content(kind);
        content.insert(extra, Field::String("surplus".into()));
        let is_unexpected = matches!(
            Message::new(kind, content),
            Err(ValidationError::UnexpectedField { .. })
        );
        prop_assert!(is_unexpected);
    }

    #[test]
    fn container_names_are_unique_and_minimal(ops in prop::collection::vec((0usize..3, any::<bool>()), 1..40)) {
        let bases = ["sine", "psd", "scale"];
        let mut container = NodeContainer::new();
        for (base, add) in ops {
            let base = bases[base];
            if add || container.is_empty() {
                let expected = (0u64..)
                    .map(|i| format!("{base}{i}"))
                    .find(|n| !container.contains(n))
                    .unwrap();
                let node = NodeRef::new(base, local::pair().0, &[], &[], ParamTree::new());
                prop_assert_eq!(container.add(base, node), expected);
            } else {
                let victim = container.names().next().unwrap().to_string();
                container.remove(&victim).unwrap();
                prop_assert!(!container.contains(&victim));
            }
            let mut names: Vec<&str> = container.names().collect();
            let total = names.len();
            names.sort_unstable();
            names.dedup();
            prop_assert_eq!(names.len(), total);
        }
        container.terminate_all();
    }
}
