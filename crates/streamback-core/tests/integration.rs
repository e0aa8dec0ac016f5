//! Core integration tests: registration through encoding, as one producer would see it.
//!
//! Run with: `cargo test -p streamback-core --test integration`

use bytes::Bytes;
use serde_json::{Value, json};

use streamback_core::codec::{SseLineDecoder, decode_message, decode_record, encode_frame};
use streamback_core::config::Config;
use streamback_core::layout::{ComponentNode, ConnectorIds, inject_connectors};
use streamback_core::protocol::{CALLBACK_ID_KEY, CONTEXT_KEY, DEFAULT_ENDPOINT};
use streamback_core::{
    CallbackBuilder, ComponentId, Dependency, Emitter, ErrorPayload, Frame, FramePayload,
    FrameTarget, StreamRegistry, TriggerPayload, TriggerRequest, generate_callback_id,
};

fn register(registry: &StreamRegistry) -> streamback_core::CallbackId {
    CallbackBuilder::new("app::update_table")
        .input("stream-button", "n_clicks")
        .state("chunk-size", "value")
        .params(["n_clicks", "chunk_size"])
        .generator(|payload: TriggerPayload, emitter: Emitter| {
            let clicks = payload.get("n_clicks").cloned().unwrap_or(Value::Null);
            let items: Vec<anyhow::Result<Option<Bytes>>> = vec![
                Ok(Some(emitter.emit("stream-button", json!({"loading": true}))?)),
                Ok(None),
                Ok(Some(emitter.emit("stream-table", json!({"rowData": [{"clicks": clicks}]}))?)),
            ];
            Ok(items.into_iter())
        })
        .register(registry)
        .unwrap()
}

#[test]
fn test_registered_generator_produces_decodable_frames() {
    let registry = StreamRegistry::new();
    let id = register(&registry);
    let registration = registry.get(&id).unwrap();

    let mut payload = TriggerPayload::new();
    payload.insert("n_clicks".into(), json!(3));
    let mut producer = (registration.generator)(payload, Emitter::new(id.clone())).unwrap();

    let mut frames = Vec::new();
    let mut nulls = 0;
    while let Some(item) = producer.next_item() {
        match item.unwrap() {
            Some(bytes) => frames.push(decode_record(&bytes).unwrap()),
            None => nulls += 1,
        }
    }

    assert_eq!(nulls, 1);
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.callback_id == id));
    match &frames[1].payload {
        FramePayload::Update(props) => assert_eq!(props["rowData"][0]["clicks"], 3),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn test_callback_id_is_order_independent_and_identity_sensitive() {
    let a = [
        Dependency::input("stream-button", "n_clicks"),
        Dependency::state("chunk-size", "value"),
    ];
    let b = [a[1].clone(), a[0].clone()];
    assert_eq!(
        generate_callback_id("app::update_table", &a),
        generate_callback_id("app::update_table", &b)
    );
    assert_ne!(
        generate_callback_id("app::update_table", &a),
        generate_callback_id("app::update_chart", &a)
    );
}

#[test]
fn test_trigger_request_round_trip_through_json() {
    let id = generate_callback_id("app::f", &[Dependency::input("a", "value")]);
    let request = TriggerRequest::new(id.clone())
        .with_input("value", "hello")
        .with_context(json!({"triggered_inputs": [{"prop_id": "a.value"}]}));

    let wire = serde_json::to_string(&request.to_body()).unwrap();
    let parsed = TriggerRequest::from_body(serde_json::from_str(&wire).unwrap()).unwrap();

    assert_eq!(parsed.callback_id, id);
    assert_eq!(parsed.inputs["value"], "hello");
    assert!(!parsed.inputs.contains_key(CONTEXT_KEY));
    assert!(!parsed.inputs.contains_key(CALLBACK_ID_KEY));
}

#[test]
fn test_records_survive_arbitrary_chunking() {
    let id = generate_callback_id("app::f", &[Dependency::input("a", "value")]);
    let mut wire = Vec::new();
    wire.extend_from_slice(&encode_frame(&Frame::init(id.clone())).unwrap());
    let props = json!({"children": "héllo"}).as_object().cloned().unwrap();
    wire.extend_from_slice(&encode_frame(&Frame::update(id.clone(), "label".into(), props)).unwrap());
    wire.extend_from_slice(
        &encode_frame(&Frame::error(
            id.clone(),
            ErrorPayload {
                error: "boom".into(),
                handle_error: true,
                reset_props: Default::default(),
            },
        ))
        .unwrap(),
    );

    // Three-byte chunks split both lines and UTF-8 sequences.
    let mut decoder = SseLineDecoder::new();
    let mut message = String::new();
    for chunk in wire.chunks(3) {
        for event in decoder.push(chunk) {
            message.push_str(&event.data);
        }
    }
    let frames: Vec<Frame> = decode_message(&message).into_iter().map(|f| f.unwrap()).collect();

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].target, FrameTarget::Init);
    assert_eq!(frames[2].target, FrameTarget::Error);
    match &frames[1].payload {
        FramePayload::Update(props) => assert_eq!(props["children"], "héllo"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn test_layout_gets_one_connector_pair_per_callback() {
    let registry = StreamRegistry::new();
    let id = register(&registry);

    let layout = inject_connectors(
        vec![ComponentNode::new("Button").with_id("stream-button")],
        &registry,
        DEFAULT_ENDPOINT,
    );
    assert_eq!(layout.len(), 2);

    let mut ids: Vec<ComponentId> = Vec::new();
    for node in &layout {
        node.walk(&mut |n| {
            if let Some(id) = &n.id {
                ids.push(id.clone());
            }
        });
    }
    assert!(ids.contains(&ConnectorIds::stream(&id)));
    assert!(ids.contains(&ConnectorIds::store(&id)));
    assert!(ids.contains(&ComponentId::plain("stream-button")));
}

#[test]
fn test_config_set_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::load(&path).unwrap();
    assert_eq!(config.endpoint(), DEFAULT_ENDPOINT);

    config.set_path("streaming.timeout_secs", json!(7)).unwrap();
    config.set_path("server.port", json!(9100)).unwrap();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.stream_timeout().as_secs(), 7);
    assert_eq!(loaded.port(), 9100);
    assert_eq!(loaded.get_path("server.port"), Some(json!(9100)));
    let (_, errors) = loaded.validate();
    assert!(errors.is_empty());
}
