//! Demo application served by `streamback serve`.
//!
//! A table that downloads in chunks while a notification container reports
//! progress, plus a callback that fails halfway to show error handling.

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Value, json};

use streamback_core::layout::ComponentNode;
use streamback_core::{CallbackBuilder, CallbackId, Emitter, StreamRegistry, TriggerPayload};

pub const BUTTON: &str = "stream-button";
pub const CANCEL_BUTTON: &str = "cancel-button";
pub const TABLE: &str = "stream-table";
pub const CHUNK_SIZE: &str = "chunk-size";
pub const NOTIFICATIONS: &str = "notifications-container";
pub const FAILING_BUTTON: &str = "failing-button";

const COUNTRIES: [(&str, &str); 8] = [
    ("Afghanistan", "Asia"),
    ("Albania", "Europe"),
    ("Algeria", "Africa"),
    ("Argentina", "Americas"),
    ("Australia", "Oceania"),
    ("Austria", "Europe"),
    ("Bangladesh", "Asia"),
    ("Belgium", "Europe"),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Row {
    country: &'static str,
    continent: &'static str,
    year: u32,
    life_exp: f64,
    pop: u64,
}

#[derive(Serialize)]
struct Notification {
    title: String,
    id: String,
    action: &'static str,
    message: String,
    color: &'static str,
    #[serde(rename = "autoClose")]
    auto_close: bool,
}

fn dataset() -> Vec<Row> {
    let mut rows = Vec::new();
    for (i, (country, continent)) in COUNTRIES.into_iter().enumerate() {
        for (j, year) in (1952..=2007).step_by(5).enumerate() {
            rows.push(Row {
                country,
                continent,
                year,
                life_exp: 40.0 + (i as f64) * 2.5 + (j as f64) * 1.1,
                pop: 1_000_000 * (i as u64 + 1) + 25_000 * j as u64,
            });
        }
    }
    rows
}

fn notify(emitter: &Emitter, title: &str, message: String, color: &'static str) -> anyhow::Result<Bytes> {
    let notification = Notification {
        title: title.to_string(),
        id: format!("{}-{title}", emitter.callback_id().as_str().get(..8).unwrap_or_default()),
        action: "show",
        message,
        color,
        auto_close: true,
    };
    Ok(emitter.emit(NOTIFICATIONS, json!({ "sendNotifications": [notification] }))?)
}

/// Register the demo callbacks into `registry`.
pub fn register_demo_callbacks(
    registry: &StreamRegistry,
    chunk_delay: Duration,
) -> anyhow::Result<Vec<CallbackId>> {
    let download = CallbackBuilder::new("streamback_cli::demo::update_table")
        .input(BUTTON, "n_clicks")
        .state(CHUNK_SIZE, "value")
        .params(["n_clicks", "chunk_size"])
        .reset_props(BUTTON, json!({"loading": false, "children": "Start"}))
        .cancel_on(CANCEL_BUTTON, "n_clicks", 1)
        .generator(move |payload: TriggerPayload, emitter: Emitter| {
            let chunk_size = payload
                .get("chunk_size")
                .and_then(Value::as_u64)
                .filter(|n| *n > 0)
                .unwrap_or(20) as usize;
            Ok(table_download(emitter, chunk_size, chunk_delay))
        })
        .register(registry)?;

    let failing = CallbackBuilder::new("streamback_cli::demo::failing_job")
        .input(FAILING_BUTTON, "n_clicks")
        .reset_props(FAILING_BUTTON, json!({"loading": false}))
        .on_error(|err, emitter| {
            notify(
                emitter,
                "Error occurred during stream - please reload the page",
                format!("{err:#}"),
                "red.6",
            )
        })
        .generator(|_: TriggerPayload, emitter: Emitter| {
            let items: Vec<anyhow::Result<Option<Bytes>>> = vec![
                Ok(Some(emitter.emit(FAILING_BUTTON, json!({"loading": true}))?)),
                Ok(Some(notify(&emitter, "Working", "Half way there".into(), "violet")?)),
                Err(anyhow::anyhow!("upstream data source went away")),
            ];
            Ok(items.into_iter())
        })
        .register(registry)?;

    Ok(vec![download, failing])
}

/// Lazily stream the dataset: header, then one chunk per step, then a summary.
fn table_download(
    emitter: Emitter,
    chunk_size: usize,
    chunk_delay: Duration,
) -> impl Iterator<Item = anyhow::Result<Option<Bytes>>> + Send {
    let rows = dataset();
    let total = rows.len();
    let chunks: Vec<Vec<Row>> = rows.chunks(chunk_size).map(<[Row]>::to_vec).collect();
    let columns: Vec<Value> = ["country", "continent", "year", "lifeExp", "pop"]
        .iter()
        .map(|field| json!({ "field": field }))
        .collect();

    let head_emitter = emitter.clone();
    let head = move || -> anyhow::Result<Vec<Bytes>> {
        Ok(vec![
            head_emitter.emit(BUTTON, json!({"loading": true}))?,
            notify(&head_emitter, "Starting Download!", format!("{total} rows to go"), "lime")?,
            head_emitter.emit(TABLE, json!({"columnDefs": columns, "rowData": []}))?,
        ])
    };

    let body_emitter = emitter.clone();
    let body = chunks.into_iter().enumerate().map(move |(i, chunk)| -> anyhow::Result<Option<Bytes>> {
        std::thread::sleep(chunk_delay);
        let sent = (i * chunk_size + chunk.len()).min(total);
        let update = if i == 0 {
            json!({ "rowData": chunk })
        } else {
            json!({ "rowTransaction": { "add": chunk } })
        };
        let table = body_emitter.emit(TABLE, update)?;
        let progress = notify(&body_emitter, "Progress", format!("Processed {sent} of {total} items"), "violet")?;
        let mut frame = table.to_vec();
        frame.extend_from_slice(&progress);
        Ok(Some(Bytes::from(frame)))
    });

    let tail = move || -> anyhow::Result<Vec<Bytes>> {
        Ok(vec![
            emitter.emit(BUTTON, json!({"loading": false, "children": "Reload"}))?,
            notify(&emitter, "Finished Callback!", "All rows loaded".into(), "lime")?,
        ])
    };

    let head_items = std::iter::once(head).flat_map(expand);
    let tail_items = std::iter::once(tail).flat_map(expand);
    head_items.chain(body).chain(tail_items)
}

fn expand<F>(build: F) -> Vec<anyhow::Result<Option<Bytes>>>
where
    F: FnOnce() -> anyhow::Result<Vec<Bytes>>,
{
    match build() {
        Ok(frames) => frames.into_iter().map(|f| Ok(Some(f))).collect(),
        Err(e) => vec![Err(e)],
    }
}

/// Application layout the demo callbacks act on.
pub fn demo_layout() -> Vec<ComponentNode> {
    vec![
        ComponentNode::new("NotificationContainer")
            .with_id(NOTIFICATIONS)
            .with_prop("transitionDuration", 500),
        ComponentNode::new("Stack").with_children(vec![
            ComponentNode::new("NumberInput")
                .with_id(CHUNK_SIZE)
                .with_prop("value", 20),
            ComponentNode::new("Button")
                .with_id(BUTTON)
                .with_prop("children", "Start")
                .with_prop("n_clicks", 0)
                .with_prop("loading", false),
            ComponentNode::new("Button")
                .with_id(CANCEL_BUTTON)
                .with_prop("children", "Cancel")
                .with_prop("n_clicks", 0),
            ComponentNode::new("AgGrid")
                .with_id(TABLE)
                .with_prop("rowData", json!([]))
                .with_prop("columnDefs", json!([])),
            ComponentNode::new("Button")
                .with_id(FAILING_BUTTON)
                .with_prop("children", "Fail")
                .with_prop("n_clicks", 0)
                .with_prop("loading", false),
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamback_core::FramePayload;
    use streamback_core::codec::decode_message;

    fn frames_of(items: Vec<anyhow::Result<Option<Bytes>>>) -> Vec<streamback_core::Frame> {
        let mut message = String::new();
        for item in items {
            let bytes = item.unwrap().unwrap();
            let text = String::from_utf8(bytes.to_vec()).unwrap();
            for record in text.split("\n\n").filter(|r| !r.is_empty()) {
                message.push_str(record.strip_prefix("data: ").unwrap());
            }
        }
        decode_message(&message).into_iter().map(|f| f.unwrap()).collect()
    }

    #[test]
    fn test_demo_callbacks_register() {
        let registry = StreamRegistry::new();
        let ids = register_demo_callbacks(&registry, Duration::ZERO).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(registry.len(), 2);
        let again = register_demo_callbacks(&registry, Duration::ZERO).unwrap();
        assert_eq!(ids, again);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_table_download_streams_every_row() {
        let emitter = Emitter::new(CallbackId::from("0123456789abcdef"));
        let items: Vec<_> = table_download(emitter, 25, Duration::ZERO).collect();
        let frames = frames_of(items);

        let mut rows = 0;
        for frame in &frames {
            if let FramePayload::Update(props) = &frame.payload {
                if let Some(data) = props.get("rowData").and_then(Value::as_array) {
                    rows += data.len();
                }
                if let Some(add) = props.get("rowTransaction").map(|t| &t["add"]) {
                    rows += add.as_array().unwrap().len();
                }
            }
        }
        assert_eq!(rows, dataset().len());
    }

    #[test]
    fn test_dataset_shape() {
        let rows = dataset();
        assert_eq!(rows.len(), COUNTRIES.len() * 12);
        assert_eq!(rows[0].year, 1952);
    }
}
