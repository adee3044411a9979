use anyhow::Result;
use serde_json::{Value, json};
use shardpipe::executor::serve;
use shardpipe::transform::{
    Transform, TransformConfig, TransformFactory, register_transform,
};
use shardpipe::wire::{ResultMsg, TaskMsg, read_msg, write_msg};
use std::io::Cursor;
use std::sync::Arc;

fn run_serve(transform: &str, tasks: &[TaskMsg]) -> Result<Vec<ResultMsg>> {
    let mut input = Vec::new();
    for task in tasks {
        write_msg(&mut input, task)?;
    }
    let mut output = Vec::new();
    serve(
        transform,
        &TransformConfig::default(),
        Cursor::new(input),
        &mut output,
    )?;
    let mut results = Vec::new();
    let mut rdr = Cursor::new(output);
    while let Some(msg) = read_msg::<ResultMsg, _>(&mut rdr)? {
        results.push(msg);
    }
    Ok(results)
}

#[test]
fn serves_tasks_until_stop() -> Result<()> {
    let results = run_serve(
        "identity",
        &[
            TaskMsg::Work {
                seq: 0,
                record: json!({"id": 1}),
            },
            TaskMsg::Work {
                seq: 1,
                record: json!({"id": 2}),
            },
            TaskMsg::Stop,
        ],
    )?;
    assert_eq!(results.len(), 2);
    let ResultMsg::Done { seq, out } = &results[0];
    assert_eq!(*seq, 0);
    assert_eq!(out.as_ref(), Some(&json!({"id": 1})));
    Ok(())
}

#[test]
fn issue_records_come_back_null() -> Result<()> {
    let results = run_serve(
        "identity",
        &[
            TaskMsg::Work {
                seq: 0,
                record: json!({"issue": "unsupported", "id": 9}),
            },
            TaskMsg::Stop,
        ],
    )?;
    let ResultMsg::Done { out, .. } = &results[0];
    assert_eq!(*out, None);
    Ok(())
}

#[test]
fn closed_channel_ends_the_loop() -> Result<()> {
    // No stop message; EOF alone must end the loop cleanly.
    let results = run_serve(
        "identity",
        &[TaskMsg::Work {
            seq: 0,
            record: json!({}),
        }],
    )?;
    assert_eq!(results.len(), 1);
    Ok(())
}

#[test]
fn transform_errors_become_error_values() -> Result<()> {
    struct DoubleId;
    impl TransformFactory for DoubleId {
        fn name(&self) -> &str {
            "double-id-exec"
        }
        fn build(&self, _cfg: &TransformConfig) -> anyhow::Result<Box<dyn Transform>> {
            struct D;
            impl Transform for D {
                fn apply(&mut self, record: &Value) -> Value {
                    match record.get("id").and_then(Value::as_i64) {
                        Some(id) => json!({"id": id * 2}),
                        None => json!({"errors": "bad id"}),
                    }
                }
            }
            Ok(Box::new(D))
        }
    }
    register_transform(Arc::new(DoubleId));

    let results = run_serve(
        "double-id-exec",
        &[
            TaskMsg::Work {
                seq: 0,
                record: json!({"id": 1}),
            },
            TaskMsg::Work {
                seq: 1,
                record: json!({"id": "seven"}),
            },
            TaskMsg::Stop,
        ],
    )?;
    let ResultMsg::Done { out, .. } = &results[0];
    assert_eq!(out.as_ref(), Some(&json!({"id": 2})));
    let ResultMsg::Done { out, .. } = &results[1];
    assert_eq!(out.as_ref(), Some(&json!({"errors": "bad id"})));
    Ok(())
}

#[test]
fn unknown_transform_fails_before_the_loop() {
    let err = run_serve("no-such-transform", &[TaskMsg::Stop]).unwrap_err();
    assert!(err.to_string().contains("unknown transform"));
}
