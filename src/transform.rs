//! The per-record transform interface and its registry.
//!
//! Transform semantics are opaque to the pipeline: a [`Transform`] maps one
//! record to one result value and must never fail past its own boundary.
//! Internal errors are encoded as `{"errors": <message>}` results, which
//! the pipeline records and moves past. Construction happens through a
//! [`TransformFactory`] so that the expensive part (loading reference data,
//! opening native-library contexts) is paid once per executor process, not
//! per record.
//!
//! Factories are looked up by name in a global registry, mirroring the
//! codec registry in [`crate::io::compression`]; executor processes resolve
//! their transform from the name they were spawned with.

use crate::record::{Envelope, Record};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Flags forwarded opaquely into transform construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformConfig {
    /// Attempt lift-over of records on older coordinate assemblies.
    pub liftover: bool,
}

/// A per-record conversion. `apply` must catch its own failures and return
/// an `{"errors": <message>}` value instead of panicking or erroring.
pub trait Transform: Send {
    fn apply(&mut self, record: &Record) -> Value;
}

/// Builds a [`Transform`] instance. `build` carries the one-time
/// initialization cost and is re-run whenever an executor process is
/// replaced.
pub trait TransformFactory: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, cfg: &TransformConfig) -> Result<Box<dyn Transform>>;
}

static FACTORIES: RwLock<Option<Vec<Arc<dyn TransformFactory>>>> = RwLock::new(None);

fn builtin_factories() -> Vec<Arc<dyn TransformFactory>> {
    vec![Arc::new(Identity), Arc::new(Reject), Arc::new(Stall)]
}

/// Register a transform factory; `resolve_transform` finds it by name from
/// then on. Registration in a parent process does not carry over into
/// executor processes; register before calling into the pipeline in every
/// process image (e.g. from `main`).
pub fn register_transform(factory: Arc<dyn TransformFactory>) {
    let mut lock = FACTORIES.write().unwrap();
    lock.get_or_insert_with(builtin_factories).push(factory);
}

/// Build the named transform, paying its one-time initialization.
pub fn resolve_transform(name: &str, cfg: &TransformConfig) -> Result<Box<dyn Transform>> {
    let factories = {
        let mut lock = FACTORIES.write().unwrap();
        lock.get_or_insert_with(builtin_factories).clone()
    };
    let factory = factories
        .iter()
        .find(|f| f.name() == name)
        .ok_or_else(|| {
            let known: Vec<&str> = factories.iter().map(|f| f.name()).collect();
            anyhow!("unknown transform {name:?}; known transforms: {known:?}")
        })?;
    factory.build(cfg)
}

/// Convert one record into its output envelope.
///
/// Records carrying a non-null `"issue"` field are passed through with a
/// `null` result; everything else goes through the transform. Exactly one
/// envelope comes out per record, always.
pub fn convert(record: Record, transform: &mut dyn Transform) -> Envelope {
    if record.get("issue").is_some_and(|v| !v.is_null()) {
        return Envelope::new(record, None);
    }
    let out = transform.apply(&record);
    Envelope::new(record, Some(out))
}

// ---------------------------------------------------------------------------
// Built-in transforms
// ---------------------------------------------------------------------------

/// Passes every record through unchanged.
struct Identity;

impl TransformFactory for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn build(&self, _cfg: &TransformConfig) -> Result<Box<dyn Transform>> {
        struct Pass;
        impl Transform for Pass {
            fn apply(&mut self, record: &Record) -> Value {
                record.clone()
            }
        }
        Ok(Box::new(Pass))
    }
}

/// Fault injection: fails every record. Exercises the error-envelope path
/// end to end without a real normalizer.
struct Reject;

impl TransformFactory for Reject {
    fn name(&self) -> &str {
        "reject"
    }

    fn build(&self, _cfg: &TransformConfig) -> Result<Box<dyn Transform>> {
        struct AlwaysError;
        impl Transform for AlwaysError {
            fn apply(&mut self, _record: &Record) -> Value {
                json!({ "errors": "record rejected" })
            }
        }
        Ok(Box::new(AlwaysError))
    }
}

/// Fault injection: hangs on demand. A record with `"stall": true` never
/// completes; `"stall": <seconds>` sleeps that long first. Everything else
/// (and the sleep survivors) reports the executor's process id, which
/// makes replacement observable. Exercises deadline enforcement end to
/// end.
struct Stall;

impl TransformFactory for Stall {
    fn name(&self) -> &str {
        "stall"
    }

    fn build(&self, _cfg: &TransformConfig) -> Result<Box<dyn Transform>> {
        struct Hang;
        impl Transform for Hang {
            fn apply(&mut self, record: &Record) -> Value {
                match record.get("stall") {
                    Some(Value::Bool(true)) => loop {
                        std::thread::sleep(Duration::from_secs(60));
                    },
                    Some(v) if v.is_number() => {
                        let secs = v.as_f64().unwrap_or(0.0).max(0.0);
                        std::thread::sleep(Duration::from_secs_f64(secs));
                    }
                    _ => {}
                }
                json!({ "pid": std::process::id() })
            }
        }
        Ok(Box::new(Hang))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trips_records() {
        let mut t = resolve_transform("identity", &TransformConfig::default()).unwrap();
        let env = convert(json!({"id": 1}), t.as_mut());
        assert_eq!(env.output, Some(json!({"id": 1})));
    }

    #[test]
    fn issue_records_skip_the_transform() {
        // Even a transform that fails everything never sees issue records.
        let mut t = resolve_transform("reject", &TransformConfig::default()).unwrap();
        let env = convert(json!({"issue": "unsupported", "id": 2}), t.as_mut());
        assert_eq!(env.output, None);

        let env = convert(json!({"issue": null, "id": 3}), t.as_mut());
        assert!(env.is_error());
    }

    #[test]
    fn unknown_transform_names_error() {
        let err = resolve_transform("nope", &TransformConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown transform"));
    }

    #[test]
    fn custom_factories_resolve_by_name() {
        struct Doubler;
        impl TransformFactory for Doubler {
            fn name(&self) -> &str {
                "double-id"
            }
            fn build(&self, _cfg: &TransformConfig) -> Result<Box<dyn Transform>> {
                struct D;
                impl Transform for D {
                    fn apply(&mut self, record: &Record) -> Value {
                        match record.get("id").and_then(Value::as_i64) {
                            Some(id) => json!({"id": id * 2}),
                            None => json!({"errors": "bad id"}),
                        }
                    }
                }
                Ok(Box::new(D))
            }
        }
        register_transform(Arc::new(Doubler));
        let mut t = resolve_transform("double-id", &TransformConfig::default()).unwrap();
        let env = convert(json!({"id": 21}), t.as_mut());
        assert_eq!(env.output, Some(json!({"id": 42})));
        let env = convert(json!({"name": "x"}), t.as_mut());
        assert_eq!(env.output, Some(json!({"errors": "bad id"})));
    }
}
