use serde_json::Value;

use crate::models::PatchOperation;

/// RFC 6902-shaped changes turning `from` into `to`.
///
/// Objects are compared key by key, arrays index by index. A shrinking
/// array is trimmed from its highest index down so every emitted remove is
/// valid when the list is applied in order.
pub fn diff_documents(from: &Value, to: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_at("", from, to, &mut ops);
    ops
}

fn diff_at(path: &str, from: &Value, to: &Value, ops: &mut Vec<PatchOperation>) {
    if from == to {
        return;
    }

    match (from, to) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old) in a {
                let child = format!("{path}/{}", escape_token(key));
                match b.get(key) {
                    Some(new) => diff_at(&child, old, new, ops),
                    None => ops.push(PatchOperation::remove(child)),
                }
            }
            for (key, new) in b {
                if !a.contains_key(key) {
                    ops.push(PatchOperation::add(
                        format!("{path}/{}", escape_token(key)),
                        new.clone(),
                    ));
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let shared = a.len().min(b.len());
            for i in 0..shared {
                diff_at(&format!("{path}/{i}"), &a[i], &b[i], ops);
            }
            for i in (shared..a.len()).rev() {
                ops.push(PatchOperation::remove(format!("{path}/{i}")));
            }
            for (i, new) in b.iter().enumerate().skip(shared) {
                ops.push(PatchOperation::add(format!("{path}/{i}"), new.clone()));
            }
        }
        _ => ops.push(PatchOperation::replace(path, to.clone())),
    }
}

fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
