//! Fusión determinista de documentos de configuración.
//!
//! Merge profundo: los mappings se fusionan recursivamente y las claves de
//! `overlay` reemplazan a las de `base`. Para cualquier otro par de valores
//! (listas incluidas) `overlay` tiene precedencia completa.

use serde_json::Value;

pub fn merge_json(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(mb), Value::Object(mo)) => {
            let mut out = mb.clone();
            for (k, v) in mo.iter() {
                let merged = match out.get(k) {
                    Some(existing) => merge_json(existing, v),
                    None => v.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        (_, other) => other.clone(),
    }
}
