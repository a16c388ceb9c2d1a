//! Lenient YAML → JSON conversion.
//!
//! YAML admits values JSON cannot hold directly: integers beyond 64 bits, custom tags,
//! non-string keys and non-finite floats. They are mapped to the closest JSON form instead
//! of failing the whole document.

use std::fmt;

use serde::de::{Deserialize, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde_json::{Map, Number, Value};

/// A JSON value decoded from YAML without rejecting anything YAML itself accepts.
pub(crate) struct LossyValue(pub(crate) Value);

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn key_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl<'de> Deserialize<'de> for LossyValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LossyVisitor;

        impl<'de> Visitor<'de> for LossyVisitor {
            type Value = LossyValue;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("any yaml value")
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<LossyValue, E> {
                Ok(LossyValue(Value::Bool(v)))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<LossyValue, E> {
                Ok(LossyValue(Value::Number(v.into())))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<LossyValue, E> {
                Ok(LossyValue(Value::Number(v.into())))
            }

            // out of 64-bit range: keep the magnitude as a float
            fn visit_i128<E: serde::de::Error>(self, v: i128) -> Result<LossyValue, E> {
                Ok(LossyValue(match i64::try_from(v) {
                    Ok(n) => Value::Number(n.into()),
                    Err(_) => float(v as f64),
                }))
            }

            fn visit_u128<E: serde::de::Error>(self, v: u128) -> Result<LossyValue, E> {
                Ok(LossyValue(match u64::try_from(v) {
                    Ok(n) => Value::Number(n.into()),
                    Err(_) => float(v as f64),
                }))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<LossyValue, E> {
                Ok(LossyValue(float(v)))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<LossyValue, E> {
                Ok(LossyValue(Value::String(v.to_owned())))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<LossyValue, E> {
                Ok(LossyValue(Value::String(v)))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<LossyValue, E> {
                Ok(LossyValue(Value::Null))
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<LossyValue, E> {
                Ok(LossyValue(Value::Null))
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<LossyValue, D::Error> {
                LossyValue::deserialize(d)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LossyValue, A::Error> {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(LossyValue(v)) = seq.next_element()? {
                    items.push(v);
                }
                Ok(LossyValue(Value::Array(items)))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<LossyValue, A::Error> {
                let mut out = Map::new();
                while let Some((LossyValue(k), LossyValue(v))) = map.next_entry()? {
                    out.insert(key_string(k), v);
                }
                Ok(LossyValue(Value::Object(out)))
            }

            // custom tags (`!foo bar`) arrive as enums; the tag is dropped, the content kept
            fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<LossyValue, A::Error> {
                let (_tag, variant): (String, _) = data.variant()?;
                variant.newtype_variant::<LossyValue>()
            }
        }

        deserializer.deserialize_any(LossyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(text: &str) -> Value {
        serde_yaml::from_str::<LossyValue>(text).unwrap().0
    }

    #[test]
    fn oversized_integers_become_floats() {
        let v = decode("n: 184467440737095516160\nsmall: 7\nneg: -3\n");
        assert_eq!(v["n"].as_f64(), Some(184467440737095516160.0));
        assert_eq!(v["small"], json!(7));
        assert_eq!(v["neg"], json!(-3));
    }

    #[test]
    fn custom_tags_keep_their_content() {
        let v = decode("v: !custom foo\nplain: bar\n");
        assert_eq!(v["v"], json!("foo"));
        assert_eq!(v["plain"], json!("bar"));
    }

    #[test]
    fn non_string_keys_and_non_finite_floats() {
        let v = decode("true: yes\n3: three\nnan: .nan\n");
        assert_eq!(v["true"], json!("yes"));
        assert_eq!(v["3"], json!("three"));
        assert_eq!(v["nan"], Value::Null);
    }
}
