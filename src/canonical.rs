use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Field that carries the signature and is never part of the signed message.
pub const SIGNATURE_FIELD: &str = "signature";

/// Canonicalizes a serializable value to JCS and returns the UTF-8 bytes.
///
/// Object keys are sorted at every depth, output is compact, so the result
/// depends only on the set of key/value pairs and not on insertion order.
///
/// # Arguments
///
/// * `json` - The JSON value to canonicalize.
///
/// # Returns
///
/// The bytes of the JCS canonicalization.
pub fn canonicalize<T: Serialize + ?Sized>(json: &T) -> Result<Vec<u8>> {
    let jcs_json = serde_jcs::to_string(json)?;

    Ok(jcs_json.into_bytes())
}

/// Builds the exact message that gets signed and re-verified for a proof.
///
/// The `signature` field is stripped first; every other field, including
/// ones this crate does not know about, stays in the message.
///
/// # Arguments
///
/// * `fields` - The proof fields as a JSON object.
///
/// # Returns
///
/// The canonical message bytes.
pub fn canonical_message(fields: &Map<String, Value>) -> Result<Vec<u8>> {
    let mut unsigned = fields.clone();
    unsigned.remove(SIGNATURE_FIELD);

    canonicalize(&Value::Object(unsigned))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn sorts_keys_and_drops_whitespace() {
        let value = json!({ "nonce": "ab", "ai_model": "m", "prompt": "a cat" });

        let bytes = canonicalize(&value).unwrap();

        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"ai_model":"m","nonce":"ab","prompt":"a cat"}"#
        );
    }

    #[test]
    fn message_excludes_signature() {
        let fields = json!({ "image_hash": "00", "signature": "c2ln", "proof_type": "ai_generated" });
        let fields = fields.as_object().unwrap();

        let msg = canonical_message(fields).unwrap();

        assert_eq!(
            String::from_utf8(msg).unwrap(),
            r#"{"image_hash":"00","proof_type":"ai_generated"}"#
        );
    }

    #[test]
    fn nested_objects_are_sorted_too() {
        let value = json!({ "b": { "z": "1", "a": "2" }, "a": "x" });

        let bytes = canonicalize(&value).unwrap();

        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":"x","b":{"a":"2","z":"1"}}"#
        );
    }

    #[test]
    fn non_ascii_is_written_literally() {
        let value = json!({ "prompt": "chat noir \u{1F408}" });

        let bytes = canonicalize(&value).unwrap();

        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"prompt\":\"chat noir \u{1F408}\"}"
        );
    }

    /// Serializes its pairs as a JSON object in exactly the given order.
    struct Ordered<'a>(Vec<(&'a String, &'a String)>);

    impl Serialize for Ordered<'_> {
        fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            use serde::ser::SerializeMap;

            let mut map = serializer.serialize_map(Some(self.0.len()))?;
            for (k, v) in &self.0 {
                map.serialize_entry(k, v)?;
            }
            map.end()
        }
    }

    proptest! {
        #[test]
        fn insertion_order_does_not_matter(
            entries in proptest::collection::btree_map("[a-z_]{1,12}", "[ -~]{0,24}", 1..10),
            seed in any::<u64>(),
        ) {
            prop_assume!(!entries.contains_key(SIGNATURE_FIELD));

            let pairs: Vec<_> = entries.iter().collect();
            let shift = (seed as usize) % pairs.len();
            let rotated: Vec<_> = pairs[shift..].iter().chain(pairs[..shift].iter()).copied().collect();
            let reversed: Vec<_> = pairs.iter().rev().copied().collect();

            let a = canonicalize(&Ordered(pairs)).unwrap();
            let b = canonicalize(&Ordered(rotated.clone())).unwrap();
            let c = canonicalize(&Ordered(reversed)).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&a, &c);

            // the same pairs arriving as wire text in rotated order
            let text = serde_json::to_string(&Ordered(rotated)).unwrap();
            let parsed: Map<String, Value> = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(&a, &canonical_message(&parsed).unwrap());
        }
    }
}
