//! Snapshot frames - the by-value wire form of managed objects.
//!
//! A snapshot is a MessagePack frame `{ schema, version, body }`. The body is
//! the schema struct encoded with named fields, so a decoder can tell which
//! keys it does not know and refuse them instead of dropping data.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{DeserializeOwned, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{BridgeError, TypeTag};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// A struct that can cross the boundary as a snapshot.
///
/// `FIELDS` must list every serialized field path (`outer` and `outer.inner`
/// for nested structs); decoding rejects any other key as a schema mismatch.
pub trait SnapshotSchema: Serialize + DeserializeOwned + Default {
    /// Type tag written into the frame.
    const TAG: TypeTag;
    /// Field names the schema defines.
    const FIELDS: &'static [&'static str];
}

#[derive(Serialize, Deserialize)]
struct Frame {
    schema: u32,
    version: u16,
    body: Vec<u8>,
}

/// A decoded snapshot frame whose body has not been interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    tag: TypeTag,
    body: Vec<u8>,
}

impl Snapshot {
    /// Encode a schema value into snapshot bytes.
    pub fn encode<S: SnapshotSchema>(value: &S) -> Result<Vec<u8>, BridgeError> {
        let body = rmp_serde::to_vec_named(value)?;
        let frame = Frame {
            schema: S::TAG as u32,
            version: SNAPSHOT_VERSION,
            body,
        };
        Ok(rmp_serde::to_vec(&frame)?)
    }

    /// Decode the outer frame and check its tag and version.
    pub fn peek(bytes: &[u8]) -> Result<Self, BridgeError> {
        if bytes.is_empty() {
            return Err(BridgeError::DecodingFailure("empty snapshot".to_string()));
        }
        let frame: Frame = rmp_serde::from_slice(bytes)?;
        let tag = TypeTag::try_from(frame.schema)?;
        if frame.version != SNAPSHOT_VERSION {
            return Err(BridgeError::SchemaMismatch(format!(
                "{tag} snapshot version {} (supported: {SNAPSHOT_VERSION})",
                frame.version
            )));
        }
        Ok(Self {
            tag,
            body: frame.body,
        })
    }

    /// Type tag carried by the frame.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Interpret the body as `S`.
    pub fn decode<S: SnapshotSchema>(&self) -> Result<S, BridgeError> {
        if self.tag != S::TAG {
            return Err(BridgeError::SchemaMismatch(format!(
                "expected {} snapshot, got {}",
                S::TAG,
                self.tag
            )));
        }

        let shape: Shape = rmp_serde::from_slice(&self.body)?;
        let Shape::Map(fields) = shape else {
            return Err(BridgeError::DecodingFailure(format!(
                "{} snapshot body is not a map",
                S::TAG
            )));
        };
        let mut paths = Vec::new();
        collect_paths("", &fields, &mut paths);
        let unknown: Vec<&str> = paths
            .iter()
            .map(String::as_str)
            .filter(|p| !S::FIELDS.contains(p))
            .collect();
        if !unknown.is_empty() {
            return Err(BridgeError::SchemaMismatch(format!(
                "unknown {} fields: {}",
                S::TAG,
                unknown.join(", ")
            )));
        }

        Ok(rmp_serde::from_slice(&self.body)?)
    }
}

/// Key structure of a decoded body; leaf values are skipped.
enum Shape {
    Leaf,
    Map(BTreeMap<String, Shape>),
}

impl<'de> Deserialize<'de> for Shape {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ShapeVisitor)
    }
}

struct ShapeVisitor;

impl<'de> Visitor<'de> for ShapeVisitor {
    type Value = Shape;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any MessagePack value")
    }

    fn visit_bool<E>(self, _: bool) -> Result<Shape, E> {
        Ok(Shape::Leaf)
    }

    fn visit_i64<E>(self, _: i64) -> Result<Shape, E> {
        Ok(Shape::Leaf)
    }

    fn visit_u64<E>(self, _: u64) -> Result<Shape, E> {
        Ok(Shape::Leaf)
    }

    fn visit_f64<E>(self, _: f64) -> Result<Shape, E> {
        Ok(Shape::Leaf)
    }

    fn visit_str<E>(self, _: &str) -> Result<Shape, E> {
        Ok(Shape::Leaf)
    }

    fn visit_bytes<E>(self, _: &[u8]) -> Result<Shape, E> {
        Ok(Shape::Leaf)
    }

    fn visit_none<E>(self) -> Result<Shape, E> {
        Ok(Shape::Leaf)
    }

    fn visit_unit<E>(self) -> Result<Shape, E> {
        Ok(Shape::Leaf)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Shape, D::Error> {
        Shape::deserialize(deserializer)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Shape, D::Error> {
        Shape::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Shape, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Shape::Leaf)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Shape, A::Error> {
        let mut fields = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, Shape>()? {
            fields.insert(key, value);
        }
        Ok(Shape::Map(fields))
    }
}

fn collect_paths(prefix: &str, fields: &BTreeMap<String, Shape>, out: &mut Vec<String>) {
    for (key, value) in fields {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Shape::Map(nested) = value {
            collect_paths(&path, nested, out);
        }
        out.push(path);
    }
}

/// Decode snapshot bytes straight into `S`.
pub fn decode<S: SnapshotSchema>(bytes: &[u8]) -> Result<S, BridgeError> {
    Snapshot::peek(bytes)?.decode()
}

#[cfg(test)]
pub(crate) fn frame_with_body(tag: u32, version: u16, body: Vec<u8>) -> Vec<u8> {
    rmp_serde::to_vec(&Frame {
        schema: tag,
        version,
        body,
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        name: String,
        size: u64,
    }

    impl SnapshotSchema for Sample {
        const TAG: TypeTag = TypeTag::ProjectOptions;
        const FIELDS: &'static [&'static str] = &["name", "size"];
    }

    #[derive(Serialize)]
    struct SampleV2 {
        name: String,
        size: u64,
        colour: String,
    }

    #[test]
    fn encode_then_decode() {
        let sample = Sample {
            name: "alpha".to_string(),
            size: 7,
        };
        let bytes = Snapshot::encode(&sample).unwrap();
        let restored: Sample = decode(&bytes).unwrap();
        assert_eq!(restored, sample);
    }

    #[test]
    fn encoding_is_deterministic() {
        let sample = Sample {
            name: "alpha".to_string(),
            size: 7,
        };
        assert_eq!(
            Snapshot::encode(&sample).unwrap(),
            Snapshot::encode(&sample).unwrap()
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let body = rmp_serde::to_vec_named(&SampleV2 {
            name: "alpha".to_string(),
            size: 7,
            colour: "red".to_string(),
        })
        .unwrap();
        let bytes = frame_with_body(Sample::TAG as u32, SNAPSHOT_VERSION, body);

        let err = decode::<Sample>(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        #[derive(Serialize)]
        struct NameOnly {
            name: String,
        }
        let body = rmp_serde::to_vec_named(&NameOnly {
            name: "beta".to_string(),
        })
        .unwrap();
        let bytes = frame_with_body(Sample::TAG as u32, SNAPSHOT_VERSION, body);

        let restored: Sample = decode(&bytes).unwrap();
        assert_eq!(restored.name, "beta");
        assert_eq!(restored.size, 0);
    }

    #[test]
    fn wrong_tag_is_schema_mismatch() {
        let bytes = Snapshot::encode(&Sample::default()).unwrap();
        let mut snapshot = Snapshot::peek(&bytes).unwrap();
        snapshot.tag = TypeTag::BucketConfig;
        let err = snapshot.decode::<Sample>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn future_version_is_schema_mismatch() {
        let body = rmp_serde::to_vec_named(&Sample::default()).unwrap();
        let bytes = frame_with_body(Sample::TAG as u32, SNAPSHOT_VERSION + 1, body);
        let err = Snapshot::peek(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn unknown_tag_is_schema_mismatch() {
        let body = rmp_serde::to_vec_named(&Sample::default()).unwrap();
        let bytes = frame_with_body(77, SNAPSHOT_VERSION, body);
        let err = Snapshot::peek(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn garbage_is_decoding_failure() {
        for bytes in [&[][..], &[0xc1][..], &[0x93, 0x01][..]] {
            let err = Snapshot::peek(bytes).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DecodingFailure, "{bytes:?}");
        }
    }

    #[test]
    fn body_of_wrong_shape_is_decoding_failure() {
        let body = rmp_serde::to_vec(&42u32).unwrap();
        let bytes = frame_with_body(Sample::TAG as u32, SNAPSHOT_VERSION, body);
        let err = decode::<Sample>(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingFailure);
    }
}
