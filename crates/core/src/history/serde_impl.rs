//! Serde forms for mops and ops.
//!
//! A mop serializes as a 3-tuple `[tag, key, value]` with tag `"append"`,
//! `"r"`, or `"w"`. Read values are `null` (never observed), a scalar, or
//! a list. Deserialization additionally accepts the tagged-enum form
//! `{"Read": {...}} / {"Write": {...}} / {"Append": {...}}`, so histories
//! written by a derived serializer parse as well.
//! An op is a map `{"index": .., "process": .., "type": "ok", "time": ..,
//! "value": [[mop], ..]}`; unknown fields (such as `"f"`) are ignored.

use core::fmt::{self, Formatter};
use core::marker::PhantomData;

use super::{Mop, Observed, Op, OpKind};

impl<K, V> ::serde::Serialize for Mop<K, V>
where
    K: ::serde::Serialize,
    V: ::serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ::serde::Serializer,
    {
        use ::serde::ser::SerializeTuple;
        let mut tup = serializer.serialize_tuple(3)?;
        match self {
            Self::Read { key, value } => {
                tup.serialize_element("r")?;
                tup.serialize_element(key)?;
                tup.serialize_element(value)?;
            }
            Self::Write { key, value } => {
                tup.serialize_element("w")?;
                tup.serialize_element(key)?;
                tup.serialize_element(value)?;
            }
            Self::Append { key, element } => {
                tup.serialize_element("append")?;
                tup.serialize_element(key)?;
                tup.serialize_element(element)?;
            }
        }
        tup.end()
    }
}

impl<'de, K, V> ::serde::Deserialize<'de> for Mop<K, V>
where
    K: ::serde::Deserialize<'de>,
    V: ::serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: ::serde::Deserializer<'de>,
    {
        use ::serde::de::{self, MapAccess, SeqAccess, Visitor};

        struct MopVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for MopVisitor<K, V>
        where
            K: ::serde::Deserialize<'de>,
            V: ::serde::Deserialize<'de>,
        {
            type Value = Mop<K, V>;

            fn expecting(&self, f: &mut Formatter) -> fmt::Result {
                f.write_str(
                    "a mop tuple [\"append\"/\"r\"/\"w\", key, value] \
                     or a tagged map {\"Read\"/\"Write\"/\"Append\": {..}}",
                )
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let tag: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &"3"))?;
                let key: K = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &"3"))?;

                match tag.as_str() {
                    "r" => {
                        let value: Option<Observed<V>> = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(2, &"3"))?;
                        Ok(Mop::Read { key, value })
                    }
                    "w" => {
                        let value: V = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(2, &"3"))?;
                        Ok(Mop::Write { key, value })
                    }
                    "append" => {
                        let element: V = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(2, &"3"))?;
                        Ok(Mop::Append { key, element })
                    }
                    other => Err(de::Error::custom(format!(
                        "unknown mop tag {other:?}, expected \"append\", \"r\", or \"w\""
                    ))),
                }
            }

            // Tagged enum: {"Read": {...}}, {"Write": {...}}, {"Append": {...}}
            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let tag: String = map
                    .next_key()?
                    .ok_or_else(|| de::Error::custom("expected Read, Write, or Append key"))?;

                match tag.as_str() {
                    "Read" => {
                        #[derive(::serde::Deserialize)]
                        struct ReadFields<K, V> {
                            key: K,
                            value: Option<Observed<V>>,
                        }
                        let fields: ReadFields<K, V> = map.next_value()?;
                        Ok(Mop::Read {
                            key: fields.key,
                            value: fields.value,
                        })
                    }
                    "Write" => {
                        #[derive(::serde::Deserialize)]
                        struct WriteFields<K, V> {
                            key: K,
                            value: V,
                        }
                        let fields: WriteFields<K, V> = map.next_value()?;
                        Ok(Mop::Write {
                            key: fields.key,
                            value: fields.value,
                        })
                    }
                    "Append" => {
                        #[derive(::serde::Deserialize)]
                        struct AppendFields<K, V> {
                            key: K,
                            element: V,
                        }
                        let fields: AppendFields<K, V> = map.next_value()?;
                        Ok(Mop::Append {
                            key: fields.key,
                            element: fields.element,
                        })
                    }
                    other => Err(de::Error::unknown_variant(
                        other,
                        &["Read", "Write", "Append"],
                    )),
                }
            }
        }

        deserializer.deserialize_any(MopVisitor(PhantomData))
    }
}

#[derive(::serde::Deserialize)]
struct OpRecord<K, V> {
    index: u64,
    process: u64,
    #[serde(rename = "type")]
    kind: OpKind,
    #[serde(rename = "value", default = "Vec::new")]
    mops: Vec<Mop<K, V>>,
    #[serde(default)]
    time: i64,
}

impl<K, V> ::serde::Serialize for Op<K, V>
where
    K: ::serde::Serialize,
    V: ::serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ::serde::Serializer,
    {
        use ::serde::ser::SerializeStruct;
        let mut rec = serializer.serialize_struct("Op", 5)?;
        rec.serialize_field("index", &self.index)?;
        rec.serialize_field("process", &self.process)?;
        rec.serialize_field("type", &self.kind)?;
        rec.serialize_field("value", &self.mops)?;
        rec.serialize_field("time", &self.time)?;
        rec.end()
    }
}

impl<'de, K, V> ::serde::Deserialize<'de> for Op<K, V>
where
    K: ::serde::Deserialize<'de>,
    V: ::serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: ::serde::Deserializer<'de>,
    {
        let rec = OpRecord::<K, V>::deserialize(deserializer)?;
        Ok(Self {
            index: rec.index,
            process: rec.process,
            kind: rec.kind,
            mops: rec.mops,
            time: rec.time,
        })
    }
}
