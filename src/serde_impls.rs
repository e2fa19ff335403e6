use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt::{self, Formatter};
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::{Guard, HashSet, HashSetRef};

struct SetVisitor<K, S> {
    _marker: PhantomData<HashSet<K, S>>,
}

impl<K, S, G> Serialize for HashSetRef<'_, K, S, G>
where
    K: Serialize,
    G: Guard,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        // The length may change while we are visiting elements.
        let mut seq = serializer.serialize_seq(None)?;
        self.try_for_each(|key| seq.serialize_element(key))?;
        seq.end()
    }
}

impl<K, S> Serialize for HashSet<K, S>
where
    K: Serialize,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        self.pin().serialize(serializer)
    }
}

impl<'de, K, S> Deserialize<'de> for HashSet<K, S>
where
    K: Deserialize<'de> + Hash + Eq + Send + Sync + 'static,
    S: Default + BuildHasher + Send + Sync + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(SetVisitor::new())
    }
}

impl<K, S> SetVisitor<K, S> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<'de, K, S> Visitor<'de> for SetVisitor<K, S>
where
    K: Deserialize<'de> + Hash + Eq + Send + Sync + 'static,
    S: Default + BuildHasher + Send + Sync + 'static,
{
    type Value = HashSet<K, S>;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "a set")
    }

    fn visit_seq<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: SeqAccess<'de>,
    {
        // Leave room for every element below the growth threshold.
        let values = match access.size_hint() {
            Some(size) if size > 0 => {
                HashSet::with_capacity_and_hasher(size.saturating_mul(2), S::default())
                    .map_err(de::Error::custom)?
            }
            _ => HashSet::default(),
        };

        {
            let values = values.pin();
            while let Some(key) = access.next_element()? {
                values.add(key);
            }
        }

        Ok(values)
    }
}
