use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const PROFESSION_UNSPECIFIED: &str = "Not specified";

/// One directory entry as it appears on the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    pub name: String,
    pub image_ref: String,
    pub detail_ref: String,
}

/// Fields scraped from a person's detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detail {
    pub description: String,
    pub profession: String,
}

/// A person's persisted record. Field names on disk follow the site's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(rename = "location")]
    pub group: String,
    #[serde(rename = "img")]
    pub image_ref: String,
    #[serde(rename = "href")]
    pub detail_ref: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "unspecified")]
    pub profession: String,
    #[serde(rename = "haiku", default, skip_serializing_if = "Option::is_none")]
    pub generated_poem: Option<String>,
    #[serde(rename = "summary_en", default, skip_serializing_if = "Option::is_none")]
    pub generated_summary: Option<String>,
}

fn unspecified() -> String {
    PROFESSION_UNSPECIFIED.to_string()
}

impl Record {
    pub fn assemble(group: &str, stub: &Stub, detail: Detail) -> Self {
        Record {
            name: stub.name.clone(),
            group: group.to_string(),
            image_ref: stub.image_ref.clone(),
            detail_ref: stub.detail_ref.clone(),
            description: detail.description,
            profession: detail.profession,
            generated_poem: None,
            generated_summary: None,
        }
    }
}

/// A directory section and its members, in page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group<T> {
    pub name: String,
    pub members: Vec<T>,
}

/// Ordered group → stubs mapping produced by the directory extractor.
pub type Listing = Vec<Group<Stub>>;

/// Whole-dataset view written after each phase.
///
/// Serialized as a JSON object keyed by group name; key order is the
/// extraction order, which a plain map type would not keep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub groups: Vec<Group<Record>>,
}

impl Snapshot {
    /// Add an empty group. A heading seen before keeps its first position,
    /// so a repeated section merges into it.
    pub fn push_group(&mut self, name: &str) {
        if self.groups.iter().any(|g| g.name == name) {
            return;
        }
        self.groups.push(Group {
            name: name.to_string(),
            members: Vec::new(),
        });
    }

    /// Append to the named group, creating it at the end if new.
    pub fn push(&mut self, group: &str, record: Record) {
        match self.groups.iter_mut().find(|g| g.name == group) {
            Some(g) => g.members.push(record),
            None => self.groups.push(Group {
                name: group.to_string(),
                members: vec![record],
            }),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    pub fn len(&self) -> usize {
        self.records().count()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for g in &self.groups {
            map.serialize_entry(&g.name, &g.members)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = Snapshot;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of group name to records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Snapshot, A::Error> {
                let mut snapshot = Snapshot::default();
                while let Some((name, members)) = access.next_entry::<String, Vec<Record>>()? {
                    snapshot.groups.push(Group { name, members });
                }
                Ok(snapshot)
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(group: &str, name: &str) -> Record {
        Record {
            name: name.to_string(),
            group: group.to_string(),
            image_ref: "https://example.com/a.jpg".into(),
            detail_ref: "https://example.com/a".into(),
            description: "Beskrivelse".into(),
            profession: "Developer".into(),
            generated_poem: None,
            generated_summary: None,
        }
    }

    #[test]
    fn record_uses_site_field_names() {
        let json = serde_json::to_value(record("Oslo", "Ola Nordmann")).unwrap();
        assert_eq!(json["location"], "Oslo");
        assert_eq!(json["img"], "https://example.com/a.jpg");
        assert_eq!(json["href"], "https://example.com/a");
        assert!(json.get("haiku").is_none());
        assert!(json.get("summary_en").is_none());
    }

    #[test]
    fn record_missing_profession_defaults() {
        let json = r#"{"name":"A","location":"Oslo","img":"i","href":"h"}"#;
        let r: Record = serde_json::from_str(json).unwrap();
        assert_eq!(r.profession, PROFESSION_UNSPECIFIED);
        assert!(r.description.is_empty());
    }

    #[test]
    fn snapshot_keeps_group_order() {
        let mut snap = Snapshot::default();
        snap.push("Trondheim", record("Trondheim", "B"));
        snap.push("Bergen", record("Bergen", "C"));
        snap.push("Trondheim", record("Trondheim", "D"));

        let text = serde_json::to_string(&snap).unwrap();
        assert!(text.find("Trondheim").unwrap() < text.find("Bergen").unwrap());

        let back: Snapshot = serde_json::from_str(&text).unwrap();
        let names: Vec<_> = back.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Trondheim", "Bergen"]);
        assert_eq!(back.groups[0].members.len(), 2);
        assert_eq!(back.len(), 3);
    }

    #[test]
    fn repeated_heading_merges_into_one_group() {
        let mut snap = Snapshot::default();
        for name in ["Oslo", "Bergen", "Oslo"] {
            snap.push_group(name);
        }
        snap.push("Oslo", record("Oslo", "A"));
        snap.push("Bergen", record("Bergen", "B"));
        snap.push("Oslo", record("Oslo", "C"));

        let names: Vec<_> = snap.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Oslo", "Bergen"]);

        let text = serde_json::to_string(&snap).unwrap();
        assert_eq!(text.matches("\"Oslo\":").count(), 1);
        let back: Snapshot = serde_json::from_str(&text).unwrap();
        let oslo: Vec<_> = back.groups[0].members.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(oslo, ["A", "C"]);
    }
}
