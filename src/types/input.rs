//! Producer-side annotation tree accepted by the writer.
//!
//! Span boundaries are **character** offsets into `text`, as NLP producers emit them; the
//! writer converts them to UTF-8 byte offsets before anything is written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One document as emitted by a producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInput {
    pub text: String,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub external_key: Option<Value>,
    #[serde(default)]
    pub taggers: Vec<TaggerInput>,
}

impl DocumentInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    #[must_use]
    pub fn external_key(mut self, key: Value) -> Self {
        self.external_key = Some(key);
        self
    }

    #[must_use]
    pub fn tagger(mut self, tagger: TaggerInput) -> Self {
        self.taggers.push(tagger);
        self
    }
}

/// Annotations contributed by one producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggerInput {
    #[serde(alias = "tagger")]
    pub signature: Value,
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<TagInput>>,
    /// Dense vectors per tag name, one row per entry of that tag in input order.
    #[serde(default)]
    pub vectors: BTreeMap<String, VectorInput>,
}

impl TaggerInput {
    #[must_use]
    pub fn new(signature: Value) -> Self {
        Self {
            signature,
            tags: BTreeMap::new(),
            vectors: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, name: impl Into<String>, entries: Vec<TagInput>) -> Self {
        self.tags.insert(name.into(), entries);
        self
    }

    pub fn vectors(mut self, tag: impl Into<String>, rows: Vec<Vec<f32>>) -> Self {
        self.vectors.insert(tag.into(), VectorInput::Rows(rows));
        self
    }

    pub fn vector_stream(
        mut self,
        tag: impl Into<String>,
        stream: impl Into<String>,
        rows: Vec<Vec<f32>>,
    ) -> Self {
        let tag = tag.into();
        let mut streams = match self.vectors.remove(&tag) {
            Some(VectorInput::Streams(streams)) => streams,
            Some(VectorInput::Rows(rows)) => {
                BTreeMap::from([(crate::types::DEFAULT_VECTOR_STREAM.to_string(), rows)])
            }
            None => BTreeMap::new(),
        };
        streams.insert(stream.into(), rows);
        self.vectors.insert(tag, VectorInput::Streams(streams));
        self
    }
}

/// Vectors for one tag: either a single unnamed stream or several named ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorInput {
    Rows(Vec<Vec<f32>>),
    Streams(BTreeMap<String, Vec<Vec<f32>>>),
}

impl VectorInput {
    /// Named streams, with an unnamed stream reported under the default name.
    pub fn streams(&self) -> Vec<(&str, &[Vec<f32>])> {
        match self {
            Self::Rows(rows) => vec![(crate::types::DEFAULT_VECTOR_STREAM, rows.as_slice())],
            Self::Streams(streams) => streams
                .iter()
                .map(|(name, rows)| (name.as_str(), rows.as_slice()))
                .collect(),
        }
    }
}

/// One tag entry. Without `start`/`end` it labels the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagInput {
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub end: Option<usize>,
    #[serde(default)]
    pub labels: Vec<LabelInput>,
    /// Index of the parent entry within the same tag's entry list.
    #[serde(default)]
    pub parent: Option<usize>,
}

impl TagInput {
    #[must_use]
    pub fn span(start: usize, end: usize) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn document() -> Self {
        Self::default()
    }

    pub fn label(mut self, value: impl Into<String>) -> Self {
        self.labels.push(LabelInput {
            value: value.into(),
            score: None,
        });
        self
    }

    pub fn scored(mut self, value: impl Into<String>, score: f32) -> Self {
        self.labels.push(LabelInput {
            value: value.into(),
            score: Some(score),
        });
        self
    }

    #[must_use]
    pub fn parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelInput {
    pub value: String,
    #[serde(default)]
    pub score: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_producer_json() {
        let doc: DocumentInput = serde_json::from_value(json!({
            "text": "Ab.",
            "meta": {"source": "unit"},
            "taggers": [{
                "tagger": {"lib": "x"},
                "tags": {
                    "token": [
                        {"start": 0, "end": 1, "labels": [{"value": "Ab"}]},
                        {"start": 2, "end": 3, "labels": [{"value": ".", "score": 0.5}], "parent": 0}
                    ],
                    "lang": [{"labels": [{"value": "en"}]}]
                },
                "vectors": {"token": [[1.0, 2.0], [3.0, 4.0]]}
            }]
        }))
        .expect("parse");

        let tagger = &doc.taggers[0];
        assert_eq!(tagger.signature, json!({"lib": "x"}));
        let tokens = &tagger.tags["token"];
        assert_eq!(tokens[1].parent, Some(0));
        assert_eq!(tokens[1].labels[0].score, Some(0.5));
        assert_eq!(tagger.tags["lang"][0].start, None);
        assert!(matches!(tagger.vectors["token"], VectorInput::Rows(ref rows) if rows.len() == 2));
    }

    #[test]
    fn named_streams_keep_the_unnamed_rows() {
        let tagger = TaggerInput::new(json!({"lib": "x"}))
            .vectors("token", vec![vec![1.0]])
            .vector_stream("token", "context", vec![vec![2.0]]);
        let streams = tagger.vectors["token"].streams();
        let names: Vec<&str> = streams.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["context", crate::types::DEFAULT_VECTOR_STREAM]);
    }
}
